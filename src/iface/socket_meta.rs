//! Per-socket bookkeeping the interface needs but sockets themselves don't:
//! when a socket last failed to dispatch for want of a resolved neighbor,
//! and how that interacts with the timer it reports through `poll_at`.

use crate::time::{Duration, Instant};

/// When a socket next wants to be polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollAt {
    /// Only when new data arrives; no timer is outstanding.
    Ingress,
    /// As soon as possible.
    Now,
    /// Not before the given instant.
    Time(Instant),
}

/// A small amount of rate-limiting state for egress attempts that failed
/// because the destination's hardware address isn't resolved yet.
const DISCOVER_RETRY: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
pub struct Meta {
    neighbor_missing_since: Option<Instant>,
}

impl Meta {
    /// Whether this socket is allowed to attempt egress right now: either it
    /// has never failed on a missing neighbor, or enough time has passed to
    /// retry.
    pub(crate) fn egress_permitted(
        &self,
        now: Instant,
        has_neighbor: impl FnMut(crate::wire::IpAddress) -> bool,
    ) -> bool {
        let _ = has_neighbor;
        match self.neighbor_missing_since {
            Some(since) => now - since >= DISCOVER_RETRY,
            None => true,
        }
    }

    /// Record that dispatch for this socket just failed because `neighbor`
    /// hasn't been resolved yet.
    pub(crate) fn neighbor_missing(&mut self, now: Instant, _neighbor: crate::wire::IpAddress) {
        self.neighbor_missing_since = Some(now);
    }

    /// Combine a socket's own notion of when it wants to run with this
    /// meta's neighbor back-off, producing the single deadline the
    /// interface should actually schedule.
    pub(crate) fn poll_at(
        &self,
        socket_poll_at: PollAt,
        has_neighbor: impl FnMut(crate::wire::IpAddress) -> bool,
    ) -> PollAt {
        let _ = has_neighbor;
        match (socket_poll_at, self.neighbor_missing_since) {
            (PollAt::Ingress, _) => PollAt::Ingress,
            (poll_at, None) => poll_at,
            (PollAt::Now, Some(since)) => PollAt::Time(since + DISCOVER_RETRY),
            (PollAt::Time(t), Some(since)) => PollAt::Time(t.max(since + DISCOVER_RETRY)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::IpAddress;

    fn no_neighbor(_: crate::wire::IpAddress) -> bool {
        false
    }

    #[test]
    fn fresh_meta_permits_egress() {
        let meta = Meta::default();
        assert!(meta.egress_permitted(Instant::from_millis(0), no_neighbor));
    }

    #[test]
    fn missing_neighbor_blocks_egress_until_retry_interval_elapses() {
        let mut meta = Meta::default();
        let now = Instant::from_millis(0);
        meta.neighbor_missing(now, IpAddress::v4(127, 0, 0, 1));
        assert!(!meta.egress_permitted(now, no_neighbor));
        assert!(meta.egress_permitted(now + DISCOVER_RETRY, no_neighbor));
    }

    #[test]
    fn poll_at_ingress_always_wins() {
        let mut meta = Meta::default();
        meta.neighbor_missing(Instant::from_millis(0), IpAddress::v4(127, 0, 0, 1));
        assert_eq!(meta.poll_at(PollAt::Ingress, no_neighbor), PollAt::Ingress);
    }

    #[test]
    fn poll_at_defers_now_until_the_neighbor_backoff_expires() {
        let mut meta = Meta::default();
        let now = Instant::from_millis(0);
        meta.neighbor_missing(now, IpAddress::v4(127, 0, 0, 1));
        assert_eq!(meta.poll_at(PollAt::Now, no_neighbor), PollAt::Time(now + DISCOVER_RETRY));
    }

    #[test]
    fn poll_at_without_a_missing_neighbor_passes_through_unchanged() {
        let meta = Meta::default();
        let at = Instant::from_millis(500);
        assert_eq!(meta.poll_at(PollAt::Time(at), no_neighbor), PollAt::Time(at));
    }
}
