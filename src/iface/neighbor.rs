//! Address resolution cache: internet address -> hardware address.
//!
//! Entries move Free -> Pending -> Resolved -> Stale -> Free. `lookup` is a
//! read-only query so it never allocates a slot; callers that get `NotFound`
//! are expected to actually send a request and then call [`Cache::limit_rate`]
//! to record the attempt.

use crate::config::{ARP_CACHE_SIZE, ARP_MAX_RETRIES, ARP_RESOLVED_TIMEOUT_SECS};
use crate::time::{Duration, Instant};
use crate::wire::{HardwareAddress, IpAddress};

const RESOLVED_TIMEOUT: Duration = Duration::from_secs(ARP_RESOLVED_TIMEOUT_SECS);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Free,
    Pending { retries_left: u8 },
    Resolved,
    Stale,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    addr: IpAddress,
    hardware_addr: HardwareAddress,
    state: State,
    updated_at: Instant,
}

impl Entry {
    const fn free() -> Self {
        Entry {
            addr: IpAddress::Ipv4(crate::wire::Ipv4Address::UNSPECIFIED),
            hardware_addr: HardwareAddress::Ethernet(crate::wire::EthernetAddress::BROADCAST),
            state: State::Free,
            updated_at: Instant::from_millis(0),
        }
    }
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    /// A hardware address is on file and may be used directly.
    Found(HardwareAddress),
    /// Nothing usable on file; the caller should issue a request and then
    /// call [`Cache::limit_rate`] to record the attempt.
    NotFound,
    /// A request for this address was already sent recently; don't resend yet.
    RateLimited,
}

impl Answer {
    pub fn found(&self) -> bool {
        matches!(self, Answer::Found(_))
    }
}

/// Fixed-capacity address resolution cache.
#[derive(Debug)]
pub struct Cache {
    storage: [Entry; ARP_CACHE_SIZE],
}

impl Cache {
    pub fn new() -> Self {
        Cache {
            storage: [Entry::free(); ARP_CACHE_SIZE],
        }
    }

    pub(crate) fn flush(&mut self) {
        self.storage = [Entry::free(); ARP_CACHE_SIZE];
    }

    fn find_mut(&mut self, addr: &IpAddress) -> Option<&mut Entry> {
        self.storage
            .iter_mut()
            .find(|e| e.state != State::Free && e.addr == *addr)
    }

    /// Pick a slot to (re)use: prefer a Free one, else the oldest Stale, else
    /// the oldest Resolved.
    fn evict_slot(&mut self) -> &mut Entry {
        if let Some(i) = self.storage.iter().position(|e| e.state == State::Free) {
            return &mut self.storage[i];
        }

        let oldest = |storage: &[Entry], want: State| {
            storage
                .iter()
                .enumerate()
                .filter(|(_, e)| e.state == want)
                .min_by_key(|(_, e)| e.updated_at)
                .map(|(i, _)| i)
        };

        if let Some(i) = oldest(&self.storage, State::Stale) {
            return &mut self.storage[i];
        }
        if let Some(i) = oldest(&self.storage, State::Resolved) {
            return &mut self.storage[i];
        }
        // Every slot is Pending; reuse the oldest one.
        let i = (0..self.storage.len())
            .min_by_key(|&i| self.storage[i].updated_at)
            .unwrap_or(0);
        &mut self.storage[i]
    }

    /// Look up a hardware address. Never mutates the cache.
    pub fn lookup(&self, addr: &IpAddress, now: Instant) -> Answer {
        match self
            .storage
            .iter()
            .find(|e| e.state != State::Free && e.addr == *addr)
        {
            Some(e) => match e.state {
                State::Resolved | State::Stale => Answer::Found(e.hardware_addr),
                State::Pending { .. } => {
                    if now - e.updated_at < crate::time::Duration::from_secs(
                        crate::config::ARP_RETRY_INTERVAL_SECS,
                    ) {
                        Answer::RateLimited
                    } else {
                        Answer::NotFound
                    }
                }
                State::Free => unreachable!(),
            },
            None => Answer::NotFound,
        }
    }

    /// Record that a resolution request for `addr` was just (re)sent.
    ///
    /// Allocates a Pending entry if none exists; otherwise decrements its
    /// retry budget, freeing it once exhausted.
    pub(crate) fn limit_rate(&mut self, addr: IpAddress, now: Instant) {
        if let Some(e) = self.find_mut(&addr) {
            match &mut e.state {
                State::Pending { retries_left } => {
                    if *retries_left == 0 {
                        e.state = State::Free;
                    } else {
                        *retries_left -= 1;
                        e.updated_at = now;
                    }
                }
                _ => {
                    e.state = State::Pending {
                        retries_left: ARP_MAX_RETRIES,
                    };
                    e.updated_at = now;
                }
            }
            return;
        }

        let e = self.evict_slot();
        *e = Entry {
            addr,
            hardware_addr: HardwareAddress::Ethernet(crate::wire::EthernetAddress::BROADCAST),
            state: State::Pending {
                retries_left: ARP_MAX_RETRIES,
            },
            updated_at: now,
        };
    }

    /// Bind `addr` to `hardware_addr`, marking the entry Resolved.
    ///
    /// Allocates a new entry (via the eviction order) if one doesn't exist.
    pub(crate) fn fill(&mut self, addr: IpAddress, hardware_addr: HardwareAddress, now: Instant) {
        if let Some(e) = self.find_mut(&addr) {
            e.hardware_addr = hardware_addr;
            e.state = State::Resolved;
            e.updated_at = now;
            return;
        }

        let e = self.evict_slot();
        *e = Entry {
            addr,
            hardware_addr,
            state: State::Resolved,
            updated_at: now,
        };
    }

    /// Refresh an *existing* entry's binding and timestamp without allocating
    /// a new one. Used when we observe traffic from an address we already
    /// have on file, even outside of ARP itself.
    pub(crate) fn reset_expiry_if_existing(
        &mut self,
        addr: IpAddress,
        hardware_addr: HardwareAddress,
        now: Instant,
    ) {
        if let Some(e) = self.find_mut(&addr) {
            e.hardware_addr = hardware_addr;
            e.state = State::Resolved;
            e.updated_at = now;
        }
    }

    /// Timer maintenance: age Resolved entries into Stale after the
    /// timeout, and free Stale entries after twice the timeout. Returns the
    /// addresses of Pending entries that are due for a retransmit, so the
    /// caller (which owns the device) can actually send the request.
    pub(crate) fn poll(&mut self, now: Instant) -> heapless::Vec<IpAddress, ARP_CACHE_SIZE> {
        let retry_interval =
            crate::time::Duration::from_secs(crate::config::ARP_RETRY_INTERVAL_SECS);
        let mut due = heapless::Vec::new();

        for e in self.storage.iter_mut() {
            match e.state {
                State::Resolved if now - e.updated_at >= RESOLVED_TIMEOUT => {
                    e.state = State::Stale;
                }
                State::Stale if now - e.updated_at >= RESOLVED_TIMEOUT * 2 => {
                    e.state = State::Free;
                }
                State::Pending { retries_left } if now - e.updated_at >= retry_interval => {
                    if retries_left == 0 {
                        e.state = State::Free;
                    } else {
                        let _ = due.push(e.addr);
                    }
                }
                _ => {}
            }
        }

        due
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> IpAddress {
        IpAddress::v4(192, 168, 1, last)
    }

    fn hw(last: u8) -> HardwareAddress {
        HardwareAddress::Ethernet(crate::wire::EthernetAddress([0x02, 0, 0, 0, 0, last]))
    }

    #[test]
    fn lookup_on_empty_cache_is_not_found() {
        let cache = Cache::new();
        assert_eq!(cache.lookup(&addr(1), Instant::from_millis(0)), Answer::NotFound);
    }

    #[test]
    fn fill_then_lookup_finds_entry() {
        let mut cache = Cache::new();
        let now = Instant::from_millis(0);
        cache.fill(addr(1), hw(1), now);
        assert_eq!(cache.lookup(&addr(1), now), Answer::Found(hw(1)));
    }

    #[test]
    fn pending_entry_is_rate_limited_until_retry_interval_elapses() {
        let mut cache = Cache::new();
        let now = Instant::from_millis(0);
        cache.limit_rate(addr(1), now);
        assert_eq!(cache.lookup(&addr(1), now), Answer::RateLimited);

        let later = now + Duration::from_secs(crate::config::ARP_RETRY_INTERVAL_SECS);
        assert_eq!(cache.lookup(&addr(1), later), Answer::NotFound);
    }

    #[test]
    fn limit_rate_exhausts_retries_then_frees_the_slot() {
        let mut cache = Cache::new();
        let now = Instant::from_millis(0);
        cache.limit_rate(addr(1), now);
        for _ in 0..ARP_MAX_RETRIES {
            cache.limit_rate(addr(1), now);
        }
        // Retries are now exhausted; the next call frees the slot outright.
        cache.limit_rate(addr(1), now);
        assert_eq!(cache.lookup(&addr(1), now), Answer::NotFound);
    }

    #[test]
    fn poll_ages_resolved_entries_to_stale_then_free() {
        let mut cache = Cache::new();
        let now = Instant::from_millis(0);
        cache.fill(addr(1), hw(1), now);

        let stale_at = now + RESOLVED_TIMEOUT;
        cache.poll(stale_at);
        assert_eq!(cache.lookup(&addr(1), stale_at), Answer::Found(hw(1)), "Stale is still usable");

        let freed_at = now + RESOLVED_TIMEOUT * 2;
        cache.poll(freed_at);
        assert_eq!(cache.lookup(&addr(1), freed_at), Answer::NotFound);
    }

    #[test]
    fn poll_reports_overdue_pending_entries_for_retransmit() {
        let mut cache = Cache::new();
        let now = Instant::from_millis(0);
        cache.limit_rate(addr(1), now);

        let due = now + Duration::from_secs(crate::config::ARP_RETRY_INTERVAL_SECS);
        let overdue = cache.poll(due);
        assert!(overdue.iter().any(|a| *a == addr(1)));
    }

    #[test]
    fn fill_evicts_an_entry_once_the_cache_is_full() {
        let mut cache = Cache::new();
        let now = Instant::from_millis(0);
        for i in 0..ARP_CACHE_SIZE as u8 {
            cache.fill(addr(i), hw(i), now);
        }
        // Cache is full of Resolved entries; filling one more must evict the
        // oldest rather than silently failing.
        cache.fill(addr(ARP_CACHE_SIZE as u8), hw(ARP_CACHE_SIZE as u8), now + Duration::from_secs(1));
        assert_eq!(
            cache.lookup(&addr(ARP_CACHE_SIZE as u8), now + Duration::from_secs(1)),
            Answer::Found(hw(ARP_CACHE_SIZE as u8))
        );
    }
}
