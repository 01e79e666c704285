//! An in-memory device that reflects every transmitted frame back onto its
//! own receive queue. Used by tests and demos that need a real [`Device`]
//! without a tap interface or root privileges.

use std::collections::VecDeque;

use crate::phy::{Device, DeviceCapabilities, Medium, RxToken, TxToken};
use crate::time::Instant;

/// A software loopback device: frames handed to `transmit` are queued and
/// handed back out on the next `receive`.
#[derive(Debug)]
pub struct Loopback {
    queue: VecDeque<Vec<u8>>,
    medium: Medium,
}

impl Loopback {
    /// Create a loopback device for the given medium. `medium` matters
    /// because it decides whether `Interface` runs ARP over this device.
    pub fn new(medium: Medium) -> Self {
        Loopback {
            queue: VecDeque::new(),
            medium,
        }
    }
}

impl Device for Loopback {
    type RxToken<'a> = RxBuffer;
    type TxToken<'a> = TxBuffer<'a>;

    fn receive(&mut self, _timestamp: Instant) -> Option<(Self::RxToken<'_>, Self::TxToken<'_>)> {
        self.queue.pop_front().map(move |buffer| {
            let rx = RxBuffer { buffer };
            let tx = TxBuffer {
                queue: &mut self.queue,
            };
            (rx, tx)
        })
    }

    fn transmit(&mut self, _timestamp: Instant) -> Option<Self::TxToken<'_>> {
        Some(TxBuffer {
            queue: &mut self.queue,
        })
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            medium: self.medium,
            max_transmission_unit: 65535,
            ..Default::default()
        }
    }
}

#[doc(hidden)]
pub struct RxBuffer {
    buffer: Vec<u8>,
}

impl RxToken for RxBuffer {
    fn consume<R, F>(self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        f(&self.buffer)
    }
}

#[doc(hidden)]
pub struct TxBuffer<'a> {
    queue: &'a mut VecDeque<Vec<u8>>,
}

impl<'a> TxToken for TxBuffer<'a> {
    fn consume<R, F>(self, len: usize, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        let mut buffer = vec![0u8; len];
        let result = f(&mut buffer);
        self.queue.push_back(buffer);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transmitted_frame_is_received_back() {
        let mut dev = Loopback::new(Medium::Ethernet);
        let now = Instant::from_millis(0);

        let tx = dev.transmit(now).unwrap();
        tx.consume(4, |buf| buf.copy_from_slice(b"ping"));

        let (rx, _tx) = dev.receive(now).unwrap();
        rx.consume(|buf| assert_eq!(buf, b"ping"));

        assert!(dev.receive(now).is_none());
    }
}
