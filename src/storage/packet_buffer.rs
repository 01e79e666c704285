//! A ring buffer of discrete, metadata-tagged packets sharing one byte pool.
//!
//! Used by [`crate::socket::udp::Socket`] for its send/receive queues: each
//! enqueued packet carries caller-supplied metadata (e.g. the peer address)
//! alongside its payload bytes.

use core::cmp;

use super::ring_buffer::RingBuffer;
use super::{Empty, Full};

#[derive(Debug, Clone, Copy)]
struct Header<H> {
    meta: H,
    size: usize,
}

/// A single packet's metadata slot, as tracked in the buffer's metadata ring.
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketMetadata<H> {
    header: Option<Header<H>>,
}

impl<H> PacketMetadata<H> {
    pub const EMPTY: Self = PacketMetadata { header: None };
}

/// A packet ring buffer over caller-provided metadata and payload storage.
pub struct PacketBuffer<'a, H> {
    metadata: RingBuffer<'a, PacketMetadata<H>>,
    payload: RingBuffer<'a, u8>,
}

impl<'a, H> PacketBuffer<'a, H>
where
    H: Copy,
{
    pub fn new(
        metadata_storage: &'a mut [PacketMetadata<H>],
        payload_storage: &'a mut [u8],
    ) -> Self {
        PacketBuffer {
            metadata: RingBuffer::new(metadata_storage),
            payload: RingBuffer::new(payload_storage),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.metadata.is_full() || self.payload.window() == 0
    }

    /// Bytes of payload storage currently free.
    pub fn payload_window(&self) -> usize {
        self.payload.window()
    }

    pub fn packet_capacity(&self) -> usize {
        self.metadata.capacity()
    }

    pub fn payload_capacity(&self) -> usize {
        self.payload.capacity()
    }

    /// Append one packet, copying `data` into the payload pool and tagging
    /// it with `meta`. Fails if either the metadata ring or the payload pool
    /// has no room for the whole packet.
    pub fn enqueue(&mut self, data: &[u8], meta: H) -> Result<(), Full> {
        if self.metadata.is_full() || data.len() > self.payload.window() {
            return Err(Full);
        }
        let written = self.payload.enqueue_slice(data);
        debug_assert_eq!(written, data.len());
        self.metadata
            .enqueue_one(PacketMetadata {
                header: Some(Header {
                    meta,
                    size: data.len(),
                }),
            })
            .map_err(|_| Full)
    }

    /// Remove and return the oldest packet's metadata and a copy of its
    /// payload into `data`. Returns the metadata and the number of bytes
    /// copied (truncated to `data.len()` if the caller's buffer is smaller).
    pub fn dequeue(&mut self, data: &mut [u8]) -> Result<(H, usize), Empty> {
        let header = loop {
            match self.metadata.dequeue_one() {
                Ok(PacketMetadata { header: Some(h) }) => break h,
                Ok(PacketMetadata { header: None }) => continue,
                Err(Empty) => return Err(Empty),
            }
        };

        let to_copy = cmp::min(header.size, data.len());
        let copied = self.payload.dequeue_slice(&mut data[..to_copy]);
        debug_assert_eq!(copied, to_copy);
        // Discard any remainder that didn't fit in the caller's buffer.
        if header.size > to_copy {
            let mut sink = [0u8; 64];
            let mut left = header.size - to_copy;
            while left > 0 {
                let n = cmp::min(left, sink.len());
                self.payload.dequeue_slice(&mut sink[..n]);
                left -= n;
            }
        }
        Ok((header.meta, to_copy))
    }

    pub fn clear(&mut self) {
        self.metadata.clear();
        self.payload.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_dequeue_preserves_metadata() {
        let mut meta_storage = [PacketMetadata::<u32>::EMPTY; 4];
        let mut payload_storage = [0u8; 32];
        let mut pb = PacketBuffer::new(&mut meta_storage, &mut payload_storage);

        pb.enqueue(b"hello", 42).unwrap();
        pb.enqueue(b"world", 7).unwrap();

        let mut buf = [0u8; 16];
        let (meta, n) = pb.dequeue(&mut buf).unwrap();
        assert_eq!(meta, 42);
        assert_eq!(&buf[..n], b"hello");

        let (meta, n) = pb.dequeue(&mut buf).unwrap();
        assert_eq!(meta, 7);
        assert_eq!(&buf[..n], b"world");

        assert!(pb.is_empty());
    }
}
