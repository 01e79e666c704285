//! A contiguous ring buffer over borrowed storage.
//!
//! Used as the backing store for TCP send/receive buffers and as the queue
//! of discrete packets for UDP sockets (see [`super::PacketBuffer`]).

use core::cmp;

use super::{Empty, Full};

/// Bytes `[0, capacity)` with a write pointer (`head`), a read pointer
/// (`tail`), and a `used` count. `used <= capacity` always holds.
#[derive(Debug)]
pub struct RingBuffer<'a, T> {
    storage: &'a mut [T],
    head: usize,
    tail: usize,
    used: usize,
}

impl<'a, T> RingBuffer<'a, T> {
    /// Build a ring buffer using the given storage slice as backing memory.
    pub fn new(storage: &'a mut [T]) -> Self {
        RingBuffer {
            storage,
            head: 0,
            tail: 0,
            used: 0,
        }
    }

    /// Clear the buffer without touching its storage.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.used = 0;
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub fn is_full(&self) -> bool {
        self.used == self.capacity()
    }

    /// Free space available for writing (`rcv_wnd` is this, for the receive buffer).
    pub fn window(&self) -> usize {
        self.capacity() - self.used
    }

    fn advance_head(&mut self, n: usize) {
        self.head = (self.head + n) % self.capacity().max(1);
        self.used += n;
    }

    fn advance_tail(&mut self, n: usize) {
        self.tail = (self.tail + n) % self.capacity().max(1);
        self.used -= n;
    }
}

impl<'a, T: Copy> RingBuffer<'a, T> {
    /// Enqueue as much of `data` as fits; returns the number of elements written.
    pub fn enqueue_slice(&mut self, data: &[T]) -> usize {
        let n = cmp::min(data.len(), self.window());
        let (first, second) = data.split_at(n);
        let first_n = self.enqueue_contiguous(first);
        let second_n = self.enqueue_contiguous(second);
        first_n + second_n
    }

    fn enqueue_contiguous(&mut self, data: &[T]) -> usize {
        if data.is_empty() || self.capacity() == 0 {
            return 0;
        }
        let mut written = 0;
        for &byte in data {
            if self.is_full() {
                break;
            }
            self.storage[self.head] = byte;
            self.advance_head(1);
            written += 1;
        }
        written
    }

    /// Dequeue up to `data.len()` elements into `data`; returns the number read.
    pub fn dequeue_slice(&mut self, data: &mut [T]) -> usize {
        let n = cmp::min(data.len(), self.used);
        for slot in data.iter_mut().take(n) {
            *slot = self.storage[self.tail];
            self.advance_tail(1);
        }
        n
    }

    pub fn enqueue_one(&mut self, value: T) -> Result<(), Full> {
        if self.is_full() {
            return Err(Full);
        }
        self.storage[self.head] = value;
        self.advance_head(1);
        Ok(())
    }

    pub fn dequeue_one(&mut self) -> Result<T, Empty> {
        if self.is_empty() {
            return Err(Empty);
        }
        let value = self.storage[self.tail];
        self.advance_tail(1);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_dequeue_roundtrip() {
        let mut storage = [0u8; 8];
        let mut rb = RingBuffer::new(&mut storage);
        assert_eq!(rb.enqueue_slice(b"hello"), 5);
        assert_eq!(rb.len(), 5);
        let mut out = [0u8; 5];
        assert_eq!(rb.dequeue_slice(&mut out), 5);
        assert_eq!(&out, b"hello");
        assert!(rb.is_empty());
    }

    #[test]
    fn wraps_around() {
        let mut storage = [0u8; 4];
        let mut rb = RingBuffer::new(&mut storage);
        assert_eq!(rb.enqueue_slice(b"ab"), 2);
        let mut out = [0u8; 1];
        rb.dequeue_slice(&mut out);
        assert_eq!(rb.enqueue_slice(b"cd"), 2);
        let mut out = [0u8; 3];
        assert_eq!(rb.dequeue_slice(&mut out), 3);
        assert_eq!(&out, b"bcd");
    }

    #[test]
    fn full_buffer_rejects_excess() {
        let mut storage = [0u8; 2];
        let mut rb = RingBuffer::new(&mut storage);
        assert_eq!(rb.enqueue_slice(b"abc"), 2);
        assert!(rb.is_full());
        assert_eq!(rb.window(), 0);
    }
}
