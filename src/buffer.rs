//! Fixed-capacity byte ring buffer.
//!
//! Absorbs bursty notification deliveries from the BLE stack so the
//! consumer can drain them at the wired-serial rate. Single producer
//! (the notification listener task), single consumer (the transport's
//! read path); the transport wraps the buffer in a mutex and holds it
//! only for the duration of one push or pop.

/// Fixed-capacity circular byte store.
///
/// Overflow policy: **drop-on-full**. A `push` that does not fit accepts
/// as many leading bytes as there is free space and discards the rest,
/// incrementing the overflow counter by the number of bytes dropped. The
/// producer is a radio-stack callback that must never be stalled, and
/// evicting already-buffered bytes would corrupt an in-flight exchange,
/// so the newest data loses.
#[derive(Debug)]
pub struct RingBuffer {
    data: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
    len: usize,
    overflow: u64,
}

impl RingBuffer {
    /// Create a buffer holding at most `capacity` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
            len: 0,
            overflow: 0,
        }
    }

    /// Append bytes, dropping whatever does not fit.
    ///
    /// Returns the number of bytes accepted.
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        let free = self.capacity() - self.len;
        let accepted = bytes.len().min(free);

        for &byte in &bytes[..accepted] {
            self.data[self.write_pos] = byte;
            self.write_pos = (self.write_pos + 1) % self.data.len();
        }
        // Count is updated after the payload is in place, so a consumer
        // that observes the new count sees fully written bytes.
        self.len += accepted;

        let dropped = bytes.len() - accepted;
        if dropped > 0 {
            self.overflow += dropped as u64;
        }

        accepted
    }

    /// Remove and return the oldest byte.
    ///
    /// Returns [`Error::Underflow`](crate::Error::Underflow) if the buffer
    /// is empty; callers check [`len`](Self::len) first.
    pub fn pop(&mut self) -> crate::Result<u8> {
        if self.len == 0 {
            return Err(crate::Error::Underflow);
        }
        let byte = self.data[self.read_pos];
        self.read_pos = (self.read_pos + 1) % self.data.len();
        self.len -= 1;
        Ok(byte)
    }

    /// Drain up to `out.len()` bytes into `out`, oldest first.
    ///
    /// Returns the number of bytes written.
    pub fn pop_slice(&mut self, out: &mut [u8]) -> usize {
        let count = out.len().min(self.len);
        for slot in out.iter_mut().take(count) {
            *slot = self.data[self.read_pos];
            self.read_pos = (self.read_pos + 1) % self.data.len();
        }
        self.len -= count;
        count
    }

    /// Number of occupied bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the buffer is at capacity.
    pub fn is_full(&self) -> bool {
        self.len == self.data.len()
    }

    /// Maximum number of bytes the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Total bytes dropped by `push` calls that found the buffer full.
    pub fn overflow_count(&self) -> u64 {
        self.overflow
    }

    /// Discard all buffered bytes. The overflow counter is preserved.
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fifo_order() {
        let mut buf = RingBuffer::with_capacity(8);
        assert_eq!(buf.push(&[0x01, 0x02, 0x03]), 3);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.pop().unwrap(), 0x01);
        assert_eq!(buf.pop().unwrap(), 0x02);
        assert_eq!(buf.pop().unwrap(), 0x03);
        assert_eq!(buf.len(), 0);
        assert!(matches!(buf.pop(), Err(crate::Error::Underflow)));
    }

    #[test]
    fn test_underflow_does_not_corrupt_state() {
        let mut buf = RingBuffer::with_capacity(4);
        assert!(buf.pop().is_err());
        assert!(buf.pop().is_err());
        buf.push(&[0xAA]);
        assert_eq!(buf.pop().unwrap(), 0xAA);
        assert!(buf.pop().is_err());
    }

    #[test]
    fn test_drop_on_full() {
        let mut buf = RingBuffer::with_capacity(4);
        assert_eq!(buf.push(&[1, 2, 3]), 3);
        // Only one slot free; two of the incoming bytes are dropped.
        assert_eq!(buf.push(&[4, 5, 6]), 1);
        assert_eq!(buf.overflow_count(), 2);
        assert!(buf.is_full());

        // A full buffer accepts nothing.
        assert_eq!(buf.push(&[7]), 0);
        assert_eq!(buf.overflow_count(), 3);

        // The oldest bytes survived intact.
        assert_eq!(buf.pop().unwrap(), 1);
        assert_eq!(buf.pop().unwrap(), 2);
        assert_eq!(buf.pop().unwrap(), 3);
        assert_eq!(buf.pop().unwrap(), 4);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_available_after_pushes_and_pops() {
        let mut buf = RingBuffer::with_capacity(16);
        buf.push(&[1, 2, 3, 4, 5]);
        buf.pop().unwrap();
        buf.pop().unwrap();
        assert_eq!(buf.len(), 3);
        buf.push(&[6, 7]);
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_wraparound() {
        let mut buf = RingBuffer::with_capacity(4);
        buf.push(&[1, 2, 3]);
        assert_eq!(buf.pop().unwrap(), 1);
        assert_eq!(buf.pop().unwrap(), 2);
        // Write cursor wraps past the end of the backing array.
        buf.push(&[4, 5, 6]);
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.pop().unwrap(), 3);
        assert_eq!(buf.pop().unwrap(), 4);
        assert_eq!(buf.pop().unwrap(), 5);
        assert_eq!(buf.pop().unwrap(), 6);
    }

    #[test]
    fn test_pop_slice() {
        let mut buf = RingBuffer::with_capacity(8);
        buf.push(&[1, 2, 3, 4, 5]);
        let mut out = [0u8; 3];
        assert_eq!(buf.pop_slice(&mut out), 3);
        assert_eq!(out, [1, 2, 3]);
        let mut rest = [0u8; 8];
        assert_eq!(buf.pop_slice(&mut rest), 2);
        assert_eq!(&rest[..2], &[4, 5]);
        assert_eq!(buf.pop_slice(&mut rest), 0);
    }

    #[test]
    fn test_clear_preserves_overflow_counter() {
        let mut buf = RingBuffer::with_capacity(2);
        buf.push(&[1, 2, 3]);
        assert_eq!(buf.overflow_count(), 1);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.overflow_count(), 1);
        buf.push(&[9]);
        assert_eq!(buf.pop().unwrap(), 9);
    }

    #[test]
    fn test_end_to_end_scenario() {
        let mut buf = RingBuffer::with_capacity(8);
        buf.push(&[0x01, 0x02, 0x03]);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.pop().unwrap(), 0x01);
        assert_eq!(buf.pop().unwrap(), 0x02);
        assert_eq!(buf.pop().unwrap(), 0x03);
        assert_eq!(buf.len(), 0);
        assert!(matches!(buf.pop(), Err(crate::Error::Underflow)));
    }

    proptest! {
        /// Pushes totalling at most the capacity pop back verbatim.
        #[test]
        fn prop_fifo_roundtrip(chunks in prop::collection::vec(
            prop::collection::vec(any::<u8>(), 0..64), 0..8,
        )) {
            let total: usize = chunks.iter().map(Vec::len).sum();
            prop_assume!(total <= 256);

            let mut buf = RingBuffer::with_capacity(256);
            for chunk in &chunks {
                prop_assert_eq!(buf.push(chunk), chunk.len());
            }
            prop_assert_eq!(buf.len(), total);
            prop_assert_eq!(buf.overflow_count(), 0);

            let expected: Vec<u8> = chunks.concat();
            for &byte in &expected {
                prop_assert_eq!(buf.pop().unwrap(), byte);
            }
            prop_assert!(buf.is_empty());
        }

        /// Overflowing pushes accept exactly the free space and count the rest.
        #[test]
        fn prop_drop_on_full(
            initial in prop::collection::vec(any::<u8>(), 0..32),
            incoming in prop::collection::vec(any::<u8>(), 0..64),
        ) {
            let mut buf = RingBuffer::with_capacity(32);
            buf.push(&initial);
            let free = buf.capacity() - buf.len();

            let accepted = buf.push(&incoming);
            prop_assert_eq!(accepted, incoming.len().min(free));
            prop_assert_eq!(
                buf.overflow_count(),
                incoming.len().saturating_sub(free) as u64
            );
            prop_assert!(buf.len() <= buf.capacity());
        }
    }
}
