//! Bounded sample FIFO between the encoder worker and the timing loop.
//!
//! One producer, one consumer, one guard. The ring itself never blocks:
//! the encoder waits by polling `bytes_used` and the output stage treats a
//! short read as a broken realtime contract. Each octet is one audio sample;
//! values below 0xA0 drive the output pin low, the rest drive it high.

use parking_lot::Mutex;
use ringbuf::{
    traits::{Consumer, Observer, Producer},
    HeapRb,
};

use crate::error::{Error, Result};

pub struct SampleRing {
    rb: Mutex<HeapRb<u8>>,
    capacity: usize,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        SampleRing {
            rb: Mutex::new(HeapRb::new(capacity)),
            capacity,
        }
    }

    /// Copy `src` into the tail. The producer must have waited for room;
    /// a write past capacity is a flow violation, not a partial write.
    pub fn write_bulk(&self, src: &[u8]) -> Result<()> {
        let mut rb = self.rb.lock();
        let used = rb.occupied_len();
        if src.len() > self.capacity - used {
            return Err(Error::RingOverflow {
                requested: src.len(),
                used,
                capacity: self.capacity,
            });
        }
        let n = rb.push_slice(src);
        debug_assert_eq!(n, src.len());
        Ok(())
    }

    /// Copy exactly `dst.len()` octets from the head, or fail without
    /// consuming anything if the consumer has been under-fed.
    pub fn read_bulk(&self, dst: &mut [u8]) -> Result<()> {
        let mut rb = self.rb.lock();
        let available = rb.occupied_len();
        if dst.len() > available {
            return Err(Error::RingUnderflow {
                requested: dst.len(),
                available,
            });
        }
        let n = rb.pop_slice(dst);
        debug_assert_eq!(n, dst.len());
        Ok(())
    }

    /// Snapshot of the current occupancy.
    pub fn bytes_used(&self) -> usize {
        self.rb.lock().occupied_len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_is_preserved() {
        let ring = SampleRing::new(16);
        ring.write_bulk(&[1, 2, 3, 4]).unwrap();
        ring.write_bulk(&[5, 6]).unwrap();
        assert_eq!(ring.bytes_used(), 6);

        let mut out = [0u8; 6];
        ring.read_bulk(&mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4, 5, 6]);
        assert_eq!(ring.bytes_used(), 0);
    }

    #[test]
    fn wraps_across_the_boundary() {
        let ring = SampleRing::new(8);
        ring.write_bulk(&[1, 2, 3, 4, 5, 6]).unwrap();
        let mut out = [0u8; 4];
        ring.read_bulk(&mut out).unwrap();
        // Head is now at offset 4; this write wraps.
        ring.write_bulk(&[7, 8, 9, 10]).unwrap();
        let mut rest = [0u8; 6];
        ring.read_bulk(&mut rest).unwrap();
        assert_eq!(rest, [5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn overflow_is_an_error_and_writes_nothing() {
        let ring = SampleRing::new(4);
        ring.write_bulk(&[1, 2, 3]).unwrap();
        let err = ring.write_bulk(&[4, 5]).unwrap_err();
        match err {
            Error::RingOverflow {
                requested,
                used,
                capacity,
            } => {
                assert_eq!((requested, used, capacity), (2, 3, 4));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ring.bytes_used(), 3);
    }

    #[test]
    fn underflow_is_an_error_and_consumes_nothing() {
        let ring = SampleRing::new(8);
        ring.write_bulk(&[1, 2]).unwrap();
        let mut out = [0u8; 5];
        let err = ring.read_bulk(&mut out).unwrap_err();
        match err {
            Error::RingUnderflow {
                requested,
                available,
            } => assert_eq!((requested, available), (5, 2)),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ring.bytes_used(), 2);
        let mut out = [0u8; 2];
        ring.read_bulk(&mut out).unwrap();
        assert_eq!(out, [1, 2]);
    }
}
