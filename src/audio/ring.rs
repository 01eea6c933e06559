//! SPSC sample ring buffer between the analysis thread and the output callback
//!
//! Thin wrapper over `ringbuf`'s heap-allocated SPSC queue giving the two
//! halves the contract the engine needs: writes signal overflow with the
//! number of dropped samples, reads are all-or-nothing so the callback can
//! substitute a full block of silence on underrun. No locks, no allocation
//! after creation.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use thiserror::Error;

/// Write failed for part of the block; the first samples fit, `dropped` did not
#[derive(Error, Debug, PartialEq, Eq)]
#[error("ring buffer overflow: {dropped} samples dropped")]
pub struct Overflow {
    pub dropped: usize,
}

/// Create a ring of `capacity` samples, split into its two ends
pub fn ring(capacity: usize) -> (RingWriter, RingReader) {
    let rb = HeapRb::<f32>::new(capacity);
    let (prod, cons) = rb.split();
    (RingWriter { prod }, RingReader { cons })
}

/// Producer half, owned by the analysis thread
pub struct RingWriter {
    prod: HeapProd<f32>,
}

impl RingWriter {
    /// Append `samples`, signalling overflow if they do not all fit
    pub fn write(&mut self, samples: &[f32]) -> Result<(), Overflow> {
        let written = self.prod.push_slice(samples);
        if written < samples.len() {
            Err(Overflow {
                dropped: samples.len() - written,
            })
        } else {
            Ok(())
        }
    }

    /// Samples currently readable by the consumer
    pub fn readable(&self) -> usize {
        self.prod.occupied_len()
    }

    /// Total capacity in samples
    pub fn capacity(&self) -> usize {
        self.prod.capacity().get()
    }
}

/// Consumer half, owned by the real-time output callback
pub struct RingReader {
    cons: HeapCons<f32>,
}

impl RingReader {
    /// Fill `out` completely, or take nothing and report underrun
    ///
    /// # Returns
    /// `true` if `out` was filled; `false` on underrun (contents untouched,
    /// the caller substitutes silence)
    pub fn read_exact(&mut self, out: &mut [f32]) -> bool {
        if self.cons.occupied_len() < out.len() {
            return false;
        }
        let read = self.cons.pop_slice(out);
        debug_assert_eq!(read, out.len());
        true
    }

    /// Samples currently readable
    pub fn readable(&self) -> usize {
        self.cons.occupied_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let (mut w, mut r) = ring(16);
        w.write(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(r.readable(), 4);

        let mut out = [0.0; 4];
        assert!(r.read_exact(&mut out));
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(r.readable(), 0);
    }

    #[test]
    fn test_underrun_leaves_output_untouched() {
        let (mut w, mut r) = ring(16);
        w.write(&[1.0, 2.0]).unwrap();

        let mut out = [9.0; 4];
        assert!(!r.read_exact(&mut out), "short read must fail");
        assert_eq!(out, [9.0; 4], "underrun must not partially fill");
        // The two samples are still there for a later, smaller read
        assert_eq!(r.readable(), 2);
    }

    #[test]
    fn test_overflow_reports_dropped_count() {
        let (mut w, _r) = ring(4);
        let err = w.write(&[0.0; 7]).unwrap_err();
        assert_eq!(err.dropped, 3);
        assert_eq!(w.readable(), 4);
    }

    #[test]
    fn test_readable_never_exceeds_capacity() {
        let (mut w, mut r) = ring(8);
        let mut out = [0.0; 3];
        for i in 0..50 {
            let _ = w.write(&[i as f32; 5]);
            assert!(w.readable() <= w.capacity());
            let _ = r.read_exact(&mut out);
            assert!(r.readable() <= w.capacity());
        }
    }

    #[test]
    fn test_fifo_order_across_wrap() {
        let (mut w, mut r) = ring(8);
        let mut expected = 0.0f32;
        let mut next = 0.0f32;
        let mut out = [0.0; 4];
        for _ in 0..10 {
            let block: Vec<f32> = (0..4)
                .map(|_| {
                    let v = next;
                    next += 1.0;
                    v
                })
                .collect();
            w.write(&block).unwrap();
            assert!(r.read_exact(&mut out));
            for &v in &out {
                assert_eq!(v, expected);
                expected += 1.0;
            }
        }
    }
}
