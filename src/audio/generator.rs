//! Timecode encode-ahead generation
//!
//! Runs on the analysis thread, never on the real-time path. Whenever the
//! ring buffer's readable level drops below the pre-roll threshold, whole
//! LTC frames are encoded, scaled to the configured output level and written
//! ahead of the consumer until the threshold is satisfied again.

use crate::audio::ring::RingWriter;
use crate::ltc::LtcEncoder;

/// Encode-ahead generator feeding the output ring buffer
///
/// Owns the encoder cursor (current timecode and biphase level); each
/// refill emits whole frames and advances the timecode by one frame per
/// frame emitted.
pub struct EncodeAhead {
    encoder: LtcEncoder,
    /// Linear gain from the configured dBFS level
    gain: f32,
    /// Refill threshold in samples (~0.5s of audio)
    preroll: usize,
    /// Scratch buffer reused for each encoded frame
    frame_buf: Vec<f32>,
}

impl EncodeAhead {
    /// Create a generator
    ///
    /// # Arguments
    /// * `sample_rate` - Output sample rate in Hz
    /// * `fps` - LTC frame rate (24, 25 or 30)
    /// * `level_dbfs` - Output level in dBFS (0 is full scale)
    pub fn new(sample_rate: u32, fps: u32, level_dbfs: f32) -> Self {
        let encoder = LtcEncoder::new(sample_rate, fps);
        let frame_buf = Vec::with_capacity(encoder.samples_per_frame() + 1);
        Self {
            encoder,
            gain: 10f32.powf(level_dbfs / 20.0),
            preroll: sample_rate as usize / 2,
            frame_buf,
        }
    }

    /// Top the ring up to the pre-roll threshold
    ///
    /// Because the generator runs ahead of the consumer, write capacity is
    /// normally guaranteed by prior draining; an overflow means pre-roll
    /// sizing and consumer pace disagree and is logged as a fault, not
    /// propagated.
    ///
    /// # Returns
    /// Number of samples written during this refill
    pub fn refill(&mut self, ring: &mut RingWriter) -> usize {
        let mut written = 0;
        while ring.readable() < self.preroll {
            let len = self.encoder.encode_frame(&mut self.frame_buf);
            for s in &mut self.frame_buf {
                *s *= self.gain;
            }
            match ring.write(&self.frame_buf) {
                Ok(()) => written += len,
                Err(overflow) => {
                    tracing::error!(
                        dropped = overflow.dropped,
                        "ring buffer overflow while pre-filling"
                    );
                    written += len - overflow.dropped;
                    self.encoder.inc_timecode();
                    break;
                }
            }
            self.encoder.inc_timecode();
        }
        written
    }

    /// Pre-roll threshold in samples
    pub fn preroll(&self) -> usize {
        self.preroll
    }

    /// Linear output gain derived from the configured level
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Access the underlying encoder (current timecode cursor)
    pub fn encoder(&self) -> &LtcEncoder {
        &self.encoder
    }

    /// Mutable access to the encoder, e.g. to seed a starting timecode
    pub fn encoder_mut(&mut self) -> &mut LtcEncoder {
        &mut self.encoder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ring::ring;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_refill_reaches_preroll() {
        let (mut w, _r) = ring(48000);
        let mut gen = EncodeAhead::new(48000, 25, -6.0);

        let written = gen.refill(&mut w);
        assert!(w.readable() >= gen.preroll());
        assert_eq!(written, w.readable());
        // Whole frames only
        assert_eq!(written % 1920, 0);
    }

    #[test]
    fn test_refill_noop_when_full_enough() {
        let (mut w, _r) = ring(48000);
        let mut gen = EncodeAhead::new(48000, 25, -6.0);
        gen.refill(&mut w);
        let tc_before = gen.encoder().timecode();

        assert_eq!(gen.refill(&mut w), 0);
        assert_eq!(gen.encoder().timecode(), tc_before);
    }

    #[test]
    fn test_output_level_scaling() {
        let (mut w, mut r) = ring(48000);
        let mut gen = EncodeAhead::new(48000, 25, -6.0);
        gen.refill(&mut w);

        let mut out = vec![0.0; 1920];
        assert!(r.read_exact(&mut out));
        let peak = out.iter().fold(0.0f32, |m, &s| m.max(s.abs()));
        // -6 dBFS is a gain of ~0.5012
        assert_abs_diff_eq!(peak, 0.5012, epsilon = 1e-3);
    }

    #[test]
    fn test_timecode_advances_one_per_frame() {
        let (mut w, _r) = ring(48000);
        let mut gen = EncodeAhead::new(48000, 25, -6.0);
        let written = gen.refill(&mut w);

        let frames = written / 1920;
        let tc = gen.encoder().timecode();
        let advanced = tc.frame as usize + 25 * tc.total_seconds() as usize;
        assert_eq!(advanced, frames);
    }

    #[test]
    fn test_overflow_is_absorbed() {
        // A ring smaller than the pre-roll threshold can never satisfy the
        // refill loop; the overflow must be reported once and absorbed, not
        // loop forever or panic.
        let (mut w, _r) = ring(4096);
        let mut gen = EncodeAhead::new(48000, 25, -6.0);

        let written = gen.refill(&mut w);
        assert_eq!(w.readable(), 4096);
        assert_eq!(written, 4096);
    }
}
