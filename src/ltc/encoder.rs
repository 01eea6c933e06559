//! Biphase-mark LTC encoder
//!
//! Encodes one 80-bit frame at a time into full-scale audio samples.
//! Biphase-mark coding puts a level transition at the start of every bit
//! period and an additional mid-period transition for a one bit, so the
//! signal is polarity-insensitive and carries its own clock.

use super::{pack_frame, Timecode, FRAME_BITS};

/// Streaming LTC frame encoder
///
/// Owns the current timecode value and the biphase output level; both
/// advance as frames are emitted, so consecutive calls produce one
/// continuous, phase-coherent stream.
///
/// # Example
/// ```
/// use ltc_delay::ltc::LtcEncoder;
///
/// let mut enc = LtcEncoder::new(48000, 25);
/// let mut buf = Vec::new();
/// enc.encode_frame(&mut buf);
/// assert_eq!(buf.len(), 1920); // one frame at 48kHz / 25fps
/// enc.inc_timecode();
/// ```
#[derive(Debug)]
pub struct LtcEncoder {
    sample_rate: u32,
    fps: u32,
    /// Exact (possibly fractional) frame duration in samples
    samples_per_frame: f64,
    tc: Timecode,
    /// Current biphase output level; carried across frames
    level: bool,
}

impl LtcEncoder {
    /// Create an encoder starting at 00:00:00:00
    ///
    /// # Arguments
    /// * `sample_rate` - Output sample rate in Hz
    /// * `fps` - LTC frame rate (24, 25 or 30)
    pub fn new(sample_rate: u32, fps: u32) -> Self {
        Self {
            sample_rate,
            fps,
            samples_per_frame: sample_rate as f64 / fps as f64,
            tc: Timecode::default(),
            level: false,
        }
    }

    /// Frame duration in samples (rounded)
    pub fn samples_per_frame(&self) -> usize {
        self.samples_per_frame.round() as usize
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frame rate in frames per second
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Current timecode value (the next frame to be encoded)
    pub fn timecode(&self) -> Timecode {
        self.tc
    }

    /// Set the timecode for the next encoded frame
    pub fn set_timecode(&mut self, tc: Timecode) {
        self.tc = tc;
    }

    /// Advance the internal timecode by one frame
    pub fn inc_timecode(&mut self) {
        self.tc.increment(self.fps);
    }

    /// Encode the current frame into `out` (cleared first)
    ///
    /// Samples are full-scale, in [-1.0, 1.0]; the caller applies output
    /// level scaling. Bit boundaries are placed on the exact rational
    /// positions within the frame, so fractional samples-per-bit rates do
    /// not accumulate drift across the frame.
    ///
    /// # Returns
    /// Number of samples written, always `samples_per_frame()`
    pub fn encode_frame(&mut self, out: &mut Vec<f32>) -> usize {
        let word = pack_frame(&self.tc);
        let spf = self.samples_per_frame;
        out.clear();

        for i in 0..FRAME_BITS {
            let start = (i as f64 * spf / FRAME_BITS as f64).round() as usize;
            let end = ((i + 1) as f64 * spf / FRAME_BITS as f64).round() as usize;
            let mid = ((i as f64 + 0.5) * spf / FRAME_BITS as f64).round() as usize;
            let one = (word >> i) & 1 == 1;

            // Transition at every bit start
            self.level = !self.level;
            for t in start..end {
                // Second transition at mid-period encodes a one
                if one && t == mid {
                    self.level = !self.level;
                }
                out.push(if self.level { 1.0 } else { -1.0 });
            }
        }

        out.len()
    }
}
