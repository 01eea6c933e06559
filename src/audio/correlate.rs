//! Timecode correlation
//!
//! Maps a decoded timecode value back to the sample position at which that
//! frame was transmitted and compares it with the position at which its
//! audio actually arrived. Because the transmitted stream is continuous and
//! monotonic starting from 00:00:00:00, any plausible positive difference
//! is genuine round-trip latency; everything else is phase noise or a
//! decode error and is discarded. The acceptance window is the noise
//! filter.

use crate::ltc::{DecodedFrame, Timecode};

/// Seconds in one day, for the 24-hour timecode rollover guard
const SECONDS_PER_DAY: u64 = 86400;

/// Outcome of correlating one decoded frame
#[derive(Debug, Clone, Copy)]
pub struct Correlation {
    /// Transmitted sample position derived from the decoded time value
    pub expected: u64,
    /// Arrival offset relative to the expected position
    pub delta: i64,
    /// Whether `delta` lies in the plausible latency window
    pub accepted: bool,
}

/// Converts decoded frames into delay observations
#[derive(Debug, Clone, Copy)]
pub struct Correlator {
    sample_rate: u32,
    fps: u32,
    /// Modulus applied to raw frame start positions (24h rollover guard)
    wraparound: u64,
}

impl Correlator {
    pub fn new(sample_rate: u32, fps: u32) -> Self {
        Self {
            sample_rate,
            fps,
            wraparound: SECONDS_PER_DAY * sample_rate as u64 / fps as u64,
        }
    }

    /// Sample position at which a frame with this time value was transmitted
    ///
    /// `expected = (frame + fps * total_seconds) * sample_rate / fps`
    pub fn expected_position(&self, tc: &Timecode) -> u64 {
        let frames = tc.frame as u64 + self.fps as u64 * tc.total_seconds();
        (frames as f64 * self.sample_rate as f64 / self.fps as f64) as u64
    }

    /// Correlate one decoded frame against its expected position
    ///
    /// The frame is accepted only for `0 <= delta < sample_rate`: latency
    /// must be positive (the loop cannot deliver audio before it was sent)
    /// and a round trip longer than a second is not physically plausible
    /// for an audio chain, so such deltas are treated as noise. Negative
    /// deltas are likewise discarded rather than wrapped.
    pub fn correlate(&self, frame: &DecodedFrame) -> Correlation {
        let expected = self.expected_position(&frame.tc);
        let delta = (frame.start % self.wraparound) as i64 - expected as i64;
        Correlation {
            expected,
            delta,
            accepted: delta >= 0 && delta < self.sample_rate as i64,
        }
    }

    /// The rollover modulus in samples
    pub fn wraparound(&self) -> u64 {
        self.wraparound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_at(tc: Timecode, start: u64) -> DecodedFrame {
        DecodedFrame {
            tc,
            drop_frame: false,
            start,
            end: start + 1920,
            polarity: true,
            volume_dbfs: -6.0,
        }
    }

    #[test]
    fn test_expected_position() {
        let c = Correlator::new(48000, 25);
        assert_eq!(c.expected_position(&Timecode::default()), 0);

        // 00:00:01:00 is frame 25, at 1920 samples per frame
        let tc = Timecode {
            secs: 1,
            ..Default::default()
        };
        assert_eq!(c.expected_position(&tc), 25 * 1920);

        let tc = Timecode {
            hours: 1,
            mins: 2,
            secs: 3,
            frame: 4,
        };
        assert_eq!(c.expected_position(&tc), (4 + 25 * 3723) * 1920);
    }

    #[test]
    fn test_plausible_delay_accepted() {
        let c = Correlator::new(48000, 25);
        let tc = Timecode {
            secs: 2,
            frame: 3,
            ..Default::default()
        };
        let expected = c.expected_position(&tc);

        let corr = c.correlate(&frame_at(tc, expected + 240));
        assert_eq!(corr.delta, 240);
        assert!(corr.accepted);
    }

    #[test]
    fn test_zero_delta_accepted() {
        let c = Correlator::new(48000, 25);
        let tc = Timecode::default();
        let corr = c.correlate(&frame_at(tc, 0));
        assert_eq!(corr.delta, 0);
        assert!(corr.accepted);
    }

    #[test]
    fn test_negative_delta_discarded() {
        let c = Correlator::new(48000, 25);
        let tc = Timecode {
            secs: 1,
            ..Default::default()
        };
        let expected = c.expected_position(&tc);

        let corr = c.correlate(&frame_at(tc, expected - 100));
        assert_eq!(corr.delta, -100);
        assert!(!corr.accepted);
    }

    #[test]
    fn test_delay_over_one_second_discarded() {
        let c = Correlator::new(48000, 25);
        let tc = Timecode::default();
        let corr = c.correlate(&frame_at(tc, 48000));
        assert!(!corr.accepted);
        let corr = c.correlate(&frame_at(tc, 47999));
        assert!(corr.accepted);
    }

    #[test]
    fn test_wraparound_modular_reduction() {
        // A raw start position beyond the rollover period must reduce to
        // the same delta as its in-period equivalent.
        let c = Correlator::new(48000, 25);
        let tc = Timecode {
            secs: 5,
            ..Default::default()
        };
        let expected = c.expected_position(&tc);

        let in_period = c.correlate(&frame_at(tc, expected + 100));
        let beyond = c.correlate(&frame_at(tc, expected + 100 + 3 * c.wraparound()));
        assert_eq!(in_period.delta, beyond.delta);
        assert_eq!(beyond.delta, 100);
        assert!(beyond.accepted);
    }

    #[test]
    fn test_wraparound_period_value() {
        let c = Correlator::new(48000, 25);
        assert_eq!(c.wraparound(), 86400 * 48000 / 25);
    }
}
