//! Running delay estimation with signal-loss detection
//!
//! A plain streaming mean over accepted delay observations, reset after a
//! silence window so that stale readings never linger once the loop-back
//! signal is lost. All timing is measured in samples against the engine's
//! monotonic counter, not wall-clock time.

/// Silence window in seconds of audio before the average is reset
const SILENCE_WINDOW_SECS: u64 = 3;

/// One periodic report from the estimator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DelayReport {
    /// Mean delay in samples over the observations since the last reset
    Average(f64),
    /// No observation accepted within the silence window
    NoRecentSignal,
}

/// Streaming mean of accepted delay samples
///
/// # Example
/// ```
/// use ltc_delay::audio::estimator::{DelayEstimator, DelayReport};
///
/// let mut est = DelayEstimator::new(48000);
/// est.accept(240, 1000);
/// est.accept(242, 2000);
/// // First poll past the report interval reports the mean
/// assert_eq!(est.poll(24001), Some(DelayReport::Average(241.0)));
/// ```
#[derive(Debug)]
pub struct DelayEstimator {
    sum: f64,
    count: u64,
    /// Monotonic position of the last accepted observation
    last_signal: u64,
    /// Monotonic position of the last emitted report
    last_report: u64,
    /// Report interval in samples (~0.5s of audio)
    report_interval: u64,
    /// Silence window in samples
    silence_window: u64,
}

impl DelayEstimator {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sum: 0.0,
            count: 0,
            last_signal: 0,
            last_report: 0,
            report_interval: sample_rate as u64 / 2,
            silence_window: SILENCE_WINDOW_SECS * sample_rate as u64,
        }
    }

    /// Fold one accepted delay observation into the running mean
    pub fn accept(&mut self, delta: i64, now: u64) {
        self.sum += delta as f64;
        self.count += 1;
        self.last_signal = now;
    }

    /// Periodic tick; emits a report once per report interval
    ///
    /// If nothing has been accepted for longer than the silence window the
    /// running mean is reset before reporting, so a lost signal reads as
    /// [`DelayReport::NoRecentSignal`] rather than a stale average.
    pub fn poll(&mut self, now: u64) -> Option<DelayReport> {
        if now <= self.last_report + self.report_interval {
            return None;
        }
        self.last_report = now;

        if now.saturating_sub(self.last_signal) > self.silence_window {
            self.sum = 0.0;
            self.count = 0;
        }

        if self.count > 0 {
            Some(DelayReport::Average(self.sum / self.count as f64))
        } else {
            Some(DelayReport::NoRecentSignal)
        }
    }

    /// Number of observations since the last reset
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Current mean, if any observations are held
    pub fn average(&self) -> Option<f64> {
        if self.count > 0 {
            Some(self.sum / self.count as f64)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_mean_equals_arithmetic_mean() {
        let mut est = DelayEstimator::new(48000);
        let deltas = [240i64, 238, 245, 241, 236];
        for (i, &d) in deltas.iter().enumerate() {
            est.accept(d, i as u64 * 100);
        }

        let mean = deltas.iter().sum::<i64>() as f64 / deltas.len() as f64;
        assert_abs_diff_eq!(est.average().unwrap(), mean, epsilon = 1e-9);
        assert_eq!(est.count(), 5);
    }

    #[test]
    fn test_no_report_before_interval() {
        let mut est = DelayEstimator::new(48000);
        est.accept(240, 0);
        assert_eq!(est.poll(1000), None);
        assert_eq!(est.poll(24000), None);
        assert_eq!(est.poll(24001), Some(DelayReport::Average(240.0)));
    }

    #[test]
    fn test_report_cadence() {
        let mut est = DelayEstimator::new(48000);
        est.accept(100, 0);
        assert!(est.poll(24001).is_some());
        // Within the next interval: quiet
        assert_eq!(est.poll(30000), None);
        assert!(est.poll(24001 + 24001).is_some());
    }

    #[test]
    fn test_initial_state_reports_no_signal() {
        let mut est = DelayEstimator::new(48000);
        assert_eq!(est.poll(25000), Some(DelayReport::NoRecentSignal));
    }

    #[test]
    fn test_silence_window_resets_average() {
        let sr = 48000u64;
        let mut est = DelayEstimator::new(48000);

        // A healthy run of observations
        for i in 0..100u64 {
            est.accept(240, i * 480);
        }
        assert_eq!(est.poll(sr), Some(DelayReport::Average(240.0)));

        // More than 3 seconds of audio with nothing accepted
        let later = 100 * 480 + 3 * sr + 1000;
        assert_eq!(est.poll(later), Some(DelayReport::NoRecentSignal));
        assert_eq!(est.count(), 0, "average must be reset after silence");
    }

    #[test]
    fn test_signal_within_window_keeps_average() {
        let sr = 48000u64;
        let mut est = DelayEstimator::new(48000);
        est.accept(240, 0);
        est.accept(242, 2 * sr);

        // 2.5s after the last accept: still within the 3s window
        assert_eq!(
            est.poll(2 * sr + sr * 5 / 2),
            Some(DelayReport::Average(241.0))
        );
    }
}
