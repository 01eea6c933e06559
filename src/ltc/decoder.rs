//! Streaming biphase-mark LTC decoder
//!
//! Consumes arbitrary-sized blocks of audio, reconstructs the bit stream
//! from level transitions, and emits completed frames with sample-accurate
//! start and end positions in the caller's clock.
//!
//! The write path performs bounded per-sample work and never allocates
//! after construction, so it is safe to call from a real-time audio
//! callback. Completed frames land in a fixed-capacity queue; when the
//! queue is full the oldest frame is dropped.

use std::collections::VecDeque;

use super::{drop_frame_bit, unpack_frame, Timecode, FRAME_BITS, SYNC_WORD};

/// Hysteresis threshold below which input is treated as silence (-60 dBFS)
const SIGNAL_FLOOR: f32 = 1.0e-3;

/// Completed frames retained before the oldest is dropped
const QUEUE_LEN: usize = 12;

/// Smoothing factor for the adaptive bit period estimate
const PERIOD_ALPHA: f64 = 0.1;

/// One fully decoded LTC frame
///
/// Created by [`LtcDecoder::write`], consumed once by the correlation
/// logic, then discarded.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Decoded time-of-day value
    pub tc: Timecode,
    /// Drop-frame flag as transmitted
    pub drop_frame: bool,
    /// Sample position at which the frame's audio started
    pub start: u64,
    /// Sample position at which the frame's audio ended
    pub end: u64,
    /// Signal polarity (level) at frame completion
    pub polarity: bool,
    /// Peak level observed during the frame, in dBFS
    pub volume_dbfs: f32,
}

/// Streaming LTC decoder
///
/// Positions are supplied by the caller per block (typically a snapshot of
/// a monotonic sample counter) and flow unchanged into the start/end fields
/// of decoded frames.
#[derive(Debug)]
pub struct LtcDecoder {
    /// Nominal bit period in samples for the configured rates
    nominal_period: f64,
    /// Adaptive bit period estimate, clamped near the nominal
    bit_period: f64,
    /// Current signal level; `None` until a sample clears the floor
    state: Option<bool>,
    /// Position of the most recent level transition
    last_transition: u64,
    /// Start position of an unpaired half-period interval
    pending_half: Option<u64>,
    /// Receive-order shift register; bit `i` is transmitted bit `i`
    reg: u128,
    /// Start positions of the bits currently in the register
    bit_starts: VecDeque<u64>,
    /// Peak absolute level since the last completed frame
    peak: f32,
    queue: VecDeque<DecodedFrame>,
}

impl LtcDecoder {
    /// Create a decoder for the given sample and frame rates
    pub fn new(sample_rate: u32, fps: u32) -> Self {
        let nominal = sample_rate as f64 / (fps as f64 * FRAME_BITS as f64);
        Self {
            nominal_period: nominal,
            bit_period: nominal,
            state: None,
            last_transition: 0,
            pending_half: None,
            reg: 0,
            bit_starts: VecDeque::with_capacity(FRAME_BITS),
            peak: 0.0,
            queue: VecDeque::with_capacity(QUEUE_LEN),
        }
    }

    /// Feed one block of samples starting at absolute position `pos`
    ///
    /// The decoder buffers partial frames across calls; any frames completed
    /// within this block become available via [`pop_frame`](Self::pop_frame).
    pub fn write(&mut self, samples: &[f32], pos: u64) {
        for (i, &s) in samples.iter().enumerate() {
            let at = pos + i as u64;
            self.peak = self.peak.max(s.abs());

            let level = if s > SIGNAL_FLOOR {
                Some(true)
            } else if s < -SIGNAL_FLOOR {
                Some(false)
            } else {
                None
            };

            match (self.state, level) {
                (None, Some(l)) => {
                    self.state = Some(l);
                    self.last_transition = at;
                }
                (Some(cur), Some(l)) if l != cur => {
                    let interval = at - self.last_transition;
                    self.transition(interval, at);
                    self.state = Some(l);
                    self.last_transition = at;
                }
                _ => {}
            }
        }
    }

    /// Take the oldest completed frame, if any
    pub fn pop_frame(&mut self) -> Option<DecodedFrame> {
        self.queue.pop_front()
    }

    /// Number of completed frames waiting to be read
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Classify the interval that just ended at `at`
    fn transition(&mut self, interval: u64, at: u64) {
        let ratio = interval as f64 / self.bit_period;

        if ratio > 1.5 {
            // Stream discontinuity (silence gap or dropout): discard any
            // half-built bit and require a fresh run of 80 bits.
            self.pending_half = None;
            self.bit_starts.clear();
        } else if ratio >= 0.75 {
            // Full bit period: a zero bit
            self.pending_half = None;
            self.adapt(interval as f64);
            self.push_bit(false, at - interval, at);
        } else if ratio >= 0.25 {
            // Half period: two in a row make a one bit
            match self.pending_half.take() {
                Some(start) => {
                    self.adapt((at - start) as f64);
                    self.push_bit(true, start, at);
                }
                None => self.pending_half = Some(at - interval),
            }
        }
        // Shorter intervals are glitches; ignored.
    }

    /// Nudge the bit period estimate toward an observed full period
    fn adapt(&mut self, observed: f64) {
        let next = self.bit_period * (1.0 - PERIOD_ALPHA) + observed * PERIOD_ALPHA;
        self.bit_period = next.clamp(self.nominal_period * 0.66, self.nominal_period * 1.5);
    }

    fn push_bit(&mut self, bit: bool, start: u64, end: u64) {
        if self.bit_starts.len() == FRAME_BITS {
            self.bit_starts.pop_front();
        }
        self.bit_starts.push_back(start);
        self.reg = (self.reg >> 1) | ((bit as u128) << (FRAME_BITS - 1));

        if (self.reg >> 64) as u16 == SYNC_WORD && self.bit_starts.len() == FRAME_BITS {
            let frame = DecodedFrame {
                tc: unpack_frame(self.reg),
                drop_frame: drop_frame_bit(self.reg),
                // Front of the ring is the start of bit 0
                start: self.bit_starts[0],
                end,
                polarity: self.state.unwrap_or(false),
                volume_dbfs: 20.0 * self.peak.max(1.0e-10).log10(),
            };
            if self.queue.len() == QUEUE_LEN {
                self.queue.pop_front();
            }
            self.queue.push_back(frame);
            self.peak = 0.0;
            self.bit_starts.clear();
        }
    }
}
