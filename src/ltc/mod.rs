//! Linear Time Code (SMPTE 12M) encoding and decoding
//!
//! Implements the subset of the LTC protocol needed for loop-back delay
//! measurement:
//! - 80-bit frame layout with BCD time fields and the fixed sync word
//! - Biphase-mark encoding of whole frames ([`encoder`])
//! - Streaming biphase-mark decoding with sample-accurate frame start and
//!   end positions ([`decoder`])
//!
//! User bits are transmitted as zero and ignored on receive. Drop-frame
//! timecode arithmetic is not implemented; the drop-frame flag is decoded
//! and reported as-is.

pub mod decoder;
pub mod encoder;

pub use decoder::{DecodedFrame, LtcDecoder};
pub use encoder::LtcEncoder;

use std::fmt;

/// Number of bits in one LTC frame
pub const FRAME_BITS: usize = 80;

/// Sync word as it appears in a receive-order shift register.
///
/// Bits are transmitted LSB-first; shifting each received bit in at the top
/// of a 16-bit register leaves the sync pattern `0011 1111 1111 1101`
/// (transmission order) as the value `0xBFFC`.
pub const SYNC_WORD: u16 = 0xBFFC;

/// A decoded or to-be-encoded time-of-day value
///
/// Plain hours/minutes/seconds/frame without any frame-rate context; the
/// frame rate lives with the codec that produced or consumes the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timecode {
    /// Hours (0-23)
    pub hours: u8,
    /// Minutes (0-59)
    pub mins: u8,
    /// Seconds (0-59)
    pub secs: u8,
    /// Frame within the current second (0..fps)
    pub frame: u8,
}

impl Timecode {
    /// Total seconds since 00:00:00, ignoring the frame field
    pub fn total_seconds(&self) -> u64 {
        self.hours as u64 * 3600 + self.mins as u64 * 60 + self.secs as u64
    }

    /// Advance by one frame at the given frame rate, wrapping at 24 hours
    pub fn increment(&mut self, fps: u32) {
        self.frame += 1;
        if self.frame as u32 >= fps {
            self.frame = 0;
            self.secs += 1;
            if self.secs >= 60 {
                self.secs = 0;
                self.mins += 1;
                if self.mins >= 60 {
                    self.mins = 0;
                    self.hours += 1;
                    if self.hours >= 24 {
                        self.hours = 0;
                    }
                }
            }
        }
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}",
            self.hours, self.mins, self.secs, self.frame
        )
    }
}

/// Pack a timecode into the 80-bit frame word.
///
/// Bit `i` of the returned word is the `i`-th transmitted bit. Time fields
/// are BCD per SMPTE 12M (frame units at 0-3, frame tens at 8-9, second
/// units at 16-19, second tens at 24-26, minute units at 32-35, minute tens
/// at 40-42, hour units at 48-51, hour tens at 56-57), user bits are zero,
/// and the sync word occupies bits 64-79.
pub(crate) fn pack_frame(tc: &Timecode) -> u128 {
    let mut word = (SYNC_WORD as u128) << 64;
    word |= (tc.frame as u128 % 10) | ((tc.frame as u128 / 10) << 8);
    word |= ((tc.secs as u128 % 10) << 16) | ((tc.secs as u128 / 10) << 24);
    word |= ((tc.mins as u128 % 10) << 32) | ((tc.mins as u128 / 10) << 40);
    word |= ((tc.hours as u128 % 10) << 48) | ((tc.hours as u128 / 10) << 56);
    word
}

/// Extract the time fields from a received 80-bit frame word
pub(crate) fn unpack_frame(word: u128) -> Timecode {
    let bcd = |units: u32, tens: u32, mask: u128| -> u8 {
        (((word >> units) & 0xF) + 10 * ((word >> tens) & mask)) as u8
    };
    Timecode {
        frame: bcd(0, 8, 0x3),
        secs: bcd(16, 24, 0x7),
        mins: bcd(32, 40, 0x7),
        hours: bcd(48, 56, 0x3),
    }
}

/// Drop-frame flag (bit 10) of a received frame word
pub(crate) fn drop_frame_bit(word: u128) -> bool {
    (word >> 10) & 1 == 1
}
