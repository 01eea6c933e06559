//! ltc-delay - measure audio round-trip delay with an LTC loop-back
//!
//! Continuously emits Linear Time Code (LTC) encoded audio on an output
//! channel, expects the signal to be physically routed back into an input
//! channel through whatever equipment is being calibrated, decodes the
//! returned timecode, and reports the average offset in samples between the
//! position at which each timecode frame was transmitted and the position at
//! which its audio actually arrived.

pub mod audio;
pub mod ltc;

pub use audio::engine::{AudioEngine, EngineConfig, EngineState};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default LTC frame rate (24, 25 and 30 fps are supported)
pub const DEFAULT_FPS: u32 = 25;

/// Default output level in dBFS
pub const DEFAULT_LEVEL_DBFS: f32 = -6.0;
