//! Audio engine and analysis pipeline
//!
//! - Host audio I/O and the real-time callbacks ([`engine`])
//! - SPSC sample ring buffer ([`ring`])
//! - Timecode encode-ahead generation ([`generator`])
//! - Decoded-frame correlation ([`correlate`])
//! - Running delay estimation ([`estimator`])

pub mod correlate;
pub mod engine;
pub mod estimator;
pub mod generator;
pub mod ring;
