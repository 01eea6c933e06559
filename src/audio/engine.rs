//! Audio engine: host I/O, real-time callbacks and the analysis loop
//!
//! Two execution contexts cooperate here. The real-time callbacks invoked
//! by the host audio system do bounded work only: the output callback pops
//! one block from the ring buffer (silence on underrun), advances the
//! monotonic sample counter and wakes the analysis thread with a try-lock
//! notify; the input callback feeds the LTC decoder and forwards completed
//! frames over a bounded lock-free channel. The analysis loop does all
//! unbounded work: encoding ahead, correlation, averaging and reporting,
//! parking on a condition variable when there is nothing to do.

use crate::audio::correlate::Correlator;
use crate::audio::estimator::{DelayEstimator, DelayReport};
use crate::audio::generator::EncodeAhead;
use crate::audio::ring::{ring, RingReader, RingWriter};
use crate::ltc::{DecodedFrame, LtcDecoder};
use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use thiserror::Error;

/// Completed decoded frames buffered between input callback and analysis
const FRAME_CHANNEL_CAP: usize = 64;

/// Scratch sizing for callback blocks; resized if the host exceeds it
const MAX_BLOCK: usize = 1 << 14;

/// Errors raised while connecting to the host audio system
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no output device available")]
    NoOutputDevice,

    #[error("no input device available")]
    NoInputDevice,

    #[error("audio device not found: {0}")]
    DeviceNotFound(String),

    #[error("sample rate mismatch: input {input} Hz, output {output} Hz")]
    SampleRateMismatch { input: u32, output: u32 },
}

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Streams not yet active; output is silence, input is ignored
    Starting = 0,
    /// Normal operation
    Running = 1,
    /// Terminal; output forced to silence, analysis loop exits
    Shutdown = 2,
}

impl EngineState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => EngineState::Starting,
            1 => EngineState::Running,
            _ => EngineState::Shutdown,
        }
    }
}

/// Engine configuration, supplied by the CLI
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Output level in dBFS
    pub level_dbfs: f32,
    /// LTC frame rate (24, 25 or 30)
    pub fps: u32,
    /// Print one line per correlated frame
    pub debug: bool,
    /// Input device name hint; default input device when `None`
    pub input_device: Option<String>,
    /// Output device name hint; default output device when `None`
    pub output_device: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            level_dbfs: crate::DEFAULT_LEVEL_DBFS,
            fps: crate::DEFAULT_FPS,
            debug: false,
            input_device: None,
            output_device: None,
        }
    }
}

/// Shared session state between the real-time callbacks, the analysis loop
/// and the signal handler
///
/// The monotonic counter uses relaxed ordering throughout: it is read as an
/// approximate "current time" snapshot, and eventual visibility is the only
/// requirement.
pub struct Session {
    state: AtomicU8,
    monotonic: AtomicU64,
    wake_lock: Mutex<()>,
    wake_cond: Condvar,
}

impl Session {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(EngineState::Starting as u8),
            monotonic: AtomicU64::new(0),
            wake_lock: Mutex::new(()),
            wake_cond: Condvar::new(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Relaxed))
    }

    fn set_state(&self, state: EngineState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    /// Snapshot of the monotonic sample counter
    pub fn monotonic(&self) -> u64 {
        self.monotonic.load(Ordering::Relaxed)
    }

    fn advance_monotonic(&self, samples: u64) {
        self.monotonic.fetch_add(samples, Ordering::Relaxed);
    }

    /// Transition to `SHUTDOWN` and wake the analysis thread
    ///
    /// Safe to call from the Ctrl+C handler thread and idempotent; the
    /// analysis loop observes the state and exits, after which the
    /// callbacks emit silence until the streams are dropped.
    pub fn request_shutdown(&self) {
        self.set_state(EngineState::Shutdown);
        // Taking the lock here closes the check-then-wait race with the
        // analysis loop. This runs on a normal thread, never a real-time one.
        if let Ok(_guard) = self.wake_lock.lock() {
            self.wake_cond.notify_all();
        }
    }

    /// Best-effort wake from the real-time context
    ///
    /// A contended lock means the analysis thread is already awake and
    /// working; skipping the notification loses nothing, and the callback
    /// must never wait.
    fn notify_best_effort(&self) {
        if let Ok(_guard) = self.wake_lock.try_lock() {
            self.wake_cond.notify_one();
        }
    }
}

/// Information about one host audio device
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default_input: bool,
    pub is_default_output: bool,
    pub input_channels: u16,
    pub output_channels: u16,
}

/// The loop-back measurement engine
///
/// Owns the host streams, the session state and the analysis-side ends of
/// the ring buffer and frame channel. `start()` connects to the host and
/// begins emitting silence; `run()` enters the analysis loop (transitioning
/// to `RUNNING`) until shutdown is requested; `stop()` tears everything
/// down. Teardown also happens on drop, so every exit path releases the
/// streams and buffers.
pub struct AudioEngine {
    config: EngineConfig,
    session: Arc<Session>,
    sample_rate: u32,
    input_stream: Option<Stream>,
    output_stream: Option<Stream>,
    ring_writer: Option<RingWriter>,
    frame_rx: Option<Receiver<DecodedFrame>>,
}

impl AudioEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            session: Arc::new(Session::new()),
            sample_rate: 0,
            input_stream: None,
            output_stream: None,
            ring_writer: None,
            frame_rx: None,
        }
    }

    /// Shared session handle, e.g. for the signal handler
    pub fn session(&self) -> Arc<Session> {
        Arc::clone(&self.session)
    }

    /// Session sample rate; valid after `start()`
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// List host audio devices
    pub fn list_devices() -> Result<Vec<DeviceInfo>> {
        let host = cpal::default_host();
        let default_input = host.default_input_device().and_then(|d| d.name().ok());
        let default_output = host.default_output_device().and_then(|d| d.name().ok());

        let mut devices = Vec::new();
        for device in host.devices()? {
            let name = device.name().unwrap_or_else(|_| "unknown".to_string());
            devices.push(DeviceInfo {
                is_default_input: default_input.as_deref() == Some(&name),
                is_default_output: default_output.as_deref() == Some(&name),
                input_channels: device
                    .default_input_config()
                    .map(|c| c.channels())
                    .unwrap_or(0),
                output_channels: device
                    .default_output_config()
                    .map(|c| c.channels())
                    .unwrap_or(0),
                name,
            });
        }
        Ok(devices)
    }

    fn find_device(
        devices: impl Iterator<Item = Device>,
        name: &str,
    ) -> Result<Device, EngineError> {
        devices
            .into_iter()
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| EngineError::DeviceNotFound(name.to_string()))
    }

    /// Connect to the host audio system and start the streams
    ///
    /// The session sample rate is taken from the output device; the input
    /// device must agree. Output is silence until `run()` begins. All
    /// failures here are fatal startup faults; anything already acquired is
    /// released when the engine is dropped.
    pub fn start(&mut self) -> Result<()> {
        let host = cpal::default_host();

        let output = match &self.config.output_device {
            Some(name) => Self::find_device(host.output_devices()?, name)?,
            None => host
                .default_output_device()
                .ok_or(EngineError::NoOutputDevice)?,
        };
        let input = match &self.config.input_device {
            Some(name) => Self::find_device(host.input_devices()?, name)?,
            None => host
                .default_input_device()
                .ok_or(EngineError::NoInputDevice)?,
        };

        let out_default = output.default_output_config()?;
        let in_default = input.default_input_config()?;
        let sample_rate = out_default.sample_rate().0;
        if in_default.sample_rate().0 != sample_rate {
            return Err(EngineError::SampleRateMismatch {
                input: in_default.sample_rate().0,
                output: sample_rate,
            }
            .into());
        }

        let out_channels = out_default.channels().max(1) as usize;
        let in_channels = in_default.channels().max(1) as usize;

        tracing::info!(
            output = %output.name().unwrap_or_else(|_| "unknown".into()),
            input = %input.name().unwrap_or_else(|_| "unknown".into()),
            sample_rate,
            "connecting to host audio system"
        );

        let out_config = StreamConfig {
            channels: out_default.channels(),
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let in_config = StreamConfig {
            channels: in_default.channels(),
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // One second of pre-roll capacity; the generator keeps it at least
        // half full.
        let (ring_writer, ring_reader) = ring(sample_rate as usize);
        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<DecodedFrame>(FRAME_CHANNEL_CAP);

        // Output callback: ring consumer moved into the closure, no locks.
        let out_session = Arc::clone(&self.session);
        let mut reader: RingReader = ring_reader;
        let mut scratch = vec![0.0f32; MAX_BLOCK];
        let output_stream = output.build_output_stream(
            &out_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if out_session.state() != EngineState::Running {
                    data.fill(0.0);
                    return;
                }
                let n = data.len() / out_channels;
                if scratch.len() < n {
                    scratch.resize(n, 0.0);
                }
                if reader.read_exact(&mut scratch[..n]) {
                    for (frame, &s) in data.chunks_mut(out_channels).zip(&scratch[..n]) {
                        frame[0] = s;
                        for ch in frame.iter_mut().skip(1) {
                            *ch = 0.0;
                        }
                    }
                    out_session.advance_monotonic(n as u64);
                } else {
                    // Underrun is an expected transient: a full block of
                    // silence, never a short block.
                    data.fill(0.0);
                }
                out_session.notify_best_effort();
            },
            {
                let session = Arc::clone(&self.session);
                move |err| {
                    tracing::error!("output stream error: {err}");
                    if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                        session.request_shutdown();
                    }
                }
            },
            None,
        )?;

        // Input callback: decoder moved into the closure; completed frames
        // leave over the bounded channel, dropped if the analysis thread is
        // behind.
        let in_session = Arc::clone(&self.session);
        let mut decoder = LtcDecoder::new(sample_rate, self.config.fps);
        let mut mono = Vec::with_capacity(MAX_BLOCK);
        let input_stream = input.build_input_stream(
            &in_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if in_session.state() != EngineState::Running {
                    return;
                }
                mono.clear();
                mono.extend(data.iter().step_by(in_channels).copied());
                decoder.write(&mono, in_session.monotonic());
                while let Some(frame) = decoder.pop_frame() {
                    let _ = frame_tx.try_send(frame);
                }
            },
            {
                let session = Arc::clone(&self.session);
                move |err| {
                    tracing::error!("input stream error: {err}");
                    if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                        session.request_shutdown();
                    }
                }
            },
            None,
        )?;

        output_stream.play()?;
        input_stream.play()?;

        self.sample_rate = sample_rate;
        self.output_stream = Some(output_stream);
        self.input_stream = Some(input_stream);
        self.ring_writer = Some(ring_writer);
        self.frame_rx = Some(frame_rx);

        tracing::info!(sample_rate, fps = self.config.fps, "audio engine started");
        Ok(())
    }

    /// Run the analysis loop until shutdown
    ///
    /// Transitions the session to `RUNNING` on entry. Each cycle tops the
    /// ring buffer up to the pre-roll threshold, correlates every decoded
    /// frame that arrived, emits the periodic report, then parks on the
    /// wake condition until the next callback.
    pub fn run(&mut self) -> Result<()> {
        let mut ring = self
            .ring_writer
            .take()
            .ok_or_else(|| anyhow!("engine not started"))?;
        let frame_rx = self
            .frame_rx
            .take()
            .ok_or_else(|| anyhow!("engine not started"))?;

        let mut generator =
            EncodeAhead::new(self.sample_rate, self.config.fps, self.config.level_dbfs);
        let correlator = Correlator::new(self.sample_rate, self.config.fps);
        let mut estimator = DelayEstimator::new(self.sample_rate);
        let session = Arc::clone(&self.session);

        let mut guard = session
            .wake_lock
            .lock()
            .map_err(|_| anyhow!("wake lock poisoned"))?;
        session.set_state(EngineState::Running);
        tracing::info!("analysis loop running");

        while session.state() == EngineState::Running {
            generator.refill(&mut ring);

            let now = session.monotonic();
            while let Ok(frame) = frame_rx.try_recv() {
                let corr = correlator.correlate(&frame);
                if corr.accepted {
                    estimator.accept(corr.delta, now);
                }
                if self.config.debug {
                    println!(
                        "{:02}:{:02}:{:02}{}{:02} | {:8} {:8} {} | {:.1}dB | {}",
                        frame.tc.hours,
                        frame.tc.mins,
                        frame.tc.secs,
                        if frame.drop_frame { '.' } else { ':' },
                        frame.tc.frame,
                        frame.start,
                        frame.end,
                        if frame.polarity { '+' } else { '-' },
                        frame.volume_dbfs,
                        corr.delta
                    );
                }
            }

            match estimator.poll(now) {
                Some(DelayReport::Average(delay)) => println!("Delay {:.0}", delay),
                Some(DelayReport::NoRecentSignal) => println!(" -- no recent signal"),
                None => {}
            }

            if session.state() != EngineState::Running {
                break;
            }
            guard = session
                .wake_cond
                .wait(guard)
                .map_err(|_| anyhow!("wake lock poisoned"))?;
        }

        drop(guard);
        tracing::info!("analysis loop exited");
        Ok(())
    }

    /// Tear the engine down; idempotent, also invoked on drop
    pub fn stop(&mut self) {
        self.session.request_shutdown();
        self.input_stream = None;
        self.output_stream = None;
        self.ring_writer = None;
        self.frame_rx = None;
        tracing::info!("audio engine stopped");
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_starts_in_starting() {
        let session = Session::new();
        assert_eq!(session.state(), EngineState::Starting);
        assert_eq!(session.monotonic(), 0);
    }

    #[test]
    fn test_state_roundtrip() {
        for state in [
            EngineState::Starting,
            EngineState::Running,
            EngineState::Shutdown,
        ] {
            assert_eq!(EngineState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_request_shutdown_is_terminal_and_idempotent() {
        let session = Session::new();
        session.set_state(EngineState::Running);
        session.request_shutdown();
        assert_eq!(session.state(), EngineState::Shutdown);
        session.request_shutdown();
        assert_eq!(session.state(), EngineState::Shutdown);
    }

    #[test]
    fn test_monotonic_advances() {
        let session = Session::new();
        session.advance_monotonic(1024);
        session.advance_monotonic(1024);
        assert_eq!(session.monotonic(), 2048);
    }

    #[test]
    fn test_notify_does_not_block() {
        // Even with the wake lock held elsewhere, the best-effort notify
        // must return immediately.
        let session = Arc::new(Session::new());
        let _guard = session.wake_lock.lock().unwrap();
        session.notify_best_effort();
    }

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.fps, 25);
        assert_eq!(config.level_dbfs, -6.0);
        assert!(!config.debug);
    }

    #[test]
    fn test_list_devices_does_not_panic() {
        // May legitimately find nothing on CI hosts without audio.
        match AudioEngine::list_devices() {
            Ok(devices) => println!("found {} devices", devices.len()),
            Err(e) => println!("no audio devices available: {e}"),
        }
    }
}
