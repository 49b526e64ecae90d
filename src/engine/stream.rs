//! Real-time stream engine
//!
//! ```text
//!  input callback ──try_send──▶ [input queue] ──▶ pedalboard-dsp thread
//!                                                     │ chain.process
//!  output callback ◀──try_recv── [output queue] ◀─────┘
//! ```
//!
//! Neither callback blocks, takes the chain lock, or logs. A full queue
//! drops the newest block; an empty output queue is answered with silence
//! of the requested shape. Faults are counted in `StreamStats` and logged
//! from the processing thread.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dsp::SharedChain;
use crate::engine::buffer::AudioBuffer;
use crate::engine::device::{
    AudioDevice, CaptureCallback, DeliveryCallback, DeviceConfig, DeviceFault, DeviceSession,
    FaultCallback,
};
use crate::error::{PedalboardError, Result};

/// Default hand-off queue capacity in blocks
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// Default processing-thread wait per dequeue attempt
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default bound on waiting for the processing thread at stop
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest capture `record` accepts
pub const MAX_RECORD_SECONDS: f32 = 3600.0;

const PROCESSING_THREAD_NAME: &str = "pedalboard-dsp";

// ============================================================================
// State
// ============================================================================

/// Stream engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    /// No device session open
    Idle,
    /// Processing blocks
    Running,
    /// The device reported a fatal error; only `stop` is valid
    Faulted,
}

impl StreamState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => StreamState::Running,
            2 => StreamState::Faulted,
            _ => StreamState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            StreamState::Idle => 0,
            StreamState::Running => 1,
            StreamState::Faulted => 2,
        }
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StreamState::Idle => "idle",
            StreamState::Running => "running",
            StreamState::Faulted => "faulted",
        };
        write!(f, "{}", name)
    }
}

/// Engine state readable from callbacks without locking
#[derive(Debug)]
struct SharedState(AtomicU8);

impl SharedState {
    fn new(state: StreamState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    fn get(&self) -> StreamState {
        StreamState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: StreamState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Lock-free stream counters
#[derive(Debug, Default)]
pub struct StreamStats {
    blocks_captured: AtomicU64,
    blocks_processed: AtomicU64,
    blocks_delivered: AtomicU64,
    input_overruns: AtomicU64,
    output_drops: AtomicU64,
    underruns: AtomicU64,
    shape_mismatches: AtomicU64,
    device_errors: AtomicU64,
}

/// Point-in-time copy of `StreamStats`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Blocks accepted into the input queue
    pub blocks_captured: u64,
    /// Blocks run through the chain
    pub blocks_processed: u64,
    /// Processed blocks handed to the output device
    pub blocks_delivered: u64,
    /// Captured blocks dropped because the input queue was full
    pub input_overruns: u64,
    /// Processed blocks dropped because the output queue was full
    pub output_drops: u64,
    /// Output requests answered with silence because nothing was ready
    pub underruns: u64,
    /// Blocks of the wrong size, replaced by silence or dropped
    pub shape_mismatches: u64,
    /// Errors reported by the device
    pub device_errors: u64,
}

impl StatsSnapshot {
    /// Sum of every fault counter
    pub fn faults(&self) -> u64 {
        self.input_overruns
            + self.output_drops
            + self.underruns
            + self.shape_mismatches
            + self.device_errors
    }
}

impl StreamStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            blocks_captured: self.blocks_captured.load(Ordering::Relaxed),
            blocks_processed: self.blocks_processed.load(Ordering::Relaxed),
            blocks_delivered: self.blocks_delivered.load(Ordering::Relaxed),
            input_overruns: self.input_overruns.load(Ordering::Relaxed),
            output_drops: self.output_drops.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            shape_mismatches: self.shape_mismatches.load(Ordering::Relaxed),
            device_errors: self.device_errors.load(Ordering::Relaxed),
        }
    }

    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ============================================================================
// Options
// ============================================================================

/// Queue sizing and timing of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Capacity of each hand-off queue, in blocks
    pub queue_capacity: usize,
    /// Longest single wait of the processing thread for input
    pub poll_interval: Duration,
    /// Bound on waiting for the processing thread in `stop`
    pub stop_timeout: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// Outcome of `StreamEngine::stop`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StopReport {
    /// Blocks left in either queue and discarded
    pub drained_blocks: usize,
    /// The processing thread did not finish within the stop timeout
    pub timed_out: bool,
    /// Counters at the moment the stream stopped
    pub stats: StatsSnapshot,
}

// ============================================================================
// Stream Engine
// ============================================================================

struct ActiveStream {
    session: Box<dyn DeviceSession>,
    worker: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
    input_rx: Receiver<AudioBuffer>,
    output_rx: Receiver<AudioBuffer>,
    config: DeviceConfig,
}

/// Drives a device through an effect chain in real time
///
/// State machine: `Idle → Running → Idle`, with `Faulted` reachable from
/// `Running` when the device reports a fatal error.
pub struct StreamEngine {
    device: Box<dyn AudioDevice>,
    options: StreamOptions,
    state: Arc<SharedState>,
    stats: Arc<StreamStats>,
    active: Option<ActiveStream>,
}

impl StreamEngine {
    /// Create an idle engine for a device with default options
    pub fn new(device: Box<dyn AudioDevice>) -> Self {
        Self::with_options(device, StreamOptions::default())
    }

    /// Create an idle engine with explicit queue sizing and timeouts
    pub fn with_options(device: Box<dyn AudioDevice>, options: StreamOptions) -> Self {
        Self {
            device,
            options,
            state: Arc::new(SharedState::new(StreamState::Idle)),
            stats: Arc::new(StreamStats::default()),
            active: None,
        }
    }

    /// Current state
    pub fn state(&self) -> StreamState {
        self.state.get()
    }

    /// Counters of the current (or last) run
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Format of the open session, if any
    pub fn config(&self) -> Option<DeviceConfig> {
        self.active.as_ref().map(|a| a.config)
    }

    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    /// Name of the underlying device
    pub fn device_name(&self) -> String {
        self.device.name()
    }

    /// The processing step applied to every captured block
    ///
    /// Exposed so the same step can be driven without a device.
    pub fn process_block(chain: &SharedChain, block: &mut AudioBuffer) {
        chain.process(block);
    }

    /// Open the device and start processing through `chain`
    ///
    /// Valid only from `Idle`. On `DeviceUnavailable` the engine stays
    /// `Idle`. The chain is prepared for the configured format; it may be
    /// edited freely while the stream runs.
    pub fn start(&mut self, chain: &SharedChain, config: DeviceConfig) -> Result<()> {
        let state = self.state();
        if state != StreamState::Idle {
            return Err(PedalboardError::InvalidState {
                operation: "start".to_string(),
                state: state.to_string(),
            });
        }
        config.validate()?;
        if self.options.queue_capacity == 0 {
            return Err(PedalboardError::InvalidConfig {
                reason: "queue_capacity must be greater than 0".to_string(),
            });
        }

        chain.prepare(config.sample_rate, config.channel_count);

        // Fresh queues and counters per run
        let capacity = self.options.queue_capacity;
        let (input_tx, input_rx) = bounded::<AudioBuffer>(capacity);
        let (output_tx, output_rx) = bounded::<AudioBuffer>(capacity);
        let (recycle_tx, recycle_rx) = bounded::<AudioBuffer>(capacity * 2 + 2);
        self.stats = Arc::new(StreamStats::default());

        let capture = capture_callback(config, input_tx, recycle_rx, Arc::clone(&self.stats));
        let deliver = delivery_callback(
            config,
            output_rx.clone(),
            recycle_tx,
            Arc::clone(&self.state),
            Arc::clone(&self.stats),
        );
        let on_fault = fault_callback(Arc::clone(&self.state), Arc::clone(&self.stats));

        // Set before opening so a fault reported during open is not lost
        self.state.set(StreamState::Running);
        let session = match self.device.open(&config, capture, deliver, on_fault) {
            Ok(session) => session,
            Err(e) => {
                self.state.set(StreamState::Idle);
                warn!(device = %self.device.name(), error = %e, "failed to open audio device");
                return Err(e);
            }
        };

        let shutdown = Arc::new(AtomicBool::new(false));
        let worker = ProcessingLoop {
            chain: chain.clone(),
            input_rx: input_rx.clone(),
            output_tx,
            shutdown: Arc::clone(&shutdown),
            stats: Arc::clone(&self.stats),
            poll_interval: self.options.poll_interval,
        };
        let worker = match std::thread::Builder::new()
            .name(PROCESSING_THREAD_NAME.to_string())
            .spawn(move || worker.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                session.close();
                self.state.set(StreamState::Idle);
                return Err(PedalboardError::Io(e));
            }
        };

        info!(
            device = %self.device.name(),
            sample_rate = config.sample_rate,
            block_size = config.block_size,
            channels = config.channel_count,
            queue_capacity = capacity,
            "stream started"
        );

        self.active = Some(ActiveStream {
            session,
            worker,
            shutdown,
            input_rx,
            output_rx,
            config,
        });
        Ok(())
    }

    /// Stop processing and close the device
    ///
    /// Waits at most `stop_timeout` for the processing thread, then tears
    /// the session down regardless and drains both queues. Idempotent when
    /// already `Idle`.
    pub fn stop(&mut self) -> StopReport {
        let Some(active) = self.active.take() else {
            self.state.set(StreamState::Idle);
            return StopReport {
                stats: self.stats.snapshot(),
                ..StopReport::default()
            };
        };

        active.shutdown.store(true, Ordering::Release);

        let deadline = Instant::now() + self.options.stop_timeout;
        while !active.worker.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        let timed_out = !active.worker.is_finished();
        if timed_out {
            warn!(
                timeout_ms = self.options.stop_timeout.as_millis() as u64,
                "processing thread did not stop in time; detaching"
            );
        } else if active.worker.join().is_err() {
            warn!("processing thread panicked");
        }

        active.session.close();

        let drained = active.input_rx.try_iter().count() + active.output_rx.try_iter().count();
        self.state.set(StreamState::Idle);

        let stats = self.stats.snapshot();
        info!(
            drained_blocks = drained,
            processed = stats.blocks_processed,
            faults = stats.faults(),
            "stream stopped"
        );

        StopReport {
            drained_blocks: drained,
            timed_out,
            stats,
        }
    }

    /// Whether a device session is open (Running or Faulted)
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Capture `seconds` of unprocessed input from the device
    ///
    /// Valid only from `Idle`. The device is open just for the capture and
    /// its output plays silence. Non-positive or non-finite durations fail
    /// with `InvalidConfig`. A fatal device error, or input that stops
    /// arriving for longer than `stop_timeout` past the expected end, fails
    /// with `StreamFault`.
    pub fn record(&mut self, config: DeviceConfig, seconds: f32) -> Result<AudioBuffer> {
        let state = self.state();
        if state != StreamState::Idle {
            return Err(PedalboardError::InvalidState {
                operation: "record".to_string(),
                state: state.to_string(),
            });
        }
        config.validate()?;
        if !seconds.is_finite() || seconds <= 0.0 || seconds > MAX_RECORD_SECONDS {
            return Err(PedalboardError::InvalidConfig {
                reason: format!(
                    "recording duration must be in (0, {}] seconds, got {}",
                    MAX_RECORD_SECONDS, seconds
                ),
            });
        }

        let frames = ((seconds as f64 * config.sample_rate as f64).round() as usize).max(1);
        let blocks = frames.div_ceil(config.block_size);
        let expected = config.samples_per_block();

        let (block_tx, block_rx) = bounded::<Vec<f32>>(blocks);
        let capture: CaptureCallback = Box::new(move |data: &[f32]| {
            if data.len() == expected {
                let _ = block_tx.try_send(data.to_vec());
            }
        });
        let deliver: DeliveryCallback = Box::new(|out: &mut [f32]| out.fill(0.0));
        let fatal = Arc::new(AtomicBool::new(false));
        let on_fault: FaultCallback = {
            let fatal = Arc::clone(&fatal);
            Box::new(move |fault: DeviceFault| {
                if fault.fatal {
                    fatal.store(true, Ordering::Release);
                }
            })
        };

        let session = self.device.open(&config, capture, deliver, on_fault)?;
        info!(
            device = %self.device.name(),
            seconds,
            sample_rate = config.sample_rate,
            channels = config.channel_count,
            "recording started"
        );

        let deadline = Instant::now() + Duration::from_secs_f32(seconds) + self.options.stop_timeout;
        let mut interleaved = Vec::with_capacity(blocks * expected);
        let mut received = 0;
        let captured = loop {
            if received == blocks {
                break Ok(());
            }
            if fatal.load(Ordering::Acquire) {
                break Err(PedalboardError::StreamFault {
                    reason: "device reported a fatal error while recording".to_string(),
                });
            }
            let now = Instant::now();
            if now >= deadline {
                break Err(PedalboardError::StreamFault {
                    reason: format!("recording timed out after {} of {} blocks", received, blocks),
                });
            }
            match block_rx.recv_timeout((deadline - now).min(self.options.poll_interval)) {
                Ok(block) => {
                    interleaved.extend_from_slice(&block);
                    received += 1;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    break Err(PedalboardError::StreamFault {
                        reason: "capture stopped while recording".to_string(),
                    });
                }
            }
        };
        session.close();
        captured?;

        interleaved.truncate(frames * config.channel_count);
        info!(frames, "recording finished");
        AudioBuffer::from_interleaved(&interleaved, config.channel_count, config.sample_rate)
    }
}

impl Drop for StreamEngine {
    fn drop(&mut self) {
        if self.active.is_some() {
            self.stop();
        }
    }
}

impl std::fmt::Debug for StreamEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEngine")
            .field("device", &self.device.name())
            .field("state", &self.state())
            .field("options", &self.options)
            .finish()
    }
}

// ============================================================================
// Callbacks
// ============================================================================

/// Builds the input-side callback: deinterleave and enqueue, never block
fn capture_callback(
    config: DeviceConfig,
    input_tx: Sender<AudioBuffer>,
    recycle_rx: Receiver<AudioBuffer>,
    stats: Arc<StreamStats>,
) -> Box<dyn FnMut(&[f32]) + Send + 'static> {
    let channels = config.channel_count;
    let expected = config.samples_per_block();

    Box::new(move |data: &[f32]| {
        if data.len() != expected {
            StreamStats::bump(&stats.shape_mismatches);
            return;
        }

        let mut block = recycle_rx.try_recv().unwrap_or_else(|_| {
            AudioBuffer::silence(config.block_size, channels, config.sample_rate)
        });
        for (frame_index, frame) in data.chunks_exact(channels).enumerate() {
            for (ch, &sample) in frame.iter().enumerate() {
                block.samples[ch][frame_index] = sample;
            }
        }

        match input_tx.try_send(block) {
            Ok(()) => StreamStats::bump(&stats.blocks_captured),
            Err(_) => StreamStats::bump(&stats.input_overruns),
        }
    })
}

/// Builds the output-side callback: dequeue if ready, otherwise silence
fn delivery_callback(
    config: DeviceConfig,
    output_rx: Receiver<AudioBuffer>,
    recycle_tx: Sender<AudioBuffer>,
    state: Arc<SharedState>,
    stats: Arc<StreamStats>,
) -> Box<dyn FnMut(&mut [f32]) + Send + 'static> {
    let expected = config.samples_per_block();

    Box::new(move |out: &mut [f32]| {
        if state.get() == StreamState::Faulted {
            out.fill(0.0);
            return;
        }

        match output_rx.try_recv() {
            Ok(block) => {
                let fits = out.len() == expected
                    && block.num_channels() == config.channel_count
                    && block.num_samples() == config.block_size;
                if fits && block.is_finite() {
                    block.write_interleaved(out);
                    StreamStats::bump(&stats.blocks_delivered);
                } else {
                    out.fill(0.0);
                    StreamStats::bump(&stats.shape_mismatches);
                }
                let _ = recycle_tx.try_send(block);
            }
            Err(_) => {
                out.fill(0.0);
                StreamStats::bump(&stats.underruns);
            }
        }
    })
}

fn fault_callback(
    state: Arc<SharedState>,
    stats: Arc<StreamStats>,
) -> Box<dyn FnMut(DeviceFault) + Send + 'static> {
    Box::new(move |fault: DeviceFault| {
        StreamStats::bump(&stats.device_errors);
        if fault.fatal && state.get() == StreamState::Running {
            state.set(StreamState::Faulted);
        }
    })
}

// ============================================================================
// Processing Thread
// ============================================================================

struct ProcessingLoop {
    chain: SharedChain,
    input_rx: Receiver<AudioBuffer>,
    output_tx: Sender<AudioBuffer>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<StreamStats>,
    poll_interval: Duration,
}

impl ProcessingLoop {
    fn run(self) {
        debug!("processing thread started");
        let mut reported = StatsSnapshot::default();
        let mut last_report = Instant::now();

        while !self.shutdown.load(Ordering::Acquire) {
            match self.input_rx.recv_timeout(self.poll_interval) {
                Ok(mut block) => {
                    StreamEngine::process_block(&self.chain, &mut block);
                    if self.output_tx.try_send(block).is_err() {
                        StreamStats::bump(&self.stats.output_drops);
                    }
                    StreamStats::bump(&self.stats.blocks_processed);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if last_report.elapsed() >= self.poll_interval {
                reported = self.report_faults(reported);
                last_report = Instant::now();
            }
        }

        self.report_faults(reported);
        debug!("processing thread finished");
    }

    /// Log counters that grew since the last report
    fn report_faults(&self, previous: StatsSnapshot) -> StatsSnapshot {
        let current = self.stats.snapshot();
        if current.faults() > previous.faults() {
            warn!(
                input_overruns = current.input_overruns - previous.input_overruns,
                output_drops = current.output_drops - previous.output_drops,
                underruns = current.underruns - previous.underruns,
                shape_mismatches = current.shape_mismatches - previous.shape_mismatches,
                device_errors = current.device_errors - previous.device_errors,
                "stream faults"
            );
        }
        current
    }
}

// ============================================================================
// Tests
// ============================================================================
