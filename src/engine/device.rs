//! Audio device collaborators
//!
//! The stream engine opens a device with a `DeviceConfig` and three
//! callbacks. The device calls `capture` with exactly one interleaved block
//! of `block_size` frames, calls `deliver` with a zeroed interleaved block
//! to be filled, and reports driver problems through `on_fault`. None of the
//! callbacks may block.
//!
//! Two backends exist: `CpalDevice` for real hardware and `VirtualDevice`,
//! whose callbacks are driven by the caller for tests and headless runs.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::buffer::{DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE};
use crate::error::{PedalboardError, Result};

// ============================================================================
// Configuration
// ============================================================================

/// Stream format negotiated with a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Frames per block
    pub block_size: usize,
    /// Interleaved channel count
    pub channel_count: usize,
}

impl DeviceConfig {
    pub fn new(sample_rate: u32, block_size: usize, channel_count: usize) -> Self {
        Self {
            sample_rate,
            block_size,
            channel_count,
        }
    }

    /// Check that every field is positive
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(PedalboardError::InvalidConfig {
                reason: "sample_rate must be greater than 0".to_string(),
            });
        }
        if self.block_size == 0 {
            return Err(PedalboardError::InvalidConfig {
                reason: "block_size must be greater than 0".to_string(),
            });
        }
        if self.channel_count == 0 {
            return Err(PedalboardError::InvalidConfig {
                reason: "channel_count must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Interleaved samples in one block
    pub fn samples_per_block(&self) -> usize {
        self.block_size * self.channel_count
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            channel_count: 1,
        }
    }
}

// ============================================================================
// Device Traits
// ============================================================================

/// A driver-level problem reported from a device context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFault {
    pub message: String,
    /// The device can no longer stream
    pub fatal: bool,
}

/// Receives one interleaved captured block
pub type CaptureCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Fills one interleaved block for playback
pub type DeliveryCallback = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// Receives device faults
pub type FaultCallback = Box<dyn FnMut(DeviceFault) + Send + 'static>;

/// Something that can open a duplex audio session
pub trait AudioDevice {
    /// Human-readable backend/device description
    fn name(&self) -> String;

    /// Open input and output at `config` and start calling the callbacks
    ///
    /// Fails with `DeviceUnavailable` when either direction cannot be
    /// opened; no callback is invoked in that case.
    fn open(
        &mut self,
        config: &DeviceConfig,
        capture: CaptureCallback,
        deliver: DeliveryCallback,
        on_fault: FaultCallback,
    ) -> Result<Box<dyn DeviceSession>>;
}

/// An open device session; callbacks stop once it is closed
pub trait DeviceSession {
    fn close(self: Box<Self>);
}

// ============================================================================
// cpal Backend
// ============================================================================

/// Name and capabilities of a host audio device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub is_input: bool,
    pub is_output: bool,
    pub is_default_input: bool,
    pub is_default_output: bool,
}

/// List the devices known to the default host
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let host = cpal::default_host();
    let default_in = host.default_input_device().and_then(|d| d.name().ok());
    let default_out = host.default_output_device().and_then(|d| d.name().ok());

    let devices = host
        .devices()
        .map_err(|e| PedalboardError::DeviceUnavailable {
            reason: e.to_string(),
        })?;

    let mut out = Vec::new();
    for device in devices {
        let name = device.name().unwrap_or_else(|_| "<unknown>".to_string());
        out.push(DeviceInfo {
            is_input: device.default_input_config().is_ok(),
            is_output: device.default_output_config().is_ok(),
            is_default_input: default_in.as_deref() == Some(name.as_str()),
            is_default_output: default_out.as_deref() == Some(name.as_str()),
            name,
        });
    }
    Ok(out)
}

/// Host audio hardware via cpal
///
/// Device names are matched case-insensitively by substring; `None` selects
/// the host default.
#[derive(Debug, Clone, Default)]
pub struct CpalDevice {
    input_name: Option<String>,
    output_name: Option<String>,
}

impl CpalDevice {
    pub fn new(input_name: Option<String>, output_name: Option<String>) -> Self {
        Self {
            input_name,
            output_name,
        }
    }

    fn find_input(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
        match name {
            Some(search) => {
                let devices = host
                    .input_devices()
                    .map_err(|e| unavailable("enumerating inputs", e))?;
                find_by_name(devices, search, "input")
            }
            None => host
                .default_input_device()
                .ok_or_else(|| PedalboardError::DeviceUnavailable {
                    reason: "no default input device".to_string(),
                }),
        }
    }

    fn find_output(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
        match name {
            Some(search) => {
                let devices = host
                    .output_devices()
                    .map_err(|e| unavailable("enumerating outputs", e))?;
                find_by_name(devices, search, "output")
            }
            None => host
                .default_output_device()
                .ok_or_else(|| PedalboardError::DeviceUnavailable {
                    reason: "no default output device".to_string(),
                }),
        }
    }
}

fn unavailable(context: &str, e: impl std::fmt::Display) -> PedalboardError {
    PedalboardError::DeviceUnavailable {
        reason: format!("{}: {}", context, e),
    }
}

fn find_by_name(
    devices: impl Iterator<Item = cpal::Device>,
    search: &str,
    direction: &str,
) -> Result<cpal::Device> {
    let search_lower = search.to_lowercase();
    for device in devices {
        if let Ok(name) = device.name() {
            if name.to_lowercase().contains(&search_lower) {
                return Ok(device);
            }
        }
    }
    Err(PedalboardError::DeviceUnavailable {
        reason: format!("no {} device matching '{}'", direction, search),
    })
}

/// Map a cpal stream error to a fault; a vanished device is fatal
fn stream_fault(err: cpal::StreamError) -> DeviceFault {
    let fatal = matches!(err, cpal::StreamError::DeviceNotAvailable);
    DeviceFault {
        message: err.to_string(),
        fatal,
    }
}

/// Collects driver buffers of any length into exact blocks
struct InputChunker {
    block: Vec<f32>,
    filled: usize,
    capture: CaptureCallback,
}

impl InputChunker {
    fn push(&mut self, mut data: impl Iterator<Item = f32>) {
        loop {
            while self.filled < self.block.len() {
                match data.next() {
                    Some(sample) => {
                        self.block[self.filled] = sample;
                        self.filled += 1;
                    }
                    None => return,
                }
            }
            (self.capture)(&self.block);
            self.filled = 0;
        }
    }
}

/// Serves driver requests of any length from whole delivered blocks
struct OutputChunker {
    block: Vec<f32>,
    read: usize,
    deliver: DeliveryCallback,
}

impl OutputChunker {
    fn next_sample(&mut self) -> f32 {
        if self.read >= self.block.len() {
            self.block.fill(0.0);
            (self.deliver)(&mut self.block);
            self.read = 0;
        }
        let sample = self.block[self.read];
        self.read += 1;
        sample
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut chunker: InputChunker,
    on_fault: Arc<Mutex<FaultCallback>>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                chunker.push(data.iter().map(|s| cpal::Sample::to_sample::<f32>(*s)));
            },
            move |err| {
                let mut report = on_fault.lock();
                (*report)(stream_fault(err));
            },
            None,
        )
        .map_err(|e| unavailable("building input stream", e))
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut chunker: OutputChunker,
    on_fault: Arc<Mutex<FaultCallback>>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for out in data.iter_mut() {
                    *out = T::from_sample(chunker.next_sample());
                }
            },
            move |err| {
                let mut report = on_fault.lock();
                (*report)(stream_fault(err));
            },
            None,
        )
        .map_err(|e| unavailable("building output stream", e))
}

impl AudioDevice for CpalDevice {
    fn name(&self) -> String {
        format!(
            "cpal (input: {}, output: {})",
            self.input_name.as_deref().unwrap_or("default"),
            self.output_name.as_deref().unwrap_or("default")
        )
    }

    fn open(
        &mut self,
        config: &DeviceConfig,
        capture: CaptureCallback,
        deliver: DeliveryCallback,
        on_fault: FaultCallback,
    ) -> Result<Box<dyn DeviceSession>> {
        config.validate()?;
        let host = cpal::default_host();
        let input = Self::find_input(&host, self.input_name.as_deref())?;
        let output = Self::find_output(&host, self.output_name.as_deref())?;

        let stream_config = cpal::StreamConfig {
            channels: config.channel_count as u16,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(config.block_size as u32),
        };

        let input_format = input
            .default_input_config()
            .map_err(|e| unavailable("querying input format", e))?
            .sample_format();
        let output_format = output
            .default_output_config()
            .map_err(|e| unavailable("querying output format", e))?
            .sample_format();

        let block_len = config.samples_per_block();
        let in_chunker = InputChunker {
            block: vec![0.0; block_len],
            filled: 0,
            capture,
        };
        let out_chunker = OutputChunker {
            block: vec![0.0; block_len],
            read: block_len,
            deliver,
        };

        // Both streams report into the same callback
        let on_fault = Arc::new(Mutex::new(on_fault));

        let input_stream = match input_format {
            cpal::SampleFormat::F32 => {
                build_input::<f32>(&input, &stream_config, in_chunker, on_fault.clone())?
            }
            cpal::SampleFormat::I16 => {
                build_input::<i16>(&input, &stream_config, in_chunker, on_fault.clone())?
            }
            cpal::SampleFormat::U16 => {
                build_input::<u16>(&input, &stream_config, in_chunker, on_fault.clone())?
            }
            other => {
                return Err(PedalboardError::DeviceUnavailable {
                    reason: format!("unsupported input sample format {:?}", other),
                })
            }
        };

        let output_stream = match output_format {
            cpal::SampleFormat::F32 => {
                build_output::<f32>(&output, &stream_config, out_chunker, on_fault)?
            }
            cpal::SampleFormat::I16 => {
                build_output::<i16>(&output, &stream_config, out_chunker, on_fault)?
            }
            cpal::SampleFormat::U16 => {
                build_output::<u16>(&output, &stream_config, out_chunker, on_fault)?
            }
            other => {
                return Err(PedalboardError::DeviceUnavailable {
                    reason: format!("unsupported output sample format {:?}", other),
                })
            }
        };

        input_stream
            .play()
            .map_err(|e| unavailable("starting input stream", e))?;
        output_stream
            .play()
            .map_err(|e| unavailable("starting output stream", e))?;

        info!(
            input = input.name().unwrap_or_default(),
            output = output.name().unwrap_or_default(),
            sample_rate = config.sample_rate,
            block_size = config.block_size,
            channels = config.channel_count,
            "audio devices opened"
        );

        Ok(Box::new(CpalSession {
            _input: input_stream,
            _output: output_stream,
        }))
    }
}

/// Keeps both cpal streams alive; dropping them stops the callbacks
struct CpalSession {
    _input: cpal::Stream,
    _output: cpal::Stream,
}

impl DeviceSession for CpalSession {
    fn close(self: Box<Self>) {
        let _ = self._input.pause();
        let _ = self._output.pause();
    }
}

// ============================================================================
// Virtual Device
// ============================================================================

struct VirtualCallbacks {
    config: DeviceConfig,
    capture: CaptureCallback,
    deliver: DeliveryCallback,
    on_fault: FaultCallback,
}

#[derive(Default)]
struct VirtualShared {
    callbacks: Mutex<Option<VirtualCallbacks>>,
    opens: Mutex<usize>,
}

/// In-memory device driven through a `VirtualDeviceHandle`
///
/// # Example
/// ```
/// use pedalboard::engine::VirtualDevice;
///
/// let device = VirtualDevice::new();
/// let handle = device.handle();
/// assert!(!handle.is_open());
/// ```
#[derive(Clone, Default)]
pub struct VirtualDevice {
    shared: Arc<VirtualShared>,
    unavailable: bool,
}

impl VirtualDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device whose `open` always fails with `DeviceUnavailable`
    pub fn unavailable() -> Self {
        Self {
            shared: Arc::default(),
            unavailable: true,
        }
    }

    /// Handle for driving the callbacks from the caller's thread
    pub fn handle(&self) -> VirtualDeviceHandle {
        VirtualDeviceHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl AudioDevice for VirtualDevice {
    fn name(&self) -> String {
        "virtual".to_string()
    }

    fn open(
        &mut self,
        config: &DeviceConfig,
        capture: CaptureCallback,
        deliver: DeliveryCallback,
        on_fault: FaultCallback,
    ) -> Result<Box<dyn DeviceSession>> {
        if self.unavailable {
            return Err(PedalboardError::DeviceUnavailable {
                reason: "virtual device configured as unavailable".to_string(),
            });
        }
        config.validate()?;

        *self.shared.callbacks.lock() = Some(VirtualCallbacks {
            config: *config,
            capture,
            deliver,
            on_fault,
        });
        *self.shared.opens.lock() += 1;

        Ok(Box::new(VirtualSession {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct VirtualSession {
    shared: Arc<VirtualShared>,
}

impl DeviceSession for VirtualSession {
    fn close(self: Box<Self>) {
        self.shared.callbacks.lock().take();
    }
}

/// Caller-side control of a `VirtualDevice`
#[derive(Clone)]
pub struct VirtualDeviceHandle {
    shared: Arc<VirtualShared>,
}

impl VirtualDeviceHandle {
    /// Whether a session is currently open
    pub fn is_open(&self) -> bool {
        self.shared.callbacks.lock().is_some()
    }

    /// Number of times the device has been opened
    pub fn open_count(&self) -> usize {
        *self.shared.opens.lock()
    }

    /// Format of the open session
    pub fn config(&self) -> Option<DeviceConfig> {
        self.shared.callbacks.lock().as_ref().map(|cb| cb.config)
    }

    /// Invoke the capture callback with one interleaved block
    ///
    /// Returns false when no session is open.
    pub fn capture(&self, interleaved: &[f32]) -> bool {
        match self.shared.callbacks.lock().as_mut() {
            Some(cb) => {
                (cb.capture)(interleaved);
                true
            }
            None => false,
        }
    }

    /// Invoke the delivery callback and return the interleaved block
    ///
    /// Returns an empty vector when no session is open.
    pub fn deliver(&self) -> Vec<f32> {
        match self.shared.callbacks.lock().as_mut() {
            Some(cb) => {
                let mut block = vec![0.0; cb.config.samples_per_block()];
                (cb.deliver)(&mut block);
                block
            }
            None => Vec::new(),
        }
    }

    /// Report a driver fault
    pub fn fail(&self, message: &str, fatal: bool) -> bool {
        match self.shared.callbacks.lock().as_mut() {
            Some(cb) => {
                (cb.on_fault)(DeviceFault {
                    message: message.to_string(),
                    fatal,
                });
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
