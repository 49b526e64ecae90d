//! Audio engine module
//!
//! Sample buffers, file codecs, device backends, the real-time stream
//! engine and the offline renderer.

pub mod buffer;
pub mod device;
pub mod io;
pub mod render;
pub mod stream;

pub use buffer::{AudioBuffer, DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE};
pub use device::{
    list_devices, AudioDevice, CpalDevice, DeviceConfig, DeviceFault, DeviceInfo, DeviceSession,
    VirtualDevice, VirtualDeviceHandle,
};
pub use io::{AudioFileCodec, WavCodec};
pub use render::FileRenderer;
pub use stream::{StatsSnapshot, StopReport, StreamEngine, StreamOptions, StreamState};
