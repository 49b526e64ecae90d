//! Runtime configuration
//!
//! Loaded from a JSON file; every field is optional in the file and falls
//! back to its default. Command-line flags are applied on top by the CLI.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::buffer::{DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE};
use crate::engine::device::DeviceConfig;
use crate::engine::io::WavCodec;
use crate::engine::render::FileRenderer;
use crate::engine::stream::{StreamOptions, DEFAULT_QUEUE_CAPACITY};
use crate::error::{PedalboardError, Result};

/// Pedalboard settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PedalboardConfig {
    /// Stream sample rate in Hz
    pub sample_rate: u32,
    /// Stream block size in frames
    pub block_size: usize,
    /// Stream channel count
    pub channels: usize,
    /// Capacity of each hand-off queue, in blocks
    pub queue_capacity: usize,
    /// Processing thread poll interval
    pub poll_interval_ms: u64,
    /// Bound on waiting for the processing thread at stop
    pub stop_timeout_ms: u64,
    /// Sub-block size for offline renders
    pub render_block_size: usize,
    /// Input device name filter (host default if unset)
    pub input_device: Option<String>,
    /// Output device name filter (host default if unset)
    pub output_device: Option<String>,
    /// Bit depth of rendered WAV files (16, 24 or 32)
    pub export_bit_depth: u16,
}

impl Default for PedalboardConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            channels: 1,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_interval_ms: 50,
            stop_timeout_ms: 1000,
            render_block_size: DEFAULT_BLOCK_SIZE,
            input_device: None,
            output_device: None,
            export_bit_depth: 16,
        }
    }
}

impl PedalboardConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PedalboardError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let content = fs::read_to_string(path)?;
        let config: PedalboardConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject values no stream or render could run with
    pub fn validate(&self) -> Result<()> {
        self.device_config().validate()?;
        let positive = [
            ("queue_capacity", self.queue_capacity as u64),
            ("poll_interval_ms", self.poll_interval_ms),
            ("stop_timeout_ms", self.stop_timeout_ms),
            ("render_block_size", self.render_block_size as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(PedalboardError::InvalidConfig {
                    reason: format!("{} must be greater than 0", name),
                });
            }
        }
        WavCodec::new(self.export_bit_depth)?;
        Ok(())
    }

    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig::new(self.sample_rate, self.block_size, self.channels)
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            queue_capacity: self.queue_capacity,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
        }
    }

    pub fn renderer(&self) -> Result<FileRenderer> {
        FileRenderer::new(self.render_block_size)
    }

    pub fn codec(&self) -> Result<WavCodec> {
        WavCodec::new(self.export_bit_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = PedalboardConfig::default();
        config.validate().unwrap();
        assert_eq!(config.device_config(), DeviceConfig::new(44100, 512, 1));
        assert_eq!(config.stream_options(), StreamOptions::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pedalboard.json");
        fs::write(&path, r#"{"sample_rate": 48000, "channels": 2}"#).unwrap();

        let config = PedalboardConfig::load(&path).unwrap();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.channels, 2);
        assert_eq!(config.block_size, 512);
        assert_eq!(config.export_bit_depth, 16);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = PedalboardConfig {
            block_size: 0,
            ..PedalboardConfig::default()
        };
        assert_eq!(config.validate().unwrap_err().error_code(), "INVALID_CONFIG");

        let config = PedalboardConfig {
            export_bit_depth: 12,
            ..PedalboardConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = PedalboardConfig {
            output_device: Some("USB".to_string()),
            ..PedalboardConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(PedalboardConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        let err = PedalboardConfig::load(Path::new("/nonexistent/pedalboard.json")).unwrap_err();
        assert_eq!(err.error_code(), "FILE_NOT_FOUND");
    }
}
