//! Audio file I/O
//!
//! The renderer only talks to the `AudioFileCodec` trait. `WavCodec` is the
//! built-in implementation, backed by hound. Files are decoded at their
//! native sample rate and channel count; the chain is prepared to match.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::engine::buffer::AudioBuffer;
use crate::error::{PedalboardError, Result};

/// Decodes files into sample buffers and encodes buffers back to files
pub trait AudioFileCodec: Send + Sync {
    /// Decode a file into a buffer carrying its sample rate and channel count
    fn decode(&self, path: &Path) -> Result<AudioBuffer>;

    /// Encode a buffer into a file at `path`, replacing any existing file
    fn encode(&self, buffer: &AudioBuffer, path: &Path) -> Result<()>;
}

/// WAV codec
///
/// Reads 8/16/24/32-bit integer and 32-bit float WAV. Writes at the
/// configured bit depth (16, 24, or 32 = float).
#[derive(Debug, Clone)]
pub struct WavCodec {
    bit_depth: u16,
}

impl WavCodec {
    /// Create a codec that writes at the given bit depth
    pub fn new(bit_depth: u16) -> Result<Self> {
        match bit_depth {
            16 | 24 | 32 => Ok(Self { bit_depth }),
            _ => Err(PedalboardError::UnsupportedFormat {
                format: format!("{}-bit audio (only 16, 24, 32 supported)", bit_depth),
            }),
        }
    }

    /// Output bit depth
    pub fn bit_depth(&self) -> u16 {
        self.bit_depth
    }
}

impl Default for WavCodec {
    fn default() -> Self {
        Self { bit_depth: 16 }
    }
}

impl AudioFileCodec for WavCodec {
    fn decode(&self, path: &Path) -> Result<AudioBuffer> {
        if !path.exists() {
            return Err(PedalboardError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let reader = WavReader::open(path).map_err(|e| PedalboardError::InvalidAudio {
            reason: format!("Failed to open WAV file: {}", e),
            source: Some(Box::new(e)),
        })?;

        let spec = reader.spec();
        let channels = spec.channels as usize;
        if channels == 0 {
            return Err(PedalboardError::InvalidAudio {
                reason: "WAV header declares zero channels".to_string(),
                source: None,
            });
        }

        let interleaved = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
        AudioBuffer::from_interleaved(&interleaved, channels, spec.sample_rate)
    }

    fn encode(&self, buffer: &AudioBuffer, path: &Path) -> Result<()> {
        let spec = WavSpec {
            channels: buffer.num_channels() as u16,
            sample_rate: buffer.sample_rate,
            bits_per_sample: self.bit_depth,
            sample_format: if self.bit_depth == 32 {
                SampleFormat::Float
            } else {
                SampleFormat::Int
            },
        };

        let mut writer = WavWriter::create(path, spec).map_err(hound_to_io)?;
        let interleaved = buffer.to_interleaved();

        match self.bit_depth {
            16 => {
                for sample in interleaved {
                    let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                    writer.write_sample(scaled).map_err(hound_to_io)?;
                }
            }
            24 => {
                for sample in interleaved {
                    // 24-bit stored as i32 in hound
                    let scaled = (sample * 8388607.0).clamp(-8388608.0, 8388607.0) as i32;
                    writer.write_sample(scaled).map_err(hound_to_io)?;
                }
            }
            _ => {
                for sample in interleaved {
                    writer.write_sample(sample).map_err(hound_to_io)?;
                }
            }
        }

        writer.finalize().map_err(hound_to_io)?;
        Ok(())
    }
}

fn hound_to_io(e: hound::Error) -> PedalboardError {
    match e {
        hound::Error::IoError(io) => PedalboardError::Io(io),
        other => PedalboardError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            other.to_string(),
        )),
    }
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let invalid = |bits: &str, e: hound::Error| PedalboardError::InvalidAudio {
        reason: format!("Failed to read {} samples: {}", bits, e),
        source: Some(Box::new(e)),
    };

    match sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|e| invalid("float", e)),
        SampleFormat::Int => match bits_per_sample {
            8 => reader
                .samples::<i8>()
                .map(|s| s.map(|v| v as f32 / 128.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| invalid("8-bit", e)),
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / 32768.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| invalid("16-bit", e)),
            24 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 8388608.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| invalid("24-bit", e)),
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 2147483648.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| invalid("32-bit int", e)),
            _ => Err(PedalboardError::UnsupportedFormat {
                format: format!("{}-bit integer audio", bits_per_sample),
            }),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::generate_test_tone;
    use tempfile::tempdir;

    #[test]
    fn test_unsupported_bit_depth() {
        assert!(WavCodec::new(12).is_err());
        assert_eq!(WavCodec::new(24).unwrap().bit_depth(), 24);
    }

    #[test]
    fn test_round_trip_16bit_mono() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let tone = generate_test_tone(440.0, 0.25, 44100);

        let codec = WavCodec::default();
        codec.encode(&tone, &path).unwrap();
        let decoded = codec.decode(&path).unwrap();

        assert_eq!(decoded.sample_rate, 44100);
        assert_eq!(decoded.num_channels(), 1);
        assert_eq!(decoded.num_samples(), tone.num_samples());
        for (a, b) in tone.channel(0).iter().zip(decoded.channel(0)) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_round_trip_float_stereo() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let buffer =
            AudioBuffer::from_interleaved(&[0.25, -0.25, 0.5, -0.5, 0.75, -0.75], 2, 48000)
                .unwrap();

        let codec = WavCodec::new(32).unwrap();
        codec.encode(&buffer, &path).unwrap();
        let decoded = codec.decode(&path).unwrap();

        assert_eq!(decoded, buffer);
    }

    #[test]
    fn test_decode_missing_file() {
        let codec = WavCodec::default();
        let err = codec.decode(Path::new("/nonexistent/input.wav")).unwrap_err();
        assert_eq!(err.error_code(), "FILE_NOT_FOUND");
    }

    #[test]
    fn test_decode_garbage_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"definitely not RIFF").unwrap();

        let err = WavCodec::default().decode(&path).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_AUDIO");
    }
}
