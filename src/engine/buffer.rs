//! Audio Buffer Management
//!
//! `AudioBuffer` is the block type that flows through the effect chain, both
//! for live streaming (one device block at a time) and offline rendering
//! (a whole file, split into fixed-size sub-blocks).

use crate::error::{PedalboardError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default sample rate for streaming and rendering
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Default frames per block
pub const DEFAULT_BLOCK_SIZE: usize = 512;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Calculate the RMS level of an audio buffer in dB
///
/// Returns -f32::INFINITY for empty or silent buffers.
pub fn calculate_rms(buffer: &AudioBuffer) -> f32 {
    let total_samples = buffer.num_channels() * buffer.num_samples();
    if total_samples == 0 {
        return f32::NEG_INFINITY;
    }

    let sum_squares: f64 = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();

    let rms = (sum_squares / total_samples as f64).sqrt() as f32;
    linear_to_db(rms)
}

/// Calculate the peak level of an audio buffer in dB
pub fn calculate_peak(buffer: &AudioBuffer) -> f32 {
    let peak = buffer
        .samples
        .iter()
        .flat_map(|channel| channel.iter())
        .map(|&s| s.abs())
        .fold(0.0_f32, f32::max);

    linear_to_db(peak)
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// A block of audio: non-interleaved 32-bit float samples
///
/// Samples are normalized to [-1.0, 1.0]. Each channel is a separate
/// `Vec<f32>`; all channels have the same length.
///
/// # Example
/// ```
/// use pedalboard::engine::AudioBuffer;
///
/// let block = AudioBuffer::silence(512, 2, 48000);
/// assert_eq!(block.num_channels(), 2);
/// assert_eq!(block.num_samples(), 512);
/// assert!(block.is_silent());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a zeroed buffer with the given shape
    pub fn silence(num_samples: usize, num_channels: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; num_channels],
            sample_rate,
        }
    }

    /// Create a buffer from per-channel sample vectors
    ///
    /// Fails if the channels differ in length or there are no channels.
    pub fn from_channels(samples: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if samples.is_empty() {
            return Err(PedalboardError::InvalidAudio {
                reason: "buffer must have at least one channel".to_string(),
                source: None,
            });
        }
        let len = samples[0].len();
        if samples.iter().any(|ch| ch.len() != len) {
            return Err(PedalboardError::InvalidAudio {
                reason: "all channels must have the same length".to_string(),
                source: None,
            });
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Create an audio buffer from interleaved sample data
    ///
    /// # Arguments
    /// * `interleaved` - Interleaved sample data (L, R, L, R, ... for stereo)
    /// * `num_channels` - Number of interleaved channels
    /// * `sample_rate` - Sample rate in Hz
    pub fn from_interleaved(
        interleaved: &[f32],
        num_channels: usize,
        sample_rate: u32,
    ) -> Result<Self> {
        if num_channels == 0 {
            return Err(PedalboardError::InvalidAudio {
                reason: "channel count must be greater than zero".to_string(),
                source: None,
            });
        }

        if interleaved.len() % num_channels != 0 {
            return Err(PedalboardError::InvalidAudio {
                reason: format!(
                    "Interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    num_channels
                ),
                source: None,
            });
        }

        let num_samples = interleaved.len() / num_channels;
        let mut samples = vec![Vec::with_capacity(num_samples); num_channels];

        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Convert the buffer to interleaved format
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut interleaved = vec![0.0; self.num_channels() * self.num_samples()];
        self.write_interleaved(&mut interleaved);
        interleaved
    }

    /// Write samples into an interleaved slice
    ///
    /// Writes `min(out.len() / channels, len)` frames and returns the number
    /// of frames written. Does not allocate.
    pub fn write_interleaved(&self, out: &mut [f32]) -> usize {
        let num_channels = self.num_channels();
        if num_channels == 0 {
            return 0;
        }
        let frames = (out.len() / num_channels).min(self.num_samples());
        for (i, frame) in out.chunks_exact_mut(num_channels).take(frames).enumerate() {
            for (ch, slot) in frame.iter_mut().enumerate() {
                *slot = self.samples[ch][i];
            }
        }
        frames
    }

    /// Get the number of channels
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of samples per channel
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer is empty (no samples)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_samples() == 0
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.num_samples() as f64 / self.sample_rate as f64
    }

    /// True when both buffers have the same channel count and length
    #[inline]
    pub fn same_shape(&self, other: &AudioBuffer) -> bool {
        self.num_channels() == other.num_channels() && self.num_samples() == other.num_samples()
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Get mutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index]
    }

    /// Set a sample at the specified channel and index
    ///
    /// Returns false if indices are out of bounds.
    #[inline]
    pub fn set_sample(&mut self, channel: usize, index: usize, value: f32) -> bool {
        if let Some(ch) = self.samples.get_mut(channel) {
            if let Some(sample) = ch.get_mut(index) {
                *sample = value;
                return true;
            }
        }
        false
    }

    /// Check if every sample is exactly zero
    pub fn is_silent(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|&s| s == 0.0)
    }

    /// Check if all samples are finite (not NaN or Infinity)
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite())
    }

    /// Zero every sample in place
    pub fn fill_silence(&mut self) {
        for channel in &mut self.samples {
            channel.fill(0.0);
        }
    }

    /// Split into consecutive blocks of `block_size` frames
    ///
    /// The final block is shorter when the length is not a multiple of
    /// `block_size`. A `block_size` of zero is treated as one.
    pub fn split_blocks(&self, block_size: usize) -> Vec<AudioBuffer> {
        let block_size = block_size.max(1);
        let len = self.num_samples();
        let mut blocks = Vec::with_capacity(len.div_ceil(block_size));
        let mut start = 0;
        while start < len {
            let end = (start + block_size).min(len);
            blocks.push(AudioBuffer {
                samples: self
                    .samples
                    .iter()
                    .map(|ch| ch[start..end].to_vec())
                    .collect(),
                sample_rate: self.sample_rate,
            });
            start = end;
        }
        blocks
    }

    /// Join blocks back into one buffer
    ///
    /// Fails if the blocks disagree on channel count.
    pub fn concat(blocks: &[AudioBuffer], sample_rate: u32) -> Result<AudioBuffer> {
        let num_channels = blocks.first().map(|b| b.num_channels()).unwrap_or(0);
        if blocks.iter().any(|b| b.num_channels() != num_channels) {
            return Err(PedalboardError::InvalidAudio {
                reason: "cannot join blocks with different channel counts".to_string(),
                source: None,
            });
        }
        let total: usize = blocks.iter().map(|b| b.num_samples()).sum();
        let mut samples = vec![Vec::with_capacity(total); num_channels];
        for block in blocks {
            for (out, ch) in samples.iter_mut().zip(&block.samples) {
                out.extend_from_slice(ch);
            }
        }
        Ok(AudioBuffer {
            samples,
            sample_rate,
        })
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::silence(0, 1, DEFAULT_SAMPLE_RATE)
    }
}

/// Generate a mono sine test tone
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> AudioBuffer {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let mut buffer = AudioBuffer::silence(num_samples, 1, sample_rate);

    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;

    for (i, sample) in buffer.samples[0].iter_mut().enumerate() {
        *sample = (angular_freq * i as f32).sin();
    }

    buffer
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_to_linear() {
        assert!((db_to_linear(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_linear(-6.0206) - 0.5).abs() < 1e-4);
        assert!((db_to_linear(-20.0) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_linear_to_db() {
        assert!((linear_to_db(1.0) - 0.0).abs() < 1e-6);
        assert!((linear_to_db(0.1) - (-20.0)).abs() < 1e-4);
        assert!(linear_to_db(0.0).is_infinite() && linear_to_db(0.0).is_sign_negative());
    }

    #[test]
    fn test_calculate_rms_unity() {
        let buffer = AudioBuffer::from_channels(vec![vec![1.0; 1000]], 44100).unwrap();
        assert!(calculate_rms(&buffer).abs() < 0.01);
    }

    #[test]
    fn test_calculate_peak_negative() {
        let buffer = AudioBuffer::from_channels(vec![vec![0.1, -0.5, 0.25]], 44100).unwrap();
        assert!((calculate_peak(&buffer) - linear_to_db(0.5)).abs() < 1e-5);
    }

    #[test]
    fn test_from_interleaved_stereo() {
        let buffer = AudioBuffer::from_interleaved(&[1.0, -1.0, 0.5, -0.5], 2, 48000).unwrap();
        assert_eq!(buffer.num_channels(), 2);
        assert_eq!(buffer.channel(0), &[1.0, 0.5]);
        assert_eq!(buffer.channel(1), &[-1.0, -0.5]);
        assert_eq!(buffer.to_interleaved(), vec![1.0, -1.0, 0.5, -0.5]);
    }

    #[test]
    fn test_from_interleaved_invalid() {
        assert!(AudioBuffer::from_interleaved(&[1.0, 2.0, 3.0], 2, 48000).is_err());
        assert!(AudioBuffer::from_interleaved(&[1.0], 0, 48000).is_err());
    }

    #[test]
    fn test_from_channels_ragged() {
        let result = AudioBuffer::from_channels(vec![vec![0.0; 4], vec![0.0; 3]], 48000);
        assert!(result.is_err());
    }

    #[test]
    fn test_write_interleaved_short_output() {
        let buffer = AudioBuffer::from_interleaved(&[1.0, 2.0, 3.0, 4.0], 2, 48000).unwrap();
        let mut out = [0.0; 2];
        assert_eq!(buffer.write_interleaved(&mut out), 1);
        assert_eq!(out, [1.0, 2.0]);
    }

    #[test]
    fn test_split_and_concat() {
        let tone = generate_test_tone(440.0, 0.1, 44100);
        let blocks = tone.split_blocks(512);
        assert_eq!(blocks.len(), tone.num_samples().div_ceil(512));
        assert_eq!(blocks[0].num_samples(), 512);
        assert_eq!(
            blocks.last().unwrap().num_samples(),
            tone.num_samples() - 512 * (blocks.len() - 1)
        );

        let joined = AudioBuffer::concat(&blocks, 44100).unwrap();
        assert_eq!(joined, tone);
    }

    #[test]
    fn test_silence_and_shape() {
        let mut block = AudioBuffer::silence(64, 2, 48000);
        assert!(block.is_silent());
        block.set_sample(1, 3, 0.5);
        assert!(!block.is_silent());
        assert!(block.same_shape(&AudioBuffer::silence(64, 2, 44100)));
        assert!(!block.same_shape(&AudioBuffer::silence(64, 1, 48000)));
        block.fill_silence();
        assert!(block.is_silent());
    }

    #[test]
    fn test_duration() {
        let block = AudioBuffer::silence(48000, 1, 48000);
        assert!((block.duration_secs() - 1.0).abs() < 1e-9);
    }
}
