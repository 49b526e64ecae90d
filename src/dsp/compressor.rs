//! Compressor effect
//!
//! Feed-forward hard-knee compressor. Each channel runs its own peak
//! envelope follower with one-pole attack/release ballistics; the gain is
//! computed from the smoothed envelope.

use super::effect::Effect;
use super::params::Parameters;
use crate::engine::buffer::{db_to_linear, AudioBuffer, DEFAULT_SAMPLE_RATE};

// ============================================================================
// Compressor
// ============================================================================

/// Dynamic range compressor
///
/// Above the threshold, every `ratio` dB of input rise yields 1 dB of output
/// rise. Below the threshold the signal passes unchanged.
#[derive(Debug, Clone)]
pub struct Compressor {
    threshold_db: f32,
    ratio: f32,
    attack_ms: f32,
    release_ms: f32,
    sample_rate: u32,
    /// Linear threshold
    threshold: f32,
    /// 1 / threshold, cached for the gain computer
    threshold_inverse: f32,
    /// 1 / ratio - 1
    gain_exponent: f32,
    attack_coeff: f32,
    release_coeff: f32,
    /// Per-channel envelope
    envelope: Vec<f32>,
}

impl Default for Compressor {
    fn default() -> Self {
        let mut comp = Self {
            threshold_db: 0.0,
            ratio: 1.0,
            attack_ms: 1.0,
            release_ms: 100.0,
            sample_rate: DEFAULT_SAMPLE_RATE,
            threshold: 1.0,
            threshold_inverse: 1.0,
            gain_exponent: 0.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope: vec![0.0],
        };
        comp.update_coefficients();
        comp
    }
}

impl Compressor {
    /// Recompute the cached gain-computer and ballistics constants
    fn update_coefficients(&mut self) {
        self.threshold = db_to_linear(self.threshold_db);
        self.threshold_inverse = 1.0 / self.threshold;
        self.gain_exponent = 1.0 / self.ratio - 1.0;

        // coeff = exp(-1 / time_in_samples)
        let attack_samples = (self.attack_ms / 1000.0) * self.sample_rate as f32;
        let release_samples = (self.release_ms / 1000.0) * self.sample_rate as f32;

        self.attack_coeff = if attack_samples > 0.0 {
            (-1.0 / attack_samples).exp()
        } else {
            0.0
        };
        self.release_coeff = if release_samples > 0.0 {
            (-1.0 / release_samples).exp()
        } else {
            0.0
        };
    }

    /// Linear gain for a given envelope level
    #[inline]
    fn gain_for(&self, envelope: f32) -> f32 {
        if envelope <= self.threshold {
            1.0
        } else {
            (envelope * self.threshold_inverse).powf(self.gain_exponent)
        }
    }
}

impl Effect for Compressor {
    fn configure(&mut self, params: &Parameters) {
        self.threshold_db = params.value("threshold_db");
        self.ratio = params.value("ratio").max(1.0);
        self.attack_ms = params.value("attack_ms");
        self.release_ms = params.value("release_ms");
        self.update_coefficients();
    }

    fn prepare(&mut self, sample_rate: u32, channels: usize) {
        self.sample_rate = sample_rate;
        self.envelope = vec![0.0; channels.max(1)];
        self.update_coefficients();
    }

    fn process(&mut self, buffer: &mut AudioBuffer) {
        for (ch, channel) in buffer.samples.iter_mut().enumerate() {
            let Some(mut env) = self.envelope.get(ch).copied() else {
                continue;
            };
            for sample in channel.iter_mut() {
                let level = sample.abs();
                let coeff = if level > env {
                    self.attack_coeff
                } else {
                    self.release_coeff
                };
                env = coeff * env + (1.0 - coeff) * level;
                *sample *= self.gain_for(env);
            }
            self.envelope[ch] = env;
        }
    }

    fn reset(&mut self) {
        self.envelope.fill(0.0);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::effect::EffectKind;
    use crate::engine::buffer::calculate_peak;

    fn compressor(threshold_db: f32, ratio: f32) -> Compressor {
        let mut params = Parameters::defaults(EffectKind::Compressor.schema());
        params.set("compressor", "threshold_db", threshold_db).unwrap();
        params.set("compressor", "ratio", ratio).unwrap();
        let mut comp = Compressor::default();
        comp.prepare(44100, 1);
        comp.configure(&params);
        comp
    }

    fn constant(level: f32, len: usize) -> AudioBuffer {
        AudioBuffer::from_channels(vec![vec![level; len]], 44100).unwrap()
    }

    #[test]
    fn test_below_threshold_passes() {
        let mut comp = compressor(-6.0, 4.0);
        let mut buffer = constant(0.1, 2048);
        comp.process(&mut buffer);
        for &s in buffer.channel(0) {
            assert!((s - 0.1).abs() < 1e-6);
        }
    }

    #[test]
    fn test_above_threshold_reduces() {
        let mut comp = compressor(-20.0, 4.0);
        let mut buffer = constant(0.9, 44100);
        comp.process(&mut buffer);

        // Settled: 0.9 is ~19.1 dB over -20 dB; 4:1 leaves ~4.8 dB over
        let settled = buffer.channel(0)[44099];
        let expected = db_to_linear(-20.0 + (20.0 * 0.9_f32.log10() + 20.0) / 4.0);
        assert!((settled - expected).abs() < 1e-3, "{} vs {}", settled, expected);
        assert!(calculate_peak(&buffer) <= 0.9);
    }

    #[test]
    fn test_silence_stays_silent() {
        let mut comp = compressor(-30.0, 6.0);
        let mut buffer = AudioBuffer::silence(512, 1, 44100);
        comp.process(&mut buffer);
        assert!(buffer.is_silent());
    }

    #[test]
    fn test_prepare_updates_coefficients() {
        let mut comp = compressor(-20.0, 4.0);
        let attack_44k = comp.attack_coeff;
        comp.prepare(96000, 2);
        assert_ne!(comp.attack_coeff, attack_44k);
        assert_eq!(comp.envelope.len(), 2);
    }

    #[test]
    fn test_reset_clears_envelope() {
        let mut comp = compressor(-20.0, 4.0);
        let mut buffer = constant(0.9, 256);
        comp.process(&mut buffer);
        assert!(comp.envelope[0] > 0.0);
        comp.reset();
        assert_eq!(comp.envelope[0], 0.0);
    }
}
