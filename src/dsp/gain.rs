//! Gain effect
//!
//! Static volume change in decibels.

use super::effect::Effect;
use super::params::Parameters;
use crate::engine::buffer::{db_to_linear, AudioBuffer};

/// Multiplies every sample by `db_to_linear(gain_db)`
#[derive(Debug, Clone)]
pub struct Gain {
    gain_linear: f32,
}

impl Default for Gain {
    fn default() -> Self {
        Self { gain_linear: 1.0 }
    }
}

impl Effect for Gain {
    fn configure(&mut self, params: &Parameters) {
        self.gain_linear = db_to_linear(params.value("gain_db"));
    }

    fn prepare(&mut self, _sample_rate: u32, _channels: usize) {}

    fn process(&mut self, buffer: &mut AudioBuffer) {
        if self.gain_linear == 1.0 {
            return;
        }
        for channel in &mut buffer.samples {
            for sample in channel.iter_mut() {
                *sample *= self.gain_linear;
            }
        }
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::effect::EffectKind;
    use approx::assert_relative_eq;

    fn gain_with(db: f32) -> Gain {
        let mut params = Parameters::defaults(EffectKind::Gain.schema());
        params.set("gain", "gain_db", db).unwrap();
        let mut gain = Gain::default();
        gain.configure(&params);
        gain
    }

    #[test]
    fn test_unity_gain() {
        let mut gain = gain_with(0.0);
        let mut buffer = AudioBuffer::from_channels(vec![vec![0.5, -0.25]], 44100).unwrap();
        gain.process(&mut buffer);
        assert_eq!(buffer.channel(0), &[0.5, -0.25]);
    }

    #[test]
    fn test_six_db_doubles() {
        let mut gain = gain_with(6.0);
        let mut buffer = AudioBuffer::from_channels(vec![vec![0.25]], 44100).unwrap();
        gain.process(&mut buffer);
        assert_relative_eq!(buffer.channel(0)[0], 0.25 * 1.995_262, epsilon = 1e-4);
    }

    #[test]
    fn test_min_gain_near_silent() {
        let mut gain = gain_with(-96.0);
        let mut buffer = AudioBuffer::from_channels(vec![vec![1.0]], 44100).unwrap();
        gain.process(&mut buffer);
        assert!(buffer.channel(0)[0].abs() < 1e-4);
    }
}
