//! Distortion effect
//!
//! Symmetric soft clipping: `y = tanh(x * db_to_linear(drive_db))`.

use super::effect::Effect;
use super::params::Parameters;
use crate::engine::buffer::{db_to_linear, AudioBuffer};

/// Hyperbolic tangent waveshaper with input drive
#[derive(Debug, Clone)]
pub struct Distortion {
    drive: f32,
}

impl Default for Distortion {
    fn default() -> Self {
        Self {
            drive: db_to_linear(25.0),
        }
    }
}

impl Effect for Distortion {
    fn configure(&mut self, params: &Parameters) {
        self.drive = db_to_linear(params.value("drive_db"));
    }

    fn prepare(&mut self, _sample_rate: u32, _channels: usize) {}

    fn process(&mut self, buffer: &mut AudioBuffer) {
        for channel in &mut buffer.samples {
            for sample in channel.iter_mut() {
                *sample = (*sample * self.drive).tanh();
            }
        }
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::effect::EffectKind;

    fn distortion_with(drive_db: f32) -> Distortion {
        let mut params = Parameters::defaults(EffectKind::Distortion.schema());
        params.set("distortion", "drive_db", drive_db).unwrap();
        let mut dist = Distortion::default();
        dist.configure(&params);
        dist
    }

    #[test]
    fn test_output_bounded() {
        let mut dist = distortion_with(60.0);
        let mut buffer = AudioBuffer::from_channels(vec![vec![1.0, -1.0, 0.1, 0.0]], 44100).unwrap();
        dist.process(&mut buffer);
        for &s in buffer.channel(0) {
            assert!(s.abs() <= 1.0);
        }
        assert_eq!(buffer.channel(0)[3], 0.0);
    }

    #[test]
    fn test_odd_symmetry() {
        let mut dist = distortion_with(20.0);
        let mut buffer = AudioBuffer::from_channels(vec![vec![0.3, -0.3]], 44100).unwrap();
        dist.process(&mut buffer);
        assert_eq!(buffer.channel(0)[0], -buffer.channel(0)[1]);
    }
}
