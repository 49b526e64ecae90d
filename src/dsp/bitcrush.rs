//! Bitcrush effect
//!
//! Reduces amplitude resolution by quantizing each sample to `bit_depth`
//! bits.

use super::effect::Effect;
use super::params::Parameters;
use crate::engine::buffer::AudioBuffer;

/// Quantizes samples onto a grid of `2^(bit_depth - 1)` steps per unit
#[derive(Debug, Clone)]
pub struct Bitcrush {
    scale: f32,
}

impl Default for Bitcrush {
    fn default() -> Self {
        Self {
            scale: quantization_scale(8.0),
        }
    }
}

fn quantization_scale(bit_depth: f32) -> f32 {
    2.0_f32.powf(bit_depth - 1.0)
}

impl Effect for Bitcrush {
    fn configure(&mut self, params: &Parameters) {
        self.scale = quantization_scale(params.value("bit_depth"));
    }

    fn prepare(&mut self, _sample_rate: u32, _channels: usize) {}

    fn process(&mut self, buffer: &mut AudioBuffer) {
        let scale = self.scale;
        for channel in &mut buffer.samples {
            for sample in channel.iter_mut() {
                *sample = (*sample * scale).round() / scale;
            }
        }
    }

    fn reset(&mut self) {}
}
