//! Reverb effect
//!
//! Freeverb: eight parallel damped comb filters followed by four series
//! allpass diffusers per channel. Odd channels use slightly longer delay
//! lines so stereo pairs decorrelate.

use super::effect::Effect;
use super::params::Parameters;
use crate::engine::buffer::{AudioBuffer, DEFAULT_SAMPLE_RATE};

// ============================================================================
// Freeverb Constants
// ============================================================================

/// Reference sample rate for the tuning tables
const REFERENCE_SAMPLE_RATE: f32 = 44100.0;

/// Comb filter delays at 44100 Hz
const COMB_DELAYS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// Allpass filter delays at 44100 Hz
const ALLPASS_DELAYS: [usize; 4] = [556, 441, 341, 225];

/// Extra delay for odd channels
const STEREO_SPREAD: usize = 23;

const ALLPASS_FEEDBACK: f32 = 0.5;
const INPUT_GAIN: f32 = 0.015;
const ROOM_SCALE: f32 = 0.28;
const ROOM_OFFSET: f32 = 0.7;
const DAMP_SCALE: f32 = 0.4;
const WET_SCALE: f32 = 3.0;
const DRY_SCALE: f32 = 2.0;

// ============================================================================
// Filter Components
// ============================================================================

/// Low-pass feedback comb filter
#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    index: usize,
    filter_store: f32,
}

impl CombFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
            filter_store: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let output = self.buffer[self.index];
        self.filter_store = output * (1.0 - damp) + self.filter_store * damp;
        self.buffer[self.index] = input + self.filter_store * feedback;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
        self.filter_store = 0.0;
    }
}

/// Schroeder allpass diffuser
#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f32>,
    index: usize,
}

impl AllpassFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.index];
        let output = delayed - input;
        self.buffer[self.index] = input + delayed * ALLPASS_FEEDBACK;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
    }
}

/// Comb bank plus diffusers for one channel
#[derive(Debug, Clone)]
struct Tank {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassFilter>,
}

impl Tank {
    fn new(sample_rate: u32, spread: usize) -> Self {
        let scale = sample_rate as f32 / REFERENCE_SAMPLE_RATE;
        let scaled = |samples: usize| ((samples + spread) as f32 * scale).round() as usize;
        Self {
            combs: COMB_DELAYS.iter().map(|&d| CombFilter::new(scaled(d))).collect(),
            allpasses: ALLPASS_DELAYS
                .iter()
                .map(|&d| AllpassFilter::new(scaled(d)))
                .collect(),
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let mut out = 0.0;
        for comb in &mut self.combs {
            out += comb.process(input, feedback, damp);
        }
        for allpass in &mut self.allpasses {
            out = allpass.process(out);
        }
        out
    }

    fn clear(&mut self) {
        self.combs.iter_mut().for_each(CombFilter::clear);
        self.allpasses.iter_mut().for_each(AllpassFilter::clear);
    }
}

// ============================================================================
// Reverb
// ============================================================================

/// Freeverb room reverb
///
/// Channels are processed in pairs (0/1, 2/3, ...). A pair shares a summed
/// input and cross-feeds its wet outputs according to `width`; a trailing
/// unpaired channel is processed on its own.
#[derive(Debug, Clone)]
pub struct Reverb {
    feedback: f32,
    damp: f32,
    wet1: f32,
    wet2: f32,
    dry: f32,
    tanks: Vec<Tank>,
}

impl Default for Reverb {
    fn default() -> Self {
        let mut reverb = Self {
            feedback: 0.5 * ROOM_SCALE + ROOM_OFFSET,
            damp: 0.5 * DAMP_SCALE,
            wet1: 0.33 * WET_SCALE,
            wet2: 0.0,
            dry: 0.4 * DRY_SCALE,
            tanks: Vec::new(),
        };
        reverb.prepare(DEFAULT_SAMPLE_RATE, 1);
        reverb
    }
}

impl Effect for Reverb {
    fn configure(&mut self, params: &Parameters) {
        let wet = params.value("wet_level") * WET_SCALE;
        let width = params.value("width");
        self.feedback = params.value("room_size") * ROOM_SCALE + ROOM_OFFSET;
        self.damp = params.value("damping") * DAMP_SCALE;
        self.wet1 = 0.5 * wet * (1.0 + width);
        self.wet2 = 0.5 * wet * (1.0 - width);
        self.dry = params.value("dry_level") * DRY_SCALE;
    }

    fn prepare(&mut self, sample_rate: u32, channels: usize) {
        self.tanks = (0..channels.max(1))
            .map(|ch| Tank::new(sample_rate, if ch % 2 == 1 { STEREO_SPREAD } else { 0 }))
            .collect();
    }

    fn process(&mut self, buffer: &mut AudioBuffer) {
        let (feedback, damp) = (self.feedback, self.damp);
        let (wet1, wet2, dry) = (self.wet1, self.wet2, self.dry);
        let num_samples = buffer.num_samples();

        for (pair, tanks) in buffer
            .samples
            .chunks_mut(2)
            .zip(self.tanks.chunks_mut(2))
        {
            match (pair, tanks) {
                ([left, right], [tank_l, tank_r]) => {
                    for i in 0..num_samples {
                        let (l, r) = (left[i], right[i]);
                        let input = (l + r) * INPUT_GAIN;
                        let out_l = tank_l.process(input, feedback, damp);
                        let out_r = tank_r.process(input, feedback, damp);
                        left[i] = out_l * wet1 + out_r * wet2 + l * dry;
                        right[i] = out_r * wet1 + out_l * wet2 + r * dry;
                    }
                }
                ([mono], [tank, ..]) => {
                    for sample in mono.iter_mut() {
                        let out = tank.process(*sample * INPUT_GAIN, feedback, damp);
                        *sample = out * wet1 + *sample * dry;
                    }
                }
                _ => {}
            }
        }
    }

    fn reset(&mut self) {
        self.tanks.iter_mut().for_each(Tank::clear);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::effect::EffectKind;
    use crate::engine::buffer::calculate_rms;

    fn reverb(room_size: f32, wet: f32, dry: f32, channels: usize) -> Reverb {
        let mut params = Parameters::defaults(EffectKind::Reverb.schema());
        params.set("reverb", "room_size", room_size).unwrap();
        params.set("reverb", "wet_level", wet).unwrap();
        params.set("reverb", "dry_level", dry).unwrap();
        let mut reverb = Reverb::default();
        reverb.prepare(44100, channels);
        reverb.configure(&params);
        reverb
    }

    #[test]
    fn test_impulse_produces_tail() {
        let mut reverb = reverb(0.8, 1.0, 0.0, 1);
        let mut buffer = AudioBuffer::silence(44100, 1, 44100);
        buffer.set_sample(0, 0, 1.0);
        reverb.process(&mut buffer);

        let tail = AudioBuffer::from_channels(vec![buffer.channel(0)[4410..].to_vec()], 44100)
            .unwrap();
        assert!(calculate_rms(&tail) > 0.0);
        assert!(buffer.is_finite());
    }

    #[test]
    fn test_dry_only() {
        let mut reverb = reverb(0.5, 0.0, 0.5, 1);
        let mut buffer = AudioBuffer::from_channels(vec![vec![0.25; 64]], 44100).unwrap();
        reverb.process(&mut buffer);
        for &s in buffer.channel(0) {
            assert!((s - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn test_stereo_channels_decorrelate() {
        let mut reverb = reverb(0.8, 1.0, 0.0, 2);
        let mut buffer = AudioBuffer::silence(8192, 2, 44100);
        buffer.set_sample(0, 0, 1.0);
        buffer.set_sample(1, 0, 1.0);
        reverb.process(&mut buffer);
        assert_ne!(buffer.channel(0), buffer.channel(1));
    }

    #[test]
    fn test_reset_silences_tail() {
        let mut reverb = reverb(0.9, 1.0, 0.0, 1);
        let mut buffer = AudioBuffer::silence(2048, 1, 44100);
        buffer.set_sample(0, 0, 1.0);
        reverb.process(&mut buffer);

        reverb.reset();
        let mut after = AudioBuffer::silence(2048, 1, 44100);
        reverb.process(&mut after);
        assert!(after.is_silent());
    }
}
