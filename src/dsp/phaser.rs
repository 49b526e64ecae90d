//! Phaser effect
//!
//! Six first-order allpass stages whose break frequency is swept
//! exponentially around a centre frequency by a sine LFO. The swept output
//! is mixed with the dry signal to produce moving notches.

use std::f32::consts::PI;

use super::effect::Effect;
use super::lfo::Lfo;
use super::params::Parameters;
use crate::engine::buffer::{AudioBuffer, DEFAULT_SAMPLE_RATE};

const NUM_STAGES: usize = 6;

/// Sweep span in octaves either side of the centre at full depth
const SWEEP_OCTAVES: f32 = 2.0;

const MIN_FREQUENCY_HZ: f32 = 20.0;

/// Allpass chain state for one channel
#[derive(Debug, Clone, Default)]
struct StageState {
    states: [f32; NUM_STAGES],
    last_output: f32,
}

/// LFO-swept allpass phaser
#[derive(Debug, Clone)]
pub struct Phaser {
    rate_hz: f32,
    depth: f32,
    centre_hz: f32,
    feedback: f32,
    mix: f32,
    sample_rate: u32,
    lfo: Lfo,
    channels: Vec<StageState>,
}

impl Default for Phaser {
    fn default() -> Self {
        let mut phaser = Self {
            rate_hz: 1.0,
            depth: 0.5,
            centre_hz: 1300.0,
            feedback: 0.0,
            mix: 0.5,
            sample_rate: DEFAULT_SAMPLE_RATE,
            lfo: Lfo::default(),
            channels: Vec::new(),
        };
        phaser.prepare(DEFAULT_SAMPLE_RATE, 1);
        phaser
    }
}

impl Phaser {
    /// Allpass coefficient for a break frequency
    #[inline]
    fn coefficient(&self, frequency: f32) -> f32 {
        let nyquist_guard = 0.45 * self.sample_rate as f32;
        let f = frequency.clamp(MIN_FREQUENCY_HZ, nyquist_guard);
        let t = (PI * f / self.sample_rate as f32).tan();
        (t - 1.0) / (t + 1.0)
    }
}

impl Effect for Phaser {
    fn configure(&mut self, params: &Parameters) {
        self.rate_hz = params.value("rate_hz");
        self.depth = params.value("depth");
        self.centre_hz = params.value("centre_frequency_hz");
        self.feedback = params.value("feedback");
        self.mix = params.value("mix");
        self.lfo.set_rate(self.rate_hz, self.sample_rate);
    }

    fn prepare(&mut self, sample_rate: u32, channels: usize) {
        let channels = channels.max(1);
        self.sample_rate = sample_rate;
        self.channels = vec![StageState::default(); channels];
        self.lfo.prepare(channels);
        self.lfo.set_rate(self.rate_hz, sample_rate);
    }

    fn process(&mut self, buffer: &mut AudioBuffer) {
        let (feedback, mix) = (self.feedback, self.mix);
        let sweep = self.depth * SWEEP_OCTAVES;

        for (ch, channel) in buffer.samples.iter_mut().enumerate() {
            if ch >= self.channels.len() {
                continue;
            }
            for sample in channel.iter_mut() {
                let lfo = self.lfo.next(ch);
                let a = self.coefficient(self.centre_hz * (sweep * lfo).exp2());
                let state = &mut self.channels[ch];

                let dry = *sample;
                let mut x = dry + feedback * state.last_output;
                for s in state.states.iter_mut() {
                    let y = a * x + *s;
                    *s = x - a * y;
                    x = y;
                }
                state.last_output = x;

                *sample = dry * (1.0 - mix) + x * mix;
            }
        }
    }

    fn reset(&mut self) {
        for state in &mut self.channels {
            *state = StageState::default();
        }
        self.lfo.reset();
    }
}
