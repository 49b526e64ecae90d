//! Pitch shift effect
//!
//! Delay-line pitch shifter: two read taps sweep through a 50 ms window at
//! a speed set by the pitch ratio, half a window apart, crossfaded so that
//! each tap is silent when it wraps.

use std::f32::consts::PI;

use super::effect::Effect;
use super::params::Parameters;
use crate::engine::buffer::{AudioBuffer, DEFAULT_SAMPLE_RATE};

/// Length of the sweep window in milliseconds
const WINDOW_MS: f32 = 50.0;

/// Per-channel delay line and tap position
#[derive(Debug, Clone)]
struct ShifterChannel {
    line: Vec<f32>,
    write_pos: usize,
    /// Delay of the first tap in samples, in [0, window)
    tap: f32,
}

impl ShifterChannel {
    fn new(size: usize) -> Self {
        Self {
            line: vec![0.0; size],
            write_pos: 0,
            tap: 0.0,
        }
    }

    #[inline]
    fn read(&self, delay: f32) -> f32 {
        let len = self.line.len();
        let whole = delay.floor() as usize;
        let frac = delay - whole as f32;
        let a = self.line[(self.write_pos + len - whole % len) % len];
        let b = self.line[(self.write_pos + len - (whole + 1) % len) % len];
        a + (b - a) * frac
    }

    #[inline]
    fn write(&mut self, value: f32) {
        self.line[self.write_pos] = value;
        self.write_pos = (self.write_pos + 1) % self.line.len();
    }

    fn clear(&mut self) {
        self.line.fill(0.0);
        self.write_pos = 0;
        self.tap = 0.0;
    }
}

/// Shifts pitch by a number of semitones without changing duration
#[derive(Debug, Clone)]
pub struct PitchShift {
    semitones: f32,
    ratio: f32,
    window: f32,
    channels: Vec<ShifterChannel>,
}

impl Default for PitchShift {
    fn default() -> Self {
        let mut shifter = Self {
            semitones: 0.0,
            ratio: 1.0,
            window: 0.0,
            channels: Vec::new(),
        };
        shifter.prepare(DEFAULT_SAMPLE_RATE, 1);
        shifter
    }
}

impl Effect for PitchShift {
    fn configure(&mut self, params: &Parameters) {
        self.semitones = params.value("semitones");
        self.ratio = (self.semitones / 12.0).exp2();
    }

    fn prepare(&mut self, sample_rate: u32, channels: usize) {
        self.window = (WINDOW_MS / 1000.0 * sample_rate as f32).max(4.0);
        let size = self.window.ceil() as usize + 4;
        self.channels = (0..channels.max(1)).map(|_| ShifterChannel::new(size)).collect();
    }

    fn process(&mut self, buffer: &mut AudioBuffer) {
        let window = self.window;
        let half = window * 0.5;
        let step = 1.0 - self.ratio;
        let bypass = self.semitones == 0.0;

        for (channel, state) in buffer.samples.iter_mut().zip(self.channels.iter_mut()) {
            for sample in channel.iter_mut() {
                let dry = *sample;
                state.write(dry);
                if bypass {
                    continue;
                }

                let tap_a = state.tap;
                let tap_b = (tap_a + half) % window;
                let gain_a = (PI * tap_a / window).sin().powi(2);
                let gain_b = 1.0 - gain_a;

                // Read one sample behind the write head
                *sample = state.read(tap_a + 1.0) * gain_a + state.read(tap_b + 1.0) * gain_b;

                state.tap = (tap_a + step).rem_euclid(window);
            }
        }
    }

    fn reset(&mut self) {
        self.channels.iter_mut().for_each(ShifterChannel::clear);
    }
}
