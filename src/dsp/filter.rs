//! Ladder filter
//!
//! Four cascaded one-pole sections in topology-preserving form with a
//! global resonance loop and a tanh input stage. Taps between the stages
//! give 12 and 24 dB/octave low-pass, high-pass and band-pass responses.

use std::f32::consts::PI;

use super::effect::Effect;
use super::params::Parameters;
use crate::engine::buffer::{AudioBuffer, DEFAULT_SAMPLE_RATE};

/// Resonance scaling; self-oscillation starts near 4
const MAX_FEEDBACK: f32 = 3.8;

/// Filter response selected by the integral `mode` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LadderMode {
    Lpf12,
    Hpf12,
    Bpf12,
    Lpf24,
    Hpf24,
    Bpf24,
}

impl LadderMode {
    /// Map the `mode` parameter value (0-5) to a response
    pub fn from_index(index: u32) -> Self {
        match index {
            1 => LadderMode::Hpf12,
            2 => LadderMode::Bpf12,
            3 => LadderMode::Lpf24,
            4 => LadderMode::Hpf24,
            5 => LadderMode::Bpf24,
            _ => LadderMode::Lpf12,
        }
    }

    /// Combine the input and the four stage outputs
    #[inline]
    fn mix(self, u: f32, y: &[f32; 4]) -> f32 {
        match self {
            LadderMode::Lpf12 => y[1],
            LadderMode::Lpf24 => y[3],
            LadderMode::Hpf12 => u - 2.0 * y[0] + y[1],
            LadderMode::Hpf24 => u - 4.0 * y[0] + 6.0 * y[1] - 4.0 * y[2] + y[3],
            LadderMode::Bpf12 => 2.0 * (y[0] - y[1]),
            LadderMode::Bpf24 => 4.0 * (y[1] - 2.0 * y[2] + y[3]),
        }
    }
}

/// Multi-mode resonant ladder filter
#[derive(Debug, Clone)]
pub struct LadderFilter {
    mode: LadderMode,
    cutoff_hz: f32,
    resonance: f32,
    drive: f32,
    sample_rate: u32,
    /// Per-stage integrator gain G = g / (1 + g)
    stage_gain: f32,
    /// Integrator states, four per channel
    states: Vec<[f32; 4]>,
    /// Last 4th-stage output per channel, fed back for resonance
    last_output: Vec<f32>,
}

impl Default for LadderFilter {
    fn default() -> Self {
        let mut filter = Self {
            mode: LadderMode::Lpf12,
            cutoff_hz: 200.0,
            resonance: 0.0,
            drive: 1.0,
            sample_rate: DEFAULT_SAMPLE_RATE,
            stage_gain: 0.0,
            states: Vec::new(),
            last_output: Vec::new(),
        };
        filter.prepare(DEFAULT_SAMPLE_RATE, 1);
        filter
    }
}

impl LadderFilter {
    fn update_coefficients(&mut self) {
        let cutoff = self.cutoff_hz.min(0.45 * self.sample_rate as f32);
        let g = (PI * cutoff / self.sample_rate as f32).tan();
        self.stage_gain = g / (1.0 + g);
    }
}

impl Effect for LadderFilter {
    fn configure(&mut self, params: &Parameters) {
        self.mode = LadderMode::from_index(params.value("mode").round().max(0.0) as u32);
        self.cutoff_hz = params.value("cutoff_hz");
        self.resonance = params.value("resonance");
        self.drive = params.value("drive");
        self.update_coefficients();
    }

    fn prepare(&mut self, sample_rate: u32, channels: usize) {
        let channels = channels.max(1);
        self.sample_rate = sample_rate;
        self.states = vec![[0.0; 4]; channels];
        self.last_output = vec![0.0; channels];
        self.update_coefficients();
    }

    fn process(&mut self, buffer: &mut AudioBuffer) {
        let big_g = self.stage_gain;
        let k = MAX_FEEDBACK * self.resonance;
        let drive = self.drive;
        let mode = self.mode;

        for ((channel, state), last) in buffer
            .samples
            .iter_mut()
            .zip(self.states.iter_mut())
            .zip(self.last_output.iter_mut())
        {
            for sample in channel.iter_mut() {
                let u = (drive * (*sample - k * *last)).tanh();
                let mut y = [0.0_f32; 4];
                let mut x = u;
                for (stage, s) in state.iter_mut().enumerate() {
                    let v = (x - *s) * big_g;
                    let out = v + *s;
                    *s = out + v;
                    y[stage] = out;
                    x = out;
                }
                *last = y[3];
                *sample = mode.mix(u, &y);
            }
        }
    }

    fn reset(&mut self) {
        self.states.iter_mut().for_each(|s| *s = [0.0; 4]);
        self.last_output.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::effect::EffectKind;
    use crate::engine::buffer::{calculate_rms, generate_test_tone};

    fn filter(mode: f32, cutoff: f32, resonance: f32) -> LadderFilter {
        let mut params = Parameters::defaults(EffectKind::Filter.schema());
        params.set("filter", "mode", mode).unwrap();
        params.set("filter", "cutoff_hz", cutoff).unwrap();
        params.set("filter", "resonance", resonance).unwrap();
        let mut filter = LadderFilter::default();
        filter.prepare(44100, 1);
        filter.configure(&params);
        filter
    }

    fn rms_after(filter: &mut LadderFilter, freq: f32) -> f32 {
        let mut tone = generate_test_tone(freq, 0.5, 44100);
        // Scale down to stay in the near-linear region of the drive stage
        for s in tone.channel_mut(0) {
            *s *= 0.1;
        }
        filter.process(&mut tone);
        calculate_rms(&tone)
    }

    #[test]
    fn test_mode_mapping() {
        assert_eq!(filter(3.0, 1000.0, 0.0).mode, LadderMode::Lpf24);
        assert_eq!(filter(1.0, 1000.0, 0.0).mode, LadderMode::Hpf12);
    }

    #[test]
    fn test_lowpass_attenuates_highs() {
        let low = rms_after(&mut filter(3.0, 500.0, 0.0), 100.0);
        let high = rms_after(&mut filter(3.0, 500.0, 0.0), 8000.0);
        assert!(high < low * 0.1, "low {} high {}", low, high);
    }

    #[test]
    fn test_highpass_attenuates_lows() {
        let low = rms_after(&mut filter(1.0, 2000.0, 0.0), 50.0);
        let high = rms_after(&mut filter(1.0, 2000.0, 0.0), 10000.0);
        assert!(low < high * 0.1, "low {} high {}", low, high);
    }

    #[test]
    fn test_resonance_stays_finite() {
        let mut filter = filter(3.0, 2000.0, 1.0);
        let mut buffer = generate_test_tone(2000.0, 0.5, 44100);
        filter.process(&mut buffer);
        assert!(buffer.is_finite());
    }
}
