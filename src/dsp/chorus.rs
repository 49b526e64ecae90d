//! Chorus effect
//!
//! A short delay line whose read position is swept by a sine LFO. The
//! delayed copy is mixed back with the dry signal; feedback recirculates
//! the modulated output into the line.

use super::effect::Effect;
use super::lfo::Lfo;
use super::params::Parameters;
use crate::engine::buffer::{AudioBuffer, DEFAULT_SAMPLE_RATE};

/// Sweep range at full depth, in milliseconds
const MAX_MODULATION_MS: f32 = 20.0;

/// Longest centre delay plus full sweep, with headroom
const MAX_DELAY_MS: f32 = 100.0;

/// Modulated delay chorus
#[derive(Debug, Clone)]
pub struct Chorus {
    rate_hz: f32,
    depth: f32,
    centre_delay_ms: f32,
    feedback: f32,
    mix: f32,
    sample_rate: u32,
    lfo: Lfo,
    lines: Vec<Vec<f32>>,
    write_pos: Vec<usize>,
}

impl Default for Chorus {
    fn default() -> Self {
        let mut chorus = Self {
            rate_hz: 1.0,
            depth: 0.25,
            centre_delay_ms: 7.0,
            feedback: 0.0,
            mix: 0.5,
            sample_rate: DEFAULT_SAMPLE_RATE,
            lfo: Lfo::default(),
            lines: Vec::new(),
            write_pos: Vec::new(),
        };
        chorus.prepare(DEFAULT_SAMPLE_RATE, 1);
        chorus
    }
}

/// Linear-interpolated read `delay` samples behind `write_pos`
#[inline]
fn read_fractional(line: &[f32], write_pos: usize, delay: f32) -> f32 {
    let len = line.len();
    let whole = delay.floor() as usize;
    let frac = delay - whole as f32;
    let a = line[(write_pos + len - whole % len) % len];
    let b = line[(write_pos + len - (whole + 1) % len) % len];
    a + (b - a) * frac
}

impl Effect for Chorus {
    fn configure(&mut self, params: &Parameters) {
        self.rate_hz = params.value("rate_hz");
        self.depth = params.value("depth");
        self.centre_delay_ms = params.value("centre_delay_ms");
        self.feedback = params.value("feedback");
        self.mix = params.value("mix");
        self.lfo.set_rate(self.rate_hz, self.sample_rate);
    }

    fn prepare(&mut self, sample_rate: u32, channels: usize) {
        let channels = channels.max(1);
        self.sample_rate = sample_rate;
        let size = (MAX_DELAY_MS / 1000.0 * sample_rate as f32).ceil() as usize + 2;
        self.lines = vec![vec![0.0; size]; channels];
        self.write_pos = vec![0; channels];
        self.lfo.prepare(channels);
        self.lfo.set_rate(self.rate_hz, sample_rate);
    }

    fn process(&mut self, buffer: &mut AudioBuffer) {
        let samples_per_ms = self.sample_rate as f32 / 1000.0;
        let centre = self.centre_delay_ms * samples_per_ms;
        let sweep = 0.5 * self.depth * MAX_MODULATION_MS * samples_per_ms;
        let (feedback, mix) = (self.feedback, self.mix);

        for (ch, channel) in buffer.samples.iter_mut().enumerate() {
            let (Some(line), Some(pos)) = (self.lines.get_mut(ch), self.write_pos.get_mut(ch))
            else {
                continue;
            };
            let max_delay = (line.len() - 2) as f32;
            for sample in channel.iter_mut() {
                let lfo = self.lfo.next(ch);
                let delay = (centre + sweep * (1.0 + lfo)).clamp(1.0, max_delay);
                let wet = read_fractional(line, *pos, delay);
                let dry = *sample;

                line[*pos] = dry + feedback * wet;
                *pos = (*pos + 1) % line.len();

                *sample = dry * (1.0 - mix) + wet * mix;
            }
        }
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.fill(0.0);
        }
        self.write_pos.fill(0);
        self.lfo.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::effect::EffectKind;
    use crate::engine::buffer::generate_test_tone;

    fn chorus(mix: f32, channels: usize) -> Chorus {
        let mut params = Parameters::defaults(EffectKind::Chorus.schema());
        params.set("chorus", "mix", mix).unwrap();
        params.set("chorus", "depth", 0.7).unwrap();
        let mut chorus = Chorus::default();
        chorus.prepare(44100, channels);
        chorus.configure(&params);
        chorus
    }

    #[test]
    fn test_zero_mix_is_dry() {
        let mut chorus = chorus(0.0, 1);
        let tone = generate_test_tone(440.0, 0.05, 44100);
        let mut buffer = tone.clone();
        chorus.process(&mut buffer);
        assert_eq!(buffer, tone);
    }

    #[test]
    fn test_wet_signal_changes_tone() {
        let mut chorus = chorus(0.5, 1);
        let tone = generate_test_tone(440.0, 0.1, 44100);
        let mut buffer = tone.clone();
        chorus.process(&mut buffer);
        assert_ne!(buffer, tone);
        assert!(buffer.is_finite());
    }

    #[test]
    fn test_stereo_spread() {
        let mut chorus = chorus(1.0, 2);
        let tone = generate_test_tone(440.0, 0.1, 44100);
        let mut buffer =
            AudioBuffer::from_channels(vec![tone.channel(0).to_vec(); 2], 44100).unwrap();
        chorus.process(&mut buffer);
        assert_ne!(buffer.channel(0), buffer.channel(1));
    }
}
