//! Delay effect
//!
//! Per-channel digital delay line with feedback and a dry/wet mix.

use super::effect::Effect;
use super::params::Parameters;
use crate::engine::buffer::{AudioBuffer, DEFAULT_SAMPLE_RATE};

/// Longest supported delay time in seconds
const MAX_DELAY_SECONDS: f32 = 2.0;

/// Circular delay buffer for one channel
#[derive(Debug, Clone)]
struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            write_pos: 0,
        }
    }

    /// Read the sample written `delay` samples ago
    #[inline]
    fn read(&self, delay: usize) -> f32 {
        let len = self.buffer.len();
        self.buffer[(self.write_pos + len - delay % len) % len]
    }

    #[inline]
    fn write(&mut self, value: f32) {
        self.buffer[self.write_pos] = value;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// Feedback delay
///
/// `out = dry * (1 - mix) + delayed * mix`, where the delay line is fed with
/// `dry + feedback * delayed`. A delay time of zero makes the wet signal equal
/// to the dry signal.
#[derive(Debug, Clone)]
pub struct Delay {
    delay_seconds: f32,
    feedback: f32,
    mix: f32,
    sample_rate: u32,
    delay_samples: usize,
    lines: Vec<DelayLine>,
}

impl Default for Delay {
    fn default() -> Self {
        let mut delay = Self {
            delay_seconds: 0.5,
            feedback: 0.0,
            mix: 0.5,
            sample_rate: DEFAULT_SAMPLE_RATE,
            delay_samples: 0,
            lines: Vec::new(),
        };
        delay.prepare(DEFAULT_SAMPLE_RATE, 1);
        delay
    }
}

impl Delay {
    fn update_delay_samples(&mut self) {
        self.delay_samples = (self.delay_seconds * self.sample_rate as f32).round() as usize;
    }
}

impl Effect for Delay {
    fn configure(&mut self, params: &Parameters) {
        self.delay_seconds = params.value("delay_seconds");
        self.feedback = params.value("feedback");
        self.mix = params.value("mix");
        self.update_delay_samples();
    }

    fn prepare(&mut self, sample_rate: u32, channels: usize) {
        self.sample_rate = sample_rate;
        let size = (MAX_DELAY_SECONDS * sample_rate as f32).ceil() as usize + 1;
        self.lines = (0..channels.max(1)).map(|_| DelayLine::new(size)).collect();
        self.update_delay_samples();
    }

    fn process(&mut self, buffer: &mut AudioBuffer) {
        let delay = self.delay_samples;
        let (feedback, mix) = (self.feedback, self.mix);

        for (channel, line) in buffer.samples.iter_mut().zip(self.lines.iter_mut()) {
            for sample in channel.iter_mut() {
                let dry = *sample;
                let wet = if delay == 0 { dry } else { line.read(delay) };
                line.write(dry + feedback * wet);
                *sample = dry * (1.0 - mix) + wet * mix;
            }
        }
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::effect::EffectKind;

    fn delay(seconds: f32, feedback: f32, mix: f32, sample_rate: u32) -> Delay {
        let mut params = Parameters::defaults(EffectKind::Delay.schema());
        params.set("delay", "delay_seconds", seconds).unwrap();
        params.set("delay", "feedback", feedback).unwrap();
        params.set("delay", "mix", mix).unwrap();
        let mut delay = Delay::default();
        delay.prepare(sample_rate, 1);
        delay.configure(&params);
        delay
    }

    fn impulse(len: usize) -> AudioBuffer {
        let mut buffer = AudioBuffer::silence(len, 1, 1000);
        buffer.set_sample(0, 0, 1.0);
        buffer
    }

    #[test]
    fn test_impulse_echo() {
        // 10 ms at 1 kHz = 10 samples
        let mut delay = delay(0.01, 0.0, 1.0, 1000);
        let mut buffer = impulse(32);
        delay.process(&mut buffer);

        assert_eq!(buffer.channel(0)[0], 0.0);
        assert_eq!(buffer.channel(0)[10], 1.0);
        assert_eq!(buffer.channel(0)[20], 0.0);
    }

    #[test]
    fn test_feedback_repeats() {
        let mut delay = delay(0.01, 0.5, 1.0, 1000);
        let mut buffer = impulse(32);
        delay.process(&mut buffer);

        assert_eq!(buffer.channel(0)[10], 1.0);
        assert_eq!(buffer.channel(0)[20], 0.5);
        assert_eq!(buffer.channel(0)[30], 0.25);
    }

    #[test]
    fn test_zero_delay_is_dry() {
        let mut delay = delay(0.0, 0.0, 0.5, 1000);
        let mut buffer = AudioBuffer::from_channels(vec![vec![0.5, -0.5, 0.25]], 1000).unwrap();
        delay.process(&mut buffer);
        assert_eq!(buffer.channel(0), &[0.5, -0.5, 0.25]);
    }

    #[test]
    fn test_echo_crosses_block_boundary() {
        let mut delay = delay(0.01, 0.0, 1.0, 1000);
        let mut first = impulse(6);
        let mut second = AudioBuffer::silence(6, 1, 1000);
        delay.process(&mut first);
        delay.process(&mut second);
        assert_eq!(second.channel(0)[4], 1.0);
    }

    #[test]
    fn test_reset_clears_tail() {
        let mut delay = delay(0.01, 0.0, 1.0, 1000);
        let mut buffer = impulse(6);
        delay.process(&mut buffer);
        delay.reset();
        let mut tail = AudioBuffer::silence(16, 1, 1000);
        delay.process(&mut tail);
        assert!(tail.is_silent());
    }
}
