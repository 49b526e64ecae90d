//! Sine low-frequency oscillator used by the modulation effects

use std::f32::consts::{FRAC_PI_2, TAU};

/// Per-channel sine LFO
///
/// Odd channels run a quarter cycle ahead so stereo modulation is spread.
#[derive(Debug, Clone, Default)]
pub(crate) struct Lfo {
    phases: Vec<f32>,
    increment: f32,
}

impl Lfo {
    /// Resize for a channel count, restarting every phase
    pub(crate) fn prepare(&mut self, channels: usize) {
        self.phases = (0..channels.max(1)).map(initial_phase).collect();
    }

    /// Set the oscillation rate
    pub(crate) fn set_rate(&mut self, rate_hz: f32, sample_rate: u32) {
        self.increment = TAU * rate_hz / sample_rate as f32;
    }

    /// Current value for `channel` in [-1, 1], then advance one sample
    #[inline]
    pub(crate) fn next(&mut self, channel: usize) -> f32 {
        let Some(phase) = self.phases.get_mut(channel) else {
            return 0.0;
        };
        let value = phase.sin();
        *phase += self.increment;
        if *phase >= TAU {
            *phase -= TAU;
        }
        value
    }

    pub(crate) fn reset(&mut self) {
        for (ch, phase) in self.phases.iter_mut().enumerate() {
            *phase = initial_phase(ch);
        }
    }
}

fn initial_phase(channel: usize) -> f32 {
    if channel % 2 == 1 {
        FRAC_PI_2
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarter_cycle_offset() {
        let mut lfo = Lfo::default();
        lfo.prepare(2);
        lfo.set_rate(1.0, 4);
        assert_eq!(lfo.next(0), 0.0);
        assert!((lfo.next(1) - 1.0).abs() < 1e-6);
        assert!((lfo.next(0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_reset_restarts_phase() {
        let mut lfo = Lfo::default();
        lfo.prepare(1);
        lfo.set_rate(3.0, 100);
        let first = lfo.next(0);
        lfo.next(0);
        lfo.reset();
        assert_eq!(lfo.next(0), first);
    }
}
