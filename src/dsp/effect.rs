//! Effect units
//!
//! An `EffectUnit` is one parametrized transform in the chain. The set of
//! kinds is closed: `EffectKind` names them, each kind carries its own
//! parameter schema, and processing is dispatched by kind to the matching
//! DSP state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::bitcrush::Bitcrush;
use super::chorus::Chorus;
use super::compressor::Compressor;
use super::delay::Delay;
use super::distortion::Distortion;
use super::filter::LadderFilter;
use super::gain::Gain;
use super::params::{ParamSpec, Parameters};
use super::phaser::Phaser;
use super::pitch_shift::PitchShift;
use super::reverb::Reverb;
use crate::engine::buffer::{AudioBuffer, DEFAULT_SAMPLE_RATE};
use crate::error::{PedalboardError, Result};

// ============================================================================
// Effect Kinds
// ============================================================================

/// Supported effect types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Compressor,
    Distortion,
    Chorus,
    Delay,
    Reverb,
    Phaser,
    Gain,
    Filter,
    Bitcrush,
    PitchShift,
}

impl EffectKind {
    /// Every kind, in catalog order
    pub const ALL: [EffectKind; 10] = [
        EffectKind::Compressor,
        EffectKind::Distortion,
        EffectKind::Chorus,
        EffectKind::Delay,
        EffectKind::Reverb,
        EffectKind::Phaser,
        EffectKind::Gain,
        EffectKind::Filter,
        EffectKind::Bitcrush,
        EffectKind::PitchShift,
    ];

    /// Stable identifier used in commands and files
    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::Compressor => "compressor",
            EffectKind::Distortion => "distortion",
            EffectKind::Chorus => "chorus",
            EffectKind::Delay => "delay",
            EffectKind::Reverb => "reverb",
            EffectKind::Phaser => "phaser",
            EffectKind::Gain => "gain",
            EffectKind::Filter => "filter",
            EffectKind::Bitcrush => "bitcrush",
            EffectKind::PitchShift => "pitch_shift",
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            EffectKind::Compressor => "Compressor",
            EffectKind::Distortion => "Distortion",
            EffectKind::Chorus => "Chorus",
            EffectKind::Delay => "Delay",
            EffectKind::Reverb => "Reverb",
            EffectKind::Phaser => "Phaser",
            EffectKind::Gain => "Gain",
            EffectKind::Filter => "Filter",
            EffectKind::Bitcrush => "Bitcrush",
            EffectKind::PitchShift => "PitchShift",
        }
    }

    /// Declared parameters for this kind
    pub fn schema(&self) -> &'static [ParamSpec] {
        match self {
            EffectKind::Compressor => COMPRESSOR_PARAMS,
            EffectKind::Distortion => DISTORTION_PARAMS,
            EffectKind::Chorus => CHORUS_PARAMS,
            EffectKind::Delay => DELAY_PARAMS,
            EffectKind::Reverb => REVERB_PARAMS,
            EffectKind::Phaser => PHASER_PARAMS,
            EffectKind::Gain => GAIN_PARAMS,
            EffectKind::Filter => FILTER_PARAMS,
            EffectKind::Bitcrush => BITCRUSH_PARAMS,
            EffectKind::PitchShift => PITCH_SHIFT_PARAMS,
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for EffectKind {
    type Err = PedalboardError;

    /// Case-insensitive; `-`, `_` and spaces are ignored
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "compressor" => Ok(EffectKind::Compressor),
            "distortion" => Ok(EffectKind::Distortion),
            "chorus" => Ok(EffectKind::Chorus),
            "delay" => Ok(EffectKind::Delay),
            "reverb" => Ok(EffectKind::Reverb),
            "phaser" => Ok(EffectKind::Phaser),
            "gain" => Ok(EffectKind::Gain),
            "filter" | "ladderfilter" => Ok(EffectKind::Filter),
            "bitcrush" | "bitcrusher" => Ok(EffectKind::Bitcrush),
            "pitchshift" => Ok(EffectKind::PitchShift),
            _ => Err(PedalboardError::UnsupportedEffectKind {
                kind: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// Parameter Schemas
// ============================================================================

const COMPRESSOR_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("threshold_db", -60.0, 0.0, 0.0, "dB"),
    ParamSpec::new("ratio", 1.0, 20.0, 1.0, ""),
    ParamSpec::new("attack_ms", 0.1, 100.0, 1.0, "ms"),
    ParamSpec::new("release_ms", 10.0, 1000.0, 100.0, "ms"),
];

const DISTORTION_PARAMS: &[ParamSpec] = &[ParamSpec::new("drive_db", 0.0, 60.0, 25.0, "dB")];

const CHORUS_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("rate_hz", 0.01, 20.0, 1.0, "Hz"),
    ParamSpec::new("depth", 0.0, 1.0, 0.25, ""),
    ParamSpec::new("centre_delay_ms", 1.0, 50.0, 7.0, "ms"),
    ParamSpec::new("feedback", -0.95, 0.95, 0.0, ""),
    ParamSpec::new("mix", 0.0, 1.0, 0.5, ""),
];

const DELAY_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("delay_seconds", 0.0, 2.0, 0.5, "s"),
    ParamSpec::new("feedback", 0.0, 0.99, 0.0, ""),
    ParamSpec::new("mix", 0.0, 1.0, 0.5, ""),
];

const REVERB_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("room_size", 0.0, 1.0, 0.5, ""),
    ParamSpec::new("damping", 0.0, 1.0, 0.5, ""),
    ParamSpec::new("wet_level", 0.0, 1.0, 0.33, ""),
    ParamSpec::new("dry_level", 0.0, 1.0, 0.4, ""),
    ParamSpec::new("width", 0.0, 1.0, 1.0, ""),
];

const PHASER_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("rate_hz", 0.01, 20.0, 1.0, "Hz"),
    ParamSpec::new("depth", 0.0, 1.0, 0.5, ""),
    ParamSpec::new("centre_frequency_hz", 20.0, 20000.0, 1300.0, "Hz"),
    ParamSpec::new("feedback", -0.95, 0.95, 0.0, ""),
    ParamSpec::new("mix", 0.0, 1.0, 0.5, ""),
];

const GAIN_PARAMS: &[ParamSpec] = &[ParamSpec::new("gain_db", -96.0, 24.0, 0.0, "dB")];

const FILTER_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("mode", 0.0, 5.0, 0.0, "").integral(),
    ParamSpec::new("cutoff_hz", 20.0, 20000.0, 200.0, "Hz"),
    ParamSpec::new("resonance", 0.0, 1.0, 0.0, ""),
    ParamSpec::new("drive", 1.0, 10.0, 1.0, ""),
];

const BITCRUSH_PARAMS: &[ParamSpec] = &[ParamSpec::new("bit_depth", 1.0, 32.0, 8.0, "bits")];

const PITCH_SHIFT_PARAMS: &[ParamSpec] =
    &[ParamSpec::new("semitones", -24.0, 24.0, 0.0, "st")];

// ============================================================================
// Effect Trait
// ============================================================================

/// DSP behaviour shared by every effect kind
///
/// Implementations process samples strictly in order, so splitting the same
/// input into different block sizes produces the same output.
pub(crate) trait Effect: Send {
    /// Pick up new parameter values
    fn configure(&mut self, params: &Parameters);

    /// Allocate history for a sample rate and channel count
    ///
    /// All buffers are sized here; `process` never grows memory.
    fn prepare(&mut self, sample_rate: u32, channels: usize);

    /// Process a block in place
    fn process(&mut self, buffer: &mut AudioBuffer);

    /// Clear history (delay lines, envelopes, LFO phase)
    fn reset(&mut self);
}

/// Per-kind DSP state
#[derive(Debug)]
enum EffectState {
    Compressor(Compressor),
    Distortion(Distortion),
    Chorus(Chorus),
    Delay(Delay),
    Reverb(Reverb),
    Phaser(Phaser),
    Gain(Gain),
    Filter(LadderFilter),
    Bitcrush(Bitcrush),
    PitchShift(PitchShift),
}

impl EffectState {
    fn new(kind: EffectKind) -> Self {
        match kind {
            EffectKind::Compressor => EffectState::Compressor(Compressor::default()),
            EffectKind::Distortion => EffectState::Distortion(Distortion::default()),
            EffectKind::Chorus => EffectState::Chorus(Chorus::default()),
            EffectKind::Delay => EffectState::Delay(Delay::default()),
            EffectKind::Reverb => EffectState::Reverb(Reverb::default()),
            EffectKind::Phaser => EffectState::Phaser(Phaser::default()),
            EffectKind::Gain => EffectState::Gain(Gain::default()),
            EffectKind::Filter => EffectState::Filter(LadderFilter::default()),
            EffectKind::Bitcrush => EffectState::Bitcrush(Bitcrush::default()),
            EffectKind::PitchShift => EffectState::PitchShift(PitchShift::default()),
        }
    }

    fn effect_mut(&mut self) -> &mut dyn Effect {
        match self {
            EffectState::Compressor(e) => e,
            EffectState::Distortion(e) => e,
            EffectState::Chorus(e) => e,
            EffectState::Delay(e) => e,
            EffectState::Reverb(e) => e,
            EffectState::Phaser(e) => e,
            EffectState::Gain(e) => e,
            EffectState::Filter(e) => e,
            EffectState::Bitcrush(e) => e,
            EffectState::PitchShift(e) => e,
        }
    }
}

// ============================================================================
// Effect Unit
// ============================================================================

/// A single named, parametrized audio transform
///
/// # Example
/// ```
/// use pedalboard::dsp::{EffectKind, EffectUnit};
///
/// let mut gain = EffectUnit::create(EffectKind::Gain, &[("gain_db", 3.0)]).unwrap();
/// gain.set_parameter("gain_db", 6.0).unwrap();
/// assert_eq!(gain.parameter("gain_db"), Some(6.0));
/// assert!(gain.set_parameter("drive_db", 1.0).is_err());
/// ```
#[derive(Debug)]
pub struct EffectUnit {
    id: String,
    kind: EffectKind,
    params: Parameters,
    state: EffectState,
    sample_rate: u32,
    channels: usize,
}

impl EffectUnit {
    /// Create a unit with parameter overrides applied on top of the defaults
    ///
    /// Fails with `InvalidParameter` on the first bad override; nothing is
    /// created in that case.
    pub fn create(kind: EffectKind, overrides: &[(&str, f32)]) -> Result<Self> {
        let mut params = Parameters::defaults(kind.schema());
        for &(name, value) in overrides {
            params.set(kind.name(), name, value)?;
        }

        let mut unit = Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            params,
            state: EffectState::new(kind),
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 1,
        };
        unit.state.effect_mut().prepare(unit.sample_rate, unit.channels);
        unit.state.effect_mut().configure(&unit.params);
        Ok(unit)
    }

    /// Create a unit from a kind name such as `"reverb"` or `"LadderFilter"`
    pub fn from_name(kind: &str, overrides: &[(&str, f32)]) -> Result<Self> {
        Self::create(kind.parse()?, overrides)
    }

    /// Create a unit with every parameter at its default
    pub fn with_defaults(kind: EffectKind) -> Self {
        let params = Parameters::defaults(kind.schema());
        let mut state = EffectState::new(kind);
        state.effect_mut().prepare(DEFAULT_SAMPLE_RATE, 1);
        state.effect_mut().configure(&params);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            params,
            state,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 1,
        }
    }

    /// Instance identifier (informational; chains address units by index)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The effect kind
    pub fn kind(&self) -> EffectKind {
        self.kind
    }

    /// Current parameter values
    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    /// Current value of one parameter
    pub fn parameter(&self, name: &str) -> Option<f32> {
        self.params.get(name)
    }

    /// Update one parameter; takes effect on the next processed block
    ///
    /// Unknown names and out-of-range values fail with `InvalidParameter`
    /// and leave the unit untouched.
    pub fn set_parameter(&mut self, name: &str, value: f32) -> Result<()> {
        self.params.set(self.kind.name(), name, value)?;
        self.state.effect_mut().configure(&self.params);
        debug!(kind = self.kind.name(), name, value, "parameter updated");
        Ok(())
    }

    /// Prepare internal state for a sample rate and channel count
    pub fn prepare(&mut self, sample_rate: u32, channels: usize) {
        let channels = channels.max(1);
        self.sample_rate = sample_rate;
        self.channels = channels;
        let effect = self.state.effect_mut();
        effect.prepare(sample_rate, channels);
        effect.configure(&self.params);
    }

    /// Whether the unit is already prepared for this format
    pub(crate) fn is_prepared_for(&self, sample_rate: u32, channels: usize) -> bool {
        self.sample_rate == sample_rate && self.channels == channels.max(1)
    }

    /// Clear internal history without touching parameters
    pub fn reset(&mut self) {
        self.state.effect_mut().reset();
    }

    /// Process one block in place
    ///
    /// The block keeps its shape. A block whose channel count or sample
    /// rate differs from the prepared format re-prepares the unit first.
    pub fn process(&mut self, block: &mut AudioBuffer) {
        if block.is_empty() {
            return;
        }
        if block.num_channels() != self.channels || block.sample_rate != self.sample_rate {
            self.prepare(block.sample_rate, block.num_channels());
        }
        self.state.effect_mut().process(block);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::generate_test_tone;

    #[test]
    fn test_kind_from_str() {
        assert_eq!("Reverb".parse::<EffectKind>().unwrap(), EffectKind::Reverb);
        assert_eq!("pitch_shift".parse::<EffectKind>().unwrap(), EffectKind::PitchShift);
        assert_eq!("PitchShift".parse::<EffectKind>().unwrap(), EffectKind::PitchShift);
        assert_eq!("LadderFilter".parse::<EffectKind>().unwrap(), EffectKind::Filter);
        assert_eq!("bit-crusher".parse::<EffectKind>().unwrap(), EffectKind::Bitcrush);
    }

    #[test]
    fn test_kind_from_str_unsupported() {
        let err = "flanger".parse::<EffectKind>().unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_EFFECT_KIND");
    }

    #[test]
    fn test_kind_name_round_trip() {
        for kind in EffectKind::ALL {
            assert_eq!(kind.name().parse::<EffectKind>().unwrap(), kind);
            assert!(!kind.schema().is_empty());
        }
    }

    #[test]
    fn test_schema_defaults_are_valid() {
        for kind in EffectKind::ALL {
            for spec in kind.schema() {
                spec.validate(kind.name(), spec.default).unwrap();
            }
        }
    }

    #[test]
    fn test_create_with_overrides() {
        let unit =
            EffectUnit::create(EffectKind::Compressor, &[("threshold_db", -20.0), ("ratio", 3.0)])
                .unwrap();
        assert_eq!(unit.parameter("threshold_db"), Some(-20.0));
        assert_eq!(unit.parameter("ratio"), Some(3.0));
        assert_eq!(unit.parameter("attack_ms"), Some(1.0));
    }

    #[test]
    fn test_create_invalid_override() {
        let err = EffectUnit::create(EffectKind::Gain, &[("gain_db", 100.0)]).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");

        let err = EffectUnit::create(EffectKind::Gain, &[("drive_db", 1.0)]).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_from_name_unsupported() {
        let err = EffectUnit::from_name("wah", &[]).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_EFFECT_KIND");
    }

    #[test]
    fn test_set_parameter_failure_leaves_state() {
        let mut unit = EffectUnit::create(EffectKind::Delay, &[("mix", 0.3)]).unwrap();
        let before = unit.parameters().clone();

        assert!(unit.set_parameter("mix", 1.5).is_err());
        assert!(unit.set_parameter("wet", 0.5).is_err());

        assert_eq!(unit.parameters(), &before);
    }

    #[test]
    fn test_every_kind_preserves_shape() {
        for kind in EffectKind::ALL {
            for channels in [1, 2] {
                let mut unit = EffectUnit::with_defaults(kind);
                unit.prepare(44100, channels);
                let tone = generate_test_tone(220.0, 0.05, 44100);
                let mut block = AudioBuffer::from_channels(
                    vec![tone.channel(0).to_vec(); channels],
                    44100,
                )
                .unwrap();
                let len = block.num_samples();

                unit.process(&mut block);

                assert_eq!(block.num_channels(), channels, "{} channels", kind);
                assert_eq!(block.num_samples(), len, "{} length", kind);
                assert!(block.is_finite(), "{} produced non-finite output", kind);
            }
        }
    }

    #[test]
    fn test_process_reprepares_on_channel_change() {
        let mut unit = EffectUnit::with_defaults(EffectKind::Chorus);
        unit.prepare(44100, 1);
        let mut stereo = AudioBuffer::silence(128, 2, 44100);
        stereo.set_sample(0, 0, 1.0);
        stereo.set_sample(1, 0, 1.0);

        unit.process(&mut stereo);

        assert_eq!(stereo.num_channels(), 2);
        assert!(stereo.is_finite());
    }

    #[test]
    fn test_unique_ids() {
        let a = EffectUnit::with_defaults(EffectKind::Gain);
        let b = EffectUnit::with_defaults(EffectKind::Gain);
        assert_ne!(a.id(), b.id());
    }
}
