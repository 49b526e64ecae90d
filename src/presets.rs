//! Preset catalog
//!
//! A preset is a named, ordered list of effect constructors. Building a
//! preset validates every unit before anything touches a chain, so a bad
//! preset never leaves a chain half-replaced.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dsp::{EffectKind, EffectUnit};
use crate::error::{PedalboardError, Result};

// ============================================================================
// Preset Types
// ============================================================================

/// One effect constructor: a kind plus parameter overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectSpec {
    pub kind: EffectKind,
    #[serde(default)]
    pub params: BTreeMap<String, f32>,
}

impl EffectSpec {
    pub fn new(kind: EffectKind, params: &[(&str, f32)]) -> Self {
        Self {
            kind,
            params: params
                .iter()
                .map(|&(name, value)| (name.to_string(), value))
                .collect(),
        }
    }

    /// Construct the unit, validating every override
    pub fn build(&self) -> Result<EffectUnit> {
        let overrides: Vec<(&str, f32)> = self
            .params
            .iter()
            .map(|(name, &value)| (name.as_str(), value))
            .collect();
        EffectUnit::create(self.kind, &overrides)
    }
}

/// A named, ordered list of effect constructors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub effects: Vec<EffectSpec>,
}

impl Preset {
    pub fn new(name: impl Into<String>, effects: Vec<EffectSpec>) -> Self {
        Self {
            name: name.into(),
            effects,
        }
    }

    /// Build every unit in order; fails on the first invalid one
    pub fn build(&self) -> Result<Vec<EffectUnit>> {
        self.effects.iter().map(EffectSpec::build).collect()
    }

    /// Parse a preset from JSON, validating that it builds
    pub fn from_json(json: &str) -> Result<Self> {
        let preset: Preset = serde_json::from_str(json)?;
        preset.build()?;
        Ok(preset)
    }

    /// Load a preset file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PedalboardError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Case-insensitive key ignoring `-`, `_` and spaces ("Lo-Fi" == "lofi")
fn lookup_key(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

// ============================================================================
// Catalogs
// ============================================================================

/// Source of named presets
pub trait PresetCatalog: Send + Sync {
    /// Preset names in display order
    fn names(&self) -> Vec<String>;

    /// Look up a preset by name (case-insensitive)
    fn get(&self, name: &str) -> Option<Preset>;

    /// Build the units of a named preset
    fn build(&self, name: &str) -> Result<Vec<EffectUnit>> {
        let preset = self.get(name).ok_or_else(|| PedalboardError::UnknownPreset {
            name: name.to_string(),
        })?;
        debug!(preset = %preset.name, effects = preset.effects.len(), "building preset");
        preset.build()
    }
}

/// The fixed guitar presets
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinPresets;

impl BuiltinPresets {
    /// Every built-in preset, in display order
    pub fn all() -> Vec<Preset> {
        use EffectKind::*;
        vec![
            Preset::new(
                "Clean",
                vec![
                    EffectSpec::new(Compressor, &[("threshold_db", -20.0), ("ratio", 3.0)]),
                    EffectSpec::new(Gain, &[("gain_db", 3.0)]),
                    reverb(0.2, 0.8, 0.2),
                ],
            ),
            Preset::new(
                "Blues",
                vec![
                    EffectSpec::new(Compressor, &[("threshold_db", -20.0), ("ratio", 4.0)]),
                    EffectSpec::new(Distortion, &[("drive_db", 10.0)]),
                    EffectSpec::new(Gain, &[("gain_db", 5.0)]),
                    reverb(0.3, 0.7, 0.3),
                ],
            ),
            Preset::new(
                "Rock",
                vec![
                    EffectSpec::new(Compressor, &[("threshold_db", -24.0), ("ratio", 4.0)]),
                    EffectSpec::new(Distortion, &[("drive_db", 20.0)]),
                    EffectSpec::new(Gain, &[("gain_db", 8.0)]),
                    reverb(0.2, 0.8, 0.2),
                ],
            ),
            Preset::new(
                "Metal",
                vec![
                    EffectSpec::new(Compressor, &[("threshold_db", -30.0), ("ratio", 6.0)]),
                    EffectSpec::new(Distortion, &[("drive_db", 30.0)]),
                    EffectSpec::new(Gain, &[("gain_db", 10.0)]),
                    EffectSpec::new(
                        Filter,
                        &[("cutoff_hz", 2000.0), ("resonance", 0.7), ("drive", 1.5)],
                    ),
                    reverb(0.1, 0.9, 0.1),
                ],
            ),
            Preset::new(
                "Ambient",
                vec![
                    EffectSpec::new(Compressor, &[("threshold_db", -20.0), ("ratio", 3.0)]),
                    EffectSpec::new(Gain, &[("gain_db", 3.0)]),
                    EffectSpec::new(
                        Chorus,
                        &[("rate_hz", 0.7), ("depth", 0.6), ("feedback", 0.4), ("mix", 0.5)],
                    ),
                    EffectSpec::new(
                        Delay,
                        &[("delay_seconds", 0.5), ("feedback", 0.4), ("mix", 0.4)],
                    ),
                    reverb(0.8, 0.3, 0.7),
                ],
            ),
            Preset::new(
                "Psychedelic",
                vec![
                    EffectSpec::new(
                        Phaser,
                        &[("rate_hz", 0.8), ("depth", 0.8), ("feedback", 0.5), ("mix", 0.6)],
                    ),
                    EffectSpec::new(
                        Delay,
                        &[("delay_seconds", 0.3), ("feedback", 0.6), ("mix", 0.5)],
                    ),
                    EffectSpec::new(
                        Chorus,
                        &[("rate_hz", 1.0), ("depth", 0.7), ("feedback", 0.5), ("mix", 0.6)],
                    ),
                    reverb(0.7, 0.4, 0.6),
                ],
            ),
            Preset::new(
                "Lo-Fi",
                vec![
                    EffectSpec::new(Bitcrush, &[("bit_depth", 8.0)]),
                    // mode 1 = 12 dB/oct high-pass
                    EffectSpec::new(
                        Filter,
                        &[("mode", 1.0), ("cutoff_hz", 3000.0), ("resonance", 0.5)],
                    ),
                    EffectSpec::new(
                        Delay,
                        &[("delay_seconds", 0.1), ("feedback", 0.3), ("mix", 0.3)],
                    ),
                    reverb(0.6, 0.5, 0.5),
                ],
            ),
        ]
    }
}

fn reverb(room_size: f32, dry_level: f32, wet_level: f32) -> EffectSpec {
    EffectSpec::new(
        EffectKind::Reverb,
        &[
            ("room_size", room_size),
            ("dry_level", dry_level),
            ("wet_level", wet_level),
        ],
    )
}

impl PresetCatalog for BuiltinPresets {
    fn names(&self) -> Vec<String> {
        Self::all().into_iter().map(|p| p.name).collect()
    }

    fn get(&self, name: &str) -> Option<Preset> {
        let key = lookup_key(name);
        Self::all().into_iter().find(|p| lookup_key(&p.name) == key)
    }
}

/// Built-in presets plus presets loaded from JSON files
///
/// A loaded preset with the same name as an earlier one replaces it.
#[derive(Debug, Clone, Default)]
pub struct PresetLibrary {
    presets: Vec<Preset>,
}

impl PresetLibrary {
    /// An empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// A library seeded with the built-in presets
    pub fn with_builtins() -> Self {
        Self {
            presets: BuiltinPresets::all(),
        }
    }

    /// Add or replace a preset
    pub fn add(&mut self, preset: Preset) {
        let key = lookup_key(&preset.name);
        match self.presets.iter_mut().find(|p| lookup_key(&p.name) == key) {
            Some(existing) => *existing = preset,
            None => self.presets.push(preset),
        }
    }

    /// Load a JSON preset file and add it; returns the preset name
    pub fn load_file(&mut self, path: &Path) -> Result<String> {
        let preset = Preset::load(path)?;
        let name = preset.name.clone();
        self.add(preset);
        Ok(name)
    }
}

impl PresetCatalog for PresetLibrary {
    fn names(&self) -> Vec<String> {
        self.presets.iter().map(|p| p.name.clone()).collect()
    }

    fn get(&self, name: &str) -> Option<Preset> {
        let key = lookup_key(name);
        self.presets
            .iter()
            .find(|p| lookup_key(&p.name) == key)
            .cloned()
    }
}

// ============================================================================
// Individual Effects
// ============================================================================

/// Parameter overrides used when a single effect is added by kind
pub fn default_overrides(kind: EffectKind) -> &'static [(&'static str, f32)] {
    match kind {
        EffectKind::Compressor => &[("threshold_db", -20.0), ("ratio", 3.0)],
        EffectKind::Distortion => &[("drive_db", 15.0)],
        EffectKind::Chorus => &[("rate_hz", 0.7), ("depth", 0.6)],
        EffectKind::Delay => &[("delay_seconds", 0.4), ("feedback", 0.4)],
        EffectKind::Reverb => &[("room_size", 0.5)],
        EffectKind::Phaser => &[("rate_hz", 0.8), ("depth", 0.6)],
        EffectKind::Gain => &[("gain_db", 5.0)],
        EffectKind::Filter => &[("cutoff_hz", 2000.0), ("resonance", 0.5)],
        EffectKind::Bitcrush => &[("bit_depth", 8.0)],
        EffectKind::PitchShift => &[("semitones", 0.0)],
    }
}

/// A unit of `kind` with its stompbox defaults applied
pub fn individual_effect(kind: EffectKind) -> Result<EffectUnit> {
    EffectUnit::create(kind, default_overrides(kind))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_builtin_names() {
        assert_eq!(
            BuiltinPresets.names(),
            vec!["Clean", "Blues", "Rock", "Metal", "Ambient", "Psychedelic", "Lo-Fi"]
        );
    }

    #[test]
    fn test_every_builtin_builds() {
        for preset in BuiltinPresets::all() {
            let units = preset.build().unwrap();
            assert_eq!(units.len(), preset.effects.len(), "{}", preset.name);
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(BuiltinPresets.get("metal").unwrap().name, "Metal");
        assert_eq!(BuiltinPresets.get("LO-FI").unwrap().name, "Lo-Fi");
        assert_eq!(BuiltinPresets.get("lofi").unwrap().name, "Lo-Fi");
        assert!(BuiltinPresets.get("jazz").is_none());
    }

    #[test]
    fn test_unknown_preset_error() {
        let err = BuiltinPresets.build("jazz").unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_PRESET");
    }

    #[test]
    fn test_metal_chain_order() {
        let kinds: Vec<EffectKind> = BuiltinPresets
            .build("Metal")
            .unwrap()
            .iter()
            .map(|u| u.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                EffectKind::Compressor,
                EffectKind::Distortion,
                EffectKind::Gain,
                EffectKind::Filter,
                EffectKind::Reverb
            ]
        );
    }

    #[test]
    fn test_individual_effects_build() {
        for kind in EffectKind::ALL {
            let unit = individual_effect(kind).unwrap();
            assert_eq!(unit.kind(), kind);
        }
        assert_eq!(
            individual_effect(EffectKind::Gain).unwrap().parameter("gain_db"),
            Some(5.0)
        );
    }

    #[test]
    fn test_preset_json_round_trip() {
        let preset = BuiltinPresets.get("Ambient").unwrap();
        let json = preset.to_json().unwrap();
        assert_eq!(Preset::from_json(&json).unwrap(), preset);
    }

    #[test]
    fn test_preset_json_invalid_parameter() {
        let json = r#"{"name": "Broken", "effects": [{"kind": "gain", "params": {"gain_db": 99}}]}"#;
        let err = Preset::from_json(json).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_library_load_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("slapback.json");
        std::fs::write(
            &path,
            r#"{"name": "Slapback", "effects": [{"kind": "delay", "params": {"delay_seconds": 0.12, "mix": 0.3}}, {"kind": "reverb"}]}"#,
        )
        .unwrap();

        let mut library = PresetLibrary::with_builtins();
        assert_eq!(library.load_file(&path).unwrap(), "Slapback");
        assert!(library.names().contains(&"Slapback".to_string()));
        assert_eq!(library.build("slapback").unwrap().len(), 2);
    }
}
