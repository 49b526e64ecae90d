//! Pedalboard - Real-Time Audio Effects Chain
//!
//! An ordered chain of guitar effects that can be edited while audio is
//! streaming through it, plus an offline renderer that applies the same
//! chain to whole files with identical results.
//!
//! # Architecture
//!
//! - `dsp`: effect units, parameter schemas and the `EffectChain`
//! - `engine`: audio buffers, device backends, the `StreamEngine` and the
//!   `FileRenderer`
//! - `presets`: named chains, built in or loaded from JSON
//! - `control`: the command set and the `Pedalboard` facade that runs it

pub mod cli;
pub mod config;
pub mod control;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod presets;

pub use config::PedalboardConfig;
pub use control::{Command, Outcome, Pedalboard};
pub use dsp::{ChainSnapshot, EffectChain, EffectKind, EffectUnit, SharedChain};
pub use engine::{AudioBuffer, FileRenderer, StreamEngine, StreamState};
pub use error::{PedalboardError, Result};
pub use presets::{BuiltinPresets, PresetCatalog, PresetLibrary};
