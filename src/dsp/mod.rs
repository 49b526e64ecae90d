//! DSP effects library
//!
//! The chain holds `EffectUnit`s; each unit wraps the DSP state of one
//! closed `EffectKind`. Every effect processes samples strictly in order so
//! block size never changes the output.

mod bitcrush;
mod chain;
mod chorus;
mod compressor;
mod delay;
mod distortion;
mod effect;
mod filter;
mod gain;
mod lfo;
mod params;
mod phaser;
mod pitch_shift;
mod reverb;

pub use chain::{ChainSnapshot, EffectChain, SharedChain, UnitSnapshot};
pub use effect::{EffectKind, EffectUnit};
pub use filter::LadderMode;
pub use params::{ParamSpec, Parameters};
