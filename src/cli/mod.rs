//! CLI Module
//!
//! Command-line interface for the pedalboard.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Pedalboard - real-time guitar effects chain and offline renderer
#[derive(Parser, Debug)]
#[command(name = "pedalboard-cli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON config file (missing fields use defaults)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print listings as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render an audio file through an effect chain
    #[command(name = "process")]
    Process {
        /// Input WAV file
        input: PathBuf,

        /// Output WAV file (defaults to a timestamped name next to the input)
        output: Option<PathBuf>,

        /// Built-in or loaded preset name
        #[arg(short, long)]
        preset: Option<String>,

        /// JSON preset file to load (used unless --preset is given)
        #[arg(long)]
        preset_file: Option<PathBuf>,

        /// Effect kinds to chain in order, with their stompbox defaults
        #[arg(short, long = "effect", num_args = 1..)]
        effects: Vec<String>,
    },

    /// Run the live stream with an interactive control prompt
    #[command(name = "realtime")]
    Realtime {
        /// Preset applied before the stream starts
        #[arg(short, long)]
        preset: Option<String>,

        #[arg(long)]
        sample_rate: Option<u32>,

        #[arg(long)]
        block_size: Option<usize>,

        #[arg(long)]
        channels: Option<usize>,

        /// Input device name (substring, case-insensitive)
        #[arg(long)]
        input_device: Option<String>,

        /// Output device name (substring, case-insensitive)
        #[arg(long)]
        output_device: Option<String>,
    },

    /// Capture the raw device input to a WAV file
    #[command(name = "record")]
    Record {
        /// Duration in seconds
        seconds: f32,

        /// Output WAV file (defaults to a timestamped name)
        output: Option<PathBuf>,

        #[arg(long)]
        sample_rate: Option<u32>,

        #[arg(long)]
        channels: Option<usize>,

        /// Input device name (substring, case-insensitive)
        #[arg(long)]
        input_device: Option<String>,
    },

    /// List the available presets
    #[command(name = "list-presets")]
    ListPresets,

    /// List effect kinds and their parameters
    #[command(name = "list-effects")]
    ListEffects,

    /// List host audio devices
    #[command(name = "list-devices")]
    ListDevices,
}
