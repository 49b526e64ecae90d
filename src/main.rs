//! Pedalboard CLI
//!
//! Command-line interface for the real-time effects pedalboard.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pedalboard::cli::{commands, Cli, Commands};
use pedalboard::PedalboardConfig;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Pedalboard v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => PedalboardConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PedalboardConfig::default(),
    };

    match cli.command {
        Some(cmd) => handle_command(cmd, config, cli.json),
        None => {
            println!("Pedalboard v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands, mut config: PedalboardConfig, json: bool) -> anyhow::Result<()> {
    match cmd {
        Commands::Process {
            input,
            output,
            preset,
            preset_file,
            effects,
        } => commands::process(
            &config,
            &input,
            output.as_deref(),
            preset.as_deref(),
            preset_file.as_deref(),
            &effects,
        )
        .with_context(|| format!("processing {}", input.display())),
        Commands::Realtime {
            preset,
            sample_rate,
            block_size,
            channels,
            input_device,
            output_device,
        } => {
            if let Some(rate) = sample_rate {
                config.sample_rate = rate;
            }
            if let Some(size) = block_size {
                config.block_size = size;
            }
            if let Some(count) = channels {
                config.channels = count;
            }
            if input_device.is_some() {
                config.input_device = input_device;
            }
            if output_device.is_some() {
                config.output_device = output_device;
            }
            commands::realtime(&config, preset.as_deref(), json).context("realtime stream")
        }
        Commands::Record {
            seconds,
            output,
            sample_rate,
            channels,
            input_device,
        } => {
            if let Some(rate) = sample_rate {
                config.sample_rate = rate;
            }
            if let Some(count) = channels {
                config.channels = count;
            }
            if input_device.is_some() {
                config.input_device = input_device;
            }
            commands::record(&config, seconds, output).context("recording")
        }
        Commands::ListPresets => Ok(commands::list_presets(json)?),
        Commands::ListEffects => Ok(commands::list_effects(json)?),
        Commands::ListDevices => {
            commands::list_devices_command(json).context("listing audio devices")
        }
    }
}
