//! Control surface
//!
//! `Command` is the closed set of operations a UI or CLI can issue;
//! `Pedalboard` executes them against one live chain, one stream engine and
//! the offline renderer, and answers with a structured `Outcome`. Nothing
//! here prints.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Local;
use tracing::info;

use crate::config::PedalboardConfig;
use crate::dsp::{ChainSnapshot, EffectChain, EffectKind, SharedChain};
use crate::engine::buffer::AudioBuffer;
use crate::engine::device::{AudioDevice, DeviceConfig};
use crate::engine::io::{AudioFileCodec, WavCodec};
use crate::engine::render::{write_output, FileRenderer};
use crate::engine::stream::{StatsSnapshot, StopReport, StreamEngine, StreamState};
use crate::error::{PedalboardError, Result};
use crate::presets::{individual_effect, BuiltinPresets, EffectSpec, PresetCatalog};

// ============================================================================
// Commands
// ============================================================================

/// Operations accepted by the control surface
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Replace the chain with a named preset
    ApplyPreset(String),
    /// Add a unit with its stompbox defaults, at the end or at `index`
    AddEffect {
        kind: EffectKind,
        index: Option<usize>,
    },
    /// Remove the unit at an index
    RemoveEffect(usize),
    /// Change one parameter of the unit at an index
    UpdateParameter {
        index: usize,
        name: String,
        value: f32,
    },
    /// Remove every unit
    ClearEffects,
    /// Describe the chain
    ListEffects,
    StartStream,
    StopStream,
    /// Report stream state and counters
    Status,
    /// Render a file through the current chain or a preset
    RenderFile {
        input: PathBuf,
        output: PathBuf,
        preset: Option<String>,
    },
    /// Capture raw input to a file; without `output` a timestamped name is used
    Record {
        seconds: f32,
        output: Option<PathBuf>,
    },
    Help,
    Quit,
}

/// Usage text for the line grammar
pub const COMMAND_HELP: &str = "\
commands:
  preset <name>                      replace the chain with a preset
  add <kind> [index]                 add an effect (end of chain by default)
  remove <index>                     remove the effect at index
  set <index> <param> <value>        change an effect parameter
  clear                              remove all effects
  list                               show the chain
  start | stop | status              control the live stream
  render <input> <output> [preset]   process a file
  record <seconds> [output]          capture the input to a file
  help | quit";

fn invalid(input: &str, reason: impl Into<String>) -> PedalboardError {
    PedalboardError::InvalidCommand {
        input: input.to_string(),
        reason: reason.into(),
    }
}

fn parse_index(input: &str, token: &str) -> Result<usize> {
    token
        .parse()
        .map_err(|_| invalid(input, format!("'{}' is not a chain index", token)))
}

impl FromStr for Command {
    type Err = PedalboardError;

    /// Parse one line of the text grammar (see `COMMAND_HELP`)
    fn from_str(line: &str) -> Result<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((&verb, args)) = tokens.split_first() else {
            return Err(invalid(line, "empty command"));
        };

        let command = match (verb.to_lowercase().as_str(), args) {
            ("preset", [name @ ..]) if !name.is_empty() => Command::ApplyPreset(name.join(" ")),
            ("add", [kind]) => Command::AddEffect {
                kind: kind.parse()?,
                index: None,
            },
            ("add", [kind, index]) => Command::AddEffect {
                kind: kind.parse()?,
                index: Some(parse_index(line, index)?),
            },
            ("remove", [index]) => Command::RemoveEffect(parse_index(line, index)?),
            ("set", [index, name, value]) => Command::UpdateParameter {
                index: parse_index(line, index)?,
                name: name.to_string(),
                value: value
                    .parse()
                    .map_err(|_| invalid(line, format!("'{}' is not a number", value)))?,
            },
            ("clear", []) => Command::ClearEffects,
            ("list", []) => Command::ListEffects,
            ("start", []) => Command::StartStream,
            ("stop", []) => Command::StopStream,
            ("status", []) => Command::Status,
            ("render", [input, output]) => Command::RenderFile {
                input: PathBuf::from(input),
                output: PathBuf::from(output),
                preset: None,
            },
            ("render", [input, output, preset @ ..]) => Command::RenderFile {
                input: PathBuf::from(input),
                output: PathBuf::from(output),
                preset: Some(preset.join(" ")),
            },
            ("record", [seconds, output @ ..]) if output.len() <= 1 => Command::Record {
                seconds: seconds
                    .parse()
                    .map_err(|_| invalid(line, format!("'{}' is not a duration", seconds)))?,
                output: output.first().map(PathBuf::from),
            },
            ("help", []) => Command::Help,
            ("quit", []) | ("exit", []) => Command::Quit,
            _ => return Err(invalid(line, "unknown command or wrong arguments; try 'help'")),
        };
        Ok(command)
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Structured result of a successful command
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    PresetApplied { name: String, effects: usize },
    EffectAdded { kind: EffectKind, index: usize },
    EffectRemoved { kind: EffectKind, index: usize },
    ParameterUpdated { index: usize, name: String, value: f32 },
    Cleared,
    Chain(ChainSnapshot),
    Started(DeviceConfig),
    Stopped(StopReport),
    Status {
        state: StreamState,
        effects: usize,
        stats: StatsSnapshot,
    },
    Rendered {
        output: PathBuf,
        duration_secs: f64,
    },
    Recorded {
        output: PathBuf,
        duration_secs: f64,
    },
    Help,
    Quit,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::PresetApplied { name, effects } => {
                write!(f, "Applied {} preset with {} effects", name, effects)
            }
            Outcome::EffectAdded { kind, index } => write!(f, "Added {} at {}", kind, index),
            Outcome::EffectRemoved { kind, index } => write!(f, "Removed {} from {}", kind, index),
            Outcome::ParameterUpdated { index, name, value } => {
                write!(f, "Set {} = {} on effect {}", name, value, index)
            }
            Outcome::Cleared => write!(f, "Cleared all effects"),
            Outcome::Chain(snapshot) => write!(f, "{}", snapshot),
            Outcome::Started(config) => write!(
                f,
                "Stream started ({} Hz, {} frames, {} ch)",
                config.sample_rate, config.block_size, config.channel_count
            ),
            Outcome::Stopped(report) => write!(
                f,
                "Stream stopped ({} blocks processed, {} faults, {} drained)",
                report.stats.blocks_processed,
                report.stats.faults(),
                report.drained_blocks
            ),
            Outcome::Status {
                state,
                effects,
                stats,
            } => write!(
                f,
                "Stream {} | {} effects | processed {} | underruns {} | overruns {} | drops {}",
                state,
                effects,
                stats.blocks_processed,
                stats.underruns,
                stats.input_overruns,
                stats.output_drops
            ),
            Outcome::Rendered {
                output,
                duration_secs,
            } => write!(
                f,
                "Rendered {:.2}s of audio to {}",
                duration_secs,
                output.display()
            ),
            Outcome::Recorded {
                output,
                duration_secs,
            } => write!(
                f,
                "Recorded {:.2}s of audio to {}",
                duration_secs,
                output.display()
            ),
            Outcome::Help => write!(f, "{}", COMMAND_HELP),
            Outcome::Quit => write!(f, "Bye"),
        }
    }
}

// ============================================================================
// Pedalboard
// ============================================================================

/// One live chain plus the engines that use it
pub struct Pedalboard {
    chain: SharedChain,
    engine: StreamEngine,
    device_config: DeviceConfig,
    renderer: FileRenderer,
    codec: Box<dyn AudioFileCodec>,
    presets: Box<dyn PresetCatalog>,
}

impl Pedalboard {
    /// Create a pedalboard with an empty chain, built-in presets and WAV I/O
    pub fn new(engine: StreamEngine, device_config: DeviceConfig) -> Self {
        Self {
            chain: SharedChain::new(EffectChain::with_format(
                device_config.sample_rate,
                device_config.channel_count,
            )),
            engine,
            device_config,
            renderer: FileRenderer::default(),
            codec: Box::new(WavCodec::default()),
            presets: Box::new(BuiltinPresets),
        }
    }

    /// Create a pedalboard for a device using every setting in `config`
    pub fn from_config(config: &PedalboardConfig, device: Box<dyn AudioDevice>) -> Result<Self> {
        config.validate()?;
        let engine = StreamEngine::with_options(device, config.stream_options());
        Ok(Self::new(engine, config.device_config())
            .with_renderer(config.renderer()?)
            .with_codec(Box::new(config.codec()?)))
    }

    pub fn with_renderer(mut self, renderer: FileRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_codec(mut self, codec: Box<dyn AudioFileCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_presets(mut self, presets: Box<dyn PresetCatalog>) -> Self {
        self.presets = presets;
        self
    }

    /// The live chain; clones share it
    pub fn chain(&self) -> &SharedChain {
        &self.chain
    }

    pub fn engine(&self) -> &StreamEngine {
        &self.engine
    }

    pub fn presets(&self) -> &dyn PresetCatalog {
        self.presets.as_ref()
    }

    pub fn device_config(&self) -> DeviceConfig {
        self.device_config
    }

    /// Execute one command
    ///
    /// Failed commands leave the chain and the stream as they were.
    pub fn execute(&mut self, command: Command) -> Result<Outcome> {
        match command {
            Command::ApplyPreset(name) => {
                let effects = self.apply_preset(&name)?;
                Ok(Outcome::PresetApplied { name, effects })
            }
            Command::AddEffect { kind, index } => {
                let unit = individual_effect(kind)?;
                let index = match index {
                    Some(position) => self.chain.insert(unit, position),
                    None => self.chain.push(unit),
                };
                Ok(Outcome::EffectAdded { kind, index })
            }
            Command::RemoveEffect(index) => {
                let unit = self.chain.remove_at(index)?;
                Ok(Outcome::EffectRemoved {
                    kind: unit.kind(),
                    index,
                })
            }
            Command::UpdateParameter { index, name, value } => {
                self.chain.update_parameter(index, &name, value)?;
                Ok(Outcome::ParameterUpdated { index, name, value })
            }
            Command::ClearEffects => {
                self.chain.clear();
                Ok(Outcome::Cleared)
            }
            Command::ListEffects => Ok(Outcome::Chain(self.chain.snapshot())),
            Command::StartStream => {
                self.engine.start(&self.chain, self.device_config)?;
                Ok(Outcome::Started(self.device_config))
            }
            Command::StopStream => Ok(Outcome::Stopped(self.engine.stop())),
            Command::Status => Ok(Outcome::Status {
                state: self.engine.state(),
                effects: self.chain.len(),
                stats: self.engine.stats(),
            }),
            Command::RenderFile {
                input,
                output,
                preset,
            } => {
                let rendered = self.render_file(&input, &output, preset.as_deref())?;
                Ok(Outcome::Rendered {
                    output,
                    duration_secs: rendered.duration_secs(),
                })
            }
            Command::Record { seconds, output } => {
                let output = output.unwrap_or_else(default_recording_path);
                let recorded = self.record(seconds, &output)?;
                Ok(Outcome::Recorded {
                    output,
                    duration_secs: recorded.duration_secs(),
                })
            }
            Command::Help => Ok(Outcome::Help),
            Command::Quit => Ok(Outcome::Quit),
        }
    }

    /// Replace the live chain with a preset; returns the unit count
    ///
    /// Every unit is built before the chain is touched, so an unknown or
    /// broken preset leaves the chain unchanged.
    pub fn apply_preset(&self, name: &str) -> Result<usize> {
        let units = self.presets.build(name)?;
        let count = units.len();
        self.chain.replace_all(units);
        info!(preset = name, effects = count, "preset applied");
        Ok(count)
    }

    /// Render a file through a private copy of the live chain
    ///
    /// With `preset`, the preset is first applied to the live chain, exactly
    /// as `ApplyPreset` would, so a running stream switches too. The render
    /// itself never touches the live units' history.
    pub fn render_file(
        &self,
        input: &Path,
        output: &Path,
        preset: Option<&str>,
    ) -> Result<AudioBuffer> {
        if let Some(name) = preset {
            self.apply_preset(name)?;
        }
        let units = self
            .chain
            .snapshot()
            .units
            .into_iter()
            .map(|unit| {
                EffectSpec {
                    kind: unit.kind,
                    params: unit.parameters,
                }
                .build()
            })
            .collect::<Result<Vec<_>>>()?;

        let mut chain = EffectChain::new();
        chain.replace_all(units);
        self.renderer
            .render_file(&mut chain, self.codec.as_ref(), input, output)
    }

    /// Capture `seconds` of unprocessed device input and write it to `output`
    ///
    /// Only valid while the stream is stopped. Missing output directories are
    /// created.
    pub fn record(&mut self, seconds: f32, output: &Path) -> Result<AudioBuffer> {
        let recorded = self.engine.record(self.device_config, seconds)?;
        write_output(self.codec.as_ref(), &recorded, output)?;
        info!(
            output = %output.display(),
            seconds = recorded.duration_secs(),
            "recording saved"
        );
        Ok(recorded)
    }

    /// Stop the stream if it is running
    pub fn shutdown(&mut self) -> StopReport {
        self.engine.stop()
    }
}

/// `recording_20240101_120000.wav` in the working directory
pub fn default_recording_path() -> PathBuf {
    PathBuf::from(format!(
        "recording_{}.wav",
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

impl fmt::Debug for Pedalboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pedalboard")
            .field("chain", &self.chain.snapshot())
            .field("engine", &self.engine)
            .field("device_config", &self.device_config)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
