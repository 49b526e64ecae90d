//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde_json::json;
use tracing::{info, warn};

use crate::config::PedalboardConfig;
use crate::control::{Command, Outcome, Pedalboard};
use crate::dsp::EffectKind;
use crate::engine::device::{list_devices, CpalDevice};
use crate::engine::stream::StreamState;
use crate::error::Result;
use crate::presets::{PresetCatalog, PresetLibrary};

/// Render a file through a preset or an ad-hoc list of effects.
pub fn process(
    config: &PedalboardConfig,
    input: &Path,
    output: Option<&Path>,
    preset: Option<&str>,
    preset_file: Option<&Path>,
    effects: &[String],
) -> Result<()> {
    let mut library = PresetLibrary::with_builtins();
    let loaded = match preset_file {
        Some(path) => Some(library.load_file(path)?),
        None => None,
    };
    let preset = preset.map(str::to_string).or(loaded);

    // Parse every kind before touching the chain
    let kinds = effects
        .iter()
        .map(|name| name.parse::<EffectKind>())
        .collect::<Result<Vec<_>>>()?;
    if preset.is_some() && !kinds.is_empty() {
        warn!("--effect is ignored when a preset is selected");
    }

    let mut board = Pedalboard::from_config(config, Box::new(CpalDevice::default()))?
        .with_presets(Box::new(library));
    if preset.is_none() {
        for kind in kinds {
            board.execute(Command::AddEffect { kind, index: None })?;
        }
    }

    let label = preset.clone().unwrap_or_else(|| "chain".to_string());
    let output = match output {
        Some(path) => path.to_path_buf(),
        None => default_output_path(input, &label),
    };

    info!(input = %input.display(), output = %output.display(), chain = %label, "processing");
    let outcome = board.execute(Command::RenderFile {
        input: input.to_path_buf(),
        output,
        preset,
    })?;
    println!("{}", outcome);

    Ok(())
}

/// `dir/song.wav` + "Lo-Fi" → `dir/song_lo-fi_20240101_120000.wav`
pub fn default_output_path(input: &Path, label: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let label: String = label
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .flat_map(char::to_lowercase)
        .collect();
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    input.with_file_name(format!("{}_{}_{}.wav", stem, label, stamp))
}

/// Start the live stream and run the interactive control prompt on stdin.
pub fn realtime(config: &PedalboardConfig, preset: Option<&str>, json: bool) -> Result<()> {
    let device = CpalDevice::new(config.input_device.clone(), config.output_device.clone());
    let mut board = Pedalboard::from_config(config, Box::new(device))?;

    if let Some(name) = preset {
        let outcome = board.execute(Command::ApplyPreset(name.to_string()))?;
        println!("{}", outcome);
    }
    let outcome = board.execute(Command::StartStream)?;
    println!("{}", outcome);
    println!("Type 'help' for commands.");

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let result = run_control_loop(&mut board, stdin.lock(), stdout.lock(), json);

    let report = board.shutdown();
    println!("{}", Outcome::Stopped(report));
    result
}

/// Capture the device input for `seconds` and save it as WAV.
pub fn record(config: &PedalboardConfig, seconds: f32, output: Option<PathBuf>) -> Result<()> {
    let device = CpalDevice::new(config.input_device.clone(), config.output_device.clone());
    let mut board = Pedalboard::from_config(config, Box::new(device))?;

    println!("Recording {:.1}s...", seconds);
    let outcome = board.execute(Command::Record { seconds, output })?;
    println!("{}", outcome);
    Ok(())
}

/// Read commands line by line and execute them until `quit` or end of input.
///
/// Command failures are reported on `out` and the loop continues.
pub fn run_control_loop<R: BufRead, W: Write>(
    board: &mut Pedalboard,
    mut input: R,
    mut out: W,
    json: bool,
) -> Result<()> {
    let mut line = String::new();
    loop {
        write!(out, "> ")?;
        out.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let outcome = line
            .parse::<Command>()
            .and_then(|command| board.execute(command));
        match outcome {
            Ok(Outcome::Quit) => break,
            Ok(outcome) => write_outcome(&mut out, &outcome, json)?,
            Err(e) => writeln!(out, "error [{}]: {}", e.error_code(), e)?,
        }

        if board.engine().state() == StreamState::Faulted {
            writeln!(out, "stream faulted; use 'stop' then 'start' to recover")?;
        }
    }
    Ok(())
}

fn write_outcome<W: Write>(out: &mut W, outcome: &Outcome, json: bool) -> Result<()> {
    if json {
        match outcome {
            Outcome::Chain(snapshot) => {
                writeln!(out, "{}", serde_json::to_string_pretty(snapshot)?)?;
                return Ok(());
            }
            Outcome::Status {
                state,
                effects,
                stats,
            } => {
                let status = json!({ "state": state, "effects": effects, "stats": stats });
                writeln!(out, "{}", serde_json::to_string_pretty(&status)?)?;
                return Ok(());
            }
            _ => {}
        }
    }
    writeln!(out, "{}", outcome)?;
    Ok(())
}

/// List built-in presets and their effect chains.
pub fn list_presets(json: bool) -> Result<()> {
    let library = PresetLibrary::with_builtins();
    let presets: Vec<_> = library
        .names()
        .iter()
        .filter_map(|name| library.get(name))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&presets)?);
        return Ok(());
    }

    println!("Presets:");
    println!("{:-<60}", "");
    for preset in presets {
        let kinds: Vec<&str> = preset
            .effects
            .iter()
            .map(|e| e.kind.display_name())
            .collect();
        println!("  {:<12} {}", preset.name, kinds.join(" -> "));
    }

    Ok(())
}

/// List effect kinds with their parameter schemas.
pub fn list_effects(json: bool) -> Result<()> {
    if json {
        let kinds: Vec<_> = EffectKind::ALL
            .iter()
            .map(|kind| {
                json!({
                    "kind": kind.name(),
                    "display_name": kind.display_name(),
                    "parameters": kind.schema(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&kinds)?);
        return Ok(());
    }

    for kind in EffectKind::ALL {
        println!("{} ({})", kind.display_name(), kind.name());
        for spec in kind.schema() {
            println!(
                "    {:<16} default {:<8} {}",
                spec.name,
                spec.default,
                spec.range_description()
            );
        }
    }

    Ok(())
}

/// List host audio devices.
pub fn list_devices_command(json: bool) -> Result<()> {
    let devices = list_devices()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No audio devices found.");
        return Ok(());
    }

    for device in devices {
        let mut roles = Vec::new();
        if device.is_input {
            roles.push(if device.is_default_input { "input*" } else { "input" });
        }
        if device.is_output {
            roles.push(if device.is_default_output { "output*" } else { "output" });
        }
        println!("  {:<40} {}", device.name, roles.join(", "));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::device::{DeviceConfig, VirtualDevice};
    use crate::engine::stream::StreamEngine;
    use std::io::Cursor;

    fn board() -> Pedalboard {
        let engine = StreamEngine::new(Box::new(VirtualDevice::new()));
        Pedalboard::new(engine, DeviceConfig::new(44100, 64, 1))
    }

    fn run(board: &mut Pedalboard, script: &str, json: bool) -> String {
        let mut out = Vec::new();
        run_control_loop(board, Cursor::new(script), &mut out, json).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_default_output_path() {
        let path = default_output_path(Path::new("/music/riff.wav"), "Lo-Fi");
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("riff_lo-fi_"), "{}", name);
        assert!(name.ends_with(".wav"));
        assert_eq!(path.parent(), Some(Path::new("/music")));
    }

    #[test]
    fn test_control_loop_edits_chain() {
        let mut board = board();
        let out = run(&mut board, "preset clean\nadd delay\nremove 0\nlist\nquit\nadd gain\n", false);

        assert!(out.contains("Applied clean preset with 3 effects"));
        assert!(out.contains("Added Delay at 3"));
        // lines after quit are not executed
        assert_eq!(board.chain().len(), 3);
    }

    #[test]
    fn test_control_loop_reports_errors_and_continues() {
        let mut board = board();
        let out = run(&mut board, "remove 4\nfrobnicate\nadd gain\n", false);

        assert!(out.contains("INDEX_OUT_OF_RANGE"));
        assert!(out.contains("INVALID_COMMAND"));
        assert_eq!(board.chain().len(), 1);
    }

    #[test]
    fn test_control_loop_json_status() {
        let mut board = board();
        let out = run(&mut board, "status\n", true);
        assert!(out.contains("\"state\": \"idle\""), "{}", out);
        assert!(out.contains("\"underruns\""));
    }
}
