//! Offline render integration tests

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use approx::assert_abs_diff_eq;
use tempfile::tempdir;

use pedalboard::engine::buffer::generate_test_tone;
use pedalboard::engine::{AudioFileCodec, DeviceConfig, StreamEngine, VirtualDevice, WavCodec};
use pedalboard::{
    AudioBuffer, BuiltinPresets, Command, EffectChain, EffectKind, EffectUnit, FileRenderer,
    Outcome, Pedalboard, PedalboardError, PresetCatalog, SharedChain,
};

fn stereo_tone(seconds: f32) -> AudioBuffer {
    let left = generate_test_tone(330.0, seconds, 44100);
    let right = generate_test_tone(495.0, seconds, 44100);
    AudioBuffer::from_channels(
        vec![
            left.channel(0).iter().map(|s| s * 0.7).collect(),
            right.channel(0).iter().map(|s| s * 0.5).collect(),
        ],
        44100,
    )
    .unwrap()
}

fn preset_chain(name: &str, channels: usize) -> EffectChain {
    let mut chain = EffectChain::with_format(44100, channels);
    chain.replace_all(BuiltinPresets.build(name).unwrap());
    chain
}

#[test]
fn test_blockwise_processing_matches_render() {
    let input = stereo_tone(0.25);

    for preset in ["Ambient", "Metal", "Lo-Fi"] {
        // Streaming path: the engine's processing step, one device block at a time
        let live = SharedChain::new(preset_chain(preset, 2));
        let mut blocks = input.split_blocks(256);
        for block in &mut blocks {
            StreamEngine::process_block(&live, block);
        }
        let streamed = AudioBuffer::concat(&blocks, 44100).unwrap();

        // Offline path with a different sub-block size
        let mut offline = preset_chain(preset, 2);
        let rendered = FileRenderer::new(1000)
            .unwrap()
            .render(&mut offline, &input)
            .unwrap();

        assert!(rendered.same_shape(&streamed), "{}", preset);
        for ch in 0..2 {
            for (a, b) in streamed.channel(ch).iter().zip(rendered.channel(ch)) {
                assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
            }
        }
    }
}

#[test]
fn test_render_file_round_trip() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("in.wav");
    let output_path = dir.path().join("out.wav");
    let codec = WavCodec::new(32).unwrap();
    let input = stereo_tone(0.1);
    codec.encode(&input, &input_path).unwrap();

    let mut chain = EffectChain::new();
    chain.push(EffectUnit::create(EffectKind::Gain, &[("gain_db", -6.0)]).unwrap());
    let rendered = FileRenderer::default()
        .render_file(&mut chain, &codec, &input_path, &output_path)
        .unwrap();

    // Prepared for the file's format
    assert_eq!(chain.channels(), 2);
    let written = codec.decode(&output_path).unwrap();
    assert!(written.same_shape(&input));
    assert_eq!(written, rendered);
    assert_abs_diff_eq!(
        written.channel(0)[100],
        input.channel(0)[100] * 0.501_187,
        epsilon = 1e-5
    );

    // no temporary file left next to the output
    let names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 2, "{:?}", names);
}

#[test]
fn test_render_file_resets_history() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("in.wav");
    let codec = WavCodec::new(32).unwrap();
    codec.encode(&stereo_tone(0.1), &input_path).unwrap();

    let mut chain = EffectChain::new();
    chain.push(
        EffectUnit::create(
            EffectKind::Delay,
            &[("delay_seconds", 0.05), ("feedback", 0.5)],
        )
        .unwrap(),
    );
    let renderer = FileRenderer::default();
    let first = renderer
        .render_file(&mut chain, &codec, &input_path, &dir.path().join("a.wav"))
        .unwrap();
    let second = renderer
        .render_file(&mut chain, &codec, &input_path, &dir.path().join("b.wav"))
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_empty_file_leaves_no_output() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("empty.wav");
    let output_path = dir.path().join("out.wav");
    let codec = WavCodec::default();
    codec
        .encode(&AudioBuffer::silence(0, 1, 44100), &input_path)
        .unwrap();

    let mut chain = EffectChain::new();
    let err = FileRenderer::default()
        .render_file(&mut chain, &codec, &input_path, &output_path)
        .unwrap_err();
    assert_eq!(err.error_code(), "EMPTY_INPUT");
    assert!(!output_path.exists());
}

#[test]
fn test_unwritable_output_leaves_no_file() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("in.wav");
    let codec = WavCodec::default();
    codec.encode(&stereo_tone(0.05), &input_path).unwrap();

    // the parent is a regular file, so no directory can be created there
    let output_path = input_path.join("out.wav");
    let mut chain = EffectChain::new();
    assert!(FileRenderer::default()
        .render_file(&mut chain, &codec, &input_path, &output_path)
        .is_err());
    assert!(!output_path.exists());
    assert!(input_path.is_file());
}

#[test]
fn test_render_file_creates_missing_directories() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("in.wav");
    let codec = WavCodec::new(32).unwrap();
    codec.encode(&stereo_tone(0.05), &input_path).unwrap();

    let output_path = dir.path().join("bounces").join("2024").join("out.wav");
    let mut chain = EffectChain::new();
    let rendered = FileRenderer::default()
        .render_file(&mut chain, &codec, &input_path, &output_path)
        .unwrap();
    assert_eq!(codec.decode(&output_path).unwrap(), rendered);
}

/// Decodes WAV but refuses to write anything
struct ReadOnlyCodec;

impl AudioFileCodec for ReadOnlyCodec {
    fn decode(&self, path: &Path) -> pedalboard::Result<AudioBuffer> {
        WavCodec::default().decode(path)
    }

    fn encode(&self, _buffer: &AudioBuffer, _path: &Path) -> pedalboard::Result<()> {
        Err(PedalboardError::UnsupportedFormat {
            format: "read-only codec".to_string(),
        })
    }
}

#[test]
fn test_failed_write_removes_created_directories() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("in.wav");
    WavCodec::default()
        .encode(&stereo_tone(0.05), &input_path)
        .unwrap();
    let existing = dir.path().join("existing");
    fs::create_dir(&existing).unwrap();

    let mut chain = EffectChain::new();
    let renderer = FileRenderer::default();
    for output_path in [
        dir.path().join("new").join("deeper").join("out.wav"),
        existing.join("new").join("out.wav"),
    ] {
        let err = renderer
            .render_file(&mut chain, &ReadOnlyCodec, &input_path, &output_path)
            .unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");
    }

    // only directories that existed before survive
    assert!(!dir.path().join("new").exists());
    assert!(existing.is_dir());
    assert_eq!(fs::read_dir(&existing).unwrap().count(), 0);
}

#[test]
fn test_render_shared_sees_one_chain_state() {
    let chain = SharedChain::new(EffectChain::with_format(44100, 1));
    chain.push(EffectUnit::create(EffectKind::Gain, &[("gain_db", -6.0)]).unwrap());
    let input = AudioBuffer::from_channels(vec![vec![0.5; 44100 * 5]], 44100).unwrap();

    let editor = {
        let chain = chain.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(1));
            chain.push(EffectUnit::create(EffectKind::Gain, &[("gain_db", -96.0)]).unwrap());
        })
    };
    let rendered = FileRenderer::default()
        .render_shared(&chain, &input)
        .unwrap();
    editor.join().unwrap();

    // the push lands before or after the whole render, never inside it
    let first = rendered.channel(0)[0];
    assert!(rendered.channel(0).iter().all(|&s| s == first));
    assert_eq!(chain.len(), 2);

    // and it is visible to the next render
    let next = FileRenderer::default().render_shared(&chain, &input).unwrap();
    assert!(next.channel(0)[0].abs() < 1e-4);
}

#[test]
fn test_pedalboard_render_with_preset_applies_it_live() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("riff.wav");
    let output_path = dir.path().join("riff_rock.wav");
    WavCodec::default()
        .encode(&stereo_tone(0.1), &input_path)
        .unwrap();

    let engine = StreamEngine::new(Box::new(VirtualDevice::new()));
    let mut board = Pedalboard::new(engine, DeviceConfig::new(44100, 128, 1));
    board.execute("add delay".parse().unwrap()).unwrap();

    let outcome = board
        .execute(Command::RenderFile {
            input: input_path.clone(),
            output: output_path.clone(),
            preset: Some("rock".to_string()),
        })
        .unwrap();
    assert!(matches!(outcome, Outcome::Rendered { .. }));
    assert!(output_path.exists());

    // the preset now drives the live chain as well
    let rock: Vec<EffectKind> = BuiltinPresets
        .build("Rock")
        .unwrap()
        .iter()
        .map(|unit| unit.kind())
        .collect();
    let live = board.chain().snapshot();
    assert_eq!(live.kinds(), rock);

    // without a preset the live units are rendered and left alone
    let plain = dir.path().join("riff_again.wav");
    board
        .execute(Command::RenderFile {
            input: input_path,
            output: plain.clone(),
            preset: None,
        })
        .unwrap();
    assert_eq!(
        WavCodec::default().decode(&plain).unwrap(),
        WavCodec::default().decode(&output_path).unwrap()
    );
    assert_eq!(board.chain().snapshot(), live);
}
