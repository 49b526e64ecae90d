//! Offline file rendering
//!
//! Applies a chain to a whole buffer without a deadline. The buffer is cut
//! into fixed-size sub-blocks processed strictly in order, so stateful
//! units carry history across block boundaries exactly as they do when
//! streaming.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::dsp::{EffectChain, SharedChain};
use crate::engine::buffer::{AudioBuffer, DEFAULT_BLOCK_SIZE};
use crate::engine::io::AudioFileCodec;
use crate::error::{PedalboardError, Result};

/// Renders whole buffers and files through an effect chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRenderer {
    block_size: usize,
}

impl Default for FileRenderer {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl FileRenderer {
    /// Create a renderer with a sub-block size in frames
    pub fn new(block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(PedalboardError::InvalidConfig {
                reason: "render block size must be greater than 0".to_string(),
            });
        }
        Ok(Self { block_size })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Run `input` through `chain` and return the processed buffer
    ///
    /// The chain is borrowed mutably for the whole render, so it cannot be
    /// edited midway. Fails with `EmptyInput` on a zero-length buffer.
    pub fn render(&self, chain: &mut EffectChain, input: &AudioBuffer) -> Result<AudioBuffer> {
        if input.is_empty() {
            return Err(PedalboardError::EmptyInput);
        }

        let mut blocks = input.split_blocks(self.block_size);
        for block in &mut blocks {
            chain.process(block);
        }
        AudioBuffer::concat(&blocks, input.sample_rate)
    }

    /// Render through a live chain, holding its lock for the whole buffer
    pub fn render_shared(&self, chain: &SharedChain, input: &AudioBuffer) -> Result<AudioBuffer> {
        chain.with_locked(|chain| self.render(chain, input))
    }

    /// Decode `input_path`, render it and encode the result to `output_path`
    ///
    /// The chain is prepared for the file's format and its history cleared
    /// first. Missing output directories are created. Output goes to a
    /// temporary sibling file that is renamed into place only on success; on
    /// any failure no output file or newly created directory is left behind.
    pub fn render_file(
        &self,
        chain: &mut EffectChain,
        codec: &dyn AudioFileCodec,
        input_path: &Path,
        output_path: &Path,
    ) -> Result<AudioBuffer> {
        let started = Instant::now();
        let input = codec.decode(input_path)?;
        debug!(
            path = %input_path.display(),
            channels = input.num_channels(),
            sample_rate = input.sample_rate,
            samples = input.num_samples(),
            "decoded input"
        );

        chain.prepare(input.sample_rate, input.num_channels());
        chain.reset();
        let output = self.render(chain, &input)?;

        write_output(codec, &output, output_path)?;

        info!(
            input = %input_path.display(),
            output = %output_path.display(),
            effects = chain.len(),
            duration_secs = output.duration_secs(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rendered file"
        );
        Ok(output)
    }
}

/// Encode `buffer` to `path` through a temporary sibling file
///
/// Creates missing parent directories. On failure the temporary file and
/// any directory created here are removed again.
pub(crate) fn write_output(
    codec: &dyn AudioFileCodec,
    buffer: &AudioBuffer,
    path: &Path,
) -> Result<()> {
    let created = create_parent_dirs(path)?;
    let temp_path = temp_sibling(path);

    let written = codec
        .encode(buffer, &temp_path)
        .and_then(|()| std::fs::rename(&temp_path, path).map_err(PedalboardError::Io));
    if let Err(e) = written {
        remove_quietly(&temp_path);
        remove_created_dirs(&created);
        return Err(e);
    }
    Ok(())
}

/// Create the missing ancestors of `path`, returning them deepest first
fn create_parent_dirs(path: &Path) -> Result<Vec<PathBuf>> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(Vec::new());
    };

    let missing: Vec<PathBuf> = parent
        .ancestors()
        .take_while(|dir| !dir.as_os_str().is_empty() && !dir.exists())
        .map(Path::to_path_buf)
        .collect();
    if missing.is_empty() {
        return Ok(missing);
    }

    if let Err(e) = std::fs::create_dir_all(parent) {
        remove_created_dirs(&missing);
        return Err(PedalboardError::Io(e));
    }
    debug!(dir = %parent.display(), created = missing.len(), "created output directory");
    Ok(missing)
}

/// Remove directories deepest first; stops at the first one that is not empty
fn remove_created_dirs(dirs: &[PathBuf]) {
    for dir in dirs {
        if dir.exists() && std::fs::remove_dir(dir).is_err() {
            warn!(dir = %dir.display(), "left created directory in place");
            break;
        }
    }
}

/// `dir/name.ext` → `dir/.name.ext.partial`
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    path.with_file_name(format!(".{}.partial", name))
}

fn remove_quietly(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "failed to remove partial output");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::{EffectKind, EffectUnit};
    use crate::engine::buffer::generate_test_tone;
    use crate::engine::io::WavCodec;
    use tempfile::tempdir;

    #[test]
    fn test_zero_block_size_rejected() {
        assert!(FileRenderer::new(0).is_err());
        assert_eq!(FileRenderer::default().block_size(), 512);
    }

    #[test]
    fn test_empty_input() {
        let mut chain = EffectChain::new();
        let err = FileRenderer::default()
            .render(&mut chain, &AudioBuffer::silence(0, 2, 44100))
            .unwrap_err();
        assert_eq!(err.error_code(), "EMPTY_INPUT");
    }

    #[test]
    fn test_render_preserves_shape() {
        let mut chain = EffectChain::new();
        chain.push(EffectUnit::with_defaults(EffectKind::Delay));
        let input = generate_test_tone(440.0, 0.1, 44100);

        let output = FileRenderer::new(100).unwrap().render(&mut chain, &input).unwrap();
        assert!(output.same_shape(&input));
    }

    #[test]
    fn test_temp_sibling() {
        let path = Path::new("/tmp/out/song.wav");
        assert_eq!(temp_sibling(path), Path::new("/tmp/out/.song.wav.partial"));
    }

    #[test]
    fn test_create_parent_dirs_reports_only_new_dirs() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("a").join("b").join("out.wav");

        let created = create_parent_dirs(&out).unwrap();
        assert_eq!(created, vec![dir.path().join("a/b"), dir.path().join("a")]);
        assert!(dir.path().join("a/b").is_dir());

        assert!(create_parent_dirs(&out).unwrap().is_empty());
        remove_created_dirs(&created);
        assert!(!dir.path().join("a").exists());
        assert!(dir.path().exists());
    }

    #[test]
    fn test_render_file_missing_input_leaves_no_output() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.wav");
        let mut chain = EffectChain::new();

        let err = FileRenderer::default()
            .render_file(
                &mut chain,
                &WavCodec::default(),
                &dir.path().join("missing.wav"),
                &out,
            )
            .unwrap_err();
        assert_eq!(err.error_code(), "FILE_NOT_FOUND");
        assert!(!out.exists());
    }
}
