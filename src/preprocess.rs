//! Audio Preprocessor
//!
//! Converts uploads to 16 kHz mono 16-bit PCM WAV with ffmpeg before they
//! reach the recognizer. Conversion is best-effort: when the converter is
//! missing or fails, the original file is used as-is.

use chrono::Utc;
use log::{debug, info, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use uuid::Uuid;

use crate::config::PreprocessConfig;

/// Why a conversion was abandoned
#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("failed to launch converter: {0}")]
    Launch(#[from] io::Error),
    #[error("converter exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("converter produced no output at {0}")]
    MissingOutput(PathBuf),
}

/// Audio ready for the recognizer.
///
/// When the file was produced by the converter it belongs to this value and
/// is deleted when it is dropped. The original upload is never touched.
#[derive(Debug)]
pub struct PreparedAudio {
    path: PathBuf,
    converted: bool,
    degraded: bool,
}

impl PreparedAudio {
    fn original(path: &Path, degraded: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            converted: false,
            degraded,
        }
    }

    fn converted(path: PathBuf) -> Self {
        Self {
            path,
            converted: true,
            degraded: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when `path` is an intermediate file owned by this value
    pub fn is_converted(&self) -> bool {
        self.converted
    }

    /// True when conversion was attempted and fell back to the original
    pub fn was_degraded(&self) -> bool {
        self.degraded
    }
}

impl Drop for PreparedAudio {
    fn drop(&mut self) {
        if !self.converted {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed preprocessed file {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove preprocessed file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

pub struct AudioPreprocessor {
    config: PreprocessConfig,
}

impl AudioPreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// A preprocessor that always hands the input back unchanged
    pub fn disabled() -> Self {
        Self::new(PreprocessConfig {
            enabled: false,
            ..PreprocessConfig::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Creates the working directory
    pub async fn init(&self) -> io::Result<()> {
        if self.config.enabled {
            tokio::fs::create_dir_all(&self.config.work_dir).await?;
            info!(
                "Audio preprocessing with {} into {}",
                self.config.command_path, self.config.work_dir
            );
        } else {
            info!("Audio preprocessing disabled");
        }
        Ok(())
    }

    /// Normalizes `input`, or hands it back unchanged if that is not possible.
    pub async fn prepare(&self, input: &Path) -> PreparedAudio {
        if !self.config.enabled {
            return PreparedAudio::original(input, false);
        }

        let output = self.derive_output_path(input);
        match self.convert(input, &output).await {
            Ok(()) => {
                debug!("Preprocessed {} -> {}", input.display(), output.display());
                PreparedAudio::converted(output)
            }
            Err(e) => {
                warn!(
                    "Preprocessing degraded for {}, using original file: {}",
                    input.display(),
                    e
                );
                if let Err(e) = tokio::fs::remove_file(&output).await {
                    if e.kind() != io::ErrorKind::NotFound {
                        warn!("Failed to remove partial output {}: {}", output.display(), e);
                    }
                }
                PreparedAudio::original(input, true)
            }
        }
    }

    /// `<work_dir>/<stem>_<timestamp>_<token>.wav`, unique per call
    fn derive_output_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("audio");
        let token = Uuid::new_v4().simple().to_string();
        let file_name = format!(
            "{}_{}_{}.wav",
            stem,
            Utc::now().format("%Y%m%d%H%M%S%3f"),
            &token[..12]
        );
        Path::new(&self.config.work_dir).join(file_name)
    }

    async fn convert(&self, input: &Path, output: &Path) -> Result<(), PreprocessError> {
        let result = Command::new(&self.config.command_path)
            .arg("-y")
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(input)
            .arg("-ar")
            .arg(self.config.sample_rate.to_string())
            .arg("-ac")
            .arg("1")
            .arg("-c:a")
            .arg("pcm_s16le")
            .arg(output)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !result.status.success() {
            return Err(PreprocessError::Failed {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(PreprocessError::MissingOutput(output.to_path_buf())),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::write_script;

    fn preprocessor(command: &Path, work_dir: &Path) -> AudioPreprocessor {
        AudioPreprocessor::new(PreprocessConfig {
            enabled: true,
            command_path: command.to_string_lossy().into_owned(),
            work_dir: work_dir.to_string_lossy().into_owned(),
            sample_rate: 16000,
        })
    }

    fn upload(dir: &Path) -> PathBuf {
        let path = dir.join("upload.mp3");
        std::fs::write(&path, b"not really mp3").unwrap();
        path
    }

    #[tokio::test]
    async fn converted_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let converter = write_script(
            dir.path(),
            "ffmpeg",
            "for last; do :; done\nprintf 'RIFF' > \"$last\"\n",
        );
        let input = upload(dir.path());
        let pre = preprocessor(&converter, dir.path());

        let prepared = pre.prepare(&input).await;
        assert!(prepared.is_converted());
        assert!(!prepared.was_degraded());
        assert_ne!(prepared.path(), input.as_path());
        let converted = prepared.path().to_path_buf();
        assert!(converted.exists());
        assert!(converted
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("upload_"));

        drop(prepared);
        assert!(!converted.exists());
        assert!(input.exists());
    }

    #[tokio::test]
    async fn failing_converter_falls_back_to_original() {
        let dir = tempfile::tempdir().unwrap();
        let converter = write_script(dir.path(), "ffmpeg", "echo 'bad input' >&2\nexit 1\n");
        let input = upload(dir.path());

        let prepared = preprocessor(&converter, dir.path()).prepare(&input).await;
        assert!(!prepared.is_converted());
        assert!(prepared.was_degraded());
        assert_eq!(prepared.path(), input.as_path());

        drop(prepared);
        assert!(input.exists());
    }

    #[tokio::test]
    async fn missing_converter_falls_back_to_original() {
        let dir = tempfile::tempdir().unwrap();
        let input = upload(dir.path());

        let prepared = preprocessor(&dir.path().join("no-such-ffmpeg"), dir.path())
            .prepare(&input)
            .await;
        assert!(prepared.was_degraded());
        assert_eq!(prepared.path(), input.as_path());
    }

    #[tokio::test]
    async fn silent_success_without_output_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let converter = write_script(dir.path(), "ffmpeg", "exit 0\n");
        let input = upload(dir.path());

        let prepared = preprocessor(&converter, dir.path()).prepare(&input).await;
        assert!(prepared.was_degraded());
        assert_eq!(prepared.path(), input.as_path());
    }

    #[tokio::test]
    async fn derived_paths_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let pre = preprocessor(Path::new("ffmpeg"), dir.path());
        let input = dir.path().join("same.wav");
        assert_ne!(pre.derive_output_path(&input), pre.derive_output_path(&input));
    }

    #[tokio::test]
    async fn disabled_preprocessor_is_a_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        let input = upload(dir.path());
        let pre = AudioPreprocessor::new(PreprocessConfig {
            enabled: false,
            command_path: "ffmpeg".to_string(),
            work_dir: dir.path().to_string_lossy().into_owned(),
            sample_rate: 16000,
        });

        let prepared = pre.prepare(&input).await;
        assert!(!prepared.is_converted());
        assert!(!prepared.was_degraded());
    }
}
