//! Recognition Invoker
//!
//! Runs the external speech recognizer as a subprocess with a fixed,
//! deterministic argument set and turns its plain-text artifact into a
//! [`TranscriptionResult`].
//!
//! The recognizer is expected to accept the audio path as its first
//! positional argument and to write `<stem>.txt` into `--output_dir`.

use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;

use crate::config::WhisperConfig;
use crate::transcription::TranscriptionResult;

const OUTPUT_FORMAT: &str = "txt";

/// Recognizer failure kinds
#[derive(Error, Debug)]
pub enum RecognitionError {
    /// The process ran but did not produce a transcript
    #[error("Recognizer failed ({status}): {stderr}")]
    Failed { status: String, stderr: String },
    /// The process could not be started at all
    #[error("Failed to launch recognizer '{command}': {source}")]
    LaunchFailed {
        command: String,
        #[source]
        source: io::Error,
    },
    /// The process exceeded the configured time budget and was killed
    #[error("Recognizer timed out after {0} seconds")]
    TimedOut(u64),
}

/// Anything able to turn an audio file into text
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(
        &self,
        audio_path: &Path,
        model: &str,
        language: &str,
    ) -> Result<TranscriptionResult, RecognitionError>;
}

/// Recognizer backed by the whisper command line
pub struct WhisperRecognizer {
    config: WhisperConfig,
}

impl WhisperRecognizer {
    pub fn new(config: WhisperConfig) -> Self {
        Self { config }
    }

    /// Creates the output directory
    pub async fn init(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        info!(
            "Recognizer command: {} (output: {})",
            self.config.command_path, self.config.output_dir
        );
        Ok(())
    }

    /// The recognizer names its artifact after the input file
    pub fn artifact_path(&self, audio_path: &Path) -> PathBuf {
        let stem = audio_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("audio");
        Path::new(&self.config.output_dir).join(format!("{}.{}", stem, OUTPUT_FORMAT))
    }

    fn build_command(&self, audio_path: &Path, model: &str, language: &str) -> Command {
        let mut command = Command::new(&self.config.command_path);

        command.arg(audio_path).arg("--model").arg(model);

        if let Some(models_dir) = &self.config.models_dir {
            command.arg("--model_dir").arg(models_dir);
        }

        command
            .arg("--language")
            .arg(language)
            .arg("--output_dir")
            .arg(&self.config.output_dir)
            .arg("--output_format")
            .arg(OUTPUT_FORMAT)
            .arg("--verbose")
            .arg("False")
            // greedy, single-pass decoding keeps output stable for the cache
            .arg("--temperature")
            .arg("0")
            .arg("--best_of")
            .arg("1")
            .arg("--beam_size")
            .arg("1")
            .arg("--condition_on_previous_text")
            .arg("False");

        if let Some(threads) = self.config.threads {
            command.arg("--threads").arg(threads.to_string());
        }

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        command
    }

    async fn remove_artifact(path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!("Removed recognizer artifact {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove recognizer artifact {}: {}", path.display(), e),
        }
    }
}

#[async_trait]
impl Recognizer for WhisperRecognizer {
    async fn recognize(
        &self,
        audio_path: &Path,
        model: &str,
        language: &str,
    ) -> Result<TranscriptionResult, RecognitionError> {
        let start_time = Instant::now();
        let artifact = self.artifact_path(audio_path);

        let child = self
            .build_command(audio_path, model, language)
            .spawn()
            .map_err(|e| {
                error!("Failed to launch {}: {}", self.config.command_path, e);
                RecognitionError::LaunchFailed {
                    command: self.config.command_path.clone(),
                    source: e,
                }
            })?;

        let waiting = child.wait_with_output();
        let output = if self.config.timeout_seconds > 0 {
            match tokio::time::timeout(Duration::from_secs(self.config.timeout_seconds), waiting)
                .await
            {
                Ok(output) => output,
                Err(_) => {
                    // dropping the wait future kills the child
                    warn!(
                        "Recognizer exceeded {}s on {}, killed",
                        self.config.timeout_seconds,
                        audio_path.display()
                    );
                    Self::remove_artifact(&artifact).await;
                    return Err(RecognitionError::TimedOut(self.config.timeout_seconds));
                }
            }
        } else {
            waiting.await
        };

        let output = output.map_err(|e| RecognitionError::Failed {
            status: "unknown".to_string(),
            stderr: format!("failed to wait for recognizer: {}", e),
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            Self::remove_artifact(&artifact).await;
            return Err(RecognitionError::Failed {
                status: output.status.to_string(),
                stderr,
            });
        }

        let text = match tokio::fs::read_to_string(&artifact).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                return Err(RecognitionError::Failed {
                    status: output.status.to_string(),
                    stderr: format!(
                        "no readable output at {} ({}){}{}",
                        artifact.display(),
                        e,
                        if stderr.is_empty() { "" } else { ": " },
                        stderr
                    ),
                });
            }
        };
        Self::remove_artifact(&artifact).await;

        let processing_time_ms = start_time.elapsed().as_millis() as u64;
        debug!(
            "Recognized {} in {} ms ({} chars)",
            audio_path.display(),
            processing_time_ms,
            text.len()
        );

        Ok(TranscriptionResult {
            text,
            model: model.to_string(),
            language: language.to_string(),
            processing_time_ms,
        })
    }
}
