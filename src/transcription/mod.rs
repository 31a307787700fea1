//! Transcription Orchestrator
//!
//! Runs one request through the pipeline:
//! cache lookup, preprocessing, admission, recognition, cache store.
//!
//! Every resource taken along the way is held by a guard (`RegisteredJob`,
//! `PreparedAudio`, `AdmissionSlot`), so an early return or a dropped request
//! future releases the slot and deletes the intermediate file exactly once.

pub mod job;


pub use job::{JobRegistry, JobStatus, RegisteredJob, TranscriptionJob, TranscriptionResult};

use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::admission::{AdmissionController, AdmissionError, AdmissionSnapshot};
use crate::cache::ResultCache;
use crate::fingerprint::{fingerprint_file, scoped_key};
use crate::metrics::Metrics;
use crate::preprocess::AudioPreprocessor;
use crate::recognizer::{RecognitionError, Recognizer};

/// Failures surfaced to the caller of a transcription
#[derive(Error, Debug)]
pub enum TranscriptionError {
    #[error("Audio file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Recognition failed: {0}")]
    RecognitionFailed(String),

    #[error("Failed to launch recognizer: {0}")]
    RecognitionLaunchFailed(String),

    #[error("Recognition timed out after {0} seconds")]
    RecognitionTimedOut(u64),

    #[error("Too many jobs waiting ({0}), try again later")]
    QueueFull(usize),

    #[error("Admission error: {0}")]
    Admission(AdmissionError),
}

impl TranscriptionError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            TranscriptionError::FileNotFound(_) => "FILE_NOT_FOUND",
            TranscriptionError::RecognitionFailed(_) => "RECOGNITION_FAILED",
            TranscriptionError::RecognitionLaunchFailed(_) => "RECOGNITION_LAUNCH_FAILED",
            TranscriptionError::RecognitionTimedOut(_) => "RECOGNITION_TIMEOUT",
            TranscriptionError::QueueFull(_) => "QUEUE_FULL",
            TranscriptionError::Admission(_) => "ADMISSION_ERROR",
        }
    }
}

impl From<AdmissionError> for TranscriptionError {
    fn from(error: AdmissionError) -> Self {
        match error {
            AdmissionError::QueueFull(waiting) => TranscriptionError::QueueFull(waiting),
            other => TranscriptionError::Admission(other),
        }
    }
}

impl From<RecognitionError> for TranscriptionError {
    fn from(error: RecognitionError) -> Self {
        match error {
            RecognitionError::Failed { status, stderr } => {
                TranscriptionError::RecognitionFailed(format!("{}: {}", status, stderr))
            }
            RecognitionError::LaunchFailed { command, source } => {
                TranscriptionError::RecognitionLaunchFailed(format!("{}: {}", command, source))
            }
            RecognitionError::TimedOut(seconds) => TranscriptionError::RecognitionTimedOut(seconds),
        }
    }
}

/// Result of a transcription plus how it was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionOutcome {
    pub result: TranscriptionResult,
    /// Served from the result cache without running the recognizer
    pub cached: bool,
    /// Id of the job that ran the recognizer; `None` on a cache hit
    pub job_id: Option<String>,
}

/// Composes cache, preprocessor, admission controller and recognizer
pub struct TranscriptionService {
    cache: Arc<ResultCache>,
    preprocessor: AudioPreprocessor,
    admission: Arc<AdmissionController>,
    recognizer: Arc<dyn Recognizer>,
    registry: JobRegistry,
    model: String,
    default_language: String,
    /// Cache key covers model and language, not only the audio bytes
    key_includes_params: bool,
    metrics: Metrics,
}

impl TranscriptionService {
    /// Service with caching and preprocessing turned off; see the `with_*`
    /// methods to enable them.
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        admission: Arc<AdmissionController>,
        model: &str,
        default_language: &str,
    ) -> Self {
        Self {
            cache: Arc::new(ResultCache::disabled()),
            preprocessor: AudioPreprocessor::disabled(),
            admission,
            recognizer,
            registry: JobRegistry::new(),
            model: model.to_string(),
            default_language: default_language.to_string(),
            key_includes_params: false,
            metrics: Metrics::disabled(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<ResultCache>, key_includes_params: bool) -> Self {
        self.cache = cache;
        self.key_includes_params = key_includes_params;
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: AudioPreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// Status of a live job; `None` once its request has settled
    pub fn job_status(&self, job_id: &str) -> Option<JobStatus> {
        self.registry.status(job_id)
    }

    /// 1-based position of a job waiting for admission
    pub fn queue_position(&self, job_id: &str) -> Option<usize> {
        self.admission.queue_position(job_id)
    }

    pub fn snapshot(&self) -> AdmissionSnapshot {
        self.admission.snapshot()
    }

    /// Transcribes `audio_path` with the configured model.
    ///
    /// `language` falls back to the configured default when absent or empty.
    pub async fn transcribe(
        &self,
        audio_path: &Path,
        user_id: &str,
        language: Option<&str>,
    ) -> Result<TranscriptionOutcome, TranscriptionError> {
        let language = language
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(self.default_language.as_str());
        let job = TranscriptionJob::new(audio_path, language, &self.model);
        self.run_job(job, user_id).await
    }

    /// Runs a job whose id was assigned by the caller.
    pub async fn run_job(
        &self,
        job: TranscriptionJob,
        user_id: &str,
    ) -> Result<TranscriptionOutcome, TranscriptionError> {
        match tokio::fs::metadata(&job.audio_path).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(TranscriptionError::FileNotFound(job.audio_path.clone())),
        }

        let cache_key = self.cache_key(&job).await;
        if let Some(key) = &cache_key {
            if let Some(result) = self.cache.get(key).await {
                self.metrics.record_cache_lookup(true).await;
                info!(
                    "Serving cached transcription for {} (user {})",
                    job.audio_path.display(),
                    user_id
                );
                return Ok(TranscriptionOutcome {
                    result,
                    cached: true,
                    job_id: None,
                });
            }
            self.metrics.record_cache_lookup(false).await;
        }

        let entry = self.registry.register(&job);
        self.metrics
            .record_job_submitted(&job.model, &job.language)
            .await;
        info!(
            "Job {} submitted by user {} ({}, model {}, language {})",
            job.id,
            user_id,
            job.audio_path.display(),
            job.model,
            job.language
        );

        let prepared = self.preprocessor.prepare(&job.audio_path).await;
        let outcome = if prepared.is_converted() {
            "converted"
        } else if prepared.was_degraded() {
            "degraded"
        } else {
            "skipped"
        };
        self.metrics.record_preprocessing(outcome).await;

        entry.set_status(JobStatus::Queued);
        let wait_started = Instant::now();
        let slot = self.admission.acquire(&job.id).await?;
        self.metrics
            .record_queue_wait(wait_started.elapsed().as_secs_f64())
            .await;
        self.publish_admission().await;

        entry.set_status(JobStatus::Running);
        debug!("Job {} running on {}", job.id, prepared.path().display());

        let started = Instant::now();
        let recognized = self
            .recognizer
            .recognize(prepared.path(), &job.model, &job.language)
            .await;
        slot.release();
        self.publish_admission().await;
        let elapsed = started.elapsed().as_secs_f64();

        match recognized {
            Ok(result) => {
                entry.set_status(JobStatus::Completed);
                self.metrics
                    .record_job_completed(&job.model, &job.language, elapsed, "completed")
                    .await;
                info!(
                    "Job {} completed in {} ms",
                    job.id, result.processing_time_ms
                );
                if let Some(key) = &cache_key {
                    self.cache.put(key, &result).await;
                }
                Ok(TranscriptionOutcome {
                    result,
                    cached: false,
                    job_id: Some(job.id.clone()),
                })
            }
            Err(e) => {
                entry.set_status(JobStatus::Failed);
                self.metrics
                    .record_job_completed(&job.model, &job.language, elapsed, "failed")
                    .await;
                error!("Job {} failed: {}", job.id, e);
                Err(e.into())
            }
        }
    }

    async fn cache_key(&self, job: &TranscriptionJob) -> Option<String> {
        if !self.cache.is_enabled() {
            return None;
        }
        match fingerprint_file(&job.audio_path).await {
            Ok(fp) if self.key_includes_params => Some(scoped_key(&fp, &job.model, &job.language)),
            Ok(fp) => Some(fp),
            Err(e) => {
                warn!(
                    "Could not fingerprint {}, skipping cache: {}",
                    job.audio_path.display(),
                    e
                );
                None
            }
        }
    }

    async fn publish_admission(&self) {
        let snapshot = self.admission.snapshot();
        self.metrics
            .record_admission(snapshot.running, snapshot.queued)
            .await;
    }
}
