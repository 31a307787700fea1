// Transcription job and result types
//
// A job exists from the moment a cache miss is confirmed until its result is
// handed back to the caller. The registry only tracks live jobs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;

/// Job status enum for tracking the progress of transcription jobs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Audio is being normalized
    Preprocessing,
    /// Waiting for an admission slot
    Queued,
    /// Recognizer is running
    Running,
    /// Recognizer returned text
    Completed,
    /// Recognizer failed
    Failed,
}

/// Transcription job structure
#[derive(Debug, Clone)]
pub struct TranscriptionJob {
    /// Unique identifier for the job
    pub id: String,
    /// Path to the audio file
    pub audio_path: PathBuf,
    /// Language code for transcription
    pub language: String,
    /// Model name to use
    pub model: String,
}

impl TranscriptionJob {
    pub fn new(audio_path: impl Into<PathBuf>, language: &str, model: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            audio_path: audio_path.into(),
            language: language.to_string(),
            model: model.to_string(),
        }
    }
}

/// Transcription result structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranscriptionResult {
    /// Transcription text
    pub text: String,
    /// Model that produced the text
    pub model: String,
    /// Language the recognizer was asked for
    pub language: String,
    /// Wall-clock recognizer time in milliseconds
    pub processing_time_ms: u64,
}

/// Status of every live job by id
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, JobStatus>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_jobs<R>(&self, f: impl FnOnce(&mut HashMap<String, JobStatus>) -> R) -> R {
        let mut jobs = self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut jobs)
    }

    /// Tracks `job` until the returned guard is dropped. Every job enters
    /// the registry as `Preprocessing`.
    pub fn register(&self, job: &TranscriptionJob) -> RegisteredJob<'_> {
        self.with_jobs(|jobs| jobs.insert(job.id.clone(), JobStatus::Preprocessing));
        RegisteredJob {
            registry: self,
            id: job.id.clone(),
        }
    }

    pub fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.with_jobs(|jobs| jobs.get(job_id).copied())
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.with_jobs(|jobs| jobs.values().filter(|s| **s == status).count())
    }

    pub fn len(&self) -> usize {
        self.with_jobs(|jobs| jobs.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registry entry of a live job; removed on drop
pub struct RegisteredJob<'a> {
    registry: &'a JobRegistry,
    id: String,
}

impl RegisteredJob<'_> {
    pub fn set_status(&self, status: JobStatus) {
        self.registry.with_jobs(|jobs| {
            if let Some(current) = jobs.get_mut(&self.id) {
                *current = status;
            }
        });
    }
}

impl Drop for RegisteredJob<'_> {
    fn drop(&mut self) {
        self.registry.with_jobs(|jobs| jobs.remove(&self.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_lasts_as_long_as_the_guard() {
        let registry = JobRegistry::new();
        let job = TranscriptionJob::new("/tmp/a.wav", "en", "base");

        {
            let entry = registry.register(&job);
            assert_eq!(registry.status(&job.id), Some(JobStatus::Preprocessing));
            entry.set_status(JobStatus::Running);
            assert_eq!(registry.count(JobStatus::Running), 1);
        }

        assert_eq!(registry.status(&job.id), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn job_ids_are_unique() {
        let a = TranscriptionJob::new("/tmp/a.wav", "en", "base");
        let b = TranscriptionJob::new("/tmp/a.wav", "en", "base");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn result_round_trips_through_json() {
        let result = TranscriptionResult {
            text: "hello".to_string(),
            model: "small".to_string(),
            language: "en".to_string(),
            processing_time_ms: 42,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(serde_json::from_str::<TranscriptionResult>(&json).unwrap(), result);
    }
}
