// Whisper Gateway Library
//
// This crate provides an HTTP API for audio transcription backed by an
// external speech recognizer. Requests share a bounded pool of recognizer
// slots, and identical audio is answered from a content-addressed cache.

pub mod admission;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod config_loader;
pub mod config_validator;
pub mod error;
pub mod file_utils;
pub mod fingerprint;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod preprocess;
pub mod recognizer;
pub mod transcription;

#[cfg(test)]
mod test_support;

// Re-export common types for easier access
pub use admission::{AdmissionController, AdmissionSlot, AdmissionSnapshot};
pub use cache::ResultCache;
pub use config::{
    AdmissionConfig, CacheConfig, HandlerConfig, MetricsConfig, PreprocessConfig, ServerConfig,
    WhisperConfig,
};
pub use error::HandlerError;
pub use handlers::{configure, Authentication};
pub use metrics::Metrics;
pub use models::{ErrorResponse, SuccessResponse, TranscriptionData};
pub use preprocess::AudioPreprocessor;
pub use recognizer::{Recognizer, WhisperRecognizer};
pub use transcription::{TranscriptionError, TranscriptionOutcome, TranscriptionService};
