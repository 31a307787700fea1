// Whisper Gateway data models
//
// Request parameters and the JSON bodies returned by the HTTP API.
// Every body carries a `success` flag; payloads live under `data`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::transcription::TranscriptionOutcome;

/// Parameters extracted from a transcription request
#[derive(Debug, Default)]
pub struct TranscriptionParams {
    /// Language hint from the form, if any
    pub language: Option<String>,
    /// Original file name as sent by the client
    pub file_name: Option<String>,
    /// Size of the upload in bytes
    pub file_size: usize,
}

/// Generic success envelope
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Error response for API
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Always false
    pub success: bool,
    /// Human readable message
    pub error: String,
    /// Stable machine-readable code
    pub code: &'static str,
    /// Debug rendering, development mode only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Payload of a successful transcription
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionData {
    pub transcription: String,
    pub model: String,
    pub language: String,
    /// Recognizer time in milliseconds
    pub processing_time: u64,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub file_name: String,
    pub file_size: usize,
}

impl TranscriptionData {
    pub fn from_outcome(outcome: TranscriptionOutcome, file_name: String, file_size: usize) -> Self {
        Self {
            transcription: outcome.result.text,
            model: outcome.result.model,
            language: outcome.result.language,
            processing_time: outcome.result.processing_time_ms,
            cached: outcome.cached,
            job_id: outcome.job_id,
            file_name,
            file_size,
        }
    }
}

/// Body of GET /health
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok",
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::TranscriptionResult;

    #[test]
    fn transcription_body_uses_camel_case() {
        let outcome = TranscriptionOutcome {
            result: TranscriptionResult {
                text: "bonjour".to_string(),
                model: "base".to_string(),
                language: "fr".to_string(),
                processing_time_ms: 1200,
            },
            cached: true,
            job_id: None,
        };
        let body = serde_json::to_value(SuccessResponse::new(TranscriptionData::from_outcome(
            outcome,
            "clip.mp3".to_string(),
            2048,
        )))
        .unwrap();

        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["transcription"], "bonjour");
        assert_eq!(body["data"]["processingTime"], 1200);
        assert_eq!(body["data"]["fileName"], "clip.mp3");
        assert_eq!(body["data"]["fileSize"], 2048);
        assert_eq!(body["data"]["cached"], true);
        assert!(body["data"].get("jobId").is_none());
    }

    #[test]
    fn error_body_omits_empty_details() {
        let body = serde_json::to_value(ErrorResponse {
            success: false,
            error: "boom".to_string(),
            code: "RECOGNITION_FAILED",
            details: None,
        })
        .unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "RECOGNITION_FAILED");
        assert!(body.get("details").is_none());
    }
}
