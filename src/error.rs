// Error handling for Whisper Gateway
//
// This module defines the errors returned by the HTTP handlers and how they
// are rendered as JSON. Each variant has a stable code clients can match on.

use std::io;
use thiserror::Error;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

use crate::config::is_development_mode;
use crate::models::ErrorResponse;
use crate::transcription::TranscriptionError;

/// Errors that can occur in the gateway handlers
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Error when processing multipart form data
    #[error("Form error: {0}")]
    FormError(String),

    /// Error when saving file data
    #[error("File error: {0}")]
    FileError(#[from] io::Error),

    /// Error when no audio file was provided
    #[error("No audio file provided in the request")]
    NoAudioFile,

    /// Error when a file is too large
    #[error("File too large: {0} bytes exceeds limit of {1} bytes")]
    FileTooLarge(usize, usize),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Missing or rejected bearer token
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Failure inside the transcription pipeline
    #[error(transparent)]
    Transcription(#[from] TranscriptionError),
}

impl HandlerError {
    /// Create a new FormError
    pub fn form_error<S: Into<String>>(msg: S) -> Self {
        Self::FormError(msg.into())
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            HandlerError::FormError(_) => "FORM_ERROR",
            HandlerError::FileError(_) => "FILE_ERROR",
            HandlerError::NoAudioFile => "NO_AUDIO_FILE",
            HandlerError::FileTooLarge(_, _) => "FILE_TOO_LARGE",
            HandlerError::UnsupportedLanguage(_) => "UNSUPPORTED_LANGUAGE",
            HandlerError::Unauthorized(_) => "UNAUTHORIZED",
            HandlerError::Transcription(e) => e.code(),
        }
    }

    fn to_body(&self, development: bool) -> ErrorResponse {
        ErrorResponse {
            success: false,
            error: self.to_string(),
            code: self.code(),
            details: development.then(|| format!("{:?}", self)),
        }
    }
}

impl ResponseError for HandlerError {
    fn status_code(&self) -> StatusCode {
        match self {
            HandlerError::NoAudioFile
            | HandlerError::FormError(_)
            | HandlerError::UnsupportedLanguage(_) => StatusCode::BAD_REQUEST,
            HandlerError::FileTooLarge(_, _) => StatusCode::PAYLOAD_TOO_LARGE,
            HandlerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            HandlerError::FileError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HandlerError::Transcription(e) => match e {
                TranscriptionError::FileNotFound(_) => StatusCode::BAD_REQUEST,
                TranscriptionError::QueueFull(_) => StatusCode::SERVICE_UNAVAILABLE,
                TranscriptionError::RecognitionTimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
                TranscriptionError::RecognitionFailed(_)
                | TranscriptionError::RecognitionLaunchFailed(_)
                | TranscriptionError::Admission(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.to_body(is_development_mode()))
    }
}
