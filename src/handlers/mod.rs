// Whisper Gateway HTTP handlers
//
// This module contains the HTTP handlers for the gateway.
// It provides the interface between HTTP requests and the transcription service.

pub mod authentication;
pub mod form;
pub mod routes;

// Re-export handlers for easier access
pub use self::routes::{
    api_status, configure, health, list_languages, list_models, metrics_handler, transcribe,
};
// Re-export authentication middleware
pub use self::authentication::{
    AuthenticatedUser, Authentication, StaticTokenVerifier, TokenVerifier,
};
