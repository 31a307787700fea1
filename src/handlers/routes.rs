// API route handlers for Whisper Gateway
//
// This module contains the route handlers for the gateway.
// It implements the actual HTTP endpoints for the API.

use crate::catalog::{is_supported_language, LANGUAGES, MODELS};
use crate::config::HandlerConfig;
use crate::error::HandlerError;
use crate::handlers::authentication::AuthenticatedUser;
use crate::handlers::form::extract_form_data;
use crate::metrics::Metrics;
use crate::models::{HealthResponse, SuccessResponse, TranscriptionData};
use crate::transcription::TranscriptionService;
use actix_multipart::Multipart;
use actix_web::{get, options, post, web, HttpResponse, ResponseError};
use log::{error, info};
use serde::Deserialize;
use std::time::Instant;

#[derive(Debug, Deserialize)]
pub struct LanguageQuery {
    pub language: Option<String>,
}

/// Handler for transcription requests
///
/// Receives an audio file as the multipart field `audio` and returns its
/// transcription once recognition is done. The language comes from the
/// `language` form field, then the `language` query parameter, then the
/// configured default.
#[post("/transcribe")]
pub async fn transcribe(
    form: Multipart,
    query: web::Query<LanguageQuery>,
    user: AuthenticatedUser,
    service: web::Data<TranscriptionService>,
    config: web::Data<HandlerConfig>,
    metrics: web::Data<Metrics>,
) -> Result<HttpResponse, HandlerError> {
    let start_time = Instant::now();

    let result = process_transcription(form, query.into_inner(), &user, &service, &config, &metrics).await;

    let status = match &result {
        Ok(_) => "200".to_string(),
        Err(e) => {
            error!("Transcription request from {} failed: {}", user.uid, e);
            e.status_code().as_u16().to_string()
        }
    };
    metrics
        .record_http_request(
            "/transcribe",
            "POST",
            &status,
            start_time.elapsed().as_secs_f64(),
        )
        .await;

    result
}

async fn process_transcription(
    form: Multipart,
    query: LanguageQuery,
    user: &AuthenticatedUser,
    service: &TranscriptionService,
    config: &HandlerConfig,
    metrics: &Metrics,
) -> Result<HttpResponse, HandlerError> {
    // the upload folder lives until the response is built
    let (params, upload) = extract_form_data(form, config).await?;
    metrics.record_file_size(params.file_size).await;

    let language = params
        .language
        .or(query.language)
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty());
    if let Some(language) = &language {
        if !is_supported_language(language) {
            return Err(HandlerError::UnsupportedLanguage(language.clone()));
        }
    }

    info!(
        "Upload {} from {}: {} ({} bytes)",
        upload.id(),
        user.uid,
        params.file_name.as_deref().unwrap_or("audio"),
        params.file_size
    );

    let outcome = service
        .transcribe(upload.audio_file(), &user.uid, language.as_deref())
        .await?;

    let data = TranscriptionData::from_outcome(
        outcome,
        params.file_name.unwrap_or_else(|| "audio".to_string()),
        params.file_size,
    );
    Ok(HttpResponse::Ok().json(SuccessResponse::new(data)))
}

/// Handler for OPTIONS requests to the transcription endpoint
#[options("/transcribe")]
pub async fn transcription_options() -> HttpResponse {
    let allowed_methods = "OPTIONS, POST";

    HttpResponse::Ok()
        .append_header(("Allow", allowed_methods))
        .append_header(("Access-Control-Allow-Methods", allowed_methods))
        .append_header((
            "Access-Control-Allow-Headers",
            "Authorization, Content-Type",
        ))
        .append_header(("Access-Control-Max-Age", "86400"))
        .finish()
}

/// Models the recognizer can be configured with
#[get("/models")]
pub async fn list_models() -> HttpResponse {
    HttpResponse::Ok().json(SuccessResponse::new(&*MODELS))
}

/// Languages accepted by /transcribe
#[get("/languages")]
pub async fn list_languages() -> HttpResponse {
    HttpResponse::Ok().json(SuccessResponse::new(&*LANGUAGES))
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse::ok())
}

/// Admission controller occupancy
#[get("/status")]
pub async fn api_status(service: web::Data<TranscriptionService>) -> HttpResponse {
    HttpResponse::Ok().json(SuccessResponse::new(service.snapshot()))
}

/// Metrics endpoint handler
#[get("/metrics")]
pub async fn metrics_handler(metrics: web::Data<Metrics>) -> HttpResponse {
    match metrics.export().await {
        Ok(data) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4; charset=utf-8")
            .body(data),
        Err(e) => {
            error!("Failed to export metrics: {}", e);
            HttpResponse::InternalServerError().body(format!("Failed to export metrics: {}", e))
        }
    }
}

/// Registers every route on an app or scope
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(transcribe)
        .service(transcription_options)
        .service(list_models)
        .service(list_languages)
        .service(health)
        .service(api_status)
        .service(metrics_handler);
}

#[cfg(test)]
mod tests;
