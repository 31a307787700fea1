use super::*;
use crate::admission::AdmissionController;
use crate::handlers::authentication::{Authentication, StaticTokenVerifier};
use crate::recognizer::{RecognitionError, Recognizer};
use crate::transcription::TranscriptionResult;
use actix_web::{http::StatusCode, test, App};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

const BOUNDARY: &str = "----gatewaytestboundary";

/// Echoes the requested language back, never touches the audio
struct EchoRecognizer;

#[async_trait]
impl Recognizer for EchoRecognizer {
    async fn recognize(
        &self,
        audio_path: &Path,
        model: &str,
        language: &str,
    ) -> Result<TranscriptionResult, RecognitionError> {
        if !audio_path.is_file() {
            return Err(RecognitionError::Failed {
                status: "exit status: 1".to_string(),
                stderr: "no such file".to_string(),
            });
        }
        Ok(TranscriptionResult {
            text: format!("hello in {}", language),
            model: model.to_string(),
            language: language.to_string(),
            processing_time_ms: 5,
        })
    }
}

macro_rules! test_app {
    ($temp_dir:expr, $auth_enabled:expr) => {{
        let service = TranscriptionService::new(
            Arc::new(EchoRecognizer),
            AdmissionController::with_limits(2, 0),
            "base",
            "en",
        );
        let config = HandlerConfig {
            temp_dir: $temp_dir.to_string_lossy().into_owned(),
            max_file_size: 1024,
        };
        test::init_service(
            App::new()
                .wrap(Authentication::new(
                    Arc::new(StaticTokenVerifier::parse("secret=alice")),
                    $auth_enabled,
                ))
                .app_data(web::Data::new(service))
                .app_data(web::Data::new(config))
                .app_data(web::Data::new(Metrics::disabled()))
                .configure(configure),
        )
        .await
    }};
}

fn multipart_body(audio: Option<&[u8]>, language: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(language) = language {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"language\"\r\n\r\n{}\r\n",
                BOUNDARY, language
            )
            .as_bytes(),
        );
    }
    if let Some(audio) = audio {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"clip.wav\"\r\nContent-Type: audio/wav\r\n\r\n",
                BOUNDARY
            )
            .as_bytes(),
        );
        body.extend_from_slice(audio);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn transcribe_request(uri: &str, token: Option<&str>, body: Vec<u8>) -> test::TestRequest {
    let mut req = test::TestRequest::post().uri(uri).insert_header((
        "content-type",
        format!("multipart/form-data; boundary={}", BOUNDARY),
    ));
    if let Some(token) = token {
        req = req.insert_header(("authorization", format!("Bearer {}", token)));
    }
    req.set_payload(body)
}

#[actix_web::test]
async fn transcribes_an_upload() {
    let temp = tempfile::tempdir().unwrap();
    let app = test_app!(temp.path(), true);

    let req = transcribe_request(
        "/transcribe",
        Some("secret"),
        multipart_body(Some(b"RIFF fake audio"), Some("fr")),
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["transcription"], "hello in fr");
    assert_eq!(body["data"]["model"], "base");
    assert_eq!(body["data"]["language"], "fr");
    assert_eq!(body["data"]["cached"], false);
    assert_eq!(body["data"]["fileName"], "clip.wav");
    assert_eq!(body["data"]["fileSize"], 15);
    assert!(body["data"]["jobId"].is_string());

    // upload folder is gone once the response is out
    assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[actix_web::test]
async fn language_from_query_and_default() {
    let temp = tempfile::tempdir().unwrap();
    let app = test_app!(temp.path(), true);

    let req = transcribe_request(
        "/transcribe?language=DE",
        Some("secret"),
        multipart_body(Some(b"audio"), None),
    )
    .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["language"], "de");

    let req = transcribe_request(
        "/transcribe?language=de",
        Some("secret"),
        multipart_body(Some(b"audio"), Some("it")),
    )
    .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["language"], "it");

    let req = transcribe_request("/transcribe", Some("secret"), multipart_body(Some(b"audio"), None))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["language"], "en");
}

#[actix_web::test]
async fn rejects_unsupported_language() {
    let temp = tempfile::tempdir().unwrap();
    let app = test_app!(temp.path(), true);

    let req = transcribe_request(
        "/transcribe",
        Some("secret"),
        multipart_body(Some(b"audio"), Some("klingon")),
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNSUPPORTED_LANGUAGE");
}

#[actix_web::test]
async fn missing_audio_field() {
    let temp = tempfile::tempdir().unwrap();
    let app = test_app!(temp.path(), true);

    let req = transcribe_request("/transcribe", Some("secret"), multipart_body(None, Some("fr")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "NO_AUDIO_FILE");
}

#[actix_web::test]
async fn oversized_upload() {
    let temp = tempfile::tempdir().unwrap();
    let app = test_app!(temp.path(), true);

    let audio = vec![0u8; 4096];
    let req = transcribe_request("/transcribe", Some("secret"), multipart_body(Some(&audio), None))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "FILE_TOO_LARGE");
    assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[actix_web::test]
async fn rejects_missing_or_unknown_token() {
    let temp = tempfile::tempdir().unwrap();
    let app = test_app!(temp.path(), true);

    let req = transcribe_request("/transcribe", None, multipart_body(Some(b"audio"), None))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "UNAUTHORIZED");

    let req = transcribe_request("/transcribe", Some("wrong"), multipart_body(Some(b"audio"), None))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get()
        .uri("/status")
        .insert_header(("authorization", "Basic c2VjcmV0"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn anonymous_when_authorization_disabled() {
    let temp = tempfile::tempdir().unwrap();
    let app = test_app!(temp.path(), false);

    let req = transcribe_request("/transcribe", None, multipart_body(Some(b"audio"), None))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn public_paths_need_no_token() {
    let temp = tempfile::tempdir().unwrap();
    let app = test_app!(temp.path(), true);

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ok");

    let req = test::TestRequest::get().uri("/models").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], true);
    assert!(body["data"]
        .as_array()
        .unwrap()
        .iter()
        .any(|m| m["id"] == "base"));

    let req = test::TestRequest::get().uri("/languages").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert!(body["data"]
        .as_array()
        .unwrap()
        .iter()
        .any(|l| l["code"] == "fr"));

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn options_bypasses_authentication() {
    let temp = tempfile::tempdir().unwrap();
    let app = test_app!(temp.path(), true);

    let req = test::TestRequest::default()
        .method(actix_web::http::Method::OPTIONS)
        .uri("/transcribe")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("Allow").unwrap(), "OPTIONS, POST");
}

#[actix_web::test]
async fn status_reports_admission_state() {
    let temp = tempfile::tempdir().unwrap();
    let app = test_app!(temp.path(), true);

    let req = test::TestRequest::get()
        .uri("/status")
        .insert_header(("authorization", "Bearer secret"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["maxConcurrent"], 2);
    assert_eq!(body["data"]["running"], 0);
    assert_eq!(body["data"]["queued"], 0);
    assert_eq!(body["data"]["maxQueueDepth"], 0);
}
