// Form data processing for Whisper Gateway
//
// Parses the multipart body of a transcription request. The `audio` field is
// streamed straight to disk into a fresh upload folder; `language` is read as
// text. Unknown fields are drained and ignored.

use actix_multipart::{Field, Multipart};
use futures::{StreamExt, TryStreamExt};
use log::{debug, error, info};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::config::HandlerConfig;
use crate::error::HandlerError;
use crate::file_utils::{upload_extension, UploadFolder};
use crate::models::TranscriptionParams;

/// Longest accepted text field
const MAX_TEXT_FIELD_LEN: usize = 256;

/// Extract and process multipart form data for transcription requests
///
/// Returns the parameters and the folder holding the saved upload. The
/// folder is deleted when the returned `UploadFolder` is dropped, including
/// when this function fails halfway.
pub async fn extract_form_data(
    mut form: Multipart,
    config: &HandlerConfig,
) -> Result<(TranscriptionParams, UploadFolder), HandlerError> {
    let mut params = TranscriptionParams::default();
    let mut upload: Option<UploadFolder> = None;

    config.ensure_temp_dir().map_err(|e| {
        error!("Failed to create main tmp directory: {}", e);
        HandlerError::FileError(e)
    })?;

    while let Some(mut field) = form
        .try_next()
        .await
        .map_err(|e| HandlerError::form_error(format!("Malformed multipart body: {}", e)))?
    {
        let content_disposition = field.content_disposition();
        let field_name = content_disposition
            .and_then(|cd| cd.get_name().map(|name| name.to_string()))
            .unwrap_or_default();
        let file_name = content_disposition
            .and_then(|cd| cd.get_filename().map(|name| name.to_string()));

        match field_name.as_str() {
            "language" => {
                let value = read_text_field(&mut field, &field_name).await?;
                if !value.is_empty() {
                    params.language = Some(value);
                }
            }
            "audio" => {
                if upload.is_some() {
                    return Err(HandlerError::form_error("Only one audio file may be sent"));
                }

                let folder = UploadFolder::create(
                    &config.temp_dir,
                    &upload_extension(file_name.as_deref()),
                )
                .map_err(|e| {
                    error!("Failed to create upload directory: {}", e);
                    HandlerError::FileError(e)
                })?;

                let size = save_field(&mut field, folder.audio_file(), config.max_file_size).await?;
                if size == 0 {
                    return Err(HandlerError::NoAudioFile);
                }

                info!(
                    "Saved audio file {} ({} bytes)",
                    folder.audio_file().display(),
                    size
                );
                params.file_name = file_name.or_else(|| Some("audio".to_string()));
                params.file_size = size;
                upload = Some(folder);
            }
            other => {
                debug!("Skipping unknown form field '{}'", other);
                while let Some(chunk) = field.next().await {
                    chunk.map_err(|e| {
                        HandlerError::form_error(format!("Error reading field {}: {}", other, e))
                    })?;
                }
            }
        }
    }

    let upload = upload.ok_or(HandlerError::NoAudioFile)?;
    Ok((params, upload))
}

async fn read_text_field(field: &mut Field, field_name: &str) -> Result<String, HandlerError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| {
            HandlerError::form_error(format!("Error reading field {}: {}", field_name, e))
        })?;
        bytes.extend_from_slice(&chunk);
        if bytes.len() > MAX_TEXT_FIELD_LEN {
            return Err(HandlerError::form_error(format!(
                "Field {} is too long",
                field_name
            )));
        }
    }

    String::from_utf8(bytes)
        .map(|s| s.trim().to_string())
        .map_err(|_| HandlerError::form_error(format!("Field {} is not valid UTF-8", field_name)))
}

/// Streams a file field to `path`, enforcing `max_size`. Returns the byte count.
async fn save_field(
    field: &mut Field,
    path: &std::path::Path,
    max_size: usize,
) -> Result<usize, HandlerError> {
    let mut file = File::create(path).await?;
    let mut total_size = 0usize;

    while let Some(chunk) = field.next().await {
        let data = chunk.map_err(|e| {
            HandlerError::form_error(format!("Error processing file upload: {}", e))
        })?;

        total_size += data.len();
        if total_size > max_size {
            return Err(HandlerError::FileTooLarge(total_size, max_size));
        }

        file.write_all(&data).await?;
    }

    file.flush().await?;
    Ok(total_size)
}
