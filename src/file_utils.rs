// File utilities for Whisper Gateway
//
// Each upload gets its own folder under the temp directory. The folder is
// owned by an `UploadFolder` and removed with everything in it when the
// request that created it is finished, whatever the outcome.

use log::{debug, error};
use std::fs;
use std::io;
use std::path::Path;
use uuid::Uuid;

use crate::config::JobPaths;

/// Longest extension kept from a client supplied file name
const MAX_EXTENSION_LEN: usize = 8;

/// Generate a unique folder and audio file path for an upload
///
/// The audio file is named after the upload id so that recognizer
/// artifacts, which take the input's stem, never collide.
///
/// # Errors
///
/// Returns an IO error if directory creation fails
pub fn generate_unique_job_paths(base_dir: &str, extension: &str) -> io::Result<JobPaths> {
    let id = Uuid::new_v4().to_string();
    let folder = Path::new(base_dir).join(&id);

    fs::create_dir_all(&folder)?;

    let audio_file = folder.join(format!("{}.{}", id, extension));

    Ok(JobPaths {
        folder,
        audio_file,
        id,
    })
}

/// Extension to store an upload under, derived from the client's file name.
///
/// Anything that is not a short alphanumeric extension becomes `audio`.
pub fn upload_extension(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "audio".to_string())
}

/// Clean up a folder and its contents
///
/// This function logs errors but doesn't return them to the caller
pub fn cleanup_folder(folder_path: &Path) {
    match fs::remove_dir_all(folder_path) {
        Ok(()) => debug!("Cleaned up folder: {}", folder_path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => error!("Failed to clean up folder {}: {}", folder_path.display(), e),
    }
}

/// Upload folder removed on drop
#[derive(Debug)]
pub struct UploadFolder {
    paths: JobPaths,
}

impl UploadFolder {
    pub fn create(base_dir: &str, extension: &str) -> io::Result<Self> {
        Ok(Self {
            paths: generate_unique_job_paths(base_dir, extension)?,
        })
    }

    pub fn id(&self) -> &str {
        &self.paths.id
    }

    pub fn folder(&self) -> &Path {
        &self.paths.folder
    }

    pub fn audio_file(&self) -> &Path {
        &self.paths.audio_file
    }
}

impl Drop for UploadFolder {
    fn drop(&mut self) {
        cleanup_folder(&self.paths.folder);
    }
}
