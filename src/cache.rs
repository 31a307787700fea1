//! Result cache
//!
//! Persists fingerprint -> transcription result as one JSON record per key.
//! The cache is an optimization only: read failures degrade to a miss and
//! write failures are logged and dropped, neither reaches the caller.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

use crate::config::CacheConfig;
use crate::transcription::TranscriptionResult;

const ENTRY_EXTENSION: &str = "json";

/// Reasons a cache operation could not complete
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt cache entry: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),
}

/// On-disk record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub result: TranscriptionResult,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Option<chrono::Duration>, now: DateTime<Utc>) -> bool {
        match ttl {
            Some(ttl) => now - self.created_at > ttl,
            None => false,
        }
    }
}

/// Content-addressed store of transcription results
pub struct ResultCache {
    dir: PathBuf,
    enabled: bool,
    ttl: Option<chrono::Duration>,
}

impl ResultCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            dir: PathBuf::from(&config.dir),
            enabled: config.enabled,
            ttl: entry_lifetime(config.ttl_hours),
        }
    }

    /// A cache that never stores anything
    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            enabled: false,
            ttl: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Creates the cache directory. Failure disables nothing: later writes
    /// will simply fail and be logged.
    pub async fn init(&self) {
        if !self.enabled {
            info!("Result cache disabled");
            return;
        }
        match fs::create_dir_all(&self.dir).await {
            Ok(()) => info!("Result cache directory: {}", self.dir.display()),
            Err(e) => warn!(
                "Failed to create cache directory {}: {}",
                self.dir.display(),
                e
            ),
        }
    }

    /// Looks up a cached result. Any failure is reported as a miss.
    pub async fn get(&self, fingerprint: &str) -> Option<TranscriptionResult> {
        if !self.enabled {
            return None;
        }

        match self.read_entry(fingerprint).await {
            Ok(Some(entry)) => {
                if entry.is_expired(self.ttl, Utc::now()) {
                    debug!("Cache entry {} expired", fingerprint);
                    self.remove_entry(fingerprint).await;
                    None
                } else {
                    debug!("Cache hit for {}", fingerprint);
                    Some(entry.result)
                }
            }
            Ok(None) => {
                debug!("Cache miss for {}", fingerprint);
                None
            }
            Err(CacheError::Corrupt(e)) => {
                warn!("Discarding corrupt cache entry {}: {}", fingerprint, e);
                self.remove_entry(fingerprint).await;
                None
            }
            Err(e) => {
                warn!("Cache read failed for {}: {}", fingerprint, e);
                None
            }
        }
    }

    /// Stores a result. Errors are logged and swallowed.
    pub async fn put(&self, fingerprint: &str, result: &TranscriptionResult) {
        if !self.enabled {
            return;
        }
        if let Err(e) = self.write_entry(fingerprint, result).await {
            error!("Failed to cache result for {}: {}", fingerprint, e);
        }
    }

    async fn read_entry(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(fingerprint)?;
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn write_entry(
        &self,
        fingerprint: &str,
        result: &TranscriptionResult,
    ) -> Result<(), CacheError> {
        let path = self.entry_path(fingerprint)?;
        let entry = CacheEntry {
            fingerprint: fingerprint.to_string(),
            result: result.clone(),
            created_at: Utc::now(),
        };
        let data = serde_json::to_vec_pretty(&entry)?;

        // Readers only ever see a complete record
        let tmp_path = self
            .dir
            .join(format!(".{}.{}.tmp", fingerprint, Uuid::new_v4().simple()));
        fs::write(&tmp_path, &data).await?;
        if let Err(e) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        debug!("Cached result for {}", fingerprint);
        Ok(())
    }

    async fn remove_entry(&self, fingerprint: &str) {
        if let Ok(path) = self.entry_path(fingerprint) {
            if let Err(e) = fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove cache entry {}: {}", path.display(), e);
                }
            }
        }
    }

    fn entry_path(&self, fingerprint: &str) -> Result<PathBuf, CacheError> {
        if fingerprint.is_empty() || !fingerprint.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CacheError::InvalidKey(fingerprint.to_string()));
        }
        Ok(self
            .dir
            .join(format!("{}.{}", fingerprint, ENTRY_EXTENSION)))
    }

    /// Removes expired and unreadable entries, returning how many were removed
    pub async fn purge_expired(&self) -> Result<usize, CacheError> {
        if !self.enabled || self.ttl.is_none() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(dir_entry) = entries.next_entry().await? {
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }

            let stale = match read_record(&path).await {
                Ok(entry) => entry.is_expired(self.ttl, now),
                Err(e) => {
                    debug!("Unreadable cache entry {}: {}", path.display(), e);
                    true
                }
            };

            if stale {
                match fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Failed to remove cache entry {}: {}", path.display(), e),
                }
            }
        }

        Ok(removed)
    }

    /// Start a background task to periodically purge expired entries
    pub fn start_cleanup_task(self: Arc<Self>, interval_hours: u64) {
        if !self.enabled || self.ttl.is_none() || interval_hours == 0 {
            return;
        }
        let period = Duration::from_secs(interval_hours * 3600);
        info!(
            "Starting cache cleanup task: interval {} hours",
            interval_hours
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match self.purge_expired().await {
                    Ok(0) => debug!("No expired cache entries"),
                    Ok(count) => info!("Purged {} expired cache entries", count),
                    Err(e) => error!("Error during cache cleanup: {}", e),
                }
            }
        });
    }
}

/// Entry lifetime for `ttl_hours`; 0 or an unrepresentable value means no expiry
fn entry_lifetime(ttl_hours: u64) -> Option<chrono::Duration> {
    if ttl_hours == 0 {
        return None;
    }
    let ttl = i64::try_from(ttl_hours)
        .ok()
        .and_then(chrono::Duration::try_hours);
    if ttl.is_none() {
        warn!(
            "Cache TTL of {} hours is out of range, entries will not expire",
            ttl_hours
        );
    }
    ttl
}

async fn read_record(path: &Path) -> Result<CacheEntry, CacheError> {
    let bytes = fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
