// Whisper Gateway configuration
//
// This module contains configuration structures and constants for the gateway.
// It centralizes all configuration parameters and provides defaults from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Default values for configuration
pub mod defaults {
    // Server settings
    pub const HOST: &str = "127.0.0.1";
    pub const PORT: u16 = 8181;
    pub const TIMEOUT_SECONDS: u64 = 480;
    pub const KEEPALIVE_SECONDS: u64 = 480;

    // Temporary directory for uploaded files
    pub const TEMP_DIR: &str = "/tmp/whisper_gateway/uploads";

    // Directory where preprocessed audio is written
    pub const PREPROCESS_DIR: &str = "/tmp/whisper_gateway/preprocessed";

    // Default language for transcription
    pub const LANGUAGE: &str = "en";

    // Default recognizer model
    pub const MODEL: &str = "base";

    // Recognizer binary and its output directory
    pub const WHISPER_CMD: &str = "whisper";
    pub const WHISPER_OUTPUT_DIR: &str = "/tmp/whisper_gateway/output";

    // Audio converter binary
    pub const FFMPEG_CMD: &str = "ffmpeg";

    // Target sample rate of the preprocessed audio
    pub const SAMPLE_RATE: u32 = 16000;

    // Result cache location
    pub const CACHE_DIR: &str = "/tmp/whisper_gateway/cache";
    pub const CACHE_CLEANUP_INTERVAL_HOURS: u64 = 1;

    // Maximum number of recognizer processes running at once
    pub const MAX_CONCURRENT_JOBS: usize = 6;

    // Max upload size (512MB)
    pub const MAX_FILE_SIZE: usize = 536870912;
}

/// Reads and parses an environment variable, falling back to `default`
/// when it is unset or unparsable.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Reads a boolean environment variable accepting the usual spellings.
pub fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Whether error responses may carry debugging details.
pub fn is_development_mode() -> bool {
    env::var("APP_ENV")
        .map(|v| v.eq_ignore_ascii_case("development"))
        .unwrap_or(false)
}

/// HTTP server settings
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Client disconnect timeout in seconds
    pub timeout: u64,
    /// Keep-alive in seconds
    pub keep_alive: u64,
    /// Number of HTTP workers (0 = one per CPU core)
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: env::var("WHISPER_API_HOST").unwrap_or_else(|_| defaults::HOST.to_string()),
            port: env_or("WHISPER_API_PORT", defaults::PORT),
            timeout: env_or("WHISPER_API_TIMEOUT", defaults::TIMEOUT_SECONDS),
            keep_alive: env_or("WHISPER_API_KEEPALIVE", defaults::KEEPALIVE_SECONDS),
            workers: env_or("HTTP_WORKER_NUMBER", 0),
        }
    }
}

impl ServerConfig {
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }
}

/// Configuration for the HTTP handlers
#[derive(Clone, Debug)]
pub struct HandlerConfig {
    /// Directory to store uploaded files
    pub temp_dir: String,
    /// Largest accepted upload in bytes
    pub max_file_size: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            temp_dir: env::var("WHISPER_TMP_FILES")
                .unwrap_or_else(|_| String::from(defaults::TEMP_DIR)),
            max_file_size: env_or("MAX_FILE_SIZE", defaults::MAX_FILE_SIZE),
        }
    }
}

impl HandlerConfig {
    /// Ensures the temporary directory exists
    pub fn ensure_temp_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.temp_dir)
    }
}

/// Configuration for the recognizer command
#[derive(Clone, Debug)]
pub struct WhisperConfig {
    /// Path to the recognizer command
    pub command_path: String,
    /// Optional directory holding downloaded models
    pub models_dir: Option<String>,
    /// Directory the recognizer writes its artifacts into
    pub output_dir: String,
    /// Model used for every request
    pub model: String,
    /// Language used when the request does not give one
    pub default_language: String,
    /// Thread count passed to the recognizer
    pub threads: Option<usize>,
    /// Per-job timeout in seconds (0 = no timeout)
    pub timeout_seconds: u64,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            command_path: env::var("WHISPER_CMD")
                .unwrap_or_else(|_| String::from(defaults::WHISPER_CMD)),
            models_dir: env::var("WHISPER_MODELS_DIR").ok().filter(|s| !s.is_empty()),
            output_dir: env::var("WHISPER_OUTPUT_DIR")
                .unwrap_or_else(|_| String::from(defaults::WHISPER_OUTPUT_DIR)),
            model: env::var("WHISPER_MODEL").unwrap_or_else(|_| String::from(defaults::MODEL)),
            default_language: env::var("WHISPER_LANGUAGE")
                .unwrap_or_else(|_| String::from(defaults::LANGUAGE)),
            threads: env::var("WHISPER_THREADS").ok().and_then(|s| s.parse().ok()),
            timeout_seconds: env_or("WHISPER_TIMEOUT_SECONDS", 0),
        }
    }
}

/// Configuration for the audio converter
#[derive(Clone, Debug)]
pub struct PreprocessConfig {
    /// Run the converter at all
    pub enabled: bool,
    /// Path to the converter binary
    pub command_path: String,
    /// Where converted files are written
    pub work_dir: String,
    /// Target sample rate in Hz
    pub sample_rate: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            enabled: env_flag("AUDIO_PREPROCESSING", true),
            command_path: env::var("FFMPEG_CMD")
                .unwrap_or_else(|_| String::from(defaults::FFMPEG_CMD)),
            work_dir: env::var("PREPROCESS_DIR")
                .unwrap_or_else(|_| String::from(defaults::PREPROCESS_DIR)),
            sample_rate: defaults::SAMPLE_RATE,
        }
    }
}

/// Configuration for the result cache
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: String,
    /// Entry lifetime in hours (0 = entries never expire)
    pub ttl_hours: u64,
    pub cleanup_interval_hours: u64,
    /// Include model and language in the cache key
    pub key_includes_params: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: env_flag("CACHE_ENABLED", true),
            dir: env::var("CACHE_DIR").unwrap_or_else(|_| String::from(defaults::CACHE_DIR)),
            ttl_hours: env_or("CACHE_TTL_HOURS", 0),
            cleanup_interval_hours: env_or(
                "CACHE_CLEANUP_INTERVAL_HOURS",
                defaults::CACHE_CLEANUP_INTERVAL_HOURS,
            ),
            key_includes_params: env_flag("CACHE_KEY_INCLUDES_PARAMS", false),
        }
    }
}

/// Configuration for the admission controller
#[derive(Clone, Debug)]
pub struct AdmissionConfig {
    /// Recognizer processes allowed to run at once
    pub max_concurrent: usize,
    /// Waiters allowed in the queue (0 = unbounded)
    pub max_queue_depth: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrent: env_or("MAX_CONCURRENT_JOBS", defaults::MAX_CONCURRENT_JOBS).max(1),
            max_queue_depth: env_or("MAX_QUEUE_DEPTH", 0),
        }
    }
}

/// Configuration for metrics collection and export
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Type of metrics exporter ("prometheus", "none")
    pub exporter_type: String,
    /// Optional namespace prefixed to every metric name
    pub namespace: Option<String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        let metrics_enabled = env_flag("WHISPER_API_METRICS_ENABLED", true);

        let exporter_type = if !metrics_enabled {
            "disabled".to_string()
        } else {
            env::var("WHISPER_API_METRICS_BACKEND")
                .or_else(|_| env::var("METRICS_BACKEND"))
                .unwrap_or_else(|_| "none".to_string())
        };

        Self {
            exporter_type,
            namespace: env::var("WHISPER_API_METRICS_PREFIX")
                .or_else(|_| env::var("METRICS_PREFIX"))
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }
}

/// Represents the path to an upload's files
#[derive(Debug, Clone)]
pub struct JobPaths {
    /// Unique folder for this upload
    pub folder: PathBuf,
    /// Audio file path
    pub audio_file: PathBuf,
    /// Upload ID (UUID)
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_on_garbage() {
        env::set_var("WHISPER_GATEWAY_TEST_NUMBER", "not-a-number");
        assert_eq!(env_or("WHISPER_GATEWAY_TEST_NUMBER", 7usize), 7);
        env::set_var("WHISPER_GATEWAY_TEST_NUMBER", " 12 ");
        assert_eq!(env_or("WHISPER_GATEWAY_TEST_NUMBER", 7usize), 12);
        env::remove_var("WHISPER_GATEWAY_TEST_NUMBER");
    }

    #[test]
    fn env_flag_accepts_common_spellings() {
        env::set_var("WHISPER_GATEWAY_TEST_FLAG", "off");
        assert!(!env_flag("WHISPER_GATEWAY_TEST_FLAG", true));
        env::set_var("WHISPER_GATEWAY_TEST_FLAG", "YES");
        assert!(env_flag("WHISPER_GATEWAY_TEST_FLAG", false));
        env::set_var("WHISPER_GATEWAY_TEST_FLAG", "maybe");
        assert!(env_flag("WHISPER_GATEWAY_TEST_FLAG", true));
        env::remove_var("WHISPER_GATEWAY_TEST_FLAG");
    }

    #[test]
    fn explicit_worker_count_wins() {
        let config = ServerConfig {
            host: defaults::HOST.to_string(),
            port: defaults::PORT,
            timeout: 1,
            keep_alive: 1,
            workers: 3,
        };
        assert_eq!(config.worker_count(), 3);
        assert!(ServerConfig { workers: 0, ..config }.worker_count() >= 1);
    }
}
