// Configuration validation module for Whisper Gateway
//
// Settings are read leniently by `config`: an unparsable value silently falls
// back to its default. This module checks every known parameter up front so
// such mistakes are reported at startup with an actionable message.
//
// The validation system is schema-driven, with a centralized parameter registry
// that defines validation rules, default values, and constraints for all configuration options.

use std::env;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;

use log::{error, info, warn};
use thiserror::Error;

use crate::catalog::{is_known_model, is_supported_language};
use crate::config::defaults;

/// Configuration parameter types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigType {
    String,
    UnsignedInteger,
    Boolean,
    IpAddress,
    Port,
    DirectoryPath,
    Model,
    Language,
    Enum(&'static [&'static str]),
}

/// Validation severity levels
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidationLevel {
    Critical, // Must be valid for application to start
    Warning,  // Optional, generates warnings only
}

/// Configuration parameter definition
#[derive(Debug, Clone)]
pub struct ConfigParam {
    pub name: &'static str,
    pub description: &'static str,
    pub param_type: ConfigType,
    pub default_value: Option<&'static str>,
    pub required: bool,
    pub validation_level: ValidationLevel,
    pub min_value: Option<u64>,
    pub max_value: Option<u64>,
}

impl ConfigParam {
    const fn new(
        name: &'static str,
        description: &'static str,
        param_type: ConfigType,
        default_value: Option<&'static str>,
    ) -> Self {
        Self {
            name,
            description,
            param_type,
            default_value,
            required: false,
            validation_level: ValidationLevel::Critical,
            min_value: None,
            max_value: None,
        }
    }

    const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    const fn warning(mut self) -> Self {
        self.validation_level = ValidationLevel::Warning;
        self
    }

    const fn range(mut self, min: u64, max: Option<u64>) -> Self {
        self.min_value = Some(min);
        self.max_value = max;
        self
    }
}

/// Centralized configuration parameter registry
pub const CONFIG_PARAMS: &[ConfigParam] = &[
    // Server Configuration
    ConfigParam::new(
        "WHISPER_API_HOST",
        "Host IP address for the API server",
        ConfigType::IpAddress,
        Some(defaults::HOST),
    ),
    ConfigParam::new(
        "WHISPER_API_PORT",
        "Port for the API server",
        ConfigType::Port,
        Some("8181"),
    ),
    ConfigParam::new(
        "WHISPER_API_TIMEOUT",
        "Client disconnect timeout in seconds",
        ConfigType::UnsignedInteger,
        Some("480"),
    )
    .range(1, Some(3600)),
    ConfigParam::new(
        "WHISPER_API_KEEPALIVE",
        "Keep-alive timeout in seconds",
        ConfigType::UnsignedInteger,
        Some("480"),
    )
    .range(1, Some(3600)),
    ConfigParam::new(
        "HTTP_WORKER_NUMBER",
        "Number of HTTP workers (0 = use CPU cores)",
        ConfigType::UnsignedInteger,
        Some("0"),
    )
    .range(0, Some(64)),
    ConfigParam::new(
        "WHISPER_TMP_FILES",
        "Directory for uploaded files",
        ConfigType::String,
        Some(defaults::TEMP_DIR),
    ),
    ConfigParam::new(
        "MAX_FILE_SIZE",
        "Largest accepted upload in bytes",
        ConfigType::UnsignedInteger,
        Some("536870912"),
    )
    .range(1, None),
    // Authentication
    ConfigParam::new(
        "ENABLE_AUTHORIZATION",
        "Require a bearer token on non-public endpoints",
        ConfigType::Boolean,
        Some("true"),
    ),
    ConfigParam::new(
        "API_TOKENS",
        "Accepted bearer tokens as token=uid[:email], comma separated",
        ConfigType::String,
        None,
    )
    .warning(),
    ConfigParam::new(
        "APP_ENV",
        "Set to development to include debug details in error bodies",
        ConfigType::Enum(&["development", "production"]),
        Some("production"),
    )
    .warning(),
    // Recognizer
    ConfigParam::new(
        "WHISPER_CMD",
        "Recognizer command or path",
        ConfigType::String,
        Some(defaults::WHISPER_CMD),
    )
    .required(),
    ConfigParam::new(
        "WHISPER_MODEL",
        "Model used for every transcription",
        ConfigType::Model,
        Some(defaults::MODEL),
    )
    .warning(),
    ConfigParam::new(
        "WHISPER_LANGUAGE",
        "Language used when a request does not give one",
        ConfigType::Language,
        Some(defaults::LANGUAGE),
    ),
    ConfigParam::new(
        "WHISPER_MODELS_DIR",
        "Directory holding downloaded models",
        ConfigType::DirectoryPath,
        None,
    )
    .warning(),
    ConfigParam::new(
        "WHISPER_OUTPUT_DIR",
        "Directory the recognizer writes its artifacts into",
        ConfigType::String,
        Some(defaults::WHISPER_OUTPUT_DIR),
    ),
    ConfigParam::new(
        "WHISPER_THREADS",
        "Thread count passed to the recognizer",
        ConfigType::UnsignedInteger,
        None,
    )
    .range(1, Some(256)),
    ConfigParam::new(
        "WHISPER_TIMEOUT_SECONDS",
        "Per-job recognizer timeout in seconds (0 = none)",
        ConfigType::UnsignedInteger,
        Some("0"),
    )
    .range(0, Some(86400)),
    // Preprocessing
    ConfigParam::new(
        "AUDIO_PREPROCESSING",
        "Convert uploads to 16 kHz mono WAV before recognition",
        ConfigType::Boolean,
        Some("true"),
    ),
    ConfigParam::new(
        "FFMPEG_CMD",
        "Audio converter command or path",
        ConfigType::String,
        Some(defaults::FFMPEG_CMD),
    ),
    ConfigParam::new(
        "PREPROCESS_DIR",
        "Directory for converted audio",
        ConfigType::String,
        Some(defaults::PREPROCESS_DIR),
    ),
    // Cache
    ConfigParam::new(
        "CACHE_ENABLED",
        "Reuse results for identical audio",
        ConfigType::Boolean,
        Some("true"),
    ),
    ConfigParam::new(
        "CACHE_DIR",
        "Directory for cached results",
        ConfigType::String,
        Some(defaults::CACHE_DIR),
    ),
    ConfigParam::new(
        "CACHE_TTL_HOURS",
        "Cached result lifetime in hours (0 = forever)",
        ConfigType::UnsignedInteger,
        Some("0"),
    )
    .range(0, Some(876_000)),
    ConfigParam::new(
        "CACHE_CLEANUP_INTERVAL_HOURS",
        "Hours between expired entry sweeps",
        ConfigType::UnsignedInteger,
        Some("1"),
    )
    .range(1, Some(720)),
    ConfigParam::new(
        "CACHE_KEY_INCLUDES_PARAMS",
        "Key cached results on model and language as well as audio",
        ConfigType::Boolean,
        Some("false"),
    ),
    // Admission
    ConfigParam::new(
        "MAX_CONCURRENT_JOBS",
        "Recognizer processes allowed to run at once",
        ConfigType::UnsignedInteger,
        Some("6"),
    )
    .range(1, Some(256)),
    ConfigParam::new(
        "MAX_QUEUE_DEPTH",
        "Requests allowed to wait for a slot (0 = unbounded)",
        ConfigType::UnsignedInteger,
        Some("0"),
    )
    .range(0, None),
    // Metrics
    ConfigParam::new(
        "WHISPER_API_METRICS_ENABLED",
        "Enable metrics collection",
        ConfigType::Boolean,
        Some("true"),
    ),
    ConfigParam::new(
        "WHISPER_API_METRICS_BACKEND",
        "Metrics backend type",
        ConfigType::Enum(&["prometheus", "none", "null", "disabled"]),
        Some("none"),
    ),
    ConfigParam::new(
        "WHISPER_API_METRICS_PREFIX",
        "Namespace prefixed to every metric name",
        ConfigType::String,
        None,
    )
    .warning(),
];

/// Configuration validation errors with detailed context
#[derive(Error, Debug, Clone)]
#[error("Configuration error in '{field}' ({error_type:?}): {message} (value: '{value}'){}", suggestion_suffix(.suggestion))]
pub struct ConfigValidationError {
    pub field: String,
    pub value: String,
    pub error_type: ConfigErrorType,
    pub message: String,
    pub suggestion: Option<String>,
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(" - Suggestion: {}", s))
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigErrorType {
    InvalidValue,
    InvalidFormat,
    InvalidRange,
    DirectoryNotFound,
    Required,
}

/// Result type for configuration validation
pub type ValidationResult<T> = Result<T, ConfigValidationError>;

/// Configuration validation results
#[derive(Debug, Default)]
pub struct ValidationResults {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ConfigValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ConfigValidationError) {
        self.warnings.push(warning);
    }

    fn add(&mut self, level: ValidationLevel, error: ConfigValidationError) {
        match level {
            ValidationLevel::Critical => self.add_error(error),
            ValidationLevel::Warning => self.add_warning(error),
        }
    }

    pub fn print_summary(&self) {
        if !self.errors.is_empty() {
            error!(
                "Configuration validation found {} error(s):",
                self.errors.len()
            );
            for (i, err) in self.errors.iter().enumerate() {
                error!("  {}. {}", i + 1, err);
            }
        }

        if !self.warnings.is_empty() {
            warn!(
                "Configuration validation found {} warning(s):",
                self.warnings.len()
            );
            for (i, warn) in self.warnings.iter().enumerate() {
                warn!("  {}. {}", i + 1, warn);
            }
        }

        if self.is_valid() && self.warnings.is_empty() {
            info!("Configuration validation passed successfully");
        } else if self.is_valid() {
            info!(
                "Configuration validation passed with {} warning(s)",
                self.warnings.len()
            );
        }
    }
}

/// Helper functions for common validation patterns
pub mod validators {
    use super::*;

    fn invalid(
        field: &str,
        value: &str,
        error_type: ConfigErrorType,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> ConfigValidationError {
        ConfigValidationError {
            field: field.to_string(),
            value: value.to_string(),
            error_type,
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }

    /// Validate boolean values from string
    pub fn validate_boolean(field: &str, value: &str) -> ValidationResult<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(invalid(
                field,
                value,
                ConfigErrorType::InvalidValue,
                "Invalid boolean value",
                "Use 'true' or 'false'",
            )),
        }
    }

    /// Validate unsigned integer values with optional range
    pub fn validate_unsigned(
        field: &str,
        value: &str,
        min: Option<u64>,
        max: Option<u64>,
    ) -> ValidationResult<u64> {
        let parsed = value.trim().parse::<u64>().map_err(|_| {
            invalid(
                field,
                value,
                ConfigErrorType::InvalidFormat,
                "Invalid unsigned integer format",
                "Use a valid positive integer number",
            )
        })?;

        if let Some(min) = min {
            if parsed < min {
                return Err(invalid(
                    field,
                    value,
                    ConfigErrorType::InvalidRange,
                    format!("Value {} is below minimum {}", parsed, min),
                    format!("Use a value >= {}", min),
                ));
            }
        }

        if let Some(max) = max {
            if parsed > max {
                return Err(invalid(
                    field,
                    value,
                    ConfigErrorType::InvalidRange,
                    format!("Value {} is above maximum {}", parsed, max),
                    format!("Use a value <= {}", max),
                ));
            }
        }

        Ok(parsed)
    }

    /// Validate enumerated values, case-insensitively
    pub fn validate_enum(field: &str, value: &str, valid_values: &[&str]) -> ValidationResult<String> {
        if valid_values.iter().any(|v| v.eq_ignore_ascii_case(value.trim())) {
            Ok(value.trim().to_lowercase())
        } else {
            Err(invalid(
                field,
                value,
                ConfigErrorType::InvalidValue,
                format!("Invalid value, must be one of: {}", valid_values.join(", ")),
                format!("Use one of: {}", valid_values.join(", ")),
            ))
        }
    }

    /// Validate IP address
    pub fn validate_ip_address(field: &str, value: &str) -> ValidationResult<IpAddr> {
        IpAddr::from_str(value.trim()).map_err(|_| {
            invalid(
                field,
                value,
                ConfigErrorType::InvalidFormat,
                "Invalid IP address format",
                "Use a valid IPv4 or IPv6 address (e.g., 127.0.0.1 or ::1)",
            )
        })
    }

    /// Validate port number
    pub fn validate_port(field: &str, value: &str) -> ValidationResult<u16> {
        match value.trim().parse::<u16>() {
            Ok(0) => Err(invalid(
                field,
                value,
                ConfigErrorType::InvalidRange,
                "Port number cannot be 0",
                "Use a port between 1 and 65535",
            )),
            Ok(port) => Ok(port),
            Err(_) => Err(invalid(
                field,
                value,
                ConfigErrorType::InvalidFormat,
                "Invalid port number format",
                "Use a number between 1 and 65535",
            )),
        }
    }

    /// Validate that a directory exists
    pub fn validate_directory_exists(field: &str, value: &str) -> ValidationResult<String> {
        let path = Path::new(value);
        if !path.is_dir() {
            return Err(invalid(
                field,
                value,
                ConfigErrorType::DirectoryNotFound,
                "Directory does not exist",
                "Ensure the directory exists or create it",
            ));
        }
        Ok(value.to_string())
    }

    /// Validate a model name against the catalog
    pub fn validate_model(field: &str, value: &str) -> ValidationResult<String> {
        if is_known_model(value.trim()) {
            Ok(value.trim().to_string())
        } else {
            Err(invalid(
                field,
                value,
                ConfigErrorType::InvalidValue,
                "Model is not in the catalog",
                "See GET /models for known models",
            ))
        }
    }

    /// Validate a language code against the catalog
    pub fn validate_language(field: &str, value: &str) -> ValidationResult<String> {
        if is_supported_language(value.trim()) {
            Ok(value.trim().to_lowercase())
        } else {
            Err(invalid(
                field,
                value,
                ConfigErrorType::InvalidValue,
                "Unsupported language code",
                "See GET /languages for supported codes",
            ))
        }
    }
}

/// Comprehensive configuration validator for Whisper Gateway
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the process environment
    pub fn validate() -> ValidationResults {
        info!("Starting configuration validation...");
        Self::validate_with(|name| env::var(name).ok())
    }

    /// Validates values supplied by `lookup`, falling back to defaults
    pub fn validate_with<F>(lookup: F) -> ValidationResults
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut results = ValidationResults::new();

        for param in CONFIG_PARAMS {
            let value = lookup(param.name)
                .or_else(|| param.default_value.map(String::from))
                .unwrap_or_default();

            if value.trim().is_empty() {
                if param.required {
                    results.add(
                        param.validation_level,
                        ConfigValidationError {
                            field: param.name.to_string(),
                            value: value.clone(),
                            error_type: ConfigErrorType::Required,
                            message: "Required parameter is missing".to_string(),
                            suggestion: Some(format!("Set {} environment variable", param.name)),
                        },
                    );
                }
                continue;
            }

            if let Err(error) = Self::validate_parameter(param, &value) {
                results.add(param.validation_level, error);
            }
        }

        Self::validate_cross_dependencies(&mut results, &lookup);
        results
    }

    /// Validate a single parameter against its declared type
    fn validate_parameter(param: &ConfigParam, value: &str) -> ValidationResult<()> {
        use self::validators::*;

        match param.param_type {
            ConfigType::String => {}
            ConfigType::UnsignedInteger => {
                validate_unsigned(param.name, value, param.min_value, param.max_value)?;
            }
            ConfigType::Boolean => {
                validate_boolean(param.name, value)?;
            }
            ConfigType::IpAddress => {
                validate_ip_address(param.name, value)?;
            }
            ConfigType::Port => {
                validate_port(param.name, value)?;
            }
            ConfigType::DirectoryPath => {
                validate_directory_exists(param.name, value)?;
            }
            ConfigType::Model => {
                validate_model(param.name, value)?;
            }
            ConfigType::Language => {
                validate_language(param.name, value)?;
            }
            ConfigType::Enum(valid_values) => {
                validate_enum(param.name, value, valid_values)?;
            }
        }
        Ok(())
    }

    /// Validate cross-parameter dependencies
    fn validate_cross_dependencies<F>(results: &mut ValidationResults, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |name: &str, default: bool| {
            lookup(name)
                .and_then(|v| validators::validate_boolean(name, &v).ok())
                .unwrap_or(default)
        };

        let tokens_empty = lookup("API_TOKENS")
            .map(|v| v.trim().is_empty())
            .unwrap_or(true);
        if flag("ENABLE_AUTHORIZATION", true) && tokens_empty {
            results.add_warning(ConfigValidationError {
                field: "API_TOKENS".to_string(),
                value: String::new(),
                error_type: ConfigErrorType::Required,
                message: "Authorization is enabled but no token is configured".to_string(),
                suggestion: Some(
                    "Set API_TOKENS or disable ENABLE_AUTHORIZATION".to_string(),
                ),
            });
        }

        let backend = lookup("WHISPER_API_METRICS_BACKEND").unwrap_or_default();
        if !flag("WHISPER_API_METRICS_ENABLED", true) && backend.eq_ignore_ascii_case("prometheus") {
            results.add_warning(ConfigValidationError {
                field: "WHISPER_API_METRICS_BACKEND".to_string(),
                value: backend,
                error_type: ConfigErrorType::InvalidValue,
                message: "Backend is set but metrics are disabled".to_string(),
                suggestion: Some("Set WHISPER_API_METRICS_ENABLED=true".to_string()),
            });
        }
    }
}

/// Documentation and configuration generation utilities
impl ConfigValidator {
    /// Generate a sample configuration file with all parameters and descriptions
    pub fn generate_sample_config() -> String {
        let mut output = String::new();
        output.push_str("# Whisper Gateway Configuration File\n");
        output.push_str("# This file contains all available configuration parameters\n");

        for param in CONFIG_PARAMS {
            output.push_str(&format!("\n# {}\n", param.description));
            if param.required {
                output.push_str("# REQUIRED\n");
            }
            match (param.default_value, param.param_type) {
                (Some(default), ConfigType::UnsignedInteger | ConfigType::Boolean | ConfigType::Port) => {
                    output.push_str(&format!("{} = {}\n", param.name, default));
                }
                (Some(default), _) => {
                    output.push_str(&format!("{} = \"{}\"\n", param.name, default));
                }
                (None, _) => {
                    output.push_str(&format!("# {} = \"\"\n", param.name));
                }
            }
        }
        output
    }
}
