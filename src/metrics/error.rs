//! Error types for the metrics system
//!
//! Metric operations never panic; every failure is reported as a
//! [`MetricsError`] and the facade decides whether to log or propagate it.

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum MetricsError {
    /// Invalid metric name (empty, invalid characters, wrong format)
    #[error("Invalid metric name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Invalid label key or value
    #[error("Invalid label '{label}': {reason}")]
    InvalidLabel { label: String, reason: String },

    /// The backend refused to create or register a metric
    #[error("Failed to register metric '{name}': {reason}")]
    RegistrationFailed { name: String, reason: String },

    #[error("Failed to export metrics: {reason}")]
    ExportFailed { reason: String },

    /// NaN, infinite, or too large for an f64 without precision loss
    #[error("Invalid value '{value}': {reason}")]
    InvalidValue { value: String, reason: String },

    #[error("Configuration error: {reason}")]
    ConfigurationError { reason: String },

    #[error("Resource limit exceeded: {reason}")]
    ResourceLimitExceeded { reason: String },
}

impl MetricsError {
    pub fn invalid_name<N: Into<String>, R: Into<String>>(name: N, reason: R) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_label<L: Into<String>, R: Into<String>>(label: L, reason: R) -> Self {
        Self::InvalidLabel {
            label: label.into(),
            reason: reason.into(),
        }
    }

    pub fn registration_failed<N: Into<String>, R: Into<String>>(name: N, reason: R) -> Self {
        Self::RegistrationFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn export_failed<R: Into<String>>(reason: R) -> Self {
        Self::ExportFailed {
            reason: reason.into(),
        }
    }

    pub fn invalid_value<V: fmt::Display, R: Into<String>>(value: V, reason: R) -> Self {
        Self::InvalidValue {
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn configuration_error<R: Into<String>>(reason: R) -> Self {
        Self::ConfigurationError {
            reason: reason.into(),
        }
    }

    pub fn resource_limit_exceeded<R: Into<String>>(reason: R) -> Self {
        Self::ResourceLimitExceeded {
            reason: reason.into(),
        }
    }
}

/// Validation functions for metric names, labels and values
pub mod validation {
    use super::MetricsError;
    use std::collections::HashSet;

    /// Prometheus reserved label names
    const RESERVED_LABELS: &[&str] = &["__name__", "__value__"];

    const MAX_NAME_LENGTH: usize = 512;
    const MAX_LABEL_VALUE_LENGTH: usize = 1024;
    const MAX_LABELS_PER_METRIC: usize = 32;

    /// Names start with a letter or underscore and contain only letters,
    /// digits, underscores and colons.
    pub fn validate_metric_name(name: &str) -> Result<(), MetricsError> {
        let mut chars = name.chars();
        let first = match chars.next() {
            Some(c) => c,
            None => return Err(MetricsError::invalid_name(name, "Metric name cannot be empty")),
        };

        if name.len() > MAX_NAME_LENGTH {
            return Err(MetricsError::invalid_name(
                name,
                format!("Metric name too long (max {} characters)", MAX_NAME_LENGTH),
            ));
        }

        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(MetricsError::invalid_name(
                name,
                "Metric name must start with a letter or underscore",
            ));
        }

        if let Some((i, ch)) = name
            .chars()
            .enumerate()
            .find(|(_, ch)| !ch.is_ascii_alphanumeric() && *ch != '_' && *ch != ':')
        {
            return Err(MetricsError::invalid_name(
                name,
                format!("Invalid character '{}' at position {}", ch, i),
            ));
        }

        Ok(())
    }

    pub fn validate_label_key(key: &str) -> Result<(), MetricsError> {
        let first = match key.chars().next() {
            Some(c) => c,
            None => return Err(MetricsError::invalid_label(key, "Label key cannot be empty")),
        };

        if RESERVED_LABELS.contains(&key) {
            return Err(MetricsError::invalid_label(
                key,
                "Label key is reserved by Prometheus",
            ));
        }

        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(MetricsError::invalid_label(
                key,
                "Label key must start with a letter or underscore",
            ));
        }

        if key.chars().any(|ch| !ch.is_ascii_alphanumeric() && ch != '_') {
            return Err(MetricsError::invalid_label(key, "Invalid character in label key"));
        }

        Ok(())
    }

    pub fn validate_label_value(value: &str) -> Result<(), MetricsError> {
        if value.len() > MAX_LABEL_VALUE_LENGTH {
            return Err(MetricsError::invalid_label(
                value,
                format!(
                    "Label value too long (max {} characters)",
                    MAX_LABEL_VALUE_LENGTH
                ),
            ));
        }

        if value.chars().any(|ch| ch.is_control()) {
            return Err(MetricsError::invalid_label(
                value,
                "Label value contains control characters",
            ));
        }

        Ok(())
    }

    pub fn validate_labels(labels: &[(&str, &str)]) -> Result<(), MetricsError> {
        if labels.len() > MAX_LABELS_PER_METRIC {
            return Err(MetricsError::invalid_label(
                "",
                format!("Too many labels (max {} allowed)", MAX_LABELS_PER_METRIC),
            ));
        }

        let mut seen = HashSet::new();
        for (key, value) in labels {
            validate_label_key(key)?;
            validate_label_value(value)?;
            if !seen.insert(*key) {
                return Err(MetricsError::invalid_label(*key, "Duplicate label key"));
            }
        }

        Ok(())
    }

    pub fn validate_numeric_value(value: f64) -> Result<(), MetricsError> {
        if !value.is_finite() {
            return Err(MetricsError::invalid_value(
                value,
                "Value must be finite (not NaN or infinite)",
            ));
        }

        if value.abs() > (1u64 << 53) as f64 {
            return Err(MetricsError::invalid_value(
                value,
                "Value too large, may lose precision in f64",
            ));
        }

        Ok(())
    }

    /// Converts a count to f64, refusing values that would lose precision
    pub fn validate_usize_conversion(value: usize) -> Result<f64, MetricsError> {
        if value as u64 > (1u64 << 53) {
            return Err(MetricsError::invalid_value(
                value,
                "Value too large for accurate f64 conversion",
            ));
        }

        Ok(value as f64)
    }
}
