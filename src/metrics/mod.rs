//! Metrics for the transcription gateway
//!
//! A small pluggable layer: the [`MetricsExporter`] trait is implemented by a
//! Prometheus backend and a no-op backend, and [`Metrics`] wraps whichever is
//! configured with helpers named after what the gateway actually records.
//!
//! Recording never fails the caller. Errors from the backend are logged at
//! `warn` and dropped.

pub mod error;
pub mod null;
pub mod prometheus;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;

use crate::config::MetricsConfig;
use crate::metrics::error::{validation, MetricsError};
use crate::metrics::null::NullExporter;
use crate::metrics::prometheus::PrometheusExporter;

/// Backend a [`Metrics`] facade writes to
#[async_trait]
pub trait MetricsExporter: Send + Sync {
    /// Increment a counter by one
    async fn increment(&self, name: &str, labels: &[(&str, &str)]) -> Result<(), MetricsError>;

    /// Set a gauge to an absolute value
    async fn set_gauge(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError>;

    /// Record one observation in a histogram
    async fn observe_histogram(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError>;

    /// Render everything recorded so far in the backend's wire format
    async fn export(&self) -> Result<Vec<u8>, MetricsError>;
}

#[derive(Clone)]
pub struct Metrics {
    exporter: Arc<dyn MetricsExporter>,
}

impl Metrics {
    pub fn new(exporter: Arc<dyn MetricsExporter>) -> Self {
        Self { exporter }
    }

    /// Facade that records nothing
    pub fn disabled() -> Self {
        Self::new(Arc::new(NullExporter))
    }

    pub async fn increment(&self, name: &str, labels: &[(&str, &str)]) -> Result<(), MetricsError> {
        self.exporter.increment(name, labels).await
    }

    pub async fn set_gauge(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError> {
        self.exporter.set_gauge(name, value, labels).await
    }

    pub async fn observe_histogram(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError> {
        self.exporter.observe_histogram(name, value, labels).await
    }

    pub async fn export(&self) -> Result<Vec<u8>, MetricsError> {
        self.exporter.export().await
    }

    /// Record HTTP request duration
    pub async fn record_http_request(
        &self,
        endpoint: &str,
        method: &str,
        status: &str,
        duration: f64,
    ) {
        let labels = [("endpoint", endpoint), ("method", method), ("status", status)];
        self.observe_histogram_internal("http_request_duration_seconds", duration, &labels)
            .await;
        self.increment_internal("http_requests_total", &labels).await;
    }

    /// Record authentication attempt ("success", "invalid_token", ...)
    pub async fn record_auth_attempt(&self, status: &str) {
        self.increment_internal("auth_attempts_total", &[("status", status)])
            .await;
    }

    /// Record uploaded file size
    pub async fn record_file_size(&self, size_bytes: usize) {
        match validation::validate_usize_conversion(size_bytes) {
            Ok(size) => {
                self.observe_histogram_internal("upload_size_bytes", size, &[])
                    .await
            }
            Err(e) => warn!("Failed to record file size {}: {}", size_bytes, e),
        }
    }

    /// Record a result cache lookup
    pub async fn record_cache_lookup(&self, hit: bool) {
        let name = if hit {
            "cache_hits_total"
        } else {
            "cache_misses_total"
        };
        self.increment_internal(name, &[]).await;
    }

    /// Record what the preprocessor did ("converted", "degraded", "skipped")
    pub async fn record_preprocessing(&self, outcome: &str) {
        self.increment_internal("preprocessing_total", &[("outcome", outcome)])
            .await;
    }

    /// Record job submission after a cache miss
    pub async fn record_job_submitted(&self, model: &str, language: &str) {
        self.increment_internal(
            "jobs_submitted_total",
            &[("model", model), ("language", language)],
        )
        .await;
    }

    /// Record job completion
    pub async fn record_job_completed(
        &self,
        model: &str,
        language: &str,
        duration: f64,
        status: &str,
    ) {
        let labels = [("model", model), ("language", language), ("status", status)];
        self.observe_histogram_internal("job_processing_duration_seconds", duration, &labels)
            .await;
        self.increment_internal("jobs_completed_total", &labels).await;
    }

    /// Record time spent waiting for an admission slot
    pub async fn record_queue_wait(&self, seconds: f64) {
        self.observe_histogram_internal("queue_wait_duration_seconds", seconds, &[])
            .await;
    }

    /// Publish the admission controller occupancy
    pub async fn record_admission(&self, running: usize, queued: usize) {
        for (name, value) in [("jobs_running", running), ("queue_size", queued)] {
            match validation::validate_usize_conversion(value) {
                Ok(v) => self.set_gauge_internal(name, v, &[]).await,
                Err(e) => warn!("Failed to record {} {}: {}", name, value, e),
            }
        }
    }

    async fn increment_internal(&self, name: &str, labels: &[(&str, &str)]) {
        if let Err(e) = self.increment(name, labels).await {
            warn!("Failed to increment metric '{}': {}", name, e);
        }
    }

    async fn set_gauge_internal(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        if let Err(e) = self.set_gauge(name, value, labels).await {
            warn!("Failed to set gauge '{}': {}", name, e);
        }
    }

    async fn observe_histogram_internal(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        if let Err(e) = self.observe_histogram(name, value, labels).await {
            warn!("Failed to observe histogram '{}': {}", name, e);
        }
    }
}

/// Factory function to create metrics exporter based on configuration
pub fn create_metrics_exporter(
    config: &MetricsConfig,
) -> Result<Arc<dyn MetricsExporter>, MetricsError> {
    match config.exporter_type.to_lowercase().as_str() {
        "prometheus" => {
            debug!("Initializing Prometheus metrics exporter");
            let exporter = match &config.namespace {
                Some(ns) => PrometheusExporter::with_namespace(ns)?,
                None => PrometheusExporter::new(),
            };
            Ok(Arc::new(exporter))
        }
        "none" | "null" | "disabled" => {
            debug!("Metrics disabled, using null exporter");
            Ok(Arc::new(NullExporter))
        }
        other => {
            warn!("Unknown metrics exporter type '{}', using null exporter", other);
            Ok(Arc::new(NullExporter))
        }
    }
}
