//! Prometheus metrics exporter
//!
//! Metrics are created lazily on first use and registered in a private
//! [`Registry`]. Label names are sorted so the same metric can be recorded
//! with labels given in any order.

use crate::metrics::error::{validation, MetricsError};
use crate::metrics::MetricsExporter;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

const DEFAULT_MAX_METRICS: usize = 1000;

pub struct PrometheusExporter {
    registry: Registry,
    counters: DashMap<String, CounterVec>,
    gauges: DashMap<String, GaugeVec>,
    histograms: DashMap<String, HistogramVec>,
    /// Upper bound on distinct metric names
    max_metrics: usize,
    namespace: Option<String>,
    metric_count: AtomicUsize,
}

impl Default for PrometheusExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusExporter {
    pub fn new() -> Self {
        let capacity = (DEFAULT_MAX_METRICS / 3).max(16);
        Self {
            registry: Registry::new(),
            counters: DashMap::with_capacity(capacity),
            gauges: DashMap::with_capacity(capacity),
            histograms: DashMap::with_capacity(capacity),
            max_metrics: DEFAULT_MAX_METRICS,
            namespace: None,
            metric_count: AtomicUsize::new(0),
        }
    }

    /// Exporter whose metric names are all prefixed with `namespace_`
    pub fn with_namespace(namespace: &str) -> Result<Self, MetricsError> {
        validation::validate_metric_name(namespace).map_err(|e| {
            MetricsError::configuration_error(format!(
                "Invalid metrics namespace '{}': {}",
                namespace, e
            ))
        })?;
        Ok(Self {
            namespace: Some(namespace.to_string()),
            ..Self::new()
        })
    }

    pub fn metric_count(&self) -> usize {
        self.metric_count.load(Ordering::SeqCst)
    }

    fn apply_namespace(&self, name: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{}_{}", ns, name),
            None => name.to_string(),
        }
    }

    /// "jobs_completed_total" -> "Jobs Completed Total - counter"
    fn generate_help_text(name: &str, metric_type: &str) -> String {
        let readable = name
            .split('_')
            .filter(|w| !w.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        format!("{} - {}", readable, metric_type)
    }

    fn reserve_metric_slot(&self) -> Result<(), MetricsError> {
        let mut current = self.metric_count.load(Ordering::Relaxed);
        loop {
            if current >= self.max_metrics {
                return Err(MetricsError::resource_limit_exceeded(format!(
                    "Maximum number of metrics ({}) exceeded",
                    self.max_metrics
                )));
            }
            match self.metric_count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(()),
                Err(v) => current = v,
            }
        }
    }

    fn release_metric_slot(&self) {
        self.metric_count.fetch_sub(1, Ordering::SeqCst);
    }

    /// Buckets chosen from the metric name
    fn histogram_buckets(name: &str) -> Vec<f64> {
        if name.contains("duration") || name.contains("seconds") {
            // recognition runs from sub-second to tens of minutes
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]
        } else if name.contains("size") || name.contains("bytes") {
            vec![
                16384.0, 65536.0, 262144.0, 1048576.0, 4194304.0, 16777216.0, 67108864.0,
                268435456.0,
            ]
        } else {
            prometheus::DEFAULT_BUCKETS.to_vec()
        }
    }

    fn check_type_conflict(&self, full_name: &str, metric_type: &str) -> Result<(), MetricsError> {
        let existing = [
            (self.counters.contains_key(full_name), "counter"),
            (self.gauges.contains_key(full_name), "gauge"),
            (self.histograms.contains_key(full_name), "histogram"),
        ];
        for (exists, existing_type) in existing {
            if exists && existing_type != metric_type {
                return Err(MetricsError::registration_failed(
                    full_name,
                    format!(
                        "already registered as {} but used as {}",
                        existing_type, metric_type
                    ),
                ));
            }
        }
        Ok(())
    }

    fn get_or_create_counter(
        &self,
        name: &str,
        label_names: &[&str],
    ) -> Result<CounterVec, MetricsError> {
        let full_name = self.apply_namespace(name);
        self.check_type_conflict(&full_name, "counter")?;

        match self.counters.entry(full_name.clone()) {
            Entry::Occupied(e) => Ok(e.get().clone()),
            Entry::Vacant(e) => {
                self.reserve_metric_slot()?;
                let opts = Opts::new(full_name, Self::generate_help_text(name, "counter"));
                let counter = CounterVec::new(opts, label_names)
                    .and_then(|c| self.registry.register(Box::new(c.clone())).map(|_| c))
                    .map_err(|err| {
                        self.release_metric_slot();
                        MetricsError::registration_failed(name, err.to_string())
                    })?;
                Ok(e.insert(counter).clone())
            }
        }
    }

    fn get_or_create_gauge(&self, name: &str, label_names: &[&str]) -> Result<GaugeVec, MetricsError> {
        let full_name = self.apply_namespace(name);
        self.check_type_conflict(&full_name, "gauge")?;

        match self.gauges.entry(full_name.clone()) {
            Entry::Occupied(e) => Ok(e.get().clone()),
            Entry::Vacant(e) => {
                self.reserve_metric_slot()?;
                let opts = Opts::new(full_name, Self::generate_help_text(name, "gauge"));
                let gauge = GaugeVec::new(opts, label_names)
                    .and_then(|g| self.registry.register(Box::new(g.clone())).map(|_| g))
                    .map_err(|err| {
                        self.release_metric_slot();
                        MetricsError::registration_failed(name, err.to_string())
                    })?;
                Ok(e.insert(gauge).clone())
            }
        }
    }

    fn get_or_create_histogram(
        &self,
        name: &str,
        label_names: &[&str],
    ) -> Result<HistogramVec, MetricsError> {
        let full_name = self.apply_namespace(name);
        self.check_type_conflict(&full_name, "histogram")?;

        match self.histograms.entry(full_name.clone()) {
            Entry::Occupied(e) => Ok(e.get().clone()),
            Entry::Vacant(e) => {
                self.reserve_metric_slot()?;
                let opts = HistogramOpts::new(full_name, Self::generate_help_text(name, "histogram"))
                    .buckets(Self::histogram_buckets(name));
                let histogram = HistogramVec::new(opts, label_names)
                    .and_then(|h| self.registry.register(Box::new(h.clone())).map(|_| h))
                    .map_err(|err| {
                        self.release_metric_slot();
                        MetricsError::registration_failed(name, err.to_string())
                    })?;
                Ok(e.insert(histogram).clone())
            }
        }
    }

    /// Sorted label names and the values in matching order
    fn canonical_labels<'a>(labels: &'a [(&'a str, &'a str)]) -> (Vec<&'a str>, Vec<&'a str>) {
        let mut names: Vec<&str> = labels.iter().map(|(k, _)| *k).collect();
        names.sort_unstable();
        let by_name: HashMap<&str, &str> = labels.iter().copied().collect();
        let values = names
            .iter()
            .map(|n| by_name.get(n).copied().unwrap_or_default())
            .collect();
        (names, values)
    }
}

#[async_trait]
impl MetricsExporter for PrometheusExporter {
    async fn increment(&self, name: &str, labels: &[(&str, &str)]) -> Result<(), MetricsError> {
        validation::validate_metric_name(name)?;
        validation::validate_labels(labels)?;
        let (names, values) = Self::canonical_labels(labels);

        self.get_or_create_counter(name, &names)?
            .get_metric_with_label_values(&values)
            .map_err(|e| MetricsError::invalid_label(name, e.to_string()))?
            .inc();
        debug!("Incremented counter {} with labels {:?}", name, labels);
        Ok(())
    }

    async fn set_gauge(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError> {
        validation::validate_metric_name(name)?;
        validation::validate_labels(labels)?;
        validation::validate_numeric_value(value)?;
        let (names, values) = Self::canonical_labels(labels);

        self.get_or_create_gauge(name, &names)?
            .get_metric_with_label_values(&values)
            .map_err(|e| MetricsError::invalid_label(name, e.to_string()))?
            .set(value);
        Ok(())
    }

    async fn observe_histogram(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError> {
        validation::validate_metric_name(name)?;
        validation::validate_labels(labels)?;
        validation::validate_numeric_value(value)?;
        let (names, values) = Self::canonical_labels(labels);

        self.get_or_create_histogram(name, &names)?
            .get_metric_with_label_values(&values)
            .map_err(|e| MetricsError::invalid_label(name, e.to_string()))?
            .observe(value);
        Ok(())
    }

    async fn export(&self) -> Result<Vec<u8>, MetricsError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::export_failed(format!("Failed to encode metrics: {}", e)))?;
        Ok(buffer)
    }
}
