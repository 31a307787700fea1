use super::*;
use crate::metrics::error::MetricsError;

fn prometheus_metrics() -> Metrics {
    Metrics::new(Arc::new(PrometheusExporter::new()))
}

async fn exported(metrics: &Metrics) -> String {
    String::from_utf8(metrics.export().await.expect("export failed")).expect("utf-8")
}

#[tokio::test]
async fn test_prometheus_basic_operations() {
    let metrics = prometheus_metrics();

    metrics
        .increment("test_counter", &[("label", "value")])
        .await
        .expect("increment");
    metrics.set_gauge("test_gauge", 42.0, &[]).await.expect("gauge");
    metrics
        .observe_histogram("test_histogram", 1.23, &[("type", "test")])
        .await
        .expect("histogram");

    let text = exported(&metrics).await;
    assert!(text.contains("test_counter{label=\"value\"} 1"));
    assert!(text.contains("test_gauge 42"));
    assert!(text.contains("test_histogram_count{type=\"test\"} 1"));
}

#[tokio::test]
async fn test_label_order_does_not_matter() {
    let metrics = prometheus_metrics();

    metrics
        .increment("ordered_total", &[("a", "1"), ("b", "2")])
        .await
        .unwrap();
    metrics
        .increment("ordered_total", &[("b", "2"), ("a", "1")])
        .await
        .unwrap();

    assert!(exported(&metrics).await.contains("ordered_total{a=\"1\",b=\"2\"} 2"));
}

#[tokio::test]
async fn test_type_conflict_is_rejected() {
    let exporter = PrometheusExporter::new();
    exporter.increment("shared_name", &[]).await.unwrap();

    let result = exporter.set_gauge("shared_name", 1.0, &[]).await;
    assert!(matches!(result, Err(MetricsError::RegistrationFailed { .. })));
    assert_eq!(exporter.metric_count(), 1);
}

#[tokio::test]
async fn test_validation_errors_surface_from_exporter() {
    let exporter = PrometheusExporter::new();

    assert!(matches!(
        exporter.increment("", &[]).await,
        Err(MetricsError::InvalidName { .. })
    ));
    assert!(matches!(
        exporter.set_gauge("valid_name", f64::INFINITY, &[]).await,
        Err(MetricsError::InvalidValue { .. })
    ));
    assert!(matches!(
        exporter.increment("valid_name", &[("", "value")]).await,
        Err(MetricsError::InvalidLabel { .. })
    ));
}

#[tokio::test]
async fn test_namespace_prefix() {
    let metrics = Metrics::new(Arc::new(PrometheusExporter::with_namespace("gateway").unwrap()));
    metrics.record_cache_lookup(true).await;

    assert!(exported(&metrics).await.contains("gateway_cache_hits_total 1"));
    assert!(PrometheusExporter::with_namespace("bad-namespace").is_err());
}

#[tokio::test]
async fn test_domain_helpers() {
    let metrics = prometheus_metrics();

    metrics.record_http_request("/transcribe", "POST", "200", 0.5).await;
    metrics.record_cache_lookup(false).await;
    metrics.record_preprocessing("degraded").await;
    metrics.record_job_submitted("base", "en").await;
    metrics.record_job_completed("base", "en", 2.0, "completed").await;
    metrics.record_admission(2, 5).await;
    metrics.record_file_size(2048).await;

    let text = exported(&metrics).await;
    assert!(text.contains("http_requests_total"));
    assert!(text.contains("cache_misses_total 1"));
    assert!(text.contains("preprocessing_total{outcome=\"degraded\"} 1"));
    assert!(text.contains("jobs_running 2"));
    assert!(text.contains("queue_size 5"));
    assert!(text.contains("upload_size_bytes_count 1"));
}

#[tokio::test]
async fn test_null_exporter_never_fails() {
    let metrics = Metrics::disabled();

    metrics.increment("any_name", &[]).await.unwrap();
    metrics.set_gauge("any_gauge", f64::NAN, &[]).await.unwrap();
    metrics.record_admission(1, 1).await;

    assert!(metrics.export().await.unwrap().is_empty());
}

#[test]
fn test_factory_selects_backend() {
    let prometheus = MetricsConfig {
        exporter_type: "Prometheus".to_string(),
        namespace: None,
    };
    assert!(create_metrics_exporter(&prometheus).is_ok());

    let bad_namespace = MetricsConfig {
        exporter_type: "prometheus".to_string(),
        namespace: Some("1nvalid".to_string()),
    };
    assert!(matches!(
        create_metrics_exporter(&bad_namespace),
        Err(MetricsError::ConfigurationError { .. })
    ));

    let unknown = MetricsConfig {
        exporter_type: "graphite".to_string(),
        namespace: None,
    };
    assert!(create_metrics_exporter(&unknown).is_ok());
}
