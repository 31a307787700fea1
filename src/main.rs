use actix_web::{middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use whisper_gateway::config_validator::ConfigValidator;
use whisper_gateway::metrics::create_metrics_exporter;
use whisper_gateway::{
    config_loader, configure, AdmissionConfig, AdmissionController, AudioPreprocessor,
    Authentication, CacheConfig, HandlerConfig, Metrics, MetricsConfig, PreprocessConfig,
    ResultCache, ServerConfig, TranscriptionService, WhisperConfig, WhisperRecognizer,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if std::env::args().any(|arg| arg == "--sample-config") {
        print!("{}", ConfigValidator::generate_sample_config());
        return Ok(());
    }

    // Initialize logger
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // Config file values become env vars unless already set
    config_loader::load_config();

    let validation = ConfigValidator::validate();
    validation.print_summary();
    if !validation.is_valid() {
        error!("Invalid configuration, refusing to start");
        std::process::exit(1);
    }

    // Load configurations
    let server_config = ServerConfig::default();
    let handler_config = HandlerConfig::default();
    let whisper_config = WhisperConfig::default();
    let preprocess_config = PreprocessConfig::default();
    let cache_config = CacheConfig::default();
    let admission_config = AdmissionConfig::default();
    let metrics_config = MetricsConfig::default();

    // Initialize metrics
    let metrics = match create_metrics_exporter(&metrics_config) {
        Ok(exporter) => Metrics::new(exporter),
        Err(e) => {
            warn!("Failed to create metrics exporter, metrics disabled: {}", e);
            Metrics::disabled()
        }
    };

    if let Err(e) = handler_config.ensure_temp_dir() {
        warn!(
            "Failed to create temp directory {}: {}",
            handler_config.temp_dir, e
        );
    }

    let cache = Arc::new(ResultCache::new(&cache_config));
    cache.init().await;
    Arc::clone(&cache).start_cleanup_task(cache_config.cleanup_interval_hours);

    let preprocessor = AudioPreprocessor::new(preprocess_config);
    if let Err(e) = preprocessor.init().await {
        warn!("Failed to create preprocessing directory: {}", e);
    }

    info!("Recognizer command: {}", whisper_config.command_path);
    info!(
        "Model: {}, default language: {}",
        whisper_config.model, whisper_config.default_language
    );
    let model = whisper_config.model.clone();
    let default_language = whisper_config.default_language.clone();
    let recognizer = WhisperRecognizer::new(whisper_config);
    if let Err(e) = recognizer.init().await {
        warn!("Failed to create recognizer output directory: {}", e);
    }

    let admission = AdmissionController::new(&admission_config);

    let service = web::Data::new(
        TranscriptionService::new(Arc::new(recognizer), admission, &model, &default_language)
            .with_cache(cache, cache_config.key_includes_params)
            .with_preprocessor(preprocessor)
            .with_metrics(metrics.clone()),
    );
    let authentication = Authentication::from_env();

    let bind_address = format!("{}:{}", server_config.host, server_config.port);
    info!("Starting Whisper Gateway on http://{}", bind_address);
    info!("Using temp directory: {}", handler_config.temp_dir);
    info!("Metrics exporter: {}", metrics_config.exporter_type);

    HttpServer::new(move || {
        App::new()
            .wrap(authentication.clone())
            .wrap(Logger::default())
            .app_data(service.clone())
            .app_data(web::Data::new(handler_config.clone()))
            .app_data(web::Data::new(metrics.clone()))
            .configure(configure)
    })
    .bind(bind_address)?
    .client_disconnect_timeout(Duration::from_secs(server_config.timeout))
    .keep_alive(Duration::from_secs(server_config.keep_alive))
    .workers(server_config.worker_count())
    .run()
    .await
}
