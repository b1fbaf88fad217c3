use service_core::observability::init_tracing;
use statement_service::config::StatementConfig;
use statement_service::services::init_metrics;
use statement_service::startup::Application;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = StatementConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        "statement-service",
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    // Must run before any metric is recorded.
    if let Err(e) = init_metrics() {
        tracing::warn!("Prometheus recorder not installed: {}", e);
    }

    tracing::info!(
        environment = %config.environment,
        port = config.common.port,
        "Starting statement-service"
    );

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to start application: {}", e);
        std::io::Error::other(format!("Startup error: {}", e))
    })?;

    app.run_until_stopped().await
}
