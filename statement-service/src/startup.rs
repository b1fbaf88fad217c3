use crate::config::StatementConfig;
use crate::handlers;
use crate::services::extraction::credentials::pool_for;
use crate::services::extraction::gemini::GeminiSettings;
use crate::services::{Database, GeminiExtractor, JobStore, Orchestrator, StatementExtractor};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::rate_limit::{
    ip_rate_limit_middleware, FixedWindowLimiter, IpRateLimiter,
};
use service_core::middleware::tracing::request_id_middleware;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub orchestrator: Orchestrator,
    pub rate_limiter: IpRateLimiter,
    pub max_upload_bytes: usize,
    pub environment: String,
}

impl AppState {
    pub fn new(
        store: Arc<dyn JobStore>,
        extractor: Arc<dyn StatementExtractor>,
        rate_limit_per_minute: u32,
        max_upload_bytes: usize,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator: Orchestrator::new(store.clone(), extractor),
            store,
            rate_limiter: FixedWindowLimiter::per_minute(rate_limit_per_minute),
            max_upload_bytes,
            environment: environment.into(),
        }
    }
}

/// HTTP routes. Uploads sit behind the per-IP limiter and the body size cap.
pub fn router(state: AppState) -> Router {
    let uploads = Router::new()
        .route("/api/statements/extract/", post(handlers::extract_statement))
        .route("/api/statements/extract/batch", post(handlers::extract_batch))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            ip_rate_limit_middleware,
        ))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/health/simple", get(handlers::simple_health_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/api/dashboard/stats", get(handlers::dashboard_stats))
        .route("/api/admin/dashboard", get(handlers::admin_dashboard))
        .route("/api/admin/users/stats", get(handlers::users_stats))
        .merge(uploads)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
    state: AppState,
}

impl Application {
    pub async fn build(config: StatementConfig) -> Result<Self, AppError> {
        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to PostgreSQL: {}", e);
            e
        })?;
        db.run_migrations().await.map_err(|e| {
            tracing::error!("Failed to run database migrations: {}", e);
            e
        })?;

        let credentials = pool_for(config.gemini.selection, config.gemini.api_keys.clone());
        let extractor = GeminiExtractor::new(
            GeminiSettings {
                model: config.gemini.model.clone(),
                api_base: config.gemini.api_base.clone(),
                timeout: Duration::from_secs(config.gemini.timeout_secs),
            },
            credentials,
        )
        .map_err(|e| {
            tracing::error!("Failed to build Gemini HTTP client: {}", e);
            AppError::ConfigError(anyhow::anyhow!("Failed to build HTTP client: {}", e))
        })?;

        tracing::info!(
            model = %config.gemini.model,
            credentials = config.gemini.api_keys.len(),
            selection = ?config.gemini.selection,
            "Gemini extractor configured"
        );

        let state = AppState::new(
            Arc::new(db),
            Arc::new(extractor),
            config.rate_limit_per_minute,
            config.max_upload_bytes,
            config.environment.clone(),
        );

        spawn_limiter_purge(state.rate_limiter.clone());

        let app = router(state.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal());

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
            state,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}

/// Periodically drop expired rate-limit windows so idle clients do not pile up.
fn spawn_limiter_purge(limiter: IpRateLimiter) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            limiter.purge_expired();
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
