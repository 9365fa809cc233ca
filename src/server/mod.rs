// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! HTTP server: routing, shared state and startup.

pub mod flash;
pub mod handlers;
pub mod pages;
pub mod response;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, FromRef};
use axum::routing::{get, post};
use axum::Router;
use axum_extra::extract::cookie::Key;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::annotate::load_font;
use crate::config::AppConfig;
use crate::detect::InferenceAdapter;
use crate::error::Result;
use crate::loader::ModelLoader;
use crate::storage::ImageStore;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<AppConfig>,
    /// Detection pipeline.
    pub adapter: Arc<InferenceAdapter>,
    flash_key: Key,
}

impl AppState {
    /// Assemble state from a configuration and a ready adapter.
    #[must_use]
    pub fn new(config: AppConfig, adapter: InferenceAdapter) -> Self {
        let flash_key = flash::signing_key(&config.secret_key);
        Self {
            config: Arc::new(config),
            adapter: Arc::new(adapter),
            flash_key,
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.flash_key.clone()
    }
}

/// Build the application router.
pub fn create_app(state: AppState) -> Router {
    let store = state.adapter.store();
    let uploads = ServeDir::new(store.upload_dir());
    let outputs = ServeDir::new(store.output_dir());
    let body_limit = state.config.max_body_bytes();

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/predict", post(handlers::predict_form))
        .route("/api/predict", post(handlers::api_predict))
        .route("/api-docs/openapi.json", get(handlers::openapi))
        .nest_service("/uploads", uploads)
        .nest_service("/outputs", outputs)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the production adapter: ONNX loader, on-disk store and label font.
///
/// May download the default font, so call it off the async runtime.
///
/// # Errors
///
/// Returns an error if the storage directories cannot be created.
pub fn build_adapter(config: &AppConfig) -> Result<InferenceAdapter> {
    let loader = ModelLoader::onnx(config.model_path.clone());
    let store = ImageStore::new(config.upload_dir.clone(), config.output_dir.clone())?;
    let font = load_font(config.font_path.as_deref());
    if font.is_none() {
        tracing::warn!("No label font available, annotated images will have boxes only");
    }
    Ok(InferenceAdapter::new(Arc::new(loader), Arc::new(store), font))
}

/// Periodically delete stored images older than `ttl`.
pub fn spawn_sweeper(adapter: Arc<InferenceAdapter>, ttl: Duration) -> tokio::task::JoinHandle<()> {
    let period = (ttl / 2).clamp(Duration::from_secs(1), Duration::from_secs(3600));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if let Err(e) = adapter.store().sweep_expired(ttl).await {
                tracing::warn!(error = %e, "Storage sweep failed");
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

/// Run the web application until Ctrl-C.
///
/// # Errors
///
/// Returns an error if storage cannot be prepared or the address cannot be bound.
pub async fn serve(config: AppConfig) -> Result<()> {
    let adapter = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || build_adapter(&config))
            .await
            .map_err(|e| crate::Error::DependencyError(format!("startup task failed: {e}")))??
    };

    if adapter.loader().model_exists() {
        tracing::info!(path = %config.model_path.display(), "Model file found, it will be loaded on first request");
    } else {
        tracing::warn!(
            path = %config.model_path.display(),
            "Model file not found. Place your trained model there or set MODEL_PATH"
        );
    }

    let addr = config.bind_addr();
    let ttl = config.storage_ttl_secs.map(Duration::from_secs);
    let state = AppState::new(config, adapter);

    if let Some(ttl) = ttl {
        tracing::info!(ttl_secs = ttl.as_secs(), "Storage retention enabled");
        spawn_sweeper(Arc::clone(&state.adapter), ttl);
    }

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
