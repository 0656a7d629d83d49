//! HTTP front end for the studio: creator pages' JSON endpoints, galleries and
//! the admin forms.

mod admin;
mod forms;
mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use merch_contracts::errors::StudioError;
use merch_engine::StudioEngine;
use serde_json::json;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<StudioEngine>,
}

pub fn router(engine: Arc<StudioEngine>) -> Router {
    let assets = ServeDir::new(&engine.paths().assets_dir);
    let state = AppState { engine };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/tools", get(handlers::list_tools))
        .route("/tools/:tool", post(handlers::generate_design))
        .route("/tools/:tool/designs", get(handlers::gallery))
        .route("/tools/:tool/upload", post(handlers::upload_design))
        .route(
            "/admin/designs/:tool",
            get(admin::list_designs).post(admin::publish_designs),
        )
        .route(
            "/admin/products",
            get(admin::list_products).post(admin::save_product),
        )
        .route("/admin/orders", get(admin::list_orders))
        .route(
            "/admin/config",
            get(admin::show_config).post(admin::save_config),
        )
        .nest_service("/assets", assets)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves until Ctrl-C.
pub async fn serve(engine: Arc<StudioEngine>, bind: SocketAddr) -> Result<()> {
    let app = router(engine);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("merch studio listening on http://{bind}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;
    info!("merch studio stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {err}");
    }
}

/// Runs blocking engine work on tokio's blocking pool.
pub(crate) async fn blocking<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&StudioEngine) -> Result<T, StudioError> + Send + 'static,
{
    let engine = Arc::clone(&state.engine);
    tokio::task::spawn_blocking(move || op(&engine))
        .await
        .map_err(|err| ApiError::Internal(format!("worker task failed: {err}")))?
        .map_err(ApiError::Studio)
}

#[derive(Debug)]
pub enum ApiError {
    Studio(StudioError),
    NotFound(String),
    Internal(String),
}

impl From<StudioError> for ApiError {
    fn from(err: StudioError) -> Self {
        Self::Studio(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Studio(StudioError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Studio(StudioError::Configuration(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Studio(StudioError::Provider(_)) => StatusCode::BAD_GATEWAY,
            Self::Studio(StudioError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Studio(err) => err.kind(),
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal",
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::Studio(err) => err.message(),
            Self::NotFound(message) | Self::Internal(message) => message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.kind(), "request failed: {}", self.message());
        }
        (
            status,
            Json(json!({
                "success": false,
                "error": self.message(),
                "error_kind": self.kind(),
            })),
        )
            .into_response()
    }
}
