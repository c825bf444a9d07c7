//! HTTP Lease Server
//!
//! Exposes any [`LeaseStore`] over REST so that participants on other
//! hosts can share one lease through [`crate::lease::HttpLeaseStore`].

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::error::{Error, Result};
use crate::lease::{LeaseRecord, LeaseStore};

/// Shared application state
pub struct AppState {
    /// Backing lease store
    pub store: Arc<dyn LeaseStore>,
}

/// HTTP lease server
pub struct LeaseServer {
    bind_address: String,
    state: Arc<AppState>,
}

impl LeaseServer {
    /// Create a new lease server over `store`
    pub fn new(bind_address: impl Into<String>, store: Arc<dyn LeaseStore>) -> Self {
        Self {
            bind_address: bind_address.into(),
            state: Arc::new(AppState { store }),
        }
    }

    /// Address the server binds to
    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    /// Create the router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(handle_health))
            .route("/leases", post(handle_create))
            .route(
                "/leases/:namespace/:name",
                get(handle_get).put(handle_update),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state))
    }

    /// Bind and serve until `shutdown` fires
    pub async fn start(&self, shutdown: CancellationToken) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;
        tracing::info!(
            "Lease server listening on {} ({} backend)",
            self.bind_address,
            self.state.store.backend()
        );
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` fires
    pub async fn serve(
        &self,
        listener: tokio::net::TcpListener,
        shutdown: CancellationToken,
    ) -> Result<()> {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        tracing::info!("Lease server stopped");
        Ok(())
    }
}

// ============ Request/Response Types ============

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human readable message
    pub error: String,
    /// Machine readable code (not_found, conflict, bad_request, store_error)
    pub code: String,
}

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub backend: String,
}

/// Maps a store error onto a status code and JSON body
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            Error::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            Error::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Error::Config(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            other => (
                other
                    .status_code()
                    .and_then(|s| StatusCode::from_u16(s).ok())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                "store_error",
            ),
        };

        if status.is_server_error() {
            tracing::warn!("Lease store error: {}", self.0);
        }

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// ============ Handlers ============

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        backend: state.store.backend().to_string(),
    })
}

async fn handle_get(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> std::result::Result<Json<LeaseRecord>, ApiError> {
    let record = state.store.get(&namespace, &name).await?;
    Ok(Json(record))
}

async fn handle_create(
    State(state): State<Arc<AppState>>,
    Json(record): Json<LeaseRecord>,
) -> std::result::Result<(StatusCode, Json<LeaseRecord>), ApiError> {
    if record.namespace.is_empty() || record.name.is_empty() {
        return Err(Error::Config("lease namespace and name are required".into()).into());
    }

    let created = state.store.create(&record).await?;
    tracing::debug!(
        "Created lease {} for {:?}",
        created.key(),
        created.holder()
    );
    Ok((StatusCode::CREATED, Json(created)))
}

async fn handle_update(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
    Json(record): Json<LeaseRecord>,
) -> std::result::Result<Json<LeaseRecord>, ApiError> {
    if record.namespace != namespace || record.name != name {
        return Err(Error::Config(format!(
            "body names lease {} but path names {}/{}",
            record.key(),
            namespace,
            name
        ))
        .into());
    }

    let updated = state.store.update(&record).await?;
    Ok(Json(updated))
}
