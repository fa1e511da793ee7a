use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::warn;

use super::types::*;
use crate::core::storage::models::{SyncRunStatus, SyncTrigger};
use crate::core::sync::{SyncError, SyncOrchestrator};
use crate::core::{AppServices, HealthSnapshot};

#[derive(Clone)]
pub struct AppState {
    pub sync: Arc<SyncOrchestrator>,
    pub services: AppServices,
}

/// Error half of every handler: a status code plus `{ error, message }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse::bad_request(message),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::AlreadyRunning => Self {
                status: StatusCode::CONFLICT,
                body: ErrorResponse::conflict(error.to_string()),
            },
            SyncError::Storage(_) => {
                warn!(%error, "request failed");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: ErrorResponse::internal_error(error.to_string()),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = HealthSnapshot {
        remote: state.sync.remote_health().await,
        storage_ok: state.sync.repository().count_posts().await.is_ok(),
        sync_running: state.sync.is_running(),
        sync_enabled: state.sync.is_enabled().await,
    };
    let services = state.services.health_report(&snapshot);

    let status = if snapshot.storage_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            healthy: snapshot.storage_ok,
            version: env!("CARGO_PKG_VERSION").to_string(),
            services,
        }),
    )
}

pub async fn sync_status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sync.status().await?))
}

pub async fn sync_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let logs = state
        .sync
        .logs(query.limit.unwrap_or(DEFAULT_LOG_LIMIT))
        .await?;
    Ok(Json(LogsResponse { logs }))
}

pub async fn trigger_sync(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let log = state.sync.run_once(SyncTrigger::Manual).await?;
    Ok(Json(SyncResponse {
        success: log.status != SyncRunStatus::Failed,
        log,
    }))
}

/// Accepts `{ "enabled": bool }`; an empty body or `{}` flips the flag.
pub async fn toggle_sync(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ToggleRequest::default()
    } else {
        serde_json::from_slice::<ToggleRequest>(&body)
            .map_err(|error| ApiError::bad_request(format!("invalid toggle body: {error}")))?
    };
    let status = match request.enabled {
        Some(enabled) => state.sync.set_enabled(enabled).await?,
        None => state.sync.toggle().await?,
    };
    Ok(Json(status))
}

pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query
        .per_page
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);
    let repository = state.sync.repository();
    let posts = repository
        .list_posts(page, per_page)
        .await
        .map_err(SyncError::from)?;
    let total = repository.count_posts().await.map_err(SyncError::from)?;
    Ok(Json(PostsResponse {
        posts,
        page,
        per_page,
        total,
    }))
}
