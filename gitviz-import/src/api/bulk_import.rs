//! Bulk import endpoints
//!
//! POST starts a job and answers immediately; all work continues in the
//! background. GET returns the registry snapshot for polling clients.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::services::status_registry::JobPoll;
use crate::services::BulkImportRequest;
use crate::{ApiError, ApiResult, AppState};

/// Response for a started bulk import
#[derive(Debug, Serialize)]
pub struct BulkImportStarted {
    pub bulk_import_id: Uuid,
    pub status: String,
    pub message: String,
}

/// POST /repositories/bulk-import
///
/// **Request:** `{"account_input": "acme, globex", "project_creation_mode": "per_owner"}`
/// **Response:** 202 `{"bulk_import_id": "...", "status": "initializing", "message": "..."}`
pub async fn start_bulk_import(
    State(state): State<AppState>,
    Json(request): Json<BulkImportRequest>,
) -> ApiResult<(StatusCode, Json<BulkImportStarted>)> {
    if request.account_input.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "account_input must name at least one GitHub account or URL".to_string(),
        ));
    }

    let token = match crate::config::resolve_github_token(&state.db, &state.toml_config).await {
        Ok(token) => token,
        Err(e) => {
            warn!(error = %e, "GitHub token lookup failed");
            state.record_error(format!("GitHub token lookup failed: {}", e)).await;
            None
        }
    };

    let bulk_import_id = state.bulk_import.start(request, token);

    info!(bulk_import_id = %bulk_import_id, "Bulk import accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(BulkImportStarted {
            bulk_import_id,
            status: "initializing".to_string(),
            message: "Bulk import started".to_string(),
        }),
    ))
}

/// GET /repositories/bulk-import/:id
///
/// Unknown, malformed or expired ids answer 404 with
/// `{"status": "not_found", "error": "Bulk import not found or expired"}`.
pub async fn get_bulk_import_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let poll = match Uuid::parse_str(&id) {
        Ok(id) => state.bulk_import.registry().poll(id),
        Err(_) => JobPoll::not_found(),
    };

    match poll {
        found @ JobPoll::Found(_) => (StatusCode::OK, Json(found)).into_response(),
        not_found => (StatusCode::NOT_FOUND, Json(not_found)).into_response(),
    }
}

/// Build bulk import routes
pub fn bulk_import_routes() -> Router<AppState> {
    Router::new()
        .route("/repositories/bulk-import", post(start_bulk_import))
        .route("/repositories/bulk-import/:id", get(get_bulk_import_status))
}
