//! Repository and project listing endpoints

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::models::{Project, Repository};
use crate::{ApiError, ApiResult, AppState};

/// GET /repositories
pub async fn list_repositories(State(state): State<AppState>) -> ApiResult<Json<Vec<Repository>>> {
    Ok(Json(state.store.list().await?))
}

/// GET /repositories/:id
pub async fn get_repository(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Repository>> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::BadRequest(format!("Invalid repository id: {}", id)))?;

    state
        .store
        .find_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Repository {}", id)))
}

/// GET /projects
pub async fn list_projects(State(state): State<AppState>) -> ApiResult<Json<Vec<Project>>> {
    Ok(Json(state.store.list_projects().await?))
}

/// Build repository and project routes
pub fn repository_routes() -> Router<AppState> {
    Router::new()
        .route("/repositories", get(list_repositories))
        .route("/repositories/:id", get(get_repository))
        .route("/projects", get(list_projects))
}
