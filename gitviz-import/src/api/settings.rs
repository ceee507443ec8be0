//! GitHub token settings endpoints
//!
//! The token is stored in the settings table (authoritative) and mirrored
//! into the TOML config as a backup. It is never returned unmasked.

use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct SetTokenRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SetTokenResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TokenStatusResponse {
    pub configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked_token: Option<String>,
}

/// GET /settings/github-token
pub async fn get_github_token(State(state): State<AppState>) -> ApiResult<Json<TokenStatusResponse>> {
    let token = crate::config::resolve_github_token(&state.db, &state.toml_config).await?;

    Ok(Json(TokenStatusResponse {
        configured: token.is_some(),
        masked_token: token.as_deref().map(crate::config::mask_token),
    }))
}

/// POST /settings/github-token
///
/// **Request:** `{"token": "ghp_..."}`
///
/// 400 for an empty token. TOML write failures are logged only.
pub async fn set_github_token(
    State(state): State<AppState>,
    Json(payload): Json<SetTokenRequest>,
) -> ApiResult<Json<SetTokenResponse>> {
    if !crate::config::is_valid_token(&payload.token) {
        return Err(ApiError::BadRequest(
            "Token cannot be empty or whitespace-only".to_string(),
        ));
    }
    let token = payload.token.trim().to_string();

    crate::db::settings::set_github_token(&state.db, token.clone())
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to save token to database: {}", e)))?;

    info!("GitHub token configured via API");

    if let Some(path) = &state.config_path {
        crate::config::sync_token_to_toml(&token, path);
    }

    Ok(Json(SetTokenResponse {
        success: true,
        message: "GitHub token configured successfully".to_string(),
    }))
}

/// Build settings routes
pub fn settings_routes() -> Router<AppState> {
    Router::new().route(
        "/settings/github-token",
        get(get_github_token).post(set_github_token),
    )
}
