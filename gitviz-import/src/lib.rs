//! gitviz-import library interface
//!
//! Bulk repository import for the gitviz pipeline: discovers an account's
//! repositories, clones them under a concurrency ceiling and groups the
//! results into projects. Exposed as a library for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult, BulkImportError};

use axum::Router;
use chrono::{DateTime, Utc};
use gitviz_common::config::TomlConfig;
use gitviz_common::events::EventBus;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::db::RepositoryStore;
use crate::services::BulkImportService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Settings table access
    pub db: SqlitePool,
    /// Repository and project records
    pub store: Arc<dyn RepositoryStore>,
    pub bulk_import: Arc<BulkImportService>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Bootstrap config, used for GitHub token fallback
    pub toml_config: Arc<TomlConfig>,
    /// TOML file mirroring settings written through the API
    pub config_path: Option<PathBuf>,
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        store: Arc<dyn RepositoryStore>,
        bulk_import: Arc<BulkImportService>,
        event_bus: EventBus,
        toml_config: TomlConfig,
    ) -> Self {
        Self {
            db,
            store,
            bulk_import,
            event_bus,
            toml_config: Arc::new(toml_config),
            config_path: None,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    pub async fn record_error(&self, message: String) {
        *self.last_error.write().await = Some(message);
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::bulk_import_routes())
        .merge(api::repository_routes())
        .merge(api::settings_routes())
        .merge(api::health_routes())
        .route("/bulk-import/events", get(api::bulk_import_event_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
