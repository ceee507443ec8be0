//! HTTP API handlers for gitviz-import
//!
//! REST endpoints for bulk imports, stored repositories and projects,
//! credential settings, plus an SSE stream of import events.

pub mod bulk_import;
pub mod health;
pub mod repositories;
pub mod settings;
pub mod sse;

pub use bulk_import::bulk_import_routes;
pub use health::health_routes;
pub use repositories::repository_routes;
pub use settings::settings_routes;
pub use sse::bulk_import_event_stream;
