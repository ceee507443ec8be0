//! gitviz-import - bulk repository import service
//!
//! Discovers GitHub repositories for one or more accounts, clones them into
//! the gitviz root folder and groups them into projects for visualization.

use anyhow::Result;
use clap::Parser;
use gitviz_common::config::{
    default_config_path, load_toml_config, resolve_root_folder, RootFolderInitializer,
};
use gitviz_common::events::EventBus;
use gitviz_common::time::{SharedClock, TokioClock};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gitviz_import::config::ImportSettings;
use gitviz_import::db::{RepositoryStore, SqliteStore};
use gitviz_import::services::{
    BulkImportService, Checkout, GitCheckout, GitHubApiProvider, StatusRegistry,
};
use gitviz_import::AppState;

const DEFAULT_PORT: u16 = 5780;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "gitviz-import")]
#[command(about = "Bulk repository import service for gitviz")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, env = "GITVIZ_IMPORT_PORT")]
    port: Option<u16>,

    /// Root folder holding the database and cloned repositories
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long, env = "GITVIZ_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let toml_config = load_toml_config(&config_path);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "gitviz_import={level},gitviz_common={level},tower_http=info",
                    level = toml_config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting gitviz-import");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", config_path.display());

    // Root folder: CLI → ENV → TOML → default
    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .map_err(|e| anyhow::anyhow!("Failed to initialize root folder: {}", e))?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = gitviz_import::db::init_database_pool(&db_path).await?;

    let settings = ImportSettings::resolve(initializer.repos_path(), &toml_config);
    let clock: SharedClock = Arc::new(TokioClock);
    let event_bus = EventBus::new(256);

    let store: Arc<dyn RepositoryStore> = Arc::new(SqliteStore::new(db_pool.clone()));
    let checkout: Arc<dyn Checkout> = Arc::new(GitCheckout::new());
    let registry = Arc::new(StatusRegistry::new(clock.clone(), settings.expiry));
    let remote = Arc::new(GitHubApiProvider::new(settings.github_api_url.clone()));

    let bulk_import = Arc::new(BulkImportService::new(
        Arc::clone(&store),
        checkout,
        remote,
        registry,
        event_bus.clone(),
        clock,
        settings,
    ));

    let port = args.port.or(toml_config.port).unwrap_or(DEFAULT_PORT);
    let state = AppState::new(db_pool, store, bulk_import, event_bus, toml_config)
        .with_config_path(config_path);
    let app = gitviz_import::build_router(state);

    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
