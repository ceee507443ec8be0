//! Test Helper Utilities
//!
//! Shared fakes and a harness for driving bulk imports without network or git

#![allow(dead_code)]

pub mod fakes;

pub use fakes::{CloneBehavior, FakeCheckout, FakeProvider, FakeRemote};

use gitviz_common::events::EventBus;
use gitviz_common::time::{ManualClock, SharedClock, TokioClock};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use gitviz_import::config::ImportSettings;
use gitviz_import::db::{RepositoryStore, SqliteStore};
use gitviz_import::models::{ImportJob, ProjectCreationMode};
use gitviz_import::services::{BulkImportRequest, BulkImportService, RemoteRepo, StatusRegistry};

pub const TEST_TOKEN: &str = "ghp_test";

/// In-memory database with the gitviz-import schema
///
/// A single connection keeps every query on the same in-memory database.
pub async fn create_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    gitviz_import::db::init_tables(&pool)
        .await
        .expect("Failed to initialize schema");
    pool
}

/// Remote repositories `owner/<name>` with github.com clone URLs
pub fn remote_repos(owner: &str, names: &[&str]) -> Vec<RemoteRepo> {
    names
        .iter()
        .map(|name| RemoteRepo {
            name: name.to_string(),
            owner: owner.to_string(),
            clone_url: format!("https://github.com/{}/{}.git", owner, name),
            description: Some(format!("{} test repository", name)),
        })
        .collect()
}

pub fn request(
    account_input: &str,
    mode: ProjectCreationMode,
    max_concurrent_clones: usize,
) -> BulkImportRequest {
    BulkImportRequest {
        account_input: account_input.to_string(),
        project_creation_mode: mode,
        project_name_template: None,
        max_concurrent_clones: Some(max_concurrent_clones),
        repo_limit: None,
    }
}

/// Directory names directly under `dir`, sorted
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Bulk import service wired to fakes, a real SQLite store and a manual clock
pub struct Harness {
    pub service: Arc<BulkImportService>,
    pub store: Arc<dyn RepositoryStore>,
    pub pool: SqlitePool,
    pub checkout: Arc<FakeCheckout>,
    pub remote: Arc<FakeRemote>,
    pub provider: Arc<FakeProvider>,
    /// Drives the service unless built with a real clock
    pub clock: ManualClock,
    pub event_bus: EventBus,
    pub repos_dir: TempDir,
}

impl Harness {
    pub async fn new(remote: FakeRemote) -> Self {
        Self::with_checkout(remote, FakeCheckout::new()).await
    }

    pub async fn with_checkout(remote: FakeRemote, checkout: FakeCheckout) -> Self {
        Self::with_clock(remote, checkout, ManualClock::new()).await
    }

    /// Drive the service with a clock the checkout can also advance
    pub async fn with_clock(
        remote: FakeRemote,
        checkout: FakeCheckout,
        clock: ManualClock,
    ) -> Self {
        Self::build(remote, checkout, clock.clone(), Arc::new(clock)).await
    }

    /// Service on tokio timers; jobs stay pollable until the real expiry
    pub async fn with_real_clock(remote: FakeRemote) -> Self {
        Self::build(remote, FakeCheckout::new(), ManualClock::new(), Arc::new(TokioClock)).await
    }

    async fn build(
        remote: FakeRemote,
        checkout: FakeCheckout,
        clock: ManualClock,
        shared_clock: SharedClock,
    ) -> Self {
        let pool = create_test_db().await;
        let repos_dir = tempfile::tempdir().expect("Failed to create repos dir");
        let event_bus = EventBus::new(1024);

        let settings = ImportSettings::new(repos_dir.path().to_path_buf());
        let store: Arc<dyn RepositoryStore> = Arc::new(SqliteStore::new(pool.clone()));
        let checkout = Arc::new(checkout);
        let remote = Arc::new(remote);
        let provider = Arc::new(FakeProvider::new(Arc::clone(&remote)));
        let registry = Arc::new(StatusRegistry::new(shared_clock.clone(), settings.expiry));

        let service = Arc::new(BulkImportService::new(
            Arc::clone(&store),
            checkout.clone(),
            provider.clone(),
            registry,
            event_bus.clone(),
            shared_clock,
            settings,
        ));

        Self {
            service,
            store,
            pool,
            checkout,
            remote,
            provider,
            clock,
            event_bus,
            repos_dir,
        }
    }

    pub fn repos_path(&self) -> &Path {
        self.repos_dir.path()
    }

    /// Run a job to completion with the test token
    pub async fn run(&self, request: BulkImportRequest) -> ImportJob {
        self.run_with_token(request, Some(TEST_TOKEN.to_string())).await
    }

    pub async fn run_with_token(&self, request: BulkImportRequest, token: Option<String>) -> ImportJob {
        let job = self.service.prepare(&request);
        self.checkout.watch(Arc::clone(self.service.registry()), job.id);
        self.service
            .execute(job.id, token, request.repo_limit)
            .await
            .expect("job snapshot missing after execute")
    }
}
