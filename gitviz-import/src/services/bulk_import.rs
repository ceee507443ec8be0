//! Bulk Import Orchestrator
//!
//! Drives one job end to end:
//! initializing → fetching_repos → preparing → cloning → completed
//! with `failed` reachable from any non-terminal state. Owner- and
//! repository-level problems are recorded on the job; only invalid input,
//! a missing credential and catastrophic listing errors fail it.

use gitviz_common::events::{EventBus, GitvizEvent};
use gitviz_common::time::SharedClock;
use reqwest::Url;
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::checkout::{default_strategies, Checkout, GitProgressParser};
use super::checkout_worker::CheckoutWorker;
use super::github_client::{list_owner_repositories, GitHubClient, RemoteApi};
use super::owner_resolver::resolve_owners;
use super::project_materializer::materialize;
use super::scheduler::{ChunkScheduler, DISCOVERY_PROGRESS};
use super::status_registry::{JobPatch, StatusRegistry};
use super::throughput::{spawn_ticker, ThroughputMeter};
use crate::config::{ImportSettings, DEFAULT_PROJECT_NAME_TEMPLATE};
use crate::db::RepositoryStore;
use crate::error::BulkImportError;
use crate::models::{FailedOwner, ImportJob, JobStatus, ProjectCreationMode, RepoTask};

/// Parameters of a bulk import request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkImportRequest {
    pub account_input: String,
    #[serde(default)]
    pub project_creation_mode: ProjectCreationMode,
    #[serde(default)]
    pub project_name_template: Option<String>,
    #[serde(default)]
    pub max_concurrent_clones: Option<usize>,
    #[serde(default)]
    pub repo_limit: Option<usize>,
}

/// Builds a remote listing client for a credential
pub trait RemoteApiProvider: Send + Sync {
    fn connect(&self, token: &str) -> Result<Arc<dyn RemoteApi>, BulkImportError>;
}

/// GitHub REST provider
pub struct GitHubApiProvider {
    base_url: String,
}

impl GitHubApiProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl RemoteApiProvider for GitHubApiProvider {
    fn connect(&self, token: &str) -> Result<Arc<dyn RemoteApi>, BulkImportError> {
        let client = GitHubClient::new(&self.base_url, token)
            .map_err(|e| BulkImportError::Remote(e.to_string()))?;
        Ok(Arc::new(client))
    }
}

/// Host whose clone URLs receive the credential
///
/// `api.github.com` maps to `github.com`; an Enterprise API URL maps to its
/// own host.
pub fn credential_host(api_url: &str) -> String {
    let host = Url::parse(api_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "github.com".to_string());
    if host == "api.github.com" {
        "github.com".to_string()
    } else {
        host
    }
}

pub struct BulkImportService {
    store: Arc<dyn RepositoryStore>,
    checkout: Arc<dyn Checkout>,
    remote: Arc<dyn RemoteApiProvider>,
    registry: Arc<StatusRegistry>,
    event_bus: EventBus,
    clock: SharedClock,
    settings: ImportSettings,
}

impl BulkImportService {
    pub fn new(
        store: Arc<dyn RepositoryStore>,
        checkout: Arc<dyn Checkout>,
        remote: Arc<dyn RemoteApiProvider>,
        registry: Arc<StatusRegistry>,
        event_bus: EventBus,
        clock: SharedClock,
        settings: ImportSettings,
    ) -> Self {
        Self {
            store,
            checkout,
            remote,
            registry,
            event_bus,
            clock,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<StatusRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    /// Register a job for `request` without running it
    pub fn prepare(&self, request: &BulkImportRequest) -> ImportJob {
        let template = request
            .project_name_template
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROJECT_NAME_TEMPLATE.to_string());
        let job = ImportJob::new(
            request.account_input.clone(),
            request.project_creation_mode,
            template,
            self.settings.ceiling_for(request.max_concurrent_clones),
        );
        self.registry.insert(job.clone());
        job
    }

    /// Register a job and run it on its own task
    pub fn start(self: &Arc<Self>, request: BulkImportRequest, token: Option<String>) -> Uuid {
        let job = self.prepare(&request);
        let job_id = job.id;
        let service = Arc::clone(self);

        info!(
            bulk_import_id = %job_id,
            account_input = %request.account_input,
            mode = ?request.project_creation_mode,
            max_concurrent_clones = job.max_concurrent_clones,
            "Starting bulk import"
        );

        tokio::spawn(async move {
            service.execute(job_id, token, request.repo_limit).await;
        });

        job_id
    }

    /// Run a prepared job to completion and return its final snapshot
    ///
    /// Expiry is scheduled before returning, whatever the outcome.
    pub async fn execute(
        &self,
        job_id: Uuid,
        token: Option<String>,
        repo_limit: Option<usize>,
    ) -> Option<ImportJob> {
        let outcome = self.run_stages(job_id, token, repo_limit).await;

        if let Err(e) = outcome {
            error!(bulk_import_id = %job_id, error = %e, "Bulk import failed");
            let patch = JobPatch {
                status: Some(JobStatus::Failed),
                message: Some(e.to_string()),
                error: Some(e.to_string()),
                ..Default::default()
            };
            if let Err(update_err) = self.registry.merge_update(job_id, patch) {
                warn!(bulk_import_id = %job_id, error = %update_err, "Could not record failure");
            }
        }

        let snapshot = self.registry.get(job_id);
        if let Some(job) = &snapshot {
            let counts = job.counts();
            self.event_bus.emit_lossy(GitvizEvent::BulkImportFinished {
                job_id,
                status: job.status.to_string(),
                completed: counts.completed,
                skipped: counts.skipped,
                failed: counts.failed,
                projects_created: job.created_projects.len(),
                timestamp: gitviz_common::time::now(),
            });
        }

        self.registry.schedule_expiry(job_id);
        snapshot
    }

    async fn run_stages(
        &self,
        job_id: Uuid,
        token: Option<String>,
        repo_limit: Option<usize>,
    ) -> Result<(), BulkImportError> {
        let job = self
            .registry
            .get(job_id)
            .ok_or_else(|| BulkImportError::InvalidInput(format!("Unknown bulk import {}", job_id)))?;

        self.emit_progress(job_id, JobStatus::Initializing, 0, &job.message);

        let owners = resolve_owners(&job.account_input)?;
        self.update(job_id, JobPatch { owners: Some(owners.clone()), ..Default::default() })?;

        let token = token
            .filter(|t| !t.trim().is_empty())
            .ok_or(BulkImportError::MissingCredential)?;
        let api = self.remote.connect(&token)?;

        // Discovery
        let limit = self.settings.repo_limit_for(repo_limit);
        let mut tasks: Vec<RepoTask> = Vec::new();
        let mut failed_owners: Vec<FailedOwner> = Vec::new();

        for (i, owner) in owners.iter().enumerate() {
            let message = format!(
                "Fetching repositories for {} ({}/{})",
                owner,
                i + 1,
                owners.len()
            );
            let progress = (i * DISCOVERY_PROGRESS as usize / owners.len()) as u8;
            self.set_stage(job_id, JobStatus::FetchingRepos, progress, message)?;

            match list_owner_repositories(api.as_ref(), owner, limit).await {
                Ok(repos) => {
                    tasks.extend(repos.into_iter().map(|r| {
                        RepoTask::new(r.owner, r.name, r.clone_url)
                            .with_description(r.description)
                            .with_requested_owner(owner.as_str())
                    }));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(bulk_import_id = %job_id, owner = %owner, error = %e, "Owner skipped");
                    failed_owners.push(FailedOwner {
                        name: owner.clone(),
                        error: e.to_string(),
                    });
                }
            }

            self.update(
                job_id,
                JobPatch { failed_owners: Some(failed_owners.clone()), ..Default::default() },
            )?;
        }

        let total = tasks.len();
        self.update(
            job_id,
            JobPatch {
                status: Some(JobStatus::Preparing),
                progress: Some(DISCOVERY_PROGRESS),
                message: Some(format!("Found {} repositories", total)),
                tasks: Some(tasks.clone()),
                ..Default::default()
            },
        )?;
        self.emit_progress(
            job_id,
            JobStatus::Preparing,
            DISCOVERY_PROGRESS,
            &format!("Found {} repositories", total),
        );

        // Cloning
        let ledger = if tasks.is_empty() {
            Default::default()
        } else {
            let job = self.registry.get(job_id).unwrap_or(job);
            self.set_stage(
                job_id,
                JobStatus::Cloning,
                DISCOVERY_PROGRESS,
                format!("Cloning {} repositories", total),
            )?;
            self.clone_all(job_id, &tasks, job.max_concurrent_clones, Some(token))
                .await
        };

        // Materialization
        let job = self.registry.get(job_id).ok_or_else(|| {
            BulkImportError::InvalidInput(format!("Unknown bulk import {}", job_id))
        })?;
        if job.project_creation_mode != ProjectCreationMode::None {
            self.update(
                job_id,
                JobPatch {
                    progress: Some(90),
                    message: Some("Creating projects...".to_string()),
                    ..Default::default()
                },
            )?;
        }
        let created = materialize(
            self.store.as_ref(),
            job.project_creation_mode,
            &job.project_name_template,
            &owners,
            &ledger,
            chrono::Utc::now().date_naive(),
        )
        .await;

        let counts = job.counts();
        let message = if total == 0 {
            "Bulk import completed: no repositories found".to_string()
        } else {
            format!(
                "Bulk import completed: {} imported, {} skipped, {} failed",
                counts.completed, counts.skipped, counts.failed
            )
        };

        self.update(
            job_id,
            JobPatch {
                status: Some(JobStatus::Completed),
                progress: Some(100),
                message: Some(message.clone()),
                created_projects: Some(created),
                ..Default::default()
            },
        )?;
        self.emit_progress(job_id, JobStatus::Completed, 100, &message);

        info!(
            bulk_import_id = %job_id,
            total,
            completed = counts.completed,
            skipped = counts.skipped,
            failed = counts.failed,
            failed_owners = job.failed_owners.len(),
            "Bulk import completed"
        );

        Ok(())
    }

    async fn clone_all(
        &self,
        job_id: Uuid,
        tasks: &[RepoTask],
        ceiling: usize,
        token: Option<String>,
    ) -> super::scheduler::ImportLedger {
        let meter = Arc::new(ThroughputMeter::new(self.clock.clone()));
        let worker = Arc::new(CheckoutWorker::new(
            Arc::clone(&self.store),
            Arc::clone(&self.checkout),
            Arc::new(GitProgressParser),
            default_strategies(&self.settings.clone_timeouts),
            self.settings.repos_dir.clone(),
            self.settings.assumed_repo_size_bytes,
            token,
            credential_host(&self.settings.github_api_url),
        ));
        let scheduler = ChunkScheduler::new(
            worker,
            Arc::clone(&self.registry),
            Arc::clone(&meter),
            self.event_bus.clone(),
            self.clock.clone(),
            self.settings.pacing.clone(),
            ceiling,
        );

        let cancel = CancellationToken::new();
        let ticker = spawn_ticker(
            Arc::clone(&meter),
            Arc::clone(&self.registry),
            job_id,
            self.settings.throughput_interval,
            cancel.clone(),
        );

        let ledger = scheduler.run(job_id, tasks).await;

        cancel.cancel();
        if let Err(e) = ticker.await {
            warn!(bulk_import_id = %job_id, error = %e, "Throughput ticker ended abnormally");
        }
        if let Err(e) = self.registry.merge_update(
            job_id,
            JobPatch { throughput: Some(meter.sample()), ..Default::default() },
        ) {
            warn!(bulk_import_id = %job_id, error = %e, "Final throughput update rejected");
        }

        ledger
    }

    fn update(&self, job_id: Uuid, patch: JobPatch) -> Result<(), BulkImportError> {
        self.registry
            .merge_update(job_id, patch)
            .map_err(|e| BulkImportError::Remote(format!("Status update rejected: {}", e)))
    }

    fn set_stage(
        &self,
        job_id: Uuid,
        status: JobStatus,
        progress: u8,
        message: String,
    ) -> Result<(), BulkImportError> {
        self.update(job_id, JobPatch::status(status, progress, message.clone()))?;
        self.emit_progress(job_id, status, progress, &message);
        Ok(())
    }

    fn emit_progress(&self, job_id: Uuid, status: JobStatus, progress: u8, message: &str) {
        self.event_bus.emit_lossy(GitvizEvent::BulkImportProgress {
            job_id,
            status: status.to_string(),
            progress,
            message: message.to_string(),
            timestamp: gitviz_common::time::now(),
        });
    }
}
