//! Checkout Worker
//!
//! Imports one repository and reports the outcome; it never returns an
//! error. Tiers, in order:
//! 1. URL already in the store: skipped, existing id reused
//! 2. destination directory present but unknown to the store: registered
//!    from disk without cloning
//! 3. clone strategies in order, purging the destination before each attempt
//! 4. every strategy failed: task failed with the last error

use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::checkout::{Checkout, CloneError, CloneStrategy, ProgressEstimator, ProgressParser};
use super::status_registry::{JobPatch, StatusRegistry};
use super::throughput::ThroughputMeter;
use crate::db::RepositoryStore;
use crate::error::BulkImportError;
use crate::models::{NewRepository, RepoTask, TaskStatus};

/// Where a worker reports progress for its task
#[derive(Clone)]
pub struct TaskContext {
    pub registry: Arc<StatusRegistry>,
    pub meter: Arc<ThroughputMeter>,
    pub job_id: Uuid,
    pub index: usize,
}

/// Settled result of one task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub status: TaskStatus,
    pub message: String,
    pub repository_id: Option<Uuid>,
    /// Whether a network clone was attempted
    pub network_clone: bool,
}

impl TaskOutcome {
    fn new(status: TaskStatus, message: impl Into<String>, repository_id: Option<Uuid>) -> Self {
        Self {
            status,
            message: message.into(),
            repository_id,
            network_clone: false,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self::new(TaskStatus::Failed, message, None)
    }

    /// Successful outcomes contribute to project membership
    pub fn is_success(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Skipped)
            && self.repository_id.is_some()
    }
}

pub struct CheckoutWorker {
    store: Arc<dyn RepositoryStore>,
    checkout: Arc<dyn Checkout>,
    parser: Arc<dyn ProgressParser>,
    strategies: Vec<CloneStrategy>,
    repos_dir: PathBuf,
    assumed_repo_size_bytes: u64,
    token: Option<String>,
    credential_host: String,
}

impl CheckoutWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn RepositoryStore>,
        checkout: Arc<dyn Checkout>,
        parser: Arc<dyn ProgressParser>,
        strategies: Vec<CloneStrategy>,
        repos_dir: PathBuf,
        assumed_repo_size_bytes: u64,
        token: Option<String>,
        credential_host: impl Into<String>,
    ) -> Self {
        Self {
            store,
            checkout,
            parser,
            strategies,
            repos_dir,
            assumed_repo_size_bytes,
            token,
            credential_host: credential_host.into(),
        }
    }

    /// `<repos_dir>/<owner>_<name>`
    pub fn destination(&self, task: &RepoTask) -> PathBuf {
        self.repos_dir.join(format!("{}_{}", task.owner, task.name))
    }

    /// Remove whatever a cancelled clone left at the task's destination
    pub async fn discard_partial(&self, task: &RepoTask) {
        purge(&self.destination(task)).await;
    }

    /// Run all tiers for one task
    pub async fn run(&self, task: &RepoTask, ctx: &TaskContext) -> TaskOutcome {
        let full_name = task.full_name();

        match self.store.find_by_url(&task.clone_url).await {
            Ok(Some(existing)) => {
                debug!(repository = %full_name, id = %existing.id, "Already imported, skipping");
                return TaskOutcome::new(
                    TaskStatus::Skipped,
                    "Repository already exists",
                    Some(existing.id),
                );
            }
            Ok(None) => {}
            Err(e) => {
                warn!(repository = %full_name, error = %e, "Store lookup failed");
                return TaskOutcome::failed(format!("Store lookup failed: {}", e));
            }
        }

        let dest = self.destination(task);

        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            info!(repository = %full_name, path = %dest.display(), "Registering existing checkout");
            return match self.register(task, &dest).await {
                Ok(id) => TaskOutcome::new(
                    TaskStatus::Completed,
                    "Recovered existing checkout from disk",
                    Some(id),
                ),
                Err(e) => TaskOutcome::failed(format!("Failed to register existing checkout: {}", e)),
            };
        }

        let mut outcome = self.clone_with_fallback(task, &dest, ctx).await;
        outcome.network_clone = true;
        outcome
    }

    async fn clone_with_fallback(&self, task: &RepoTask, dest: &Path, ctx: &TaskContext) -> TaskOutcome {
        let full_name = task.full_name();

        if let Err(e) = ctx.registry.update_task(
            ctx.job_id,
            ctx.index,
            TaskStatus::Cloning,
            "Cloning repository...",
            None,
        ) {
            warn!(repository = %full_name, error = %e, "Could not mark task as cloning");
        }

        let url = self.authenticated_url(&task.clone_url);
        let estimator = Mutex::new(ProgressEstimator::new(self.assumed_repo_size_bytes));
        let on_progress = |line: &str| {
            let Some(percent) = self.parser.parse_percent(line) else {
                return;
            };
            let bytes = estimator
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .observe(percent);
            if bytes > 0 {
                ctx.meter.record_bytes(bytes);
                let patch = JobPatch {
                    throughput: Some(ctx.meter.sample()),
                    ..Default::default()
                };
                if let Err(e) = ctx.registry.merge_update(ctx.job_id, patch) {
                    debug!(bulk_import_id = %ctx.job_id, error = %e, "Throughput update rejected");
                }
            }
        };

        let mut last_error: Option<CloneError> = None;

        for strategy in &self.strategies {
            if !strategy.applies(last_error.as_ref()) {
                continue;
            }

            purge(dest).await;
            estimator
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .reset();

            debug!(repository = %full_name, strategy = strategy.kind.as_str(), "Clone attempt");

            let attempt = tokio::time::timeout(
                strategy.timeout,
                self.checkout.clone_repo(&url, dest, &strategy.options, &on_progress),
            )
            .await;

            match attempt {
                Ok(Ok(())) => {
                    return match self.register(task, dest).await {
                        Ok(id) => {
                            info!(
                                repository = %full_name,
                                strategy = strategy.kind.as_str(),
                                "Repository cloned"
                            );
                            TaskOutcome::new(
                                TaskStatus::Completed,
                                format!("Cloned successfully ({})", strategy.kind.as_str()),
                                Some(id),
                            )
                        }
                        Err(e) => {
                            warn!(repository = %full_name, error = %e, "Cloned but failed to register");
                            TaskOutcome::failed(format!("Cloned but failed to register: {}", e))
                        }
                    };
                }
                Ok(Err(e)) => {
                    warn!(
                        repository = %full_name,
                        strategy = strategy.kind.as_str(),
                        error = %e,
                        "Clone attempt failed"
                    );
                    last_error = Some(e);
                }
                Err(_) => {
                    warn!(
                        repository = %full_name,
                        strategy = strategy.kind.as_str(),
                        timeout_secs = strategy.timeout.as_secs(),
                        "Clone attempt timed out"
                    );
                    last_error = Some(CloneError::TimedOut(strategy.timeout));
                }
            }
        }

        purge(dest).await;

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "No clone strategy configured".to_string());
        let failure = BulkImportError::CloneFailure {
            repository: full_name,
            message,
        };
        warn!(error = %failure, "All clone strategies failed");
        TaskOutcome::failed(failure.to_string())
    }

    async fn register(&self, task: &RepoTask, dest: &Path) -> gitviz_common::Result<Uuid> {
        let repository = self
            .store
            .insert(NewRepository {
                url: task.clone_url.clone(),
                name: task.name.clone(),
                owner: task.owner.clone(),
                description: task.description.clone(),
                path: dest.display().to_string(),
            })
            .await?;
        Ok(repository.id)
    }

    /// Embed the token into https URLs on the credential host
    pub fn authenticated_url(&self, clone_url: &str) -> String {
        let Some(token) = self.token.as_deref() else {
            return clone_url.to_string();
        };
        let Ok(mut url) = Url::parse(clone_url) else {
            return clone_url.to_string();
        };
        if url.scheme() != "https"
            || url.host_str() != Some(self.credential_host.as_str())
            || !url.username().is_empty()
        {
            return clone_url.to_string();
        }
        if url.set_username(token).is_err() {
            return clone_url.to_string();
        }
        url.to_string()
    }
}

/// Remove a partial destination directory, ignoring absence
async fn purge(dest: &Path) {
    match tokio::fs::remove_dir_all(dest).await {
        Ok(()) => debug!(path = %dest.display(), "Purged partial checkout"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %dest.display(), error = %e, "Failed to purge partial checkout"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CloneTimeouts;
    use crate::models::{ImportJob, NewProject, Project, ProjectCreationMode, Repository};
    use crate::services::checkout::{default_strategies, CloneOptions, GitProgressParser};
    use async_trait::async_trait;
    use gitviz_common::time::{SharedClock, TokioClock};
    use std::time::Duration;

    #[derive(Default)]
    struct MemoryStore {
        repos: Mutex<Vec<Repository>>,
    }

    #[async_trait]
    impl RepositoryStore for MemoryStore {
        async fn find_by_url(&self, url: &str) -> gitviz_common::Result<Option<Repository>> {
            Ok(self.repos.lock().unwrap().iter().find(|r| r.url == url).cloned())
        }
        async fn find_by_id(&self, id: Uuid) -> gitviz_common::Result<Option<Repository>> {
            Ok(self.repos.lock().unwrap().iter().find(|r| r.id == id).cloned())
        }
        async fn insert(&self, repository: NewRepository) -> gitviz_common::Result<Repository> {
            let repository = repository.into_repository();
            self.repos.lock().unwrap().push(repository.clone());
            Ok(repository)
        }
        async fn list(&self) -> gitviz_common::Result<Vec<Repository>> {
            Ok(self.repos.lock().unwrap().clone())
        }
        async fn insert_project(&self, project: NewProject) -> gitviz_common::Result<Project> {
            Ok(project.into_project())
        }
        async fn list_projects(&self) -> gitviz_common::Result<Vec<Project>> {
            Ok(Vec::new())
        }
    }

    /// Fails the first `failures` attempts with `error_output`, then creates the directory
    struct ScriptedCheckout {
        failures: usize,
        error_output: String,
        attempts: Mutex<Vec<CloneOptions>>,
        urls: Mutex<Vec<String>>,
    }

    impl ScriptedCheckout {
        fn new(failures: usize, error_output: &str) -> Self {
            Self {
                failures,
                error_output: error_output.to_string(),
                attempts: Mutex::new(Vec::new()),
                urls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Checkout for ScriptedCheckout {
        async fn clone_repo(
            &self,
            url: &str,
            dest: &Path,
            options: &CloneOptions,
            on_progress: &(dyn for<'s> Fn(&'s str) + Send + Sync),
        ) -> Result<(), CloneError> {
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                attempts.push(options.clone());
                attempts.len()
            };
            self.urls.lock().unwrap().push(url.to_string());
            std::fs::create_dir_all(dest.join("partial")).unwrap();
            on_progress("Receiving objects:  50% (5/10)");
            if attempt <= self.failures {
                return Err(CloneError::Failed {
                    code: Some(128),
                    output: self.error_output.clone(),
                });
            }
            // Lines read from git output are owned by the caller's loop
            let line = format!("Receiving objects: {}% (10/10), done.", 100);
            on_progress(line.as_str());
            std::fs::remove_dir_all(dest.join("partial")).unwrap();
            std::fs::write(dest.join("README"), "ok").unwrap();
            Ok(())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        repos_dir: PathBuf,
        store: Arc<MemoryStore>,
        ctx: TaskContext,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let repos_dir = dir.path().join("repos");
        std::fs::create_dir_all(&repos_dir).unwrap();
        let clock: SharedClock = Arc::new(TokioClock);
        let registry = Arc::new(StatusRegistry::new(clock.clone(), Duration::from_secs(600)));
        let mut job = ImportJob::new("acme".into(), ProjectCreationMode::None, "{owner}".into(), 2);
        job.tasks = vec![task()];
        let job_id = job.id;
        registry.insert(job);

        Fixture {
            _dir: dir,
            repos_dir,
            store: Arc::new(MemoryStore::default()),
            ctx: TaskContext {
                registry,
                meter: Arc::new(ThroughputMeter::new(clock)),
                job_id,
                index: 0,
            },
        }
    }

    fn task() -> RepoTask {
        RepoTask::new("acme", "widgets", "https://github.com/acme/widgets.git")
    }

    fn worker(f: &Fixture, checkout: Arc<ScriptedCheckout>, token: Option<&str>) -> CheckoutWorker {
        CheckoutWorker::new(
            f.store.clone(),
            checkout,
            Arc::new(GitProgressParser),
            default_strategies(&CloneTimeouts::default()),
            f.repos_dir.clone(),
            10 * 1024 * 1024,
            token.map(str::to_string),
            "github.com",
        )
    }

    #[tokio::test]
    async fn test_shallow_success_registers_repository() {
        let f = fixture();
        let checkout = Arc::new(ScriptedCheckout::new(0, ""));
        let outcome = worker(&f, checkout.clone(), None).run(&task(), &f.ctx).await;

        assert_eq!(outcome.status, TaskStatus::Completed);
        assert!(outcome.network_clone);
        assert_eq!(f.store.list().await.unwrap().len(), 1);
        assert_eq!(checkout.attempts.lock().unwrap()[0].depth, Some(1));
        assert_eq!(f.ctx.meter.total_bytes(), 10 * 1024 * 1024);
        assert_eq!(
            f.ctx.registry.get(f.ctx.job_id).unwrap().tasks[0].status,
            TaskStatus::Cloning
        );
    }

    #[tokio::test]
    async fn test_existing_url_is_skipped() {
        let f = fixture();
        let existing = f
            .store
            .insert(NewRepository {
                url: task().clone_url,
                name: "widgets".into(),
                owner: "acme".into(),
                description: None,
                path: "/elsewhere".into(),
            })
            .await
            .unwrap();
        let checkout = Arc::new(ScriptedCheckout::new(0, ""));
        let outcome = worker(&f, checkout.clone(), None).run(&task(), &f.ctx).await;

        assert_eq!(outcome.status, TaskStatus::Skipped);
        assert_eq!(outcome.repository_id, Some(existing.id));
        assert!(!outcome.network_clone);
        assert!(checkout.attempts.lock().unwrap().is_empty());
        assert!(!f.repos_dir.join("acme_widgets").exists());
    }

    #[tokio::test]
    async fn test_existing_directory_is_registered() {
        let f = fixture();
        std::fs::create_dir_all(f.repos_dir.join("acme_widgets")).unwrap();
        let checkout = Arc::new(ScriptedCheckout::new(0, ""));
        let outcome = worker(&f, checkout.clone(), None).run(&task(), &f.ctx).await;

        assert_eq!(outcome.status, TaskStatus::Completed);
        assert!(outcome.message.contains("disk"));
        assert!(!outcome.network_clone);
        assert!(checkout.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_path_too_long_escalates_to_extended() {
        let f = fixture();
        let checkout = Arc::new(ScriptedCheckout::new(
            1,
            "error: unable to create file a/b/c.txt: Filename too long",
        ));
        let outcome = worker(&f, checkout.clone(), None).run(&task(), &f.ctx).await;

        assert_eq!(outcome.status, TaskStatus::Completed);
        assert!(outcome.message.contains("extended"));
        let attempts = checkout.attempts.lock().unwrap();
        assert_eq!(attempts.len(), 2);
        assert!(attempts[1].long_paths);
        assert!(!f.repos_dir.join("acme_widgets").join("partial").exists());
    }

    #[tokio::test]
    async fn test_network_error_skips_extended() {
        let f = fixture();
        let checkout = Arc::new(ScriptedCheckout::new(1, "fatal: Could not resolve host"));
        let outcome = worker(&f, checkout.clone(), None).run(&task(), &f.ctx).await;

        assert_eq!(outcome.status, TaskStatus::Completed);
        let attempts = checkout.attempts.lock().unwrap();
        assert_eq!(attempts.len(), 2);
        assert!(attempts[1].no_checkout);
    }

    #[tokio::test]
    async fn test_all_tiers_fail() {
        let f = fixture();
        let checkout = Arc::new(ScriptedCheckout::new(3, "fatal: Filename too long"));
        let outcome = worker(&f, checkout.clone(), None).run(&task(), &f.ctx).await;

        assert_eq!(outcome.status, TaskStatus::Failed);
        assert!(outcome.message.starts_with("Clone failed for acme/widgets"));
        assert!(outcome.message.contains("Filename too long"));
        assert_eq!(checkout.attempts.lock().unwrap().len(), 3);
        assert!(!f.repos_dir.join("acme_widgets").exists());
        assert!(f.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_token_embedded_only_for_credential_host() {
        let f = fixture();
        let checkout = Arc::new(ScriptedCheckout::new(0, ""));
        let w = worker(&f, checkout.clone(), Some("ghp_abc"));
        assert_eq!(
            w.authenticated_url("https://github.com/acme/widgets.git"),
            "https://ghp_abc@github.com/acme/widgets.git"
        );
        assert_eq!(
            w.authenticated_url("https://gitlab.com/acme/widgets.git"),
            "https://gitlab.com/acme/widgets.git"
        );

        w.run(&task(), &f.ctx).await;
        assert!(checkout.urls.lock().unwrap()[0].contains("ghp_abc@"));
        assert_eq!(
            f.store.list().await.unwrap()[0].url,
            "https://github.com/acme/widgets.git"
        );
    }
}
