//! Status Registry
//!
//! In-memory map from job id to [`ImportJob`]. Every mutation is a
//! read-merge-write under a short synchronous lock that is never held across
//! an await, so workers updating disjoint fields never clobber each other.
//! Finished jobs are removed after a delay measured on the injected clock.

use gitviz_common::time::SharedClock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    CreatedProject, FailedOwner, ImportJob, JobStatus, RepoTask, TaskCounts, TaskStatus,
    ThroughputSnapshot, TransitionError,
};

/// Message returned when polling an unknown or expired job
pub const NOT_FOUND_ERROR: &str = "Bulk import not found or expired";

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("Unknown bulk import {0}")]
    UnknownJob(Uuid),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Partial job update; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub owners: Option<Vec<String>>,
    pub tasks: Option<Vec<RepoTask>>,
    pub created_projects: Option<Vec<CreatedProject>>,
    pub failed_owners: Option<Vec<FailedOwner>>,
    pub throughput: Option<ThroughputSnapshot>,
}

impl JobPatch {
    pub fn status(status: JobStatus, progress: u8, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            progress: Some(progress),
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Poll response: the job snapshot or the not-found sentinel
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JobPoll {
    Found(Box<JobView>),
    NotFound { status: &'static str, error: &'static str },
}

impl JobPoll {
    pub fn not_found() -> Self {
        JobPoll::NotFound {
            status: "not_found",
            error: NOT_FOUND_ERROR,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, JobPoll::Found(_))
    }
}

/// Client-facing job snapshot with derived counts
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub bulk_import_id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
    pub owners: Vec<String>,
    pub project_creation_mode: crate::models::ProjectCreationMode,
    pub repositories: Vec<RepoTask>,
    pub total_repos: usize,
    pub completed_repos: usize,
    pub skipped_repos: usize,
    pub failed_repos: usize,
    pub throughput: ThroughputSnapshot,
    pub created_projects: Vec<CreatedProject>,
    pub failed_owners: Vec<FailedOwner>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<ImportJob> for JobView {
    fn from(job: ImportJob) -> Self {
        let counts: TaskCounts = job.counts();
        Self {
            bulk_import_id: job.id,
            status: job.status,
            progress: job.progress,
            message: job.message,
            error: job.error,
            owners: job.owners,
            project_creation_mode: job.project_creation_mode,
            repositories: job.tasks,
            total_repos: counts.total,
            completed_repos: counts.completed,
            skipped_repos: counts.skipped,
            failed_repos: counts.failed,
            throughput: job.throughput,
            created_projects: job.created_projects,
            failed_owners: job.failed_owners,
            started_at: job.started_at,
            ended_at: job.ended_at,
        }
    }
}

/// Owned job status store
pub struct StatusRegistry {
    jobs: RwLock<HashMap<Uuid, ImportJob>>,
    clock: SharedClock,
    expiry: Duration,
}

impl StatusRegistry {
    pub fn new(clock: SharedClock, expiry: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            clock,
            expiry,
        }
    }

    /// Register a new job; an existing record with the same id is replaced
    pub fn insert(&self, job: ImportJob) {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        jobs.insert(job.id, job);
    }

    /// Snapshot of a job
    pub fn get(&self, id: Uuid) -> Option<ImportJob> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(&id).cloned()
    }

    /// Merge `patch` into the current record
    ///
    /// A rejected status change leaves the record untouched.
    pub fn merge_update(&self, id: Uuid, patch: JobPatch) -> Result<(), RegistryError> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let job = jobs.get_mut(&id).ok_or(RegistryError::UnknownJob(id))?;

        if let Some(status) = patch.status {
            job.set_status(status)?;
        }
        if let Some(progress) = patch.progress {
            job.progress = progress.min(100);
        }
        if let Some(message) = patch.message {
            job.message = message;
        }
        if let Some(error) = patch.error {
            job.error = Some(error);
        }
        if let Some(owners) = patch.owners {
            job.owners = owners;
        }
        if let Some(tasks) = patch.tasks {
            job.tasks = tasks;
        }
        if let Some(created_projects) = patch.created_projects {
            job.created_projects = created_projects;
        }
        if let Some(failed_owners) = patch.failed_owners {
            job.failed_owners = failed_owners;
        }
        if let Some(throughput) = patch.throughput {
            job.throughput = throughput;
        }
        Ok(())
    }

    /// Move one task to `status`, updating its message and repository id
    pub fn update_task(
        &self,
        id: Uuid,
        index: usize,
        status: TaskStatus,
        message: impl Into<String>,
        repository_id: Option<Uuid>,
    ) -> Result<(), RegistryError> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let job = jobs.get_mut(&id).ok_or(RegistryError::UnknownJob(id))?;
        let task = job
            .tasks
            .get_mut(index)
            .ok_or(TransitionError::UnknownTask(index))?;

        task.transition(status)?;
        task.message = message.into();
        if repository_id.is_some() {
            task.repository_id = repository_id;
        }
        Ok(())
    }

    /// Number of tasks currently cloning in a job
    pub fn cloning_count(&self, id: Uuid) -> usize {
        self.get(id).map(|job| job.counts().cloning).unwrap_or(0)
    }

    /// Number of jobs that have not reached a terminal state
    pub fn active_count(&self) -> usize {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.values().filter(|job| !job.is_terminal()).count()
    }

    pub fn delete(&self, id: Uuid) -> bool {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        jobs.remove(&id).is_some()
    }

    /// Remove the job once the configured expiry elapses on the clock
    pub fn schedule_expiry(self: &Arc<Self>, id: Uuid) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let sleep = self.clock.sleep(self.expiry);
        tokio::spawn(async move {
            sleep.await;
            if registry.delete(id) {
                debug!(bulk_import_id = %id, "Expired bulk import status");
            }
        })
    }

    /// Current snapshot or the not-found sentinel
    pub fn poll(&self, id: Uuid) -> JobPoll {
        match self.get(id) {
            Some(job) => JobPoll::Found(Box::new(JobView::from(job))),
            None => JobPoll::not_found(),
        }
    }
}
