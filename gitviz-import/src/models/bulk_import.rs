//! Bulk import job and per-repository task state
//!
//! Job lifecycle:
//! INITIALIZING → FETCHING_REPOS → PREPARING → CLONING → COMPLETED
//! (any non-terminal state may move to FAILED)
//!
//! Task lifecycle: PENDING → CLONING → {COMPLETED, SKIPPED, FAILED}.
//! A pending task may settle directly (skip or register-from-disk). Terminal
//! states never change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// How projects are synthesized after the import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectCreationMode {
    /// No project is created
    #[default]
    None,
    /// One project holding every imported repository
    Single,
    /// One project per owner with at least one imported repository
    #[serde(alias = "byOwner", alias = "by_owner")]
    PerOwner,
}

/// Job-level status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Initializing,
    FetchingRepos,
    Preparing,
    Cloning,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Initializing => "initializing",
            JobStatus::FetchingRepos => "fetching_repos",
            JobStatus::Preparing => "preparing",
            JobStatus::Cloning => "cloning",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-repository task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Cloning,
    Completed,
    Skipped,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Skipped | TaskStatus::Failed
        )
    }

    /// Whether `self → next` is an allowed move
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        match self {
            TaskStatus::Pending => next != TaskStatus::Pending,
            TaskStatus::Cloning => next.is_terminal(),
            TaskStatus::Completed | TaskStatus::Skipped | TaskStatus::Failed => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Cloning => "cloning",
            TaskStatus::Completed => "completed",
            TaskStatus::Skipped => "skipped",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected status change
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("task {name} is already {from} and cannot become {to}")]
    TaskTerminal {
        name: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("task {name} cannot move from {from} to {to}")]
    TaskInvalid {
        name: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("job is already {from} and cannot become {to}")]
    JobTerminal { from: JobStatus, to: JobStatus },

    #[error("no task at index {0}")]
    UnknownTask(usize),
}

/// One repository scheduled for import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoTask {
    pub name: String,
    pub owner: String,
    pub clone_url: String,
    pub status: TaskStatus,
    pub message: String,
    pub repository_id: Option<Uuid>,
    /// Remote description, stored with the repository record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Owner as typed in the account input; `owner` is the API login
    #[serde(skip)]
    pub requested_owner: String,
}

impl RepoTask {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, clone_url: impl Into<String>) -> Self {
        let owner = owner.into();
        Self {
            name: name.into(),
            requested_owner: owner.clone(),
            owner,
            clone_url: clone_url.into(),
            status: TaskStatus::Pending,
            message: "Waiting".to_string(),
            repository_id: None,
            description: None,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_requested_owner(mut self, owner: impl Into<String>) -> Self {
        self.requested_owner = owner.into();
        self
    }

    /// Validated status change
    pub fn transition(&mut self, next: TaskStatus) -> Result<(), TransitionError> {
        if self.status == next && !next.is_terminal() {
            return Ok(());
        }
        if self.status.is_terminal() {
            return Err(TransitionError::TaskTerminal {
                name: self.name.clone(),
                from: self.status,
                to: next,
            });
        }
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::TaskInvalid {
                name: self.name.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// `<owner>/<name>` label used in logs and messages
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Owner whose repositories could not be listed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedOwner {
    pub name: String,
    pub error: String,
}

/// Project created at the end of an import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedProject {
    pub id: Uuid,
    pub name: String,
    pub repository_count: usize,
}

/// Published throughput figures
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ThroughputSnapshot {
    pub total_bytes: u64,
    pub current_bytes_per_sec: f64,
    pub average_bytes_per_sec: f64,
    pub current_speed: String,
    pub average_speed: String,
    pub elapsed_seconds: u64,
}

/// Task counts derived from the task list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskCounts {
    pub total: usize,
    pub pending: usize,
    pub cloning: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn settled(&self) -> usize {
        self.completed + self.skipped + self.failed
    }
}

/// In-flight or finished bulk import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: Uuid,
    pub account_input: String,
    pub owners: Vec<String>,
    pub project_creation_mode: ProjectCreationMode,
    pub project_name_template: String,
    pub max_concurrent_clones: usize,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
    pub tasks: Vec<RepoTask>,
    pub created_projects: Vec<CreatedProject>,
    pub failed_owners: Vec<FailedOwner>,
    pub throughput: ThroughputSnapshot,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    pub fn new(
        account_input: String,
        project_creation_mode: ProjectCreationMode,
        project_name_template: String,
        max_concurrent_clones: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_input,
            owners: Vec::new(),
            project_creation_mode,
            project_name_template,
            max_concurrent_clones,
            status: JobStatus::Initializing,
            progress: 0,
            message: "Initializing bulk import...".to_string(),
            error: None,
            tasks: Vec::new(),
            created_projects: Vec::new(),
            failed_owners: Vec::new(),
            throughput: ThroughputSnapshot::default(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Validated job status change; terminal states stamp `ended_at`
    pub fn set_status(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if self.status == next {
            return Ok(());
        }
        if self.status.is_terminal() {
            return Err(TransitionError::JobTerminal {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn counts(&self) -> TaskCounts {
        let mut counts = TaskCounts {
            total: self.tasks.len(),
            ..Default::default()
        };
        for task in &self.tasks {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Cloning => counts.cloning += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Skipped => counts.skipped += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
