//! Data models for gitviz-import
//!
//! - Bulk import job / task state machine
//! - Repository and project store records

pub mod bulk_import;
pub mod repository;

pub use bulk_import::{
    CreatedProject, FailedOwner, ImportJob, JobStatus, ProjectCreationMode, RepoTask, TaskCounts,
    TaskStatus, ThroughputSnapshot, TransitionError,
};
pub use repository::{NewProject, NewRepository, Project, Repository};
