//! Checkout primitive
//!
//! [`Checkout`] clones one URL into one destination and reports every
//! progress line it sees. [`git::GitCheckout`] drives the `git` binary;
//! tests plug in fakes.

pub mod git;
pub mod progress;
pub mod strategy;

pub use git::GitCheckout;
pub use progress::{GitProgressParser, ProgressEstimator, ProgressParser};
pub use strategy::{default_strategies, CloneStrategy, RetryCondition, StrategyKind};

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Stderr fragments that identify a filesystem or path-length failure
const FILESYSTEM_SIGNATURES: &[&str] = &[
    "filename too long",
    "file name too long",
    "path too long",
    "unable to create file",
    "could not create work tree",
    "cannot create directory",
    "invalid path",
    "no space left on device",
];

/// Flags for one clone attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneOptions {
    /// History depth; `None` clones full history
    pub depth: Option<u32>,
    pub single_branch: bool,
    /// Fetch objects without populating a working tree
    pub no_checkout: bool,
    /// Sets `core.longpaths=true` on the new repository
    pub long_paths: bool,
    /// Bytes of process output retained for error messages
    pub output_buffer_bytes: usize,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            depth: None,
            single_branch: false,
            no_checkout: false,
            long_paths: false,
            output_buffer_bytes: 64 * 1024,
        }
    }
}

/// Clone attempt failure
#[derive(Debug, Clone, Error)]
pub enum CloneError {
    #[error("Failed to start git: {0}")]
    Spawn(String),

    #[error("git clone exited with {code:?}: {output}")]
    Failed { code: Option<i32>, output: String },

    #[error("Clone timed out after {0:?}")]
    TimedOut(Duration),
}

impl CloneError {
    /// Whether the failure looks like a filesystem or path-length problem
    pub fn is_filesystem_error(&self) -> bool {
        let text = match self {
            CloneError::Spawn(msg) => msg.to_lowercase(),
            CloneError::Failed { output, .. } => output.to_lowercase(),
            CloneError::TimedOut(_) => return false,
        };
        FILESYSTEM_SIGNATURES.iter().any(|sig| text.contains(sig))
    }
}

/// Clone primitive consumed by the checkout worker
#[async_trait]
pub trait Checkout: Send + Sync {
    /// Clone `url` into `dest`, calling `on_progress` with each output line
    async fn clone_repo(
        &self,
        url: &str,
        dest: &Path,
        options: &CloneOptions,
        on_progress: &(dyn for<'s> Fn(&'s str) + Send + Sync),
    ) -> Result<(), CloneError>;
}
