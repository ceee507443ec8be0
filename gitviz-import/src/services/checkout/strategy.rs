//! Ordered clone strategies
//!
//! The checkout worker walks this list front to back. Each entry states the
//! clone flags, its wall-clock limit and which previous failure lets it run.

use std::time::Duration;

use super::{CloneError, CloneOptions};
use crate::config::CloneTimeouts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Depth 1, single branch
    Shallow,
    /// Full clone with long path support
    Extended,
    /// Object database only, no working tree
    IndexOnly,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Shallow => "shallow",
            StrategyKind::Extended => "extended",
            StrategyKind::IndexOnly => "index_only",
        }
    }
}

/// When a strategy is allowed to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCondition {
    /// First attempt
    Always,
    /// Previous attempt failed with a filesystem or path-length signature
    FilesystemError,
    /// Previous attempt failed for any reason
    AnyFailure,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CloneStrategy {
    pub kind: StrategyKind,
    pub options: CloneOptions,
    pub timeout: Duration,
    pub condition: RetryCondition,
}

impl CloneStrategy {
    /// Whether this strategy runs given the previous attempt's error
    pub fn applies(&self, previous: Option<&CloneError>) -> bool {
        match (self.condition, previous) {
            (RetryCondition::Always, _) => true,
            (RetryCondition::FilesystemError, Some(err)) => err.is_filesystem_error(),
            (RetryCondition::AnyFailure, Some(_)) => true,
            (_, None) => false,
        }
    }
}

/// shallow → extended (filesystem errors only) → index_only
pub fn default_strategies(timeouts: &CloneTimeouts) -> Vec<CloneStrategy> {
    let base = CloneOptions::default();
    vec![
        CloneStrategy {
            kind: StrategyKind::Shallow,
            options: CloneOptions {
                depth: Some(1),
                single_branch: true,
                ..base.clone()
            },
            timeout: timeouts.shallow,
            condition: RetryCondition::Always,
        },
        CloneStrategy {
            kind: StrategyKind::Extended,
            options: CloneOptions {
                long_paths: true,
                output_buffer_bytes: 1024 * 1024,
                ..base.clone()
            },
            timeout: timeouts.extended,
            condition: RetryCondition::FilesystemError,
        },
        CloneStrategy {
            kind: StrategyKind::IndexOnly,
            options: CloneOptions {
                no_checkout: true,
                ..base
            },
            timeout: timeouts.index_only,
            condition: RetryCondition::AnyFailure,
        },
    ]
}
