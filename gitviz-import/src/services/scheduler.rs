//! Bounded Concurrency Scheduler
//!
//! Tasks run in sequential chunks no larger than the concurrency ceiling.
//! Every task of a chunk is polled concurrently on the job's own task
//! (`join_all`, nothing is spawned) and the chunk settles completely before
//! the next one starts. Between chunks the scheduler pauses for a duration
//! picked from the measured average throughput.

use futures::future::join_all;
use futures::FutureExt;
use gitviz_common::events::{EventBus, GitvizEvent};
use gitviz_common::time::SharedClock;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::checkout_worker::{CheckoutWorker, TaskContext, TaskOutcome};
use super::status_registry::{JobPatch, StatusRegistry};
use super::throughput::ThroughputMeter;
use crate::config::PacingConfig;
use crate::error::BulkImportError;
use crate::models::{RepoTask, TaskStatus};

/// Progress reserved for discovery
pub const DISCOVERY_PROGRESS: u8 = 10;

/// Progress span covered by cloning
pub const CLONING_PROGRESS_SPAN: usize = 80;

/// Repository ids imported or reused by a job
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportLedger {
    pub overall: Vec<Uuid>,
    pub per_owner: HashMap<String, Vec<Uuid>>,
}

impl ImportLedger {
    pub fn record(&mut self, owner: &str, id: Uuid) {
        if !self.overall.contains(&id) {
            self.overall.push(id);
        }
        let ids = self.per_owner.entry(owner.to_string()).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
}

/// Overall progress after `settled` of `total` tasks
pub fn cloning_progress(settled: usize, total: usize) -> u8 {
    if total == 0 {
        return DISCOVERY_PROGRESS + CLONING_PROGRESS_SPAN as u8;
    }
    let settled = settled.min(total);
    DISCOVERY_PROGRESS + (settled * CLONING_PROGRESS_SPAN / total) as u8
}

impl PacingConfig {
    /// Inter-chunk pause for the observed average throughput
    ///
    /// `None` (nothing measured yet) selects the default pause.
    pub fn pause_for(&self, average_bytes_per_sec: Option<f64>) -> Duration {
        match average_bytes_per_sec {
            Some(bps) if bps < self.slow_threshold_bps => self.slow_pause,
            Some(bps) if bps > self.fast_threshold_bps => self.fast_pause,
            _ => self.default_pause,
        }
    }
}

pub struct ChunkScheduler {
    worker: Arc<CheckoutWorker>,
    registry: Arc<StatusRegistry>,
    meter: Arc<ThroughputMeter>,
    event_bus: EventBus,
    clock: SharedClock,
    pacing: PacingConfig,
    ceiling: usize,
}

/// Shared per-run counters; the futures of a chunk borrow them
struct RunState {
    job_id: Uuid,
    total: usize,
    settled: AtomicUsize,
    ledger: Mutex<ImportLedger>,
}

impl ChunkScheduler {
    pub fn new(
        worker: Arc<CheckoutWorker>,
        registry: Arc<StatusRegistry>,
        meter: Arc<ThroughputMeter>,
        event_bus: EventBus,
        clock: SharedClock,
        pacing: PacingConfig,
        ceiling: usize,
    ) -> Self {
        Self {
            worker,
            registry,
            meter,
            event_bus,
            clock,
            pacing,
            ceiling: ceiling.max(1),
        }
    }

    /// Drive every task to a terminal state
    pub async fn run(&self, job_id: Uuid, tasks: &[RepoTask]) -> ImportLedger {
        let state = RunState {
            job_id,
            total: tasks.len(),
            settled: AtomicUsize::new(0),
            ledger: Mutex::new(ImportLedger::default()),
        };

        let chunk_count = tasks.len().div_ceil(self.ceiling);

        for (chunk_index, chunk) in tasks.chunks(self.ceiling).enumerate() {
            let base = chunk_index * self.ceiling;
            let network_clone = AtomicBool::new(false);

            info!(
                bulk_import_id = %job_id,
                chunk = chunk_index + 1,
                chunks = chunk_count,
                size = chunk.len(),
                "Starting clone batch"
            );

            let batch = chunk.iter().enumerate().map(|(offset, task)| {
                let index = base + offset;
                let ctx = TaskContext {
                    registry: Arc::clone(&self.registry),
                    meter: Arc::clone(&self.meter),
                    job_id,
                    index,
                };
                let state = &state;
                let network_clone = &network_clone;
                async move {
                    let outcome = self.worker.run(task, &ctx).await;
                    if outcome.network_clone {
                        network_clone.store(true, Ordering::Relaxed);
                    }
                    self.settle(state, index, task, outcome);
                }
            });

            if let Err(panic) = AssertUnwindSafe(join_all(batch)).catch_unwind().await {
                let error = BulkImportError::ChunkBatch {
                    chunk: chunk_index + 1,
                    message: panic_message(panic.as_ref()),
                };
                warn!(bulk_import_id = %job_id, error = %error, "Clone batch failed");
                self.fail_unsettled(&state, base, chunk, &error.to_string()).await;
                // A panicking batch may have cloned before failing
                network_clone.store(true, Ordering::Relaxed);
            }

            let is_last = chunk_index + 1 == chunk_count;
            if !is_last {
                if network_clone.load(Ordering::Relaxed) {
                    self.pause(job_id).await;
                } else {
                    debug!(bulk_import_id = %job_id, "No network clone in batch, skipping pause");
                }
            }
        }

        state
            .ledger
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, state: &RunState, index: usize, task: &RepoTask, outcome: TaskOutcome) {
        if let Err(e) = self.registry.update_task(
            state.job_id,
            index,
            outcome.status,
            outcome.message.clone(),
            outcome.repository_id,
        ) {
            warn!(bulk_import_id = %state.job_id, index, error = %e, "Rejected task update");
        }

        if outcome.is_success() {
            if let Some(id) = outcome.repository_id {
                state
                    .ledger
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .record(&task.requested_owner, id);
            }
        }

        self.event_bus.emit_lossy(GitvizEvent::RepositorySettled {
            job_id: state.job_id,
            owner: task.owner.clone(),
            repository: task.name.clone(),
            status: outcome.status.to_string(),
            message: outcome.message,
            timestamp: gitviz_common::time::now(),
        });

        let settled = state.settled.fetch_add(1, Ordering::SeqCst) + 1;
        self.publish_progress(state, settled);
    }

    /// Mark every non-terminal member of a failed chunk as failed
    ///
    /// Members dropped mid-clone leave a partial checkout behind; it is purged
    /// so the next run clones again instead of recovering it from disk.
    async fn fail_unsettled(
        &self,
        state: &RunState,
        base: usize,
        chunk: &[RepoTask],
        message: &str,
    ) {
        let Some(job) = self.registry.get(state.job_id) else {
            return;
        };

        for (offset, task) in chunk.iter().enumerate() {
            let index = base + offset;
            let Some(status) = job.tasks.get(index).map(|t| t.status) else {
                continue;
            };
            if status.is_terminal() {
                continue;
            }
            if status == TaskStatus::Cloning {
                self.worker.discard_partial(task).await;
            }
            self.settle(
                state,
                index,
                task,
                TaskOutcome {
                    status: TaskStatus::Failed,
                    message: message.to_string(),
                    repository_id: None,
                    network_clone: false,
                },
            );
        }
    }

    fn publish_progress(&self, state: &RunState, settled: usize) {
        let progress = cloning_progress(settled, state.total);
        let message = format!("Processed {} of {} repositories", settled, state.total);
        let patch = JobPatch {
            progress: Some(progress),
            message: Some(message.clone()),
            throughput: Some(self.meter.sample()),
            ..Default::default()
        };
        if let Err(e) = self.registry.merge_update(state.job_id, patch) {
            warn!(bulk_import_id = %state.job_id, error = %e, "Progress update rejected");
        }

        self.event_bus.emit_lossy(GitvizEvent::BulkImportProgress {
            job_id: state.job_id,
            status: "cloning".to_string(),
            progress,
            message,
            timestamp: gitviz_common::time::now(),
        });
    }

    async fn pause(&self, job_id: Uuid) {
        let average = self.meter.average_bytes_per_sec();
        let pause = self.pacing.pause_for(average);
        info!(
            bulk_import_id = %job_id,
            pause_secs = pause.as_secs_f64(),
            average_bytes_per_sec = average.unwrap_or(0.0),
            "Pausing between clone batches"
        );
        self.clock.sleep(pause).await;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
