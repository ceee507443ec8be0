//! Throughput Meter
//!
//! Counts estimated bytes transferred by clone workers and derives the
//! instantaneous and average speeds shown to pollers and used for pacing.

use gitviz_common::time::SharedClock;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::status_registry::{JobPatch, StatusRegistry};
use crate::models::ThroughputSnapshot;

struct MeterState {
    start: Instant,
    total_bytes: u64,
    last_sample_at: Instant,
    last_sample_bytes: u64,
    last_speed: f64,
}

pub struct ThroughputMeter {
    clock: SharedClock,
    state: Mutex<MeterState>,
}

impl ThroughputMeter {
    pub fn new(clock: SharedClock) -> Self {
        let now = clock.now();
        Self {
            clock,
            state: Mutex::new(MeterState {
                start: now,
                total_bytes: 0,
                last_sample_at: now,
                last_sample_bytes: 0,
                last_speed: 0.0,
            }),
        }
    }

    /// Add transferred bytes to the running total
    pub fn record_bytes(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.total_bytes = state.total_bytes.saturating_add(bytes);
    }

    pub fn total_bytes(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .total_bytes
    }

    /// Average speed so far, or `None` before anything was measured
    pub fn average_bytes_per_sec(&self) -> Option<f64> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = self.clock.now().saturating_duration_since(state.start);
        if state.total_bytes == 0 || elapsed.is_zero() {
            return None;
        }
        Some(state.total_bytes as f64 / elapsed.as_secs_f64())
    }

    /// Compute speeds and advance the instantaneous-speed window
    ///
    /// Samples taken with no elapsed time since the previous one repeat the
    /// previous instantaneous speed.
    pub fn sample(&self) -> ThroughputSnapshot {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let window = now.saturating_duration_since(state.last_sample_at);
        if !window.is_zero() {
            let delta = state.total_bytes.saturating_sub(state.last_sample_bytes);
            state.last_speed = delta as f64 / window.as_secs_f64();
            state.last_sample_at = now;
            state.last_sample_bytes = state.total_bytes;
        }

        let elapsed = now.saturating_duration_since(state.start);
        let average = if elapsed.is_zero() {
            0.0
        } else {
            state.total_bytes as f64 / elapsed.as_secs_f64()
        };

        ThroughputSnapshot {
            total_bytes: state.total_bytes,
            current_bytes_per_sec: state.last_speed,
            average_bytes_per_sec: average,
            current_speed: format_speed(state.last_speed),
            average_speed: format_speed(average),
            elapsed_seconds: elapsed.as_secs(),
        }
    }
}

/// Format bytes/sec as B/s, KB/s, MB/s or GB/s
pub fn format_speed(bytes_per_sec: f64) -> String {
    const UNITS: [&str; 4] = ["B/s", "KB/s", "MB/s", "GB/s"];
    let mut value = bytes_per_sec.max(0.0);
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{:.0} {}", value, UNITS[unit])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

/// Publish meter samples into the registry every `interval` until cancelled
pub fn spawn_ticker(
    meter: Arc<ThroughputMeter>,
    registry: Arc<StatusRegistry>,
    job_id: Uuid,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let patch = JobPatch {
                        throughput: Some(meter.sample()),
                        ..Default::default()
                    };
                    if registry.merge_update(job_id, patch).is_err() {
                        break;
                    }
                }
            }
        }
    })
}
