//! Periodic automatic serialization
//!
//! Every tick starts a targeted "Auto" sweep over the online subjects. A
//! tick that finds a sweep already running is skipped, not queued.

use crate::optimization::OptimizationEngine;
use crate::subject::SubjectProvider;
use datasync_core::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Snapshot name used by automatic sweeps
pub const AUTO_SNAPSHOT_NAME: &str = "Auto";

/// Handle to the running periodic task
///
/// Dropping the handle stops the task.
pub struct AutoSerializationTask {
    period: Duration,
    handle: JoinHandle<()>,
}

impl AutoSerializationTask {
    /// Spawn the task on the current runtime
    ///
    /// The first sweep runs one full `period` after spawning.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime or with a zero period.
    pub fn spawn(
        engine: OptimizationEngine,
        subjects: Arc<dyn SubjectProvider>,
        period: Duration,
    ) -> Self {
        assert!(!period.is_zero(), "auto serialization period must be non-zero");
        let handle = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                tick(&engine, subjects.as_ref());
            }
        });
        info!(target: "datasync::task", period_secs = period.as_secs(), "Auto serialization scheduled");
        Self { period, handle }
    }

    /// Interval between sweeps
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stop the task; a sweep already started keeps running
    pub fn stop(self) {
        // Drop aborts
    }
}

impl Drop for AutoSerializationTask {
    fn drop(&mut self) {
        self.handle.abort();
        debug!(target: "datasync::task", "Auto serialization stopped");
    }
}

fn tick(engine: &OptimizationEngine, subjects: &dyn SubjectProvider) {
    if engine.is_running() {
        debug!(target: "datasync::task", "Sweep in progress, skipping auto serialization");
        return;
    }
    let users: Vec<_> = subjects.online().iter().map(|s| s.user_id()).collect();
    if users.is_empty() {
        return;
    }
    let count = users.len();
    match engine.optimize_users(users, AUTO_SNAPSHOT_NAME) {
        Ok(()) => info!(target: "datasync::task", users = count, "Auto serialization started"),
        // Lost a race with another starter
        Err(Error::SweepAlreadyRunning) => {
            debug!(target: "datasync::task", "Sweep in progress, skipping auto serialization")
        }
        Err(e) => warn!(target: "datasync::task", error = %e, "Auto serialization failed to start"),
    }
}
