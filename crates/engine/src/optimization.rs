//! Optimization engine
//!
//! A sweep walks owners one at a time. For each owner it cleans the
//! reference list, uploads a fresh snapshot of the live subject and prunes
//! history with the retention policy.
//!
//! # State machine
//!
//! ```text
//! Idle ──start──▶ Running ──done──▶ Idle
//!                    │
//!                  stop
//!                    ▼
//!               Cancelling ──current owner done──▶ Idle
//! ```
//!
//! Only one sweep runs per engine. Starting a sweep while one is active is
//! rejected with [`Error::SweepAlreadyRunning`], never queued. Cancellation
//! is checked between owners and never interrupts an owner in flight.

use crate::locks::LockedUsers;
use crate::repository::{OwnerRepository, SnapshotRepository};
use crate::retention::RetentionPolicy;
use crate::subject::SubjectProvider;
use crate::user_serializer::{SerializeOutcome, UserSerializer};
use datasync_core::{Error, OwnerQuery, Result, SnapshotKey, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lifecycle phase of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepPhase {
    /// No sweep is running
    Idle,
    /// A sweep is walking owners
    Running,
    /// A sweep was asked to stop and is finishing its current owner
    Cancelling,
}

/// Which owners a sweep covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepScope {
    /// An explicit list of users
    Targeted,
    /// Every owner that existed when the sweep started
    Full,
}

impl fmt::Display for SweepScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepScope::Targeted => f.write_str("targeted"),
            SweepScope::Full => f.write_str("full"),
        }
    }
}

/// Counter values at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Fresh snapshots stored
    pub snapshots_uploaded: u64,
    /// Old snapshots deleted by retention
    pub snapshots_deleted: u64,
    /// Owners fully processed
    pub members_completed: u64,
    /// Owners whose unit failed
    pub members_failed: u64,
    /// Owners the sweep set out to visit
    pub members_total: u64,
}

/// Report emitted when a sweep ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepSummary {
    /// Label given to the uploaded snapshots
    pub name: String,
    /// Targeted or full
    pub scope: SweepScope,
    /// Final counter values
    pub stats: SweepStats,
    /// True if the sweep stopped early
    pub cancelled: bool,
}

/// Current phase and counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepInfo {
    /// Current phase
    pub phase: SweepPhase,
    /// Counters of the running sweep, zero when idle
    pub stats: SweepStats,
}

/// Sweep counters
///
/// Relaxed ordering throughout: only the sweep task writes, readers only
/// need a recent value for reporting.
#[derive(Default)]
struct SweepCounters {
    uploaded: AtomicU64,
    deleted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    total: AtomicU64,
}

impl SweepCounters {
    fn snapshot(&self) -> SweepStats {
        SweepStats {
            snapshots_uploaded: self.uploaded.load(Ordering::Relaxed),
            snapshots_deleted: self.deleted.load(Ordering::Relaxed),
            members_completed: self.completed.load(Ordering::Relaxed),
            members_failed: self.failed.load(Ordering::Relaxed),
            members_total: self.total.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for counter in [
            &self.uploaded,
            &self.deleted,
            &self.completed,
            &self.failed,
            &self.total,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

enum Targets {
    Users(Vec<Uuid>),
    All,
}

struct EngineInner {
    owners: OwnerRepository,
    snapshots: SnapshotRepository,
    serializer: UserSerializer,
    subjects: Arc<dyn SubjectProvider>,
    locks: LockedUsers,
    retention: RwLock<RetentionPolicy>,
    phase: watch::Sender<SweepPhase>,
    cancel: AtomicBool,
    counters: SweepCounters,
    last_summary: Mutex<Option<SweepSummary>>,
}

/// Single-flight optimization engine
///
/// Cloning is cheap; clones control the same engine.
#[derive(Clone)]
pub struct OptimizationEngine {
    inner: Arc<EngineInner>,
}

impl OptimizationEngine {
    /// Wire the engine to its collaborators
    pub fn new(
        owners: OwnerRepository,
        snapshots: SnapshotRepository,
        serializer: UserSerializer,
        subjects: Arc<dyn SubjectProvider>,
        locks: LockedUsers,
        retention: RetentionPolicy,
    ) -> Self {
        let (phase, _) = watch::channel(SweepPhase::Idle);
        Self {
            inner: Arc::new(EngineInner {
                owners,
                snapshots,
                serializer,
                subjects,
                locks,
                retention: RwLock::new(retention),
                phase,
                cancel: AtomicBool::new(false),
                counters: SweepCounters::default(),
                last_summary: Mutex::new(None),
            }),
        }
    }

    // ========================================================================
    // Control
    // ========================================================================

    /// Start a targeted sweep over `users`
    ///
    /// Returns once the sweep has started; it runs on the current tokio
    /// runtime.
    pub fn optimize_users(&self, users: Vec<Uuid>, name: &str) -> Result<()> {
        self.start(Targets::Users(users), name)
    }

    /// Start a full sweep over every owner
    pub fn optimize_all(&self, name: &str) -> Result<()> {
        self.start(Targets::All, name)
    }

    fn start(&self, targets: Targets, name: &str) -> Result<()> {
        let handle = Handle::try_current().map_err(|_| {
            Error::InvalidOperation("optimization must be started inside a tokio runtime".to_string())
        })?;
        self.inner.begin()?;

        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        handle.spawn(async move { inner.run(targets, name).await });
        Ok(())
    }

    /// Ask the running sweep to stop and wait until it has
    ///
    /// Returns the summary of the stopped sweep, or `None` if nothing was
    /// running.
    pub async fn stop(&self) -> Option<SweepSummary> {
        let mut rx = self.inner.phase.subscribe();
        let requested = self.inner.phase.send_if_modified(|phase| {
            if *phase == SweepPhase::Running {
                *phase = SweepPhase::Cancelling;
                self.inner.cancel.store(true, Ordering::Release);
                info!(target: "datasync::optimize", "Optimization cancellation requested");
                true
            } else {
                false
            }
        });
        // Another caller may already be cancelling; wait for that sweep too
        if !requested && *rx.borrow_and_update() == SweepPhase::Idle {
            return None;
        }
        rx.wait_for(|phase| *phase == SweepPhase::Idle).await.ok()?;
        self.last_summary()
    }

    /// Wait until no sweep is running
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.phase.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|phase| *phase == SweepPhase::Idle).await;
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Current phase and counters, without side effects
    pub fn info(&self) -> SweepInfo {
        SweepInfo {
            phase: *self.inner.phase.borrow(),
            stats: self.inner.counters.snapshot(),
        }
    }

    /// True unless the engine is idle
    pub fn is_running(&self) -> bool {
        *self.inner.phase.borrow() != SweepPhase::Idle
    }

    /// Summary of the most recent finished sweep
    pub fn last_summary(&self) -> Option<SweepSummary> {
        self.inner.last_summary.lock().clone()
    }

    /// Watch phase transitions
    pub fn subscribe(&self) -> watch::Receiver<SweepPhase> {
        self.inner.phase.subscribe()
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Replace the retention policy; applies from the next owner on
    pub fn set_retention(&self, policy: RetentionPolicy) {
        info!(target: "datasync::optimize", policy = %policy.summary(), "Retention policy set");
        *self.inner.retention.write() = policy;
    }

    /// Current retention policy
    pub fn retention(&self) -> RetentionPolicy {
        self.inner.retention.read().clone()
    }

    /// The administrative lock set consulted by sweeps
    pub fn locks(&self) -> &LockedUsers {
        &self.inner.locks
    }
}

impl EngineInner {
    /// Idle -> Running, atomically with respect to other starters
    fn begin(&self) -> Result<()> {
        let started = self.phase.send_if_modified(|phase| {
            if *phase == SweepPhase::Idle {
                *phase = SweepPhase::Running;
                self.cancel.store(false, Ordering::Release);
                true
            } else {
                false
            }
        });
        if started {
            Ok(())
        } else {
            Err(Error::SweepAlreadyRunning)
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    async fn run(self: Arc<Self>, targets: Targets, name: String) {
        let scope = match targets {
            Targets::Users(_) => SweepScope::Targeted,
            Targets::All => SweepScope::Full,
        };
        info!(target: "datasync::optimize", %scope, name = %name, "Optimization started");

        // Returns the engine to Idle even if the sweep unwinds or is dropped
        let _finish = FinishGuard {
            inner: Arc::clone(&self),
            scope,
            name: name.clone(),
        };
        match targets {
            Targets::Users(users) => self.sweep_users(users, &name).await,
            Targets::All => self.sweep_all(&name).await,
        }
    }

    async fn sweep_users(self: &Arc<Self>, users: Vec<Uuid>, name: &str) {
        self.counters.total.store(users.len() as u64, Ordering::Relaxed);
        for user in users {
            if self.locks.is_locked(user) {
                debug!(target: "datasync::optimize", user = %user, "Skipping locked user");
            } else {
                self.unit(OwnerQuery::ByUser(user), user, name).await;
            }
            if self.cancelled() {
                break;
            }
        }
    }

    async fn sweep_all(self: &Arc<Self>, name: &str) {
        let ids = match self.owners.get_all_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!(target: "datasync::optimize", error = %e, "Could not enumerate owners");
                return;
            }
        };
        self.counters.total.store(ids.len() as u64, Ordering::Relaxed);

        for id in ids {
            let query = OwnerQuery::ById(id);
            match self.owners.get_one(query).await {
                Ok(Some(owner)) if self.locks.is_locked(owner.user_id) => {
                    debug!(target: "datasync::optimize", user = %owner.user_id, "Skipping locked user");
                }
                Ok(Some(owner)) => self.unit(query, owner.user_id, name).await,
                Ok(None) => {}
                Err(e) => {
                    warn!(target: "datasync::optimize", owner = %id, error = %e, "Could not load owner");
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
            if self.cancelled() {
                break;
            }
        }
    }

    /// Run one owner's unit in its own task so a panic stays with that owner
    async fn unit(self: &Arc<Self>, query: OwnerQuery, user: Uuid, name: &str) {
        let inner = Arc::clone(self);
        let name = name.to_string();
        let joined = tokio::spawn(async move { inner.optimize_full(query, user, &name).await }).await;
        match joined {
            Ok(Ok(true)) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Ok(false)) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                warn!(target: "datasync::optimize", user = %user, error = %e, "Optimization failed for user");
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!(target: "datasync::optimize", user = %user, error = %e, "Optimization task aborted for user");
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Per-owner unit of work
    ///
    /// Returns false when no fresh snapshot could be taken for an online
    /// subject; history is left untouched in that case.
    async fn optimize_full(&self, query: OwnerQuery, user: Uuid, name: &str) -> Result<bool> {
        let history = self.clean_references(query).await?;

        let mut reserved = 0;
        if let Some(subject) = self.subjects.subject(user) {
            match self.serializer.serialize(subject, name).await? {
                SerializeOutcome::Failed => {
                    warn!(target: "datasync::optimize", user = %user, "No snapshot taken, keeping history");
                    return Ok(false);
                }
                SerializeOutcome::Uploaded(_) | SerializeOutcome::Partial(_) => {
                    self.counters.uploaded.fetch_add(1, Ordering::Relaxed);
                    reserved = 1;
                }
            }
        }

        let policy = self.retention.read().clone();
        let plan = policy.plan(&history, Timestamp::now(), reserved);
        for key in plan.drop {
            if self.owners.delete_snapshot(query, key).await? {
                self.counters.deleted.fetch_add(1, Ordering::Relaxed);
            } else {
                debug!(target: "datasync::optimize", user = %user, snapshot = %key, "Snapshot already gone");
            }
        }
        Ok(true)
    }

    /// Drop duplicate and dangling references, returning the live history
    async fn clean_references(&self, query: OwnerQuery) -> Result<Vec<(SnapshotKey, Timestamp)>> {
        let ids = self.snapshots.get_snapshot_ids(query).await?;

        let mut seen = HashSet::with_capacity(ids.len());
        let mut duplicated = HashSet::new();
        for key in &ids {
            if !seen.insert(*key) {
                duplicated.insert(*key);
            }
        }
        for key in duplicated {
            // Removal drops every copy; add restores exactly one
            self.owners.remove_reference(query, key).await?;
            self.owners.add_snapshot(query, key).await?;
        }

        let mut history = Vec::with_capacity(seen.len());
        let mut visited = HashSet::with_capacity(seen.len());
        for key in ids {
            if !visited.insert(key) {
                continue;
            }
            if self.snapshots.exists(key).await? {
                // Full key precision so same-second snapshots still order
                history.push((key, key.created_at()));
            } else {
                debug!(target: "datasync::optimize", %query, snapshot = %key, "Removing dangling reference");
                self.owners.remove_reference(query, key).await?;
            }
        }
        Ok(history)
    }

    fn finish(&self, scope: SweepScope, name: String) {
        let summary = SweepSummary {
            name,
            scope,
            stats: self.counters.snapshot(),
            cancelled: self.cancelled(),
        };
        info!(
            target: "datasync::optimize",
            %scope,
            uploaded = summary.stats.snapshots_uploaded,
            deleted = summary.stats.snapshots_deleted,
            completed = summary.stats.members_completed,
            failed = summary.stats.members_failed,
            cancelled = summary.cancelled,
            "Optimization complete"
        );

        *self.last_summary.lock() = Some(summary);
        self.counters.reset();
        self.phase.send_modify(|phase| {
            *phase = SweepPhase::Idle;
            self.cancel.store(false, Ordering::Release);
        });
    }
}

/// Finishes the sweep when the sweep future completes, unwinds or is dropped
struct FinishGuard {
    inner: Arc<EngineInner>,
    scope: SweepScope,
    name: String,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.inner.finish(self.scope, std::mem::take(&mut self.name));
    }
}
