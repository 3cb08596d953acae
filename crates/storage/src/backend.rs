//! Backend trait: the primitive operations both stores provide
//!
//! Repositories are written once against this trait. Each adapter maps the
//! primitives onto its own storage model; the observable semantics of every
//! operation are identical between adapters apart from the time precision
//! documented on [`Backend::creation_time`] and [`Backend::time_matches`].

use datasync_core::{Owner, OwnerKey, OwnerQuery, Result, Snapshot, SnapshotKey, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which adapter backs a repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// JSON documents in SQLite
    #[default]
    Document,
    /// Transactional embedded key-value store
    Embedded,
}

impl BackendKind {
    /// Config name of this kind
    pub const fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Document => "document",
            BackendKind::Embedded => "embedded",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primitive storage operations
///
/// All methods block. Callers on an async runtime move them onto the
/// blocking pool.
///
/// Missing rows are never errors: lookups return `None`, mutations return
/// `false`. `Err` always means the store itself failed.
pub trait Backend: Send + Sync {
    /// Adapter kind
    fn kind(&self) -> BackendKind;

    // ========================================================================
    // Owners
    // ========================================================================

    /// Load the owner addressed by `query`
    fn find_owner(&self, query: &OwnerQuery) -> Result<Option<Owner>>;

    /// Insert a new owner row
    ///
    /// Uniqueness of `user_id` is the caller's responsibility.
    fn insert_owner(&self, owner: &Owner) -> Result<()>;

    /// Keys of every owner row
    fn owner_ids(&self) -> Result<Vec<OwnerKey>>;

    /// Snapshot references of one owner, `None` if the owner does not exist
    ///
    /// Never loads snapshot bodies.
    fn snapshot_ids(&self, query: &OwnerQuery) -> Result<Option<Vec<SnapshotKey>>>;

    /// Add `key` to the owner's references unless already present
    ///
    /// Returns true iff the owner row was found.
    fn add_snapshot_id(&self, query: &OwnerQuery, key: SnapshotKey) -> Result<bool>;

    /// Remove `key` from the owner's references
    ///
    /// Returns true iff the owner was found and held the key.
    fn remove_snapshot_id(&self, query: &OwnerQuery, key: SnapshotKey) -> Result<bool>;

    // ========================================================================
    // Snapshot bodies
    // ========================================================================

    /// Store a snapshot body
    fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    /// Load a snapshot body
    fn get_snapshot(&self, key: SnapshotKey) -> Result<Option<Snapshot>>;

    /// True if a body is stored under `key`
    fn snapshot_exists(&self, key: SnapshotKey) -> Result<bool>;

    /// Delete a snapshot body; true iff it existed
    fn delete_snapshot_body(&self, key: SnapshotKey) -> Result<bool>;

    // ========================================================================
    // Time
    // ========================================================================

    /// Creation time of `key` at this store's precision
    fn creation_time(&self, key: SnapshotKey) -> Timestamp;

    /// Whether `key` was created at `target` under this store's matching rule
    fn time_matches(&self, key: SnapshotKey, target: Timestamp) -> bool;

    /// Push buffered writes to disk
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
