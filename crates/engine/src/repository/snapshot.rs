//! Snapshot repository: bodies plus owner-scoped time lookups

use super::{blocking, closest};
use datasync_core::{OwnerQuery, Result, Snapshot, SnapshotKey, Timestamp};
use datasync_storage::{Backend, BackendKind};
use std::sync::Arc;
use tracing::debug;

/// Snapshot CRUD and timestamp queries over any backend
#[derive(Clone)]
pub struct SnapshotRepository {
    backend: Arc<dyn Backend>,
}

impl SnapshotRepository {
    /// Wrap a backend
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Kind of the underlying backend
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    // ========================================================================
    // Bodies
    // ========================================================================

    /// Persist a snapshot body
    pub async fn insert(&self, snapshot: Snapshot) -> Result<()> {
        blocking(&self.backend, move |b| b.insert_snapshot(&snapshot)).await
    }

    /// Load a snapshot body
    pub async fn get(&self, key: SnapshotKey) -> Result<Option<Snapshot>> {
        blocking(&self.backend, move |b| b.get_snapshot(key)).await
    }

    /// True if a body is stored under `key`
    pub async fn exists(&self, key: SnapshotKey) -> Result<bool> {
        blocking(&self.backend, move |b| b.snapshot_exists(key)).await
    }

    /// Delete a snapshot body; false if it was not there
    ///
    /// Owner references are not touched, see
    /// [`OwnerRepository::delete_snapshot`](super::OwnerRepository::delete_snapshot).
    pub async fn delete(&self, key: SnapshotKey) -> Result<bool> {
        blocking(&self.backend, move |b| b.delete_snapshot_body(key)).await
    }

    /// Creation time of `key` at the backend's precision
    pub fn creation_time(&self, key: SnapshotKey) -> Timestamp {
        self.backend.creation_time(key)
    }

    // ========================================================================
    // Owner-scoped lookups
    // ========================================================================

    /// References held by the owner; empty if the owner does not exist
    pub async fn get_snapshot_ids(&self, query: OwnerQuery) -> Result<Vec<SnapshotKey>> {
        let ids = blocking(&self.backend, move |b| b.snapshot_ids(&query)).await?;
        Ok(ids.unwrap_or_default())
    }

    /// Creation times of the owner's snapshots, decoded from the keys alone
    pub async fn get_creation_times(&self, query: OwnerQuery) -> Result<Vec<Timestamp>> {
        let ids = self.get_snapshot_ids(query).await?;
        Ok(ids.into_iter().map(|key| self.creation_time(key)).collect())
    }

    /// First snapshot of the owner whose creation time matches `at`
    ///
    /// Matching follows the backend's rule, see [`Backend::time_matches`].
    pub async fn get_snapshot(&self, query: OwnerQuery, at: Timestamp) -> Result<Option<Snapshot>> {
        blocking(&self.backend, move |b| {
            let Some(ids) = b.snapshot_ids(&query)? else {
                return Ok(None);
            };
            match ids.into_iter().find(|key| b.time_matches(*key, at)) {
                Some(key) => b.get_snapshot(key),
                None => Ok(None),
            }
        })
        .await
    }

    /// Most recent snapshot of the owner whose body still exists
    pub async fn get_latest(&self, query: OwnerQuery) -> Result<Option<Snapshot>> {
        blocking(&self.backend, move |b| {
            let mut ids = b.snapshot_ids(&query)?.unwrap_or_default();
            ids.sort_by_key(|key| std::cmp::Reverse(key.created_at()));
            for key in ids {
                if let Some(snapshot) = b.get_snapshot(key)? {
                    return Ok(Some(snapshot));
                }
                debug!(target: "datasync::repo", %query, snapshot = %key, "Skipping dangling reference");
            }
            Ok(None)
        })
        .await
    }

    /// Up to three keys around `at`: `[before?, exact?, after?]`
    ///
    /// Compared at second precision on every backend.
    pub async fn get_closest_snapshots(
        &self,
        query: OwnerQuery,
        at: Timestamp,
    ) -> Result<Vec<SnapshotKey>> {
        let ids = self.get_snapshot_ids(query).await?;
        let entries: Vec<(SnapshotKey, u64)> = ids
            .into_iter()
            .map(|key| (key, self.creation_time(key).as_secs()))
            .collect();
        Ok(closest(&entries, at.as_secs()))
    }
}
