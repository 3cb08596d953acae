//! Owner repository: owner rows and their snapshot references

use super::{blocking, SnapshotRepository};
use datasync_core::{Owner, OwnerKey, OwnerQuery, Result, SnapshotKey, Timestamp};
use datasync_storage::Backend;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Owner CRUD and reference-list mutation over any backend
///
/// Cloning is cheap; clones share the owner-creation lock, so two clones can
/// never create two owners for the same user.
#[derive(Clone)]
pub struct OwnerRepository {
    backend: Arc<dyn Backend>,
    snapshots: SnapshotRepository,
    create_lock: Arc<Mutex<()>>,
}

impl OwnerRepository {
    /// Wrap a backend; body deletion is delegated to `snapshots`
    pub fn new(backend: Arc<dyn Backend>, snapshots: SnapshotRepository) -> Self {
        Self {
            backend,
            snapshots,
            create_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Load one owner
    pub async fn get_one(&self, query: OwnerQuery) -> Result<Option<Owner>> {
        blocking(&self.backend, move |b| b.find_owner(&query)).await
    }

    /// Load the owner of a user
    pub async fn get_one_for_user(&self, user: Uuid) -> Result<Option<Owner>> {
        self.get_one(OwnerQuery::ByUser(user)).await
    }

    /// Keys of every owner, captured once
    pub async fn get_all_ids(&self) -> Result<Vec<OwnerKey>> {
        blocking(&self.backend, |b| b.owner_ids()).await
    }

    /// Load the owner of a user, creating an empty one on first use
    pub async fn get_one_or_generate_for_user(&self, user: Uuid) -> Result<Owner> {
        let _guard = self.create_lock.lock().await;
        blocking(&self.backend, move |b| {
            if let Some(owner) = b.find_owner(&OwnerQuery::ByUser(user))? {
                return Ok(owner);
            }
            let owner = Owner::new(user);
            b.insert_owner(&owner)?;
            info!(target: "datasync::repo", user = %user, owner = %owner.id, "Created owner");
            Ok(owner)
        })
        .await
    }

    /// Add a reference to the owner unless already present
    ///
    /// Returns true iff the owner row was found.
    pub async fn add_snapshot(&self, query: OwnerQuery, key: SnapshotKey) -> Result<bool> {
        let found = blocking(&self.backend, move |b| b.add_snapshot_id(&query, key)).await?;
        if !found {
            debug!(target: "datasync::repo", %query, snapshot = %key, "Owner not found for add");
        }
        Ok(found)
    }

    /// Add a reference to the user's owner, creating the owner if needed
    pub async fn add_snapshot_for_user(&self, user: Uuid, key: SnapshotKey) -> Result<bool> {
        let owner = self.get_one_or_generate_for_user(user).await?;
        self.add_snapshot(OwnerQuery::ById(owner.id), key).await
    }

    /// Remove every copy of a reference without touching the body
    ///
    /// Returns true iff the owner held the key.
    pub async fn remove_reference(&self, query: OwnerQuery, key: SnapshotKey) -> Result<bool> {
        blocking(&self.backend, move |b| b.remove_snapshot_id(&query, key)).await
    }

    /// Remove a reference and delete the snapshot body
    ///
    /// Returns true only if the owner held the reference and the body was
    /// deleted. The body is left alone when the owner did not hold the key.
    pub async fn delete_snapshot(&self, query: OwnerQuery, key: SnapshotKey) -> Result<bool> {
        let removed = blocking(&self.backend, move |b| b.remove_snapshot_id(&query, key)).await?;
        if !removed {
            return Ok(false);
        }
        let deleted = self.snapshots.delete(key).await?;
        if !deleted {
            warn!(target: "datasync::repo", %query, snapshot = %key, "Reference removed but body was already gone");
        }
        Ok(deleted)
    }

    /// Delete the owner's snapshot created at `at`
    ///
    /// The key is located by a linear scan of the owner's references using
    /// the backend's time matching rule.
    pub async fn delete_snapshot_at(&self, query: OwnerQuery, at: Timestamp) -> Result<bool> {
        let key = blocking(&self.backend, move |b| {
            let ids = b.snapshot_ids(&query)?.unwrap_or_default();
            Ok(ids.into_iter().find(|key| b.time_matches(*key, at)))
        })
        .await?;
        match key {
            Some(key) => self.delete_snapshot(query, key).await,
            None => Ok(false),
        }
    }
}
