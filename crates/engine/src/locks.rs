//! Administrative user locks
//!
//! Users in the locked set are never touched by an optimization sweep. The
//! set is created once at startup and shared between the sweep task and the
//! administrative surface that edits it. A lock added mid-sweep is honored
//! for every user the sweep has not reached yet.

use dashmap::DashSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Concurrent set of locked user identities
#[derive(Clone, Default)]
pub struct LockedUsers {
    inner: Arc<DashSet<Uuid>>,
}

impl LockedUsers {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock a user; returns false if already locked
    pub fn lock(&self, user: Uuid) -> bool {
        let added = self.inner.insert(user);
        if added {
            info!(target: "datasync::optimize", user = %user, "User locked");
        }
        added
    }

    /// Unlock a user; returns false if the user was not locked
    pub fn unlock(&self, user: Uuid) -> bool {
        let removed = self.inner.remove(&user).is_some();
        if removed {
            info!(target: "datasync::optimize", user = %user, "User unlocked");
        }
        removed
    }

    /// True if the user is locked
    pub fn is_locked(&self, user: Uuid) -> bool {
        self.inner.contains(&user)
    }

    /// Point-in-time copy of the locked set
    pub fn locked(&self) -> Vec<Uuid> {
        self.inner.iter().map(|user| *user).collect()
    }
}
