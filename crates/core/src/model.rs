//! Owner and Snapshot records

use crate::timestamp::Timestamp;
use crate::types::{OwnerKey, SnapshotKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Opaque serialized value stored in a snapshot field
pub type FieldValue = serde_json::Value;

/// Per-user record holding references to that user's snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    /// Owner row key
    pub id: OwnerKey,
    /// Stable user identity this owner belongs to
    pub user_id: Uuid,
    /// Snapshot references; unique, order irrelevant
    pub snapshot_ids: Vec<SnapshotKey>,
}

impl Owner {
    /// Fresh owner with no snapshots
    pub fn new(user_id: Uuid) -> Self {
        Self {
            id: OwnerKey::new(),
            user_id,
            snapshot_ids: Vec::new(),
        }
    }
}

/// Immutable capture of a subject's state at one point in time.
///
/// The creation time is not stored separately; it is encoded in `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Time-ordered key
    pub id: SnapshotKey,
    /// Free-form label, e.g. "Manual" or "Auto"
    pub name: String,
    /// Modules that ran when this snapshot was taken
    #[serde(default)]
    pub modules_used: BTreeSet<String>,
    /// Modules that reported failure when this snapshot was taken
    #[serde(default)]
    pub modules_failed: BTreeSet<String>,
    /// Serialized state, keyed by field name
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl Snapshot {
    /// Empty snapshot stamped with the current time
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_key(SnapshotKey::generate(), name)
    }

    /// Empty snapshot with an explicit key
    pub fn with_key(id: SnapshotKey, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            modules_used: BTreeSet::new(),
            modules_failed: BTreeSet::new(),
            fields: BTreeMap::new(),
        }
    }

    /// Creation time decoded from the key
    pub fn created_at(&self) -> Timestamp {
        self.id.created_at()
    }

    /// Store a field value, replacing any previous one
    pub fn set_field(&mut self, field: impl Into<String>, value: FieldValue) {
        self.fields.insert(field.into(), value);
    }

    /// Read a field value
    pub fn field(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// True when no module failed while this snapshot was taken
    pub fn is_complete(&self) -> bool {
        self.modules_failed.is_empty()
    }
}
