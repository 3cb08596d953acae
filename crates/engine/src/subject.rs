//! Subject lookup and an in-memory subject
//!
//! The hosting server decides which users are online and hands out live
//! handles through [`SubjectProvider`]. [`SubjectDirectory`] is a ready-made
//! provider for hosts that register handles as users join and leave.

use dashmap::{DashMap, DashSet};
use datasync_core::{DataKey, FieldValue, Subject};
use std::sync::Arc;
use uuid::Uuid;

/// Resolves user identities to live subjects
pub trait SubjectProvider: Send + Sync {
    /// Live handle for `user`, `None` if the user is not available
    fn subject(&self, user: Uuid) -> Option<Arc<dyn Subject>>;

    /// Every subject currently online
    fn online(&self) -> Vec<Arc<dyn Subject>>;
}

/// Concurrent registry of online subjects
#[derive(Default)]
pub struct SubjectDirectory {
    subjects: DashMap<Uuid, Arc<dyn Subject>>,
}

impl SubjectDirectory {
    /// Empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subject, replacing any previous handle for the same user
    pub fn insert(&self, subject: Arc<dyn Subject>) {
        self.subjects.insert(subject.user_id(), subject);
    }

    /// Unregister a user; returns the handle if it was present
    pub fn remove(&self, user: Uuid) -> Option<Arc<dyn Subject>> {
        self.subjects.remove(&user).map(|(_, subject)| subject)
    }

    /// Number of online subjects
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    /// True if nobody is online
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}

impl SubjectProvider for SubjectDirectory {
    fn subject(&self, user: Uuid) -> Option<Arc<dyn Subject>> {
        self.subjects.get(&user).map(|entry| Arc::clone(entry.value()))
    }

    fn online(&self) -> Vec<Arc<dyn Subject>> {
        self.subjects
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

/// Subject whose state lives in a map
///
/// Keys can be marked read-only; offers to them are rejected, which is how a
/// host models facets it cannot change at the moment.
pub struct MemorySubject {
    user_id: Uuid,
    name: String,
    values: DashMap<DataKey, FieldValue>,
    read_only: DashSet<DataKey>,
}

impl MemorySubject {
    /// Subject with no state
    pub fn new(user_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            user_id,
            name: name.into(),
            values: DashMap::new(),
            read_only: DashSet::new(),
        }
    }

    /// Builder-style [`set`](Self::set)
    pub fn with(self, key: DataKey, value: FieldValue) -> Self {
        self.set(key, value);
        self
    }

    /// Overwrite a facet
    pub fn set(&self, key: DataKey, value: FieldValue) {
        self.values.insert(key, value);
    }

    /// Forget a facet
    pub fn clear(&self, key: DataKey) {
        self.values.remove(&key);
    }

    /// Reject future offers for `key`
    pub fn make_read_only(&self, key: DataKey) {
        self.read_only.insert(key);
    }
}

impl Subject for MemorySubject {
    fn user_id(&self) -> Uuid {
        self.user_id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn get(&self, key: DataKey) -> Option<FieldValue> {
        self.values.get(&key).map(|entry| entry.value().clone())
    }

    fn offer(&self, key: DataKey, value: FieldValue) -> bool {
        if self.read_only.contains(&key) {
            return false;
        }
        self.values.insert(key, value);
        true
    }
}
