//! User-level serialize, deserialize and restore
//!
//! Ties the pipeline to the repositories: a serialize captures a subject
//! into a new snapshot, stores the body and links it to the user's owner.

use crate::repository::{OwnerRepository, SnapshotRepository};
use crate::serializer::SerializerPipeline;
use crate::subject::SubjectProvider;
use datasync_core::{Error, OwnerQuery, Result, Snapshot, Subject, Timestamp};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of serializing one subject
#[derive(Debug, Clone, PartialEq)]
pub enum SerializeOutcome {
    /// Every module succeeded and the snapshot was stored
    Uploaded(Snapshot),
    /// Some modules failed; the snapshot was stored with what could be captured
    Partial(Snapshot),
    /// Nothing was stored
    Failed,
}

impl SerializeOutcome {
    /// The stored snapshot, if any
    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            SerializeOutcome::Uploaded(s) | SerializeOutcome::Partial(s) => Some(s),
            SerializeOutcome::Failed => None,
        }
    }

    /// True if a snapshot was stored
    pub fn is_stored(&self) -> bool {
        self.snapshot().is_some()
    }
}

/// Result of applying a snapshot to a subject
#[derive(Debug, Clone, PartialEq)]
pub enum DeserializeOutcome {
    /// Every module that ran succeeded
    Restored(Snapshot),
    /// Some modules failed
    Partial(Snapshot),
    /// No matching snapshot exists
    NoSnapshot,
    /// The user is not available to receive state
    NoSubject,
}

impl DeserializeOutcome {
    /// The applied snapshot, if any
    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            DeserializeOutcome::Restored(s) | DeserializeOutcome::Partial(s) => Some(s),
            _ => None,
        }
    }
}

/// Users that did and did not get a snapshot in a batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Users with a stored snapshot
    pub successful: Vec<Uuid>,
    /// Users without one
    pub unsuccessful: Vec<Uuid>,
}

/// Serialize and restore users
#[derive(Clone)]
pub struct UserSerializer {
    owners: OwnerRepository,
    snapshots: SnapshotRepository,
    pipeline: Arc<SerializerPipeline>,
    subjects: Arc<dyn SubjectProvider>,
}

impl UserSerializer {
    /// Wire the serializer to its collaborators
    pub fn new(
        owners: OwnerRepository,
        snapshots: SnapshotRepository,
        pipeline: Arc<SerializerPipeline>,
        subjects: Arc<dyn SubjectProvider>,
    ) -> Self {
        Self {
            owners,
            snapshots,
            pipeline,
            subjects,
        }
    }

    /// Capture `subject` into a new snapshot labelled `name`
    pub async fn serialize(&self, subject: Arc<dyn Subject>, name: &str) -> Result<SerializeOutcome> {
        let pipeline = Arc::clone(&self.pipeline);
        let source = Arc::clone(&subject);
        let label = name.to_string();
        // Host modules may block; keep them off the async workers
        let (snapshot, complete) = tokio::task::spawn_blocking(move || {
            let mut snapshot = Snapshot::new(label);
            let complete = pipeline.serialize(&mut snapshot, source.as_ref());
            (snapshot, complete)
        })
        .await
        .map_err(|e| Error::Internal(format!("serializer task failed: {}", e)))?;
        if snapshot.modules_used.is_empty() {
            return Ok(SerializeOutcome::Failed);
        }

        let user = subject.user_id();
        let key = snapshot.id;
        self.snapshots.insert(snapshot.clone()).await?;
        if !self.owners.add_snapshot_for_user(user, key).await? {
            // Owner vanished between creation and link; do not leave an orphan body
            self.snapshots.delete(key).await?;
            warn!(target: "datasync::serialize", user = %user, snapshot = %key, "Owner missing, snapshot discarded");
            return Ok(SerializeOutcome::Failed);
        }

        info!(
            target: "datasync::serialize",
            user = %subject.name(),
            snapshot = %key,
            created_at = %snapshot.created_at(),
            label = name,
            complete,
            "Uploaded snapshot"
        );
        Ok(if complete {
            SerializeOutcome::Uploaded(snapshot)
        } else {
            SerializeOutcome::Partial(snapshot)
        })
    }

    /// Serialize many subjects concurrently
    ///
    /// A backend error for one subject marks it unsuccessful without
    /// affecting the others.
    pub async fn serialize_many(&self, subjects: Vec<Arc<dyn Subject>>, name: &str) -> BatchReport {
        let mut tasks = JoinSet::new();
        for subject in subjects {
            let this = self.clone();
            let name = name.to_string();
            tasks.spawn(async move {
                let user = subject.user_id();
                let stored = match this.serialize(subject, &name).await {
                    Ok(outcome) => outcome.is_stored(),
                    Err(e) => {
                        warn!(target: "datasync::serialize", user = %user, error = %e, "Serialization failed");
                        false
                    }
                };
                (user, stored)
            });
        }

        let mut report = BatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((user, true)) => report.successful.push(user),
                Ok((user, false)) => report.unsuccessful.push(user),
                Err(e) => warn!(target: "datasync::serialize", error = %e, "Serialization task aborted"),
            }
        }
        report
    }

    /// Apply the user's latest snapshot to `subject`
    pub async fn deserialize(&self, subject: Arc<dyn Subject>) -> Result<DeserializeOutcome> {
        let latest = self
            .snapshots
            .get_latest(OwnerQuery::ByUser(subject.user_id()))
            .await?;
        Ok(match latest {
            Some(snapshot) => self.apply(snapshot, subject).await?,
            None => DeserializeOutcome::NoSnapshot,
        })
    }

    /// Apply a stored snapshot to an online user
    ///
    /// With `at`, the snapshot created at that time is used; otherwise the
    /// latest one.
    pub async fn restore(&self, user: Uuid, at: Option<Timestamp>) -> Result<DeserializeOutcome> {
        let Some(subject) = self.subjects.subject(user) else {
            return Ok(DeserializeOutcome::NoSubject);
        };
        let query = OwnerQuery::ByUser(user);
        let snapshot = match at {
            Some(at) => self.snapshots.get_snapshot(query, at).await?,
            None => self.snapshots.get_latest(query).await?,
        };
        let Some(snapshot) = snapshot else {
            return Ok(DeserializeOutcome::NoSnapshot);
        };
        let outcome = self.apply(snapshot, Arc::clone(&subject)).await?;
        if let Some(snapshot) = outcome.snapshot() {
            info!(
                target: "datasync::serialize",
                user = %subject.name(),
                created_at = %snapshot.created_at(),
                "Restored snapshot"
            );
        }
        Ok(outcome)
    }

    async fn apply(&self, snapshot: Snapshot, subject: Arc<dyn Subject>) -> Result<DeserializeOutcome> {
        let pipeline = Arc::clone(&self.pipeline);
        tokio::task::spawn_blocking(move || {
            if pipeline.deserialize(&snapshot, subject.as_ref()) {
                DeserializeOutcome::Restored(snapshot)
            } else {
                DeserializeOutcome::Partial(snapshot)
            }
        })
        .await
        .map_err(|e| Error::Internal(format!("deserializer task failed: {}", e)))
    }
}
