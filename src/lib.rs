//! DataSync - snapshot persistence and history compaction for per-user state
//!
//! DataSync captures the state of live users into named, timestamped
//! snapshots, stores them in one of two interchangeable backends and keeps
//! the per-user history bounded with background optimization sweeps.
//!
//! # Quick Start
//!
//! ```ignore
//! use datasync::{DataSync, MemorySubject, SubjectDirectory};
//!
//! let subjects = Arc::new(SubjectDirectory::new());
//! let sync = DataSync::open("./data", subjects.clone())?;
//!
//! // Capture one user now
//! sync.user_serializer().serialize(subject, "Manual").await?;
//!
//! // Upload, clean and prune every owner in the background
//! sync.engine().optimize_all("Manual")?;
//! ```
//!
//! # Architecture
//!
//! - `datasync-core`: keys, records, timestamps and the capability traits
//! - `datasync-storage`: the document and embedded backends
//! - `datasync-engine`: repositories, serializers, sweeps and configuration
//!
//! The engine API and the core types are re-exported here; the backends are
//! available under [`storage`].

pub use datasync_core::{
    DataKey, Error, FieldValue, GameMode, Owner, OwnerKey, OwnerQuery, Result, Serializer,
    Snapshot, SnapshotKey, Subject, Timestamp,
};
pub use datasync_engine::*;
pub use datasync_storage as storage;
pub use datasync_storage::BackendKind;
