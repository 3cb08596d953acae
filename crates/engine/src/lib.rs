//! Persistence engine for datasync
//!
//! This crate orchestrates the storage layer:
//! - Repositories: async owner and snapshot access over any backend
//! - Serializer pipeline: built-in and host modules capturing subject state
//! - UserSerializer: serialize, deserialize and restore users
//! - OptimizationEngine: single-flight sweeps that upload, clean and prune
//! - Retention: how much history a sweep keeps
//! - Auto task: periodic sweeps of online users
//! - DataSync: everything wired together from `datasync.toml`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod datasync;
pub mod locks;
pub mod optimization;
pub mod repository;
pub mod retention;
pub mod serializer;
pub mod subject;
pub mod task;
pub mod user_serializer;

pub use config::{DataSyncConfig, OptimizationConfig, SerializeConfig, CONFIG_FILE_NAME};
pub use datasync::DataSync;
pub use locks::LockedUsers;
pub use optimization::{
    OptimizationEngine, SweepInfo, SweepPhase, SweepScope, SweepStats, SweepSummary,
};
pub use repository::{OwnerRepository, SnapshotRepository};
pub use retention::{RetentionPlan, RetentionPolicy};
pub use serializer::{SerializerPipeline, SerializerRegistry};
pub use subject::{MemorySubject, SubjectDirectory, SubjectProvider};
pub use task::{AutoSerializationTask, AUTO_SNAPSHOT_NAME};
pub use user_serializer::{BatchReport, DeserializeOutcome, SerializeOutcome, UserSerializer};
