//! DataSync: the assembled persistence service
//!
//! Opens the configured backend inside a data directory and wires the
//! repositories, serializer pipeline, user serializer, optimization engine
//! and administrative locks together.
//!
//! # Example
//!
//! ```no_run
//! use datasync_engine::{DataSync, SubjectDirectory};
//! use std::sync::Arc;
//!
//! # async fn run() -> datasync_core::Result<()> {
//! let subjects = Arc::new(SubjectDirectory::new());
//! let sync = DataSync::open("./data", subjects)?;
//! sync.engine().optimize_all("Manual")?;
//! sync.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{DataSyncConfig, CONFIG_FILE_NAME};
use crate::locks::LockedUsers;
use crate::optimization::OptimizationEngine;
use crate::repository::{blocking, OwnerRepository, SnapshotRepository};
use crate::serializer::SerializerPipeline;
use crate::subject::SubjectProvider;
use crate::task::AutoSerializationTask;
use crate::user_serializer::UserSerializer;
use datasync_core::{Error, Result, Serializer};
use datasync_storage::{open_backend, Backend};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{info, warn};

/// Snapshot persistence service
pub struct DataSync {
    data_dir: Option<PathBuf>,
    config: RwLock<DataSyncConfig>,
    backend: Arc<dyn Backend>,
    owners: OwnerRepository,
    snapshots: SnapshotRepository,
    pipeline: Arc<SerializerPipeline>,
    user_serializer: UserSerializer,
    engine: OptimizationEngine,
    locks: LockedUsers,
    subjects: Arc<dyn SubjectProvider>,
    auto_task: Mutex<Option<AutoSerializationTask>>,
}

impl DataSync {
    /// Open or create a data directory
    ///
    /// Writes a default `datasync.toml` on first open. The automatic sweep
    /// is not started; call [`start_auto_task`](Self::start_auto_task).
    pub fn open(data_dir: impl AsRef<Path>, subjects: Arc<dyn SubjectProvider>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;

        let config_path = data_dir.join(CONFIG_FILE_NAME);
        DataSyncConfig::write_default_if_missing(&config_path)?;
        let config = DataSyncConfig::from_file(&config_path)?;

        let backend = open_backend(config.backend_kind(), data_dir)?;
        info!(
            target: "datasync::config",
            path = %data_dir.display(),
            backend = %config.backend_kind(),
            "Opened data directory"
        );

        let mut sync = Self::with_backend(backend, config, subjects)?;
        sync.data_dir = Some(data_dir.to_path_buf());
        Ok(sync)
    }

    /// Assemble the service over an already open backend
    ///
    /// Without a data directory, [`reload`](Self::reload) is unavailable.
    pub fn with_backend(
        backend: Arc<dyn Backend>,
        config: DataSyncConfig,
        subjects: Arc<dyn SubjectProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let retention = config.retention_policy()?;
        let snapshots = SnapshotRepository::new(Arc::clone(&backend));
        let owners = OwnerRepository::new(Arc::clone(&backend), snapshots.clone());
        let pipeline = Arc::new(SerializerPipeline::new(&config.serialize.enabled));
        let user_serializer = UserSerializer::new(
            owners.clone(),
            snapshots.clone(),
            Arc::clone(&pipeline),
            Arc::clone(&subjects),
        );
        let locks = LockedUsers::new();
        let engine = OptimizationEngine::new(
            owners.clone(),
            snapshots.clone(),
            user_serializer.clone(),
            Arc::clone(&subjects),
            locks.clone(),
            retention,
        );

        Ok(Self {
            data_dir: None,
            config: RwLock::new(config),
            backend,
            owners,
            snapshots,
            pipeline,
            user_serializer,
            engine,
            locks,
            subjects,
            auto_task: Mutex::new(None),
        })
    }

    // ========================================================================
    // Components
    // ========================================================================

    /// Owner repository
    pub fn owners(&self) -> &OwnerRepository {
        &self.owners
    }

    /// Snapshot repository
    pub fn snapshots(&self) -> &SnapshotRepository {
        &self.snapshots
    }

    /// User-level serialize and restore
    pub fn user_serializer(&self) -> &UserSerializer {
        &self.user_serializer
    }

    /// Optimization engine
    pub fn engine(&self) -> &OptimizationEngine {
        &self.engine
    }

    /// Administrative lock set
    pub fn locks(&self) -> &LockedUsers {
        &self.locks
    }

    /// Serializer pipeline
    pub fn pipeline(&self) -> &SerializerPipeline {
        &self.pipeline
    }

    /// Current configuration
    pub fn config(&self) -> DataSyncConfig {
        self.config.read().clone()
    }

    /// Data directory, if opened from one
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    // ========================================================================
    // Runtime changes
    // ========================================================================

    /// Register a host serializer module
    ///
    /// It runs once its name is in the enabled list.
    pub fn register_serializer(&self, serializer: Arc<dyn Serializer>) {
        self.pipeline.register(serializer);
        self.pipeline.apply(&self.config.read().serialize.enabled);
    }

    /// Re-read `datasync.toml` and apply it
    ///
    /// The serializer list, retention and auto interval take effect
    /// immediately. A changed backend is ignored until the next open.
    pub fn reload(&self) -> Result<()> {
        let Some(dir) = &self.data_dir else {
            return Err(Error::InvalidOperation(
                "reload requires a data directory".to_string(),
            ));
        };
        let mut config = DataSyncConfig::from_file(&dir.join(CONFIG_FILE_NAME))?;
        let retention = config.retention_policy()?;

        let previous = self.config.read().clone();
        if config.backend_kind() != previous.backend_kind() {
            warn!(
                target: "datasync::config",
                current = %previous.backend_kind(),
                configured = %config.backend_kind(),
                "Backend change requires a restart"
            );
            config.backend = previous.backend;
        }

        self.pipeline.apply(&config.serialize.enabled);
        self.engine.set_retention(retention);
        let interval_changed = config.auto_interval() != previous.auto_interval();
        *self.config.write() = config;

        let scheduled = self.auto_task.lock().is_some();
        if interval_changed && scheduled {
            self.start_auto_task()?;
        }
        info!(target: "datasync::config", "Configuration reloaded");
        Ok(())
    }

    /// Start (or restart) the automatic sweep with the configured interval
    ///
    /// Returns false when the interval is 0 and no task runs.
    pub fn start_auto_task(&self) -> Result<bool> {
        Handle::try_current().map_err(|_| {
            Error::InvalidOperation("auto serialization requires a tokio runtime".to_string())
        })?;

        let mut slot = self.auto_task.lock();
        slot.take();
        match self.config.read().auto_interval() {
            Some(period) => {
                *slot = Some(AutoSerializationTask::spawn(
                    self.engine.clone(),
                    Arc::clone(&self.subjects),
                    period,
                ));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// True if the automatic sweep is scheduled
    pub fn auto_task_running(&self) -> bool {
        self.auto_task.lock().is_some()
    }

    /// Stop the automatic sweep, wait for any running sweep and flush
    pub async fn shutdown(&self) -> Result<()> {
        self.auto_task.lock().take();
        if let Some(summary) = self.engine.stop().await {
            info!(target: "datasync::optimize", name = %summary.name, "Sweep stopped for shutdown");
        }
        blocking(&self.backend, |b| b.flush()).await
    }
}
