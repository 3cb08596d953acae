//! Sync Lifecycle Tests
//!
//! End-to-end tests through the top-level crate, organized by concern:
//! - Lifecycle: open, capture, sweep, shutdown and reopen
//! - Reload: runtime configuration changes

mod lifecycle;
mod reload;

use std::path::Path;
use std::sync::Arc;

use datasync::{DataKey, DataSync, MemorySubject, SubjectDirectory, SubjectProvider, CONFIG_FILE_NAME};
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

// ============================================================================
// Helper Functions
// ============================================================================

pub struct TestSync {
    pub sync: DataSync,
    pub directory: Arc<SubjectDirectory>,
    pub dir: TempDir,
}

impl TestSync {
    /// Open a fresh data directory with the default config
    pub fn new() -> Self {
        Self::with_config(None)
    }

    /// Open a fresh data directory with `config` as `datasync.toml`
    pub fn with_config(config: Option<&str>) -> Self {
        let dir = TempDir::new().unwrap();
        if let Some(config) = config {
            write_config(dir.path(), config);
        }
        let directory = Arc::new(SubjectDirectory::new());
        let sync = open(dir.path(), &directory);
        Self { sync, directory, dir }
    }

    /// Bring a user online with some state
    pub fn join(&self, name: &str, experience: u64) -> Arc<MemorySubject> {
        let subject = Arc::new(
            MemorySubject::new(Uuid::new_v4(), name)
                .with(DataKey::TotalExperience, json!(experience))
                .with(DataKey::GameMode, json!("SURVIVAL"))
                .with(DataKey::Health, json!(20.0))
                .with(DataKey::MaxHealth, json!(20.0))
                .with(DataKey::FoodLevel, json!(20))
                .with(DataKey::Saturation, json!(5.0))
                .with(DataKey::Inventory, json!([])),
        );
        self.directory.insert(subject.clone());
        subject
    }

    /// Close and open the same data directory again
    pub async fn reopen(self) -> Self {
        let TestSync { sync, directory, dir } = self;
        sync.shutdown().await.unwrap();
        drop(sync);
        let sync = open(dir.path(), &directory);
        Self { sync, directory, dir }
    }

    /// Replace `datasync.toml`
    pub fn rewrite_config(&self, config: &str) {
        write_config(self.dir.path(), config);
    }
}

fn open(path: &Path, directory: &Arc<SubjectDirectory>) -> DataSync {
    let subjects: Arc<dyn SubjectProvider> = directory.clone();
    DataSync::open(path, subjects).unwrap()
}

fn write_config(path: &Path, config: &str) {
    std::fs::write(path.join(CONFIG_FILE_NAME), config).unwrap();
}
