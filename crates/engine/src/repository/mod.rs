//! Backend-agnostic repositories
//!
//! Both repositories wrap an `Arc<dyn Backend>` and expose async operations.
//! Every backend call runs on the blocking pool; in-memory scans over an
//! owner's reference list stay on the calling task.

pub mod closest;
mod owner;
mod snapshot;

pub use closest::closest;
pub use owner::OwnerRepository;
pub use snapshot::SnapshotRepository;

use datasync_core::{Error, Result};
use datasync_storage::Backend;
use std::sync::Arc;

/// Run `f` against the backend on the blocking pool
pub(crate) async fn blocking<T, F>(backend: &Arc<dyn Backend>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn Backend) -> Result<T> + Send + 'static,
{
    let backend = Arc::clone(backend);
    tokio::task::spawn_blocking(move || f(backend.as_ref()))
        .await
        .map_err(|e| Error::Internal(format!("backend task failed: {}", e)))?
}
