//! Storage layer for datasync
//!
//! This crate implements the two persistence adapters behind one trait:
//! - Backend: primitive owner and snapshot operations
//! - DocumentBackend: JSON documents in SQLite, second precision
//! - EmbeddedBackend: sled trees with transactional blob updates, millisecond precision
//! - codec: binary encodings used by the embedded store

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod codec;
pub mod document;
pub mod embedded;

pub use backend::{Backend, BackendKind};
pub use document::DocumentBackend;
pub use embedded::{EmbeddedBackend, TxnMode};

use datasync_core::Result;
use std::path::Path;
use std::sync::Arc;

/// File name of the document store inside a data directory
pub const DOCUMENT_FILE: &str = "datasync.db";

/// Directory name of the embedded store inside a data directory
pub const EMBEDDED_DIR: &str = "embedded";

/// Open the store of the given kind inside `data_dir`
pub fn open_backend(kind: BackendKind, data_dir: &Path) -> Result<Arc<dyn Backend>> {
    Ok(match kind {
        BackendKind::Document => Arc::new(DocumentBackend::open(data_dir.join(DOCUMENT_FILE))?),
        BackendKind::Embedded => Arc::new(EmbeddedBackend::open(data_dir.join(EMBEDDED_DIR))?),
    })
}
