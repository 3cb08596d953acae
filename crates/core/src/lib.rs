//! Core types and traits for datasync
//!
//! This crate defines the foundational types used throughout the system:
//! - Timestamp: millisecond-precision point in time
//! - OwnerKey / SnapshotKey: row identifiers; snapshot keys encode their creation time
//! - OwnerQuery: addresses one owner row by key or by user identity
//! - Owner / Snapshot: the persisted records
//! - Subject / Serializer: the capability seams to the hosting server
//! - Error: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod model;
pub mod subject;
pub mod timestamp;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use model::{FieldValue, Owner, Snapshot};
pub use subject::{DataKey, GameMode, Subject};
pub use timestamp::Timestamp;
pub use traits::{is_valid_module_name, uses_reserved_namespace, Serializer, RESERVED_NAMESPACE};
pub use types::{OwnerKey, OwnerQuery, SnapshotKey};
