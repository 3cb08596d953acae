//! Binary encodings used by the embedded store
//!
//! - Snapshot reference lists: bincode `Vec<SnapshotKey>`
//! - Snapshot bodies: MessagePack with field names, so bodies written by an
//!   older build with fewer fields still decode

use datasync_core::{Error, Result, Snapshot, SnapshotKey};

/// Encode a reference list
pub fn encode_ids(ids: &[SnapshotKey]) -> Result<Vec<u8>> {
    Ok(bincode::serialize(ids)?)
}

/// Decode a reference list; an empty blob is an empty list
pub fn decode_ids(bytes: &[u8]) -> Result<Vec<SnapshotKey>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    Ok(bincode::deserialize(bytes)?)
}

/// Encode a snapshot body
pub fn encode_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(snapshot).map_err(Error::serialization)
}

/// Decode a snapshot body
pub fn decode_snapshot(bytes: &[u8]) -> Result<Snapshot> {
    rmp_serde::from_slice(bytes).map_err(Error::serialization)
}
