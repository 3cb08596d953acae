//! Identifier types: owner keys, time-ordered snapshot keys, owner queries

use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::{NoContext, Timestamp as UuidTimestamp, Uuid};

/// Unique identifier of an owner row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerKey(Uuid);

impl OwnerKey {
    /// Create a new random OwnerKey using UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an OwnerKey from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Parse an OwnerKey from its string form
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Get the raw bytes of this OwnerKey
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for OwnerKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Time-ordered snapshot identifier.
///
/// Uses the UUID version 7 layout: the first 48 bits hold the creation time
/// in milliseconds since epoch, the remaining bits are random apart from the
/// version and variant nibbles. The creation time can therefore always be
/// recovered from the key alone, and keys sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotKey(Uuid);

impl SnapshotKey {
    /// Generate a key for the current moment
    pub fn generate() -> Self {
        Self::at(Timestamp::now())
    }

    /// Generate a key carrying the given creation time
    ///
    /// Times past [`Timestamp::MAX_KEY_TIME`] are clamped.
    pub fn at(created_at: Timestamp) -> Self {
        let millis = created_at.as_millis().min(Timestamp::MAX_KEY_TIME.as_millis());
        let nanos = (millis % 1000) as u32 * 1_000_000;
        Self(Uuid::new_v7(UuidTimestamp::from_unix(NoContext, millis / 1000, nanos)))
    }

    /// Create a SnapshotKey from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Parse a SnapshotKey from its string form
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Get the raw bytes of this SnapshotKey
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Creation time encoded in the key (millisecond precision)
    ///
    /// Keys without a timestamp read as [`Timestamp::EPOCH`].
    pub fn created_at(&self) -> Timestamp {
        self.0
            .get_timestamp()
            .map(|ts| {
                let (secs, nanos) = ts.to_unix();
                Timestamp::from_millis(secs * 1000 + u64::from(nanos / 1_000_000))
            })
            .unwrap_or(Timestamp::EPOCH)
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Addresses exactly one owner row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerQuery {
    /// Owner with the given key
    ById(OwnerKey),
    /// Owner belonging to the given user identity
    ByUser(Uuid),
}

impl fmt::Display for OwnerQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerQuery::ById(id) => write!(f, "owner:{}", id),
            OwnerQuery::ByUser(user) => write!(f, "user:{}", user),
        }
    }
}

impl From<OwnerKey> for OwnerQuery {
    fn from(id: OwnerKey) -> Self {
        OwnerQuery::ById(id)
    }
}

impl From<Uuid> for OwnerQuery {
    fn from(user: Uuid) -> Self {
        OwnerQuery::ByUser(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_snapshot_key_encodes_time() {
        let ts = Timestamp::from_millis(1_714_564_800_123);
        let key = SnapshotKey::at(ts);
        assert_eq!(key.created_at(), ts);
    }

    #[test]
    fn test_snapshot_key_layout_is_v7() {
        let key = SnapshotKey::generate();
        assert_eq!(key.0.get_version_num(), 7);
        assert_eq!(key.0.get_variant(), uuid::Variant::RFC4122);
    }

    #[test]
    fn test_snapshot_key_clamps_far_future() {
        let key = SnapshotKey::at(Timestamp::from_millis(u64::MAX));
        assert_eq!(key.created_at(), Timestamp::MAX_KEY_TIME);
    }

    #[test]
    fn test_random_key_reads_as_epoch() {
        let key = SnapshotKey::from_bytes(*Uuid::new_v4().as_bytes());
        assert_eq!(key.created_at(), Timestamp::EPOCH);
    }

    #[test]
    fn test_snapshot_keys_are_unique_within_a_millisecond() {
        let ts = Timestamp::from_millis(42);
        assert_ne!(SnapshotKey::at(ts), SnapshotKey::at(ts));
    }

    #[test]
    fn test_snapshot_keys_sort_by_time() {
        let early = SnapshotKey::at(Timestamp::from_secs(10));
        let late = SnapshotKey::at(Timestamp::from_secs(11));
        assert!(early < late);
    }

    #[test]
    fn test_snapshot_key_string_roundtrip() {
        let key = SnapshotKey::generate();
        assert_eq!(SnapshotKey::from_string(&key.to_string()), Some(key));
        assert_eq!(SnapshotKey::from_string("not-a-key"), None);
    }

    #[test]
    fn test_owner_query_from() {
        let user = Uuid::new_v4();
        assert_eq!(OwnerQuery::from(user), OwnerQuery::ByUser(user));
        let id = OwnerKey::new();
        assert_eq!(OwnerQuery::from(id), OwnerQuery::ById(id));
    }

    proptest! {
        #[test]
        fn prop_created_at_survives_key(millis in 0u64..(1u64 << 48)) {
            let key = SnapshotKey::at(Timestamp::from_millis(millis));
            prop_assert_eq!(key.created_at().as_millis(), millis);
        }
    }
}
