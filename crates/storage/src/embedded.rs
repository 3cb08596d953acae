//! Embedded key-value adapter
//!
//! Three sled trees:
//!
//! ```text
//! owners       owner key -> bincode OwnerEntity
//! owner_users  user id   -> owner key
//! snapshots    snap key  -> MessagePack Snapshot
//! ```
//!
//! An owner's references are an opaque blob inside its entity. Every
//! mutation decodes, edits and re-encodes the blob inside one sled
//! transaction, so concurrent writers to the same owner never lose updates.
//!
//! Transactions come in three modes. Read-only and regular transactions share
//! a gate; exclusive transactions hold it alone. Owner creation runs
//! exclusively so a concurrent reader never sees the owner row without its
//! user index entry.

use crate::backend::{Backend, BackendKind};
use crate::codec;
use datasync_core::{Error, Owner, OwnerKey, OwnerQuery, Result, Snapshot, SnapshotKey, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::Transactional;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// Transaction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnMode {
    /// Reads only; writes are refused
    ReadOnly,
    /// Reads and writes under the shared gate
    Regular,
    /// Reads and writes with the gate held exclusively
    Exclusive,
}

/// Stored form of an owner; the key is the tree key
#[derive(Serialize, Deserialize)]
struct OwnerEntity {
    user_id: Uuid,
    snapshot_ids: Vec<u8>,
}

fn abort<T, E: Into<Error>>(e: E) -> ConflictableTransactionResult<T, Error> {
    Err(ConflictableTransactionError::Abort(e.into()))
}

fn owner_key(bytes: &[u8]) -> Result<OwnerKey> {
    let raw: [u8; 16] = bytes
        .try_into()
        .map_err(|_| Error::backend(format!("malformed owner key of {} bytes", bytes.len())))?;
    Ok(OwnerKey::from_bytes(raw))
}

/// View over the three trees for the duration of one transaction
struct KvTxn<'a> {
    mode: TxnMode,
    owners: &'a TransactionalTree,
    users: &'a TransactionalTree,
    snapshots: &'a TransactionalTree,
}

impl KvTxn<'_> {
    fn writable(&self) -> ConflictableTransactionResult<(), Error> {
        if self.mode == TxnMode::ReadOnly {
            return abort(Error::InvalidOperation(
                "write attempted in a read-only transaction".to_string(),
            ));
        }
        Ok(())
    }

    fn entity(&self, id: &OwnerKey) -> ConflictableTransactionResult<Option<OwnerEntity>, Error> {
        match self.owners.get(id.as_bytes())? {
            Some(bytes) => match bincode::deserialize(&bytes) {
                Ok(entity) => Ok(Some(entity)),
                Err(e) => abort(e),
            },
            None => Ok(None),
        }
    }

    fn resolve(
        &self,
        query: &OwnerQuery,
    ) -> ConflictableTransactionResult<Option<(OwnerKey, OwnerEntity)>, Error> {
        let id = match query {
            OwnerQuery::ById(id) => *id,
            OwnerQuery::ByUser(user) => match self.users.get(user.as_bytes())? {
                Some(bytes) => match owner_key(&bytes) {
                    Ok(id) => id,
                    Err(e) => return abort(e),
                },
                None => return Ok(None),
            },
        };
        Ok(self.entity(&id)?.map(|entity| (id, entity)))
    }

    fn ids(&self, entity: &OwnerEntity) -> ConflictableTransactionResult<Vec<SnapshotKey>, Error> {
        codec::decode_ids(&entity.snapshot_ids).or_else(abort)
    }

    fn put_entity(
        &self,
        id: &OwnerKey,
        entity: &OwnerEntity,
    ) -> ConflictableTransactionResult<(), Error> {
        self.writable()?;
        let bytes = match bincode::serialize(entity) {
            Ok(bytes) => bytes,
            Err(e) => return abort(e),
        };
        self.owners.insert(id.as_bytes().as_slice(), bytes)?;
        Ok(())
    }

    /// Apply `edit` to the owner's reference list; `None` if the owner is absent
    fn edit_ids<R>(
        &self,
        query: &OwnerQuery,
        edit: impl FnOnce(&mut Vec<SnapshotKey>) -> R,
    ) -> ConflictableTransactionResult<Option<R>, Error> {
        let Some((id, mut entity)) = self.resolve(query)? else {
            return Ok(None);
        };
        let mut ids = self.ids(&entity)?;
        let out = edit(&mut ids);
        entity.snapshot_ids = codec::encode_ids(&ids).or_else(abort)?;
        self.put_entity(&id, &entity)?;
        Ok(Some(out))
    }
}

/// sled-backed store
pub struct EmbeddedBackend {
    db: sled::Db,
    owners: sled::Tree,
    owner_users: sled::Tree,
    snapshots: sled::Tree,
    gate: RwLock<()>,
}

impl EmbeddedBackend {
    /// Open (or create) a store in directory `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(Error::backend)?;
        debug!(target: "datasync::storage", path = %path.display(), "Opened embedded store");
        Self::with_db(db)
    }

    /// Store removed from disk when dropped
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(Error::backend)?;
        Self::with_db(db)
    }

    fn with_db(db: sled::Db) -> Result<Self> {
        Ok(Self {
            owners: db.open_tree("owners").map_err(Error::backend)?,
            owner_users: db.open_tree("owner_users").map_err(Error::backend)?,
            snapshots: db.open_tree("snapshots").map_err(Error::backend)?,
            db,
            gate: RwLock::new(()),
        })
    }

    /// Run `f` in a transaction of the given mode
    ///
    /// `f` may be retried on conflict and must not have side effects outside
    /// the transaction.
    fn run<T, F>(&self, mode: TxnMode, f: F) -> Result<T>
    where
        F: Fn(&KvTxn<'_>) -> ConflictableTransactionResult<T, Error>,
    {
        match mode {
            TxnMode::Exclusive => {
                let _gate = self.gate.write();
                self.transact(mode, &f)
            }
            TxnMode::ReadOnly | TxnMode::Regular => {
                let _gate = self.gate.read();
                self.transact(mode, &f)
            }
        }
    }

    fn transact<T, F>(&self, mode: TxnMode, f: &F) -> Result<T>
    where
        F: Fn(&KvTxn<'_>) -> ConflictableTransactionResult<T, Error>,
    {
        (&self.owners, &self.owner_users, &self.snapshots)
            .transaction(|(owners, users, snapshots)| {
                f(&KvTxn {
                    mode,
                    owners,
                    users,
                    snapshots,
                })
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => Error::backend(e),
            })
    }
}

impl Backend for EmbeddedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Embedded
    }

    fn find_owner(&self, query: &OwnerQuery) -> Result<Option<Owner>> {
        self.run(TxnMode::ReadOnly, |txn| {
            let Some((id, entity)) = txn.resolve(query)? else {
                return Ok(None);
            };
            Ok(Some(Owner {
                id,
                user_id: entity.user_id,
                snapshot_ids: txn.ids(&entity)?,
            }))
        })
    }

    fn insert_owner(&self, owner: &Owner) -> Result<()> {
        let blob = codec::encode_ids(&owner.snapshot_ids)?;
        self.run(TxnMode::Exclusive, |txn| {
            txn.put_entity(
                &owner.id,
                &OwnerEntity {
                    user_id: owner.user_id,
                    snapshot_ids: blob.clone(),
                },
            )?;
            txn.users
                .insert(owner.user_id.as_bytes().as_slice(), owner.id.as_bytes().as_slice())?;
            Ok(())
        })
    }

    fn owner_ids(&self) -> Result<Vec<OwnerKey>> {
        let _gate = self.gate.read();
        self.owners
            .iter()
            .keys()
            .map(|key| owner_key(&key.map_err(Error::backend)?))
            .collect()
    }

    fn snapshot_ids(&self, query: &OwnerQuery) -> Result<Option<Vec<SnapshotKey>>> {
        self.run(TxnMode::ReadOnly, |txn| match txn.resolve(query)? {
            Some((_, entity)) => Ok(Some(txn.ids(&entity)?)),
            None => Ok(None),
        })
    }

    fn add_snapshot_id(&self, query: &OwnerQuery, key: SnapshotKey) -> Result<bool> {
        let found = self.run(TxnMode::Regular, |txn| {
            txn.edit_ids(query, |ids| {
                if !ids.contains(&key) {
                    ids.push(key);
                }
            })
        })?;
        Ok(found.is_some())
    }

    fn remove_snapshot_id(&self, query: &OwnerQuery, key: SnapshotKey) -> Result<bool> {
        let removed = self.run(TxnMode::Regular, |txn| {
            txn.edit_ids(query, |ids| {
                let before = ids.len();
                ids.retain(|id| *id != key);
                ids.len() != before
            })
        })?;
        Ok(removed.unwrap_or(false))
    }

    fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let body = codec::encode_snapshot(snapshot)?;
        self.run(TxnMode::Regular, |txn| {
            txn.writable()?;
            txn.snapshots
                .insert(snapshot.id.as_bytes().as_slice(), body.as_slice())?;
            Ok(())
        })
    }

    fn get_snapshot(&self, key: SnapshotKey) -> Result<Option<Snapshot>> {
        let body = self.run(TxnMode::ReadOnly, |txn| {
            Ok(txn.snapshots.get(key.as_bytes())?)
        })?;
        body.map(|bytes| codec::decode_snapshot(&bytes)).transpose()
    }

    fn snapshot_exists(&self, key: SnapshotKey) -> Result<bool> {
        let _gate = self.gate.read();
        self.snapshots
            .contains_key(key.as_bytes())
            .map_err(Error::backend)
    }

    fn delete_snapshot_body(&self, key: SnapshotKey) -> Result<bool> {
        self.run(TxnMode::Regular, |txn| {
            txn.writable()?;
            Ok(txn.snapshots.remove(key.as_bytes().as_slice())?.is_some())
        })
    }

    fn creation_time(&self, key: SnapshotKey) -> Timestamp {
        key.created_at()
    }

    fn time_matches(&self, key: SnapshotKey, target: Timestamp) -> bool {
        key.created_at().matches_lenient(target)
    }

    fn flush(&self) -> Result<()> {
        self.db.flush().map_err(Error::backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> EmbeddedBackend {
        EmbeddedBackend::temporary().unwrap()
    }

    #[test]
    fn test_owner_found_by_user_and_id() {
        let store = backend();
        let owner = Owner::new(Uuid::new_v4());
        store.insert_owner(&owner).unwrap();

        assert_eq!(store.find_owner(&OwnerQuery::ById(owner.id)).unwrap(), Some(owner.clone()));
        assert_eq!(
            store.find_owner(&OwnerQuery::ByUser(owner.user_id)).unwrap(),
            Some(owner.clone())
        );
        assert_eq!(store.owner_ids().unwrap(), vec![owner.id]);
    }

    #[test]
    fn test_read_only_transaction_refuses_writes() {
        let store = backend();
        let err = store
            .run(TxnMode::ReadOnly, |txn| {
                txn.writable()?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn test_lenient_time_matching() {
        let store = backend();
        let key = SnapshotKey::at(Timestamp::from_millis(1_500));
        assert_eq!(store.creation_time(key), Timestamp::from_millis(1_500));
        assert!(store.time_matches(key, Timestamp::from_millis(1_500)));
        assert!(store.time_matches(key, Timestamp::from_millis(1_000)));
        assert!(!store.time_matches(key, Timestamp::from_millis(1_400)));
        assert!(!store.time_matches(key, Timestamp::from_millis(2_000)));
    }

    #[test]
    fn test_concurrent_adds_are_not_lost() {
        let store = std::sync::Arc::new(backend());
        let owner = Owner::new(Uuid::new_v4());
        store.insert_owner(&owner).unwrap();
        let query = OwnerQuery::ById(owner.id);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store.add_snapshot_id(&query, SnapshotKey::generate()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.snapshot_ids(&query).unwrap().unwrap().len(), 200);
    }
}
