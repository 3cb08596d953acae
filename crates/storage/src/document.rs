//! Document-store adapter
//!
//! Owners and snapshots are JSON documents in two SQLite tables. Reference
//! list updates are single `UPDATE` statements built on the JSON1 functions,
//! so each one is atomic per owner without an explicit transaction.
//!
//! ```text
//! owners(id TEXT PRIMARY KEY, doc TEXT)     doc = {"user_id": "...", "snapshot_ids": ["...", ...]}
//! snapshots(id TEXT PRIMARY KEY, doc TEXT)  doc = Snapshot as JSON
//! ```
//!
//! Time precision is the second: creation times are the key time truncated
//! to the second and timestamp lookups compare exactly at that precision.

use crate::backend::{Backend, BackendKind};
use datasync_core::{Error, Owner, OwnerKey, OwnerQuery, Result, Snapshot, SnapshotKey, Timestamp};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS owners (
        id  TEXT PRIMARY KEY NOT NULL,
        doc TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS owners_user_id ON owners (json_extract(doc, '$.user_id'));
    CREATE TABLE IF NOT EXISTS snapshots (
        id  TEXT PRIMARY KEY NOT NULL,
        doc TEXT NOT NULL
    );
";

/// Stored form of an owner; the key lives in the `id` column
#[derive(Serialize, Deserialize)]
struct OwnerDoc {
    user_id: Uuid,
    #[serde(default)]
    snapshot_ids: Vec<SnapshotKey>,
}

/// SQLite-backed JSON document store
pub struct DocumentBackend {
    conn: Mutex<Connection>,
}

impl DocumentBackend {
    /// Open (or create) a store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(Error::backend)?;
        debug!(target: "datasync::storage", path = %path.display(), "Opened document store");
        Self::with_connection(conn)
    }

    /// Store that lives only as long as this value
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory().map_err(Error::backend)?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(Error::backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// `WHERE` fragment and its `?1` binding for an owner query
    fn filter(query: &OwnerQuery) -> (&'static str, String) {
        match query {
            OwnerQuery::ById(id) => ("id = ?1", id.to_string()),
            OwnerQuery::ByUser(user) => ("json_extract(doc, '$.user_id') = ?1", user.to_string()),
        }
    }

    fn parse_owner(id: String, doc: String) -> Result<Owner> {
        let id = OwnerKey::from_string(&id)
            .ok_or_else(|| Error::backend(format!("malformed owner id {:?}", id)))?;
        let doc: OwnerDoc = serde_json::from_str(&doc)?;
        Ok(Owner {
            id,
            user_id: doc.user_id,
            snapshot_ids: doc.snapshot_ids,
        })
    }
}

impl Backend for DocumentBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Document
    }

    fn find_owner(&self, query: &OwnerQuery) -> Result<Option<Owner>> {
        let (filter, value) = Self::filter(query);
        let sql = format!("SELECT id, doc FROM owners WHERE {} LIMIT 1", filter);
        let row = self
            .conn
            .lock()
            .query_row(&sql, params![value], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .optional()
            .map_err(Error::backend)?;
        row.map(|(id, doc)| Self::parse_owner(id, doc)).transpose()
    }

    fn insert_owner(&self, owner: &Owner) -> Result<()> {
        let doc = serde_json::to_string(&OwnerDoc {
            user_id: owner.user_id,
            snapshot_ids: owner.snapshot_ids.clone(),
        })?;
        self.conn
            .lock()
            .execute(
                "INSERT INTO owners (id, doc) VALUES (?1, ?2)",
                params![owner.id.to_string(), doc],
            )
            .map_err(Error::backend)?;
        Ok(())
    }

    fn owner_ids(&self) -> Result<Vec<OwnerKey>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id FROM owners")
            .map_err(Error::backend)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(Error::backend)?;

        let mut ids = Vec::new();
        for row in rows {
            let raw = row.map_err(Error::backend)?;
            let id = OwnerKey::from_string(&raw)
                .ok_or_else(|| Error::backend(format!("malformed owner id {:?}", raw)))?;
            ids.push(id);
        }
        Ok(ids)
    }

    fn snapshot_ids(&self, query: &OwnerQuery) -> Result<Option<Vec<SnapshotKey>>> {
        let (filter, value) = Self::filter(query);
        let sql = format!(
            "SELECT json_extract(doc, '$.snapshot_ids') FROM owners WHERE {} LIMIT 1",
            filter
        );
        let raw = self
            .conn
            .lock()
            .query_row(&sql, params![value], |row| row.get::<_, Option<String>>(0))
            .optional()
            .map_err(Error::backend)?;
        match raw {
            None => Ok(None),
            Some(None) => Ok(Some(Vec::new())),
            Some(Some(json)) => Ok(Some(serde_json::from_str(&json)?)),
        }
    }

    fn add_snapshot_id(&self, query: &OwnerQuery, key: SnapshotKey) -> Result<bool> {
        let (filter, value) = Self::filter(query);
        // Rewrites the row even when the key is present, so `changes()`
        // reports whether the owner exists.
        let sql = format!(
            "UPDATE owners SET doc = CASE
                 WHEN EXISTS (SELECT 1 FROM json_each(owners.doc, '$.snapshot_ids') WHERE value = ?2)
                 THEN doc
                 ELSE json_insert(doc, '$.snapshot_ids[#]', ?2)
             END
             WHERE {}",
            filter
        );
        let changed = self
            .conn
            .lock()
            .execute(&sql, params![value, key.to_string()])
            .map_err(Error::backend)?;
        Ok(changed > 0)
    }

    fn remove_snapshot_id(&self, query: &OwnerQuery, key: SnapshotKey) -> Result<bool> {
        let (filter, value) = Self::filter(query);
        let sql = format!(
            "UPDATE owners SET doc = json_set(doc, '$.snapshot_ids', json((
                 SELECT json_group_array(value) FROM json_each(owners.doc, '$.snapshot_ids')
                 WHERE value <> ?2
             )))
             WHERE {} AND EXISTS (
                 SELECT 1 FROM json_each(owners.doc, '$.snapshot_ids') WHERE value = ?2
             )",
            filter
        );
        let changed = self
            .conn
            .lock()
            .execute(&sql, params![value, key.to_string()])
            .map_err(Error::backend)?;
        Ok(changed > 0)
    }

    fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let doc = serde_json::to_string(snapshot)?;
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO snapshots (id, doc) VALUES (?1, ?2)",
                params![snapshot.id.to_string(), doc],
            )
            .map_err(Error::backend)?;
        Ok(())
    }

    fn get_snapshot(&self, key: SnapshotKey) -> Result<Option<Snapshot>> {
        let doc = self
            .conn
            .lock()
            .query_row(
                "SELECT doc FROM snapshots WHERE id = ?1",
                params![key.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(Error::backend)?;
        doc.map(|doc| serde_json::from_str(&doc).map_err(Error::from))
            .transpose()
    }

    fn snapshot_exists(&self, key: SnapshotKey) -> Result<bool> {
        self.conn
            .lock()
            .query_row(
                "SELECT EXISTS (SELECT 1 FROM snapshots WHERE id = ?1)",
                params![key.to_string()],
                |row| row.get::<_, bool>(0),
            )
            .map_err(Error::backend)
    }

    fn delete_snapshot_body(&self, key: SnapshotKey) -> Result<bool> {
        let changed = self
            .conn
            .lock()
            .execute("DELETE FROM snapshots WHERE id = ?1", params![key.to_string()])
            .map_err(Error::backend)?;
        Ok(changed > 0)
    }

    fn creation_time(&self, key: SnapshotKey) -> Timestamp {
        key.created_at().truncate_to_secs()
    }

    fn time_matches(&self, key: SnapshotKey, target: Timestamp) -> bool {
        self.creation_time(key) == target
    }
}
