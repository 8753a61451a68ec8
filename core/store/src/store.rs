//! SQLite-based record store.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use caresync_common::{AccountId, Error, RecordId, Result};
use caresync_model::{SyncRecord, Tombstone};

fn db_err(e: rusqlite::Error) -> Error {
    Error::LocalStore(e.to_string())
}

fn decode_err(id: &str, e: serde_json::Error) -> Error {
    Error::Deserialization(format!("stored payload for '{}': {}", id, e))
}

/// Local record store.
///
/// Each entity type registered via [`RecordStore::register`] gets its own
/// table with identical shape; record content is persisted as a JSON payload
/// with the id, owner and synced flag extracted into columns for querying.
pub struct RecordStore {
    conn: Mutex<Connection>,
}

impl RecordStore {
    /// Create or open a record store database.
    ///
    /// # Errors
    /// - Database creation or schema initialization failure
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(db_err)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tombstone (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                deleted_at TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );

            CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .map_err(db_err)?;

        info!("Record store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Create the table for an entity type if it does not exist yet.
    pub fn register<T: SyncRecord>(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                synced INTEGER NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_{table}_synced ON {table}(synced);
            CREATE INDEX IF NOT EXISTS idx_{table}_owner ON {table}(owner);
            "#,
            table = T::TABLE,
        ))
        .map_err(db_err)?;
        debug!("Registered entity table: {}", T::TABLE);
        Ok(())
    }

    fn decode<T: SyncRecord>(id: &str, payload: &str, synced: bool) -> Result<T> {
        let mut record: T = serde_json::from_str(payload).map_err(|e| decode_err(id, e))?;
        record.set_synced(synced);
        Ok(record)
    }

    fn query_records<T: SyncRecord>(
        &self,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<T>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let rows = stmt
            .query_map(args, |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)? != 0,
                ))
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;

        rows.iter()
            .map(|(id, payload, synced)| Self::decode(id, payload, *synced))
            .collect()
    }

    /// Get all records of an entity type.
    pub fn get_all<T: SyncRecord>(&self) -> Result<Vec<T>> {
        self.query_records(
            &format!("SELECT id, payload, synced FROM {}", T::TABLE),
            &[],
        )
    }

    /// Get all records of an entity type belonging to one account.
    pub fn get_for_owner<T: SyncRecord>(&self, owner: &AccountId) -> Result<Vec<T>> {
        self.query_records(
            &format!(
                "SELECT id, payload, synced FROM {} WHERE owner = ?1",
                T::TABLE
            ),
            &[&owner.as_str()],
        )
    }

    /// Get all records with pending local changes.
    pub fn get_unsynced<T: SyncRecord>(&self) -> Result<Vec<T>> {
        self.query_records(
            &format!(
                "SELECT id, payload, synced FROM {} WHERE synced = 0",
                T::TABLE
            ),
            &[],
        )
    }

    /// Get a record by id.
    pub fn get<T: SyncRecord>(&self, id: &RecordId) -> Result<Option<T>> {
        let mut records = self.query_records(
            &format!(
                "SELECT id, payload, synced FROM {} WHERE id = ?1",
                T::TABLE
            ),
            &[&id.as_str()],
        )?;
        Ok(records.pop())
    }

    /// Insert or replace a record by id.
    pub fn upsert<T: SyncRecord>(&self, record: &T) -> Result<()> {
        let payload = serde_json::to_string(record)
            .map_err(|e| Error::Internal(format!("encode record '{}': {}", record.id(), e)))?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (id, owner, synced, payload) VALUES (?1, ?2, ?3, ?4)",
                T::TABLE
            ),
            params![
                record.id().as_str(),
                record.owner().as_str(),
                record.synced() as i64,
                payload,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Update an existing record by id.
    ///
    /// # Errors
    /// - `Error::NotFound` if no row with that id exists
    pub fn update<T: SyncRecord>(&self, record: &T) -> Result<()> {
        let payload = serde_json::to_string(record)
            .map_err(|e| Error::Internal(format!("encode record '{}': {}", record.id(), e)))?;

        let conn = self.conn.lock().unwrap();
        let rows = conn
            .execute(
                &format!(
                    "UPDATE {} SET owner = ?2, synced = ?3, payload = ?4 WHERE id = ?1",
                    T::TABLE
                ),
                params![
                    record.id().as_str(),
                    record.owner().as_str(),
                    record.synced() as i64,
                    payload,
                ],
            )
            .map_err(db_err)?;

        if rows == 0 {
            return Err(Error::NotFound(format!(
                "No {} record with id {}",
                T::TABLE,
                record.id()
            )));
        }
        Ok(())
    }

    /// Persist a local edit: validate, reset the synced flag, upsert.
    ///
    /// This is the entry point for user-driven changes; anything written
    /// through here becomes eligible for the next push phase.
    pub fn save_local<T: SyncRecord>(&self, record: &mut T) -> Result<()> {
        record.validate()?;
        record.set_synced(false);
        self.upsert(record)
    }

    /// Delete records by id. Returns the number of rows removed.
    pub fn delete_by_ids<T: SyncRecord>(&self, ids: &[RecordId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let conn = self.conn.lock().unwrap();
        let rows = conn
            .execute(
                &format!("DELETE FROM {} WHERE id IN ({})", T::TABLE, placeholders),
                params_from_iter(ids.iter().map(|id| id.as_str())),
            )
            .map_err(db_err)?;
        Ok(rows)
    }

    /// Delete a record locally and stage a tombstone for the remote copy.
    ///
    /// Row removal and tombstone creation commit in a single transaction so
    /// a deletion can never be observed half-applied.
    ///
    /// # Errors
    /// - `Error::NotFound` if no row with that id exists
    pub fn delete_record<T: SyncRecord>(&self, id: &RecordId) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;

        let rows = tx
            .execute(
                &format!("DELETE FROM {} WHERE id = ?1", T::TABLE),
                params![id.as_str()],
            )
            .map_err(db_err)?;
        if rows == 0 {
            return Err(Error::NotFound(format!(
                "No {} record with id {}",
                T::TABLE,
                id
            )));
        }

        tx.execute(
            "INSERT OR REPLACE INTO tombstone (collection, id, deleted_at) VALUES (?1, ?2, ?3)",
            params![T::COLLECTION, id.as_str(), Utc::now().to_rfc3339()],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;
        debug!("Deleted {} record {} (tombstone staged)", T::TABLE, id);
        Ok(())
    }

    /// Get all pending tombstones for a collection.
    pub fn tombstones(&self, collection: &str) -> Result<Vec<Tombstone>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT id, deleted_at FROM tombstone WHERE collection = ?1")
            .map_err(db_err)?;

        let rows = stmt
            .query_map([collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;

        rows.into_iter()
            .map(|(id, deleted_at)| {
                let deleted_at = DateTime::parse_from_rfc3339(&deleted_at)
                    .map_err(|e| Error::Deserialization(format!("tombstone timestamp: {}", e)))?
                    .with_timezone(&Utc);
                Ok(Tombstone {
                    collection: collection.to_string(),
                    id: RecordId::new(id)?,
                    deleted_at,
                })
            })
            .collect()
    }

    /// Check whether a deletion is pending for a record.
    pub fn has_tombstone(&self, collection: &str, id: &RecordId) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM tombstone WHERE collection = ?1 AND id = ?2",
                params![collection, id.as_str()],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    /// Remove a tombstone after its deletion has propagated remotely.
    pub fn purge_tombstone(&self, collection: &str, id: &RecordId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM tombstone WHERE collection = ?1 AND id = ?2",
            params![collection, id.as_str()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Total record count for an entity type.
    pub fn count<T: SyncRecord>(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", T::TABLE), [], |row| {
                row.get(0)
            })
            .map_err(db_err)?;
        Ok(count as u64)
    }

    /// Count of records with pending local changes.
    pub fn unsynced_count<T: SyncRecord>(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE synced = 0", T::TABLE),
                [],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count as u64)
    }

    /// Get a store metadata value.
    pub fn meta_get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT value FROM store_meta WHERE key = ?1")
            .map_err(db_err)?;

        match stmt.query_row([key], |row| row.get(0)) {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Set a store metadata value.
    pub fn meta_set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO store_meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .map_err(db_err)?;
        Ok(())
    }
}
