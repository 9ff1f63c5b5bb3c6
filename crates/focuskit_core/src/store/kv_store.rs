//! SQLite-backed key-value store.
//!
//! # Invariants
//! - Values are stored as JSON text and must parse back on read.
//! - Per-item quota counts `key.len() + json.len()` bytes.

use super::{KeyValueStore, Revision, StoreError, StoreResult, StoredValue};
use log::warn;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

/// Per-item byte quota of synchronized browser storage.
pub const QUOTA_BYTES_PER_ITEM: usize = 8192;

/// Store tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// `None` disables the per-item quota.
    pub max_item_bytes: Option<usize>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_item_bytes: Some(QUOTA_BYTES_PER_ITEM),
        }
    }
}

/// Key-value store over the `kv_entries` table.
pub struct SqliteKeyValueStore<'conn> {
    conn: &'conn Connection,
    options: StoreOptions,
}

impl<'conn> SqliteKeyValueStore<'conn> {
    /// Constructs a store from a migrated connection with default options.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        Self::with_options(conn, StoreOptions::default())
    }

    pub fn with_options(conn: &'conn Connection, options: StoreOptions) -> StoreResult<Self> {
        ensure_store_connection_ready(conn)?;
        Ok(Self { conn, options })
    }

    fn encode(&self, key: &str, value: &Value) -> StoreResult<String> {
        let encoded = serde_json::to_string(value)?;
        if let Some(limit) = self.options.max_item_bytes {
            let bytes = key.len() + encoded.len();
            if bytes > limit {
                warn!(
                    "event=store_write module=store status=error error_code=quota_exceeded key={key} bytes={bytes} limit={limit}"
                );
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    bytes,
                    limit,
                });
            }
        }
        Ok(encoded)
    }

    fn current_revision(&self, key: &str) -> StoreResult<Option<Revision>> {
        let revision = self
            .conn
            .query_row(
                "SELECT revision FROM kv_entries WHERE key = ?1;",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(revision)
    }
}

impl KeyValueStore for SqliteKeyValueStore<'_> {
    fn get(&self, key: &str) -> StoreResult<Option<StoredValue>> {
        let row = self
            .conn
            .query_row(
                "SELECT value_json, revision FROM kv_entries WHERE key = ?1;",
                [key],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Revision>(1)?)),
            )
            .optional()?;

        let Some((raw, revision)) = row else {
            return Ok(None);
        };
        let value = serde_json::from_str(&raw).map_err(|err| {
            StoreError::InvalidData(format!("entry `{key}` is not valid JSON: {err}"))
        })?;
        Ok(Some(StoredValue { value, revision }))
    }

    fn set(&self, key: &str, value: &Value) -> StoreResult<Revision> {
        let encoded = self.encode(key, value)?;
        let revision = self.conn.query_row(
            "INSERT INTO kv_entries (key, value_json) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET
                value_json = excluded.value_json,
                revision = kv_entries.revision + 1,
                updated_at = (strftime('%s', 'now') * 1000)
             RETURNING revision;",
            params![key, encoded],
            |row| row.get(0),
        )?;
        Ok(revision)
    }

    fn compare_and_set(
        &self,
        key: &str,
        value: &Value,
        expected: Option<Revision>,
    ) -> StoreResult<Revision> {
        let encoded = self.encode(key, value)?;
        let written: Option<Revision> = match expected {
            None => self
                .conn
                .query_row(
                    "INSERT INTO kv_entries (key, value_json) VALUES (?1, ?2)
                     ON CONFLICT(key) DO NOTHING
                     RETURNING revision;",
                    params![key, encoded],
                    |row| row.get(0),
                )
                .optional()?,
            Some(revision) => self
                .conn
                .query_row(
                    "UPDATE kv_entries
                     SET
                        value_json = ?2,
                        revision = revision + 1,
                        updated_at = (strftime('%s', 'now') * 1000)
                     WHERE key = ?1
                       AND revision = ?3
                     RETURNING revision;",
                    params![key, encoded, revision],
                    |row| row.get(0),
                )
                .optional()?,
        };

        match written {
            Some(revision) => Ok(revision),
            None => Err(StoreError::RevisionConflict {
                key: key.to_string(),
                expected,
                actual: self.current_revision(key)?,
            }),
        }
    }
}

fn ensure_store_connection_ready(conn: &Connection) -> StoreResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = 'kv_entries'
        );",
        [],
        |row| row.get(0),
    )?;
    if exists == 1 {
        Ok(())
    } else {
        Err(StoreError::MissingRequiredTable("kv_entries"))
    }
}
