//! Persistent key-value store adapter.
//!
//! # Responsibility
//! - Define the string-keyed JSON store contract used by the broker.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Every stored entry carries a revision that increases on each write.
//! - `compare_and_set` never overwrites an entry whose revision moved.
//! - Failures surface as `StoreError`; replies carry its display string.

use crate::db::DbError;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod kv_store;

pub use kv_store::{SqliteKeyValueStore, StoreOptions, QUOTA_BYTES_PER_ITEM};

/// Monotonic per-key write counter, starting at 1.
pub type Revision = i64;

pub type StoreResult<T> = Result<T, StoreError>;

/// One stored JSON value with the revision it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredValue {
    pub value: Value,
    pub revision: Revision,
}

/// Store adapter error.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    Json(serde_json::Error),
    /// Serialized key + value exceed the per-item quota.
    QuotaExceeded { key: String, bytes: usize, limit: usize },
    /// The entry changed since it was read.
    RevisionConflict {
        key: String,
        expected: Option<Revision>,
        actual: Option<Revision>,
    },
    InvalidData(String),
    MissingRequiredTable(&'static str),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "{err}"),
            // Mirrors the message browsers report for synchronized storage.
            Self::QuotaExceeded { .. } => write!(f, "QUOTA_BYTES_PER_ITEM quota exceeded"),
            Self::RevisionConflict {
                key,
                expected,
                actual,
            } => write!(
                f,
                "revision conflict on `{key}`: expected {}, found {}",
                revision_label(*expected),
                revision_label(*actual)
            ),
            Self::InvalidData(message) => write!(f, "invalid stored data: {message}"),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

fn revision_label(revision: Option<Revision>) -> String {
    revision.map_or_else(|| "absent".to_string(), |value| value.to_string())
}

/// String-keyed JSON document store.
pub trait KeyValueStore {
    /// Reads one entry; `None` when the key was never written.
    fn get(&self, key: &str) -> StoreResult<Option<StoredValue>>;
    /// Writes unconditionally (last write wins) and returns the new revision.
    fn set(&self, key: &str, value: &Value) -> StoreResult<Revision>;
    /// Writes only if the stored revision equals `expected`.
    ///
    /// `expected = None` means "only if the key is absent".
    fn compare_and_set(
        &self,
        key: &str,
        value: &Value,
        expected: Option<Revision>,
    ) -> StoreResult<Revision>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &S {
    fn get(&self, key: &str) -> StoreResult<Option<StoredValue>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &Value) -> StoreResult<Revision> {
        (**self).set(key, value)
    }

    fn compare_and_set(
        &self,
        key: &str,
        value: &Value,
        expected: Option<Revision>,
    ) -> StoreResult<Revision> {
        (**self).compare_and_set(key, value, expected)
    }
}
