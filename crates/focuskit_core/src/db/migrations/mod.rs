//! Ordered schema steps for the key-value store.
//!
//! # Invariants
//! - Step versions start at 1 and increase by one.
//! - All pending steps commit in one transaction, together with the new
//!   `user_version`.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

/// (version, sql) pairs applied in order.
const SCHEMA_STEPS: &[(u32, &str)] = &[(1, include_str!("0001_kv_entries.sql"))];

/// Returns the newest schema version this build can read and write.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |(version, _)| *version)
}

/// Brings the store schema up to [`latest_version`].
///
/// # Errors
/// - [`DbError::SchemaTooNew`] when the file is ahead of this build.
/// - [`DbError::Sqlite`] when a step fails; nothing is committed then.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let found: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let supported = latest_version();
    if found > supported {
        return Err(DbError::SchemaTooNew { found, supported });
    }

    let pending: Vec<_> = SCHEMA_STEPS
        .iter()
        .filter(|(version, _)| *version > found)
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (version, sql) in &pending {
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from_version={found} to_version={supported} steps={}",
        pending.len()
    );
    Ok(())
}
