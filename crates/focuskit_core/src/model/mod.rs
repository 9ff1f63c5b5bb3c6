//! Persisted focus-state document model.
//!
//! # Responsibility
//! - Define the JSON shapes stored under the `focusData` and `quickNotes` keys.
//! - Centralize schema-on-read defaulting so handlers never re-derive it.
//!
//! # Invariants
//! - `currentGoal` `{}` means "no active goal"; clearing never touches siblings.
//! - Unknown top-level document fields survive every read-modify-write.

pub mod focus;
