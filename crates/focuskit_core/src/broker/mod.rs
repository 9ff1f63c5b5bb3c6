//! Message broker: typed requests in, one reply (or none) out.
//!
//! # Responsibility
//! - Parse raw JSON requests at the boundary.
//! - Apply one document mutation per request through the store adapter.
//! - Serialize access to the store through a single-writer actor.
//!
//! # Invariants
//! - No component other than the broker writes to storage.
//! - Unrecognized actions produce no reply.

pub mod actor;
pub mod handler;
pub mod reply;
pub mod request;
