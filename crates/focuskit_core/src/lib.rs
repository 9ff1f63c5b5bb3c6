//! Core of the focuskit study widget backend.
//! This crate owns the persisted focus state and the only code that writes it.

pub mod broker;
pub mod config;
pub mod db;
pub mod export;
pub mod logging;
pub mod model;
pub mod session;
pub mod store;
pub mod transport;

pub use broker::actor::{
    BrokerClosed, BrokerHandle, BrokerOptions, BrokerSpawnError, DbLocation, PendingReply,
};
pub use broker::handler::{FocusBroker, WriteConsistency, DEFAULT_MAX_WRITE_ATTEMPTS};
pub use broker::reply::Reply;
pub use broker::request::{Request, RequestError};
pub use config::{ConfigError, HostConfig};
pub use export::{
    Downloader, ExportArtifact, ExportError, ExportFormat, FsDownloader, MemoryDownloader,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::focus::{
    Assessment, CurrentGoal, FocusDocument, GoalsView, Subtask, FOCUS_DATA_KEY, QUICK_NOTES_KEY,
};
pub use session::pomodoro::{PomodoroTimer, TimerEvent};
pub use store::{
    KeyValueStore, Revision, SqliteKeyValueStore, StoreError, StoreOptions, StoreResult,
    StoredValue,
};
pub use transport::native_messaging::{serve, FrameError, ServeError, ServeStats};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
