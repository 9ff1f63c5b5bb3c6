//! Single-writer broker actor.
//!
//! # Responsibility
//! - Own the store connection and the broker on one dedicated thread.
//! - Give callers an async reply contract over channels.
//!
//! # Invariants
//! - Requests are handled strictly one at a time, in submission order.
//! - `submit` never blocks; the reply arrives later through `PendingReply`.
//! - A request that produces no reply resolves to `None`, never hangs.

use super::handler::{FocusBroker, WriteConsistency};
use super::reply::Reply;
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::export::Downloader;
use crate::store::{SqliteKeyValueStore, StoreError, StoreOptions};
use log::{error, info};
use rusqlite::Connection;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};

const WORKER_THREAD_NAME: &str = "focuskit-broker";

/// Where the actor opens its database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbLocation {
    File(PathBuf),
    Memory,
}

impl DbLocation {
    fn open(&self) -> Result<Connection, DbError> {
        match self {
            Self::File(path) => open_db(path),
            Self::Memory => open_db_in_memory(),
        }
    }
}

/// Actor construction options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerOptions {
    pub db: DbLocation,
    pub store: StoreOptions,
    pub consistency: WriteConsistency,
}

impl BrokerOptions {
    pub fn new(db: DbLocation) -> Self {
        Self {
            db,
            store: StoreOptions::default(),
            consistency: WriteConsistency::default(),
        }
    }
}

/// Actor startup failure.
#[derive(Debug)]
pub enum BrokerSpawnError {
    Db(DbError),
    Store(StoreError),
    Thread(std::io::Error),
    /// The worker exited before reporting readiness.
    WorkerExited,
}

impl Display for BrokerSpawnError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "broker store open failed: {err}"),
            Self::Store(err) => write!(f, "broker store init failed: {err}"),
            Self::Thread(err) => write!(f, "broker thread spawn failed: {err}"),
            Self::WorkerExited => write!(f, "broker worker exited during startup"),
        }
    }
}

impl Error for BrokerSpawnError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Thread(err) => Some(err),
            Self::WorkerExited => None,
        }
    }
}

/// The actor has shut down and accepts no more requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerClosed;

impl Display for BrokerClosed {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "broker is closed")
    }
}

impl Error for BrokerClosed {}

struct Envelope {
    request: Value,
    reply_tx: oneshot::Sender<Reply>,
}

/// Reply slot for one submitted request.
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<Reply>,
}

impl PendingReply {
    /// Waits for the reply; `None` means the broker chose not to answer.
    pub async fn reply(self) -> Option<Reply> {
        self.rx.await.ok()
    }
}

/// Cloneable handle to the broker actor.
///
/// The worker thread stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct BrokerHandle {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope").finish_non_exhaustive()
    }
}

impl BrokerHandle {
    /// Starts the worker thread and waits until its store is ready.
    ///
    /// # Errors
    /// - Returns an error when the database cannot be opened or migrated.
    /// - Returns an error when the worker thread cannot be started.
    pub fn spawn<D>(options: BrokerOptions, downloader: D) -> Result<Self, BrokerSpawnError>
    where
        D: Downloader + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(options, downloader, rx, ready_tx))
            .map_err(BrokerSpawnError::Thread)?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { tx }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(BrokerSpawnError::WorkerExited),
        }
    }

    /// Queues one request and returns immediately.
    pub fn submit(&self, request: Value) -> Result<PendingReply, BrokerClosed> {
        let (reply_tx, rx) = oneshot::channel();
        self.tx
            .send(Envelope { request, reply_tx })
            .map_err(|_| BrokerClosed)?;
        Ok(PendingReply { rx })
    }

    /// Submits one request and waits for its reply.
    pub async fn request(&self, request: Value) -> Result<Option<Reply>, BrokerClosed> {
        Ok(self.submit(request)?.reply().await)
    }
}

fn run_worker<D: Downloader>(
    options: BrokerOptions,
    downloader: D,
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    ready_tx: std::sync::mpsc::Sender<Result<(), BrokerSpawnError>>,
) {
    let conn = match options.db.open() {
        Ok(conn) => conn,
        Err(err) => {
            let _ = ready_tx.send(Err(BrokerSpawnError::Db(err)));
            return;
        }
    };
    let store = match SqliteKeyValueStore::with_options(&conn, options.store) {
        Ok(store) => store,
        Err(err) => {
            let _ = ready_tx.send(Err(BrokerSpawnError::Store(err)));
            return;
        }
    };
    let broker = FocusBroker::new(store, downloader).with_consistency(options.consistency);

    if ready_tx.send(Ok(())).is_err() {
        error!("event=broker_worker module=broker status=error error_code=spawner_gone");
        return;
    }
    info!(
        "event=broker_worker module=broker status=start consistency={}",
        options.consistency.as_str()
    );

    let mut handled: u64 = 0;
    while let Some(Envelope { request, reply_tx }) = rx.blocking_recv() {
        handled += 1;
        if let Some(reply) = broker.dispatch(&request) {
            // Receiver may have given up waiting; nothing to do then.
            let _ = reply_tx.send(reply);
        }
    }

    info!("event=broker_worker module=broker status=stop handled={handled}");
}
