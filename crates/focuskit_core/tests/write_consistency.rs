use focuskit_core::db::open_db_in_memory;
use focuskit_core::{
    FocusBroker, FocusDocument, KeyValueStore, MemoryDownloader, Revision, SqliteKeyValueStore,
    StoreResult, StoredValue, WriteConsistency, FOCUS_DATA_KEY,
};
use serde_json::{json, Value};
use std::cell::Cell;

/// Store that lands a competing `appendSubtasks` right before the
/// broker's own write, simulating a second writer interleaving with the
/// broker's read-modify-write cycle.
struct RacingStore<'conn> {
    inner: SqliteKeyValueStore<'conn>,
    races_left: Cell<u32>,
    races_run: Cell<u32>,
}

impl<'conn> RacingStore<'conn> {
    fn new(inner: SqliteKeyValueStore<'conn>, races: u32) -> Self {
        Self {
            inner,
            races_left: Cell::new(races),
            races_run: Cell::new(0),
        }
    }

    fn race(&self, key: &str) -> StoreResult<()> {
        if key != FOCUS_DATA_KEY || self.races_left.get() == 0 {
            return Ok(());
        }
        self.races_left.set(self.races_left.get() - 1);
        self.races_run.set(self.races_run.get() + 1);

        let current = self.inner.get(key)?.map(|stored| stored.value);
        let mut doc = FocusDocument::from_stored(current)?;
        doc.append_subtasks([format!("rival-{}", self.races_run.get())]);
        self.inner.set(key, &doc.to_value()?)?;
        Ok(())
    }
}

impl KeyValueStore for RacingStore<'_> {
    fn get(&self, key: &str) -> StoreResult<Option<StoredValue>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &Value) -> StoreResult<Revision> {
        self.race(key)?;
        self.inner.set(key, value)
    }

    fn compare_and_set(
        &self,
        key: &str,
        value: &Value,
        expected: Option<Revision>,
    ) -> StoreResult<Revision> {
        self.race(key)?;
        self.inner.compare_and_set(key, value, expected)
    }
}

fn subtask_names(store: &SqliteKeyValueStore<'_>) -> Vec<String> {
    let stored = store.get(FOCUS_DATA_KEY).unwrap().unwrap();
    FocusDocument::from_stored(Some(stored.value))
        .unwrap()
        .goals_view()
        .subtasks
        .into_iter()
        .map(|subtask| subtask.name)
        .collect()
}

#[test]
fn compare_and_swap_keeps_interleaved_append() {
    let conn = open_db_in_memory().unwrap();
    let racing = RacingStore::new(SqliteKeyValueStore::try_new(&conn).unwrap(), 1);
    let broker = FocusBroker::new(&racing, MemoryDownloader::new());
    assert_eq!(broker.consistency(), WriteConsistency::CompareAndSwap);

    let reply = broker
        .dispatch(&json!({ "action": "appendSubtasks", "data": ["mine"] }))
        .unwrap();
    assert!(reply.to_value().unwrap()["currentGoal"].is_object());

    let plain = SqliteKeyValueStore::try_new(&conn).unwrap();
    assert_eq!(subtask_names(&plain), vec!["rival-1", "mine"]);
    assert_eq!(racing.races_run.get(), 1);
}

#[test]
fn last_write_wins_loses_interleaved_append() {
    let conn = open_db_in_memory().unwrap();
    let racing = RacingStore::new(SqliteKeyValueStore::try_new(&conn).unwrap(), 1);
    let broker = FocusBroker::new(&racing, MemoryDownloader::new())
        .with_consistency(WriteConsistency::LastWriteWins);

    broker
        .dispatch(&json!({ "action": "appendSubtasks", "data": ["mine"] }))
        .unwrap();

    let plain = SqliteKeyValueStore::try_new(&conn).unwrap();
    assert_eq!(subtask_names(&plain), vec!["mine"]);
}

#[test]
fn compare_and_swap_gives_up_after_max_attempts() {
    let conn = open_db_in_memory().unwrap();
    let racing = RacingStore::new(SqliteKeyValueStore::try_new(&conn).unwrap(), u32::MAX);
    let broker = FocusBroker::new(&racing, MemoryDownloader::new()).with_max_write_attempts(3);

    let reply = broker
        .dispatch(&json!({ "action": "appendSubtasks", "data": ["mine"] }))
        .unwrap()
        .to_value()
        .unwrap();
    let message = reply["error"].as_str().unwrap();
    assert!(message.starts_with("revision conflict on `focusData`"));
    assert_eq!(racing.races_run.get(), 3);

    let plain = SqliteKeyValueStore::try_new(&conn).unwrap();
    assert_eq!(subtask_names(&plain), vec!["rival-1", "rival-2", "rival-3"]);
}

#[test]
fn retried_startup_sees_competing_goal() {
    let conn = open_db_in_memory().unwrap();
    let racing = RacingStore::new(SqliteKeyValueStore::try_new(&conn).unwrap(), 1);
    let broker = FocusBroker::new(&racing, MemoryDownloader::new());

    // The rival append gives the goal slot a checklist, so the retry
    // observes a non-empty goal and leaves it alone.
    let reply = broker.dispatch(&json!({ "action": "startup" })).unwrap();
    assert_eq!(reply.to_value().unwrap(), json!("returning"));

    let plain = SqliteKeyValueStore::try_new(&conn).unwrap();
    assert_eq!(subtask_names(&plain), vec!["rival-1"]);
}
