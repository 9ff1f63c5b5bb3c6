//! Focus broker: one read-modify-write cycle per request.
//!
//! # Responsibility
//! - Dispatch parsed requests to per-action handlers.
//! - Own the load-or-initialize accessor and the document write path.
//!
//! # Invariants
//! - Each attempt is one full-document read followed by at most one
//!   full-document write.
//! - In `CompareAndSwap` mode a write only lands on the revision it read;
//!   conflicts re-run the whole cycle up to `max_write_attempts` times.
//! - Handlers never log user-supplied content.

use super::reply::{
    Reply, INVALID_FORMAT, REPLY_CLEARED, REPLY_ONBOARDING, REPLY_RETURNING, SUBTASK_OUT_OF_RANGE,
};
use super::request::{Request, RequestError};
use crate::export::{Downloader, ExportArtifact, ExportFormat};
use crate::model::focus::{
    quick_notes_from_stored, Assessment, AssessmentBook, FocusDocument, FOCUS_DATA_KEY,
    QUICK_NOTES_KEY,
};
use crate::store::{KeyValueStore, Revision, StoreError, StoreResult};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Instant;

/// Default bound on compare-and-swap retries per request.
pub const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 5;

/// How document writes treat concurrent writers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteConsistency {
    /// Write only on the revision that was read; retry on conflict.
    #[default]
    CompareAndSwap,
    /// Unconditional overwrite; concurrent cycles can lose updates.
    LastWriteWins,
}

impl WriteConsistency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CompareAndSwap => "cas",
            Self::LastWriteWins => "lww",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cas" | "compare_and_swap" => Some(Self::CompareAndSwap),
            "lww" | "last_write_wins" => Some(Self::LastWriteWins),
            _ => None,
        }
    }
}

/// Whether a mutation should be persisted.
enum Mutation<T> {
    Commit(T),
    Skip(T),
}

/// Storage-backed request handler.
pub struct FocusBroker<S: KeyValueStore, D: Downloader> {
    store: S,
    downloader: D,
    consistency: WriteConsistency,
    max_write_attempts: u32,
}

impl<S: KeyValueStore, D: Downloader> FocusBroker<S, D> {
    pub fn new(store: S, downloader: D) -> Self {
        Self {
            store,
            downloader,
            consistency: WriteConsistency::default(),
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
        }
    }

    pub fn with_consistency(mut self, consistency: WriteConsistency) -> Self {
        self.consistency = consistency;
        self
    }

    /// Caps compare-and-swap attempts; values below 1 are treated as 1.
    pub fn with_max_write_attempts(mut self, attempts: u32) -> Self {
        self.max_write_attempts = attempts.max(1);
        self
    }

    pub fn consistency(&self) -> WriteConsistency {
        self.consistency
    }

    pub fn downloader(&self) -> &D {
        &self.downloader
    }

    /// Handles one raw request.
    ///
    /// Returns `None` for requests without a recognized action; callers must
    /// treat that as "no reply will ever arrive".
    pub fn dispatch(&self, raw: &Value) -> Option<Reply> {
        match Request::parse(raw) {
            Ok(request) => Some(self.handle(request)),
            Err(RequestError::Unrecognized(action)) => {
                debug!(
                    "event=broker_dispatch module=broker status=ignored action={}",
                    action.as_deref().unwrap_or("none")
                );
                None
            }
            Err(err @ RequestError::Malformed { .. }) => {
                warn!("event=broker_dispatch module=broker status=rejected error_code=malformed_request");
                Some(Reply::error(err.to_string()))
            }
        }
    }

    /// Handles one typed request.
    pub fn handle(&self, request: Request) -> Reply {
        let started_at = Instant::now();
        let action = request.action_name();
        let reply = match request {
            Request::Hello => Reply::farewell(),
            Request::Startup => self.startup(),
            Request::FetchGoals => self.fetch_goals(),
            Request::AppendCurrentGoal { name } => self.append_current_goal(name),
            Request::AppendSubtasks { titles } => self.append_subtasks(titles),
            Request::SetSubtaskCompleted { index, completed } => {
                self.set_subtask_completed(index, completed)
            }
            Request::FetchAssessment { week_key } => self.fetch_assessment(&week_key),
            Request::AppendAssessment {
                week_key,
                day,
                assessment,
            } => self.append_assessment(week_key, day, assessment),
            Request::ClearGoal => self.clear_goal(),
            Request::SaveQuickNotes { notes } => self.save_quick_notes(notes),
            Request::ConvertQuickNotes { format } => self.convert_quick_notes(&format),
        };
        info!(
            "event=broker_dispatch module=broker status=ok action={action} duration_ms={}",
            started_at.elapsed().as_millis()
        );
        reply
    }

    /// Loads the stored document with every field defaulted.
    pub fn load_document(&self) -> StoreResult<(FocusDocument, Option<Revision>)> {
        match self.store.get(FOCUS_DATA_KEY)? {
            Some(stored) => Ok((
                FocusDocument::from_stored(Some(stored.value))?,
                Some(stored.revision),
            )),
            None => Ok((FocusDocument::default(), None)),
        }
    }

    fn startup(&self) -> Reply {
        let outcome = self.update_document(|doc| {
            if doc.current_goal.is_empty() {
                doc.begin_onboarding();
                Mutation::Commit(true)
            } else {
                Mutation::Skip(false)
            }
        });
        match outcome {
            Ok((_, true)) => Reply::text(REPLY_ONBOARDING),
            Ok((_, false)) => Reply::text(REPLY_RETURNING),
            Err(err) => self.store_failure("startup", &err, Reply::text(err.to_string())),
        }
    }

    fn fetch_goals(&self) -> Reply {
        match self.load_document() {
            Ok((doc, _)) => Reply::Goals(doc.goals_view()),
            Err(err) => self.store_failure("fetchGoals", &err, Reply::error(err.to_string())),
        }
    }

    fn append_current_goal(&self, name: String) -> Reply {
        match self.update_document(|doc| {
            doc.replace_goal(name.clone());
            Mutation::Commit(())
        }) {
            Ok((doc, ())) => Reply::Document(doc),
            Err(err) => {
                self.store_failure("appendCurrentGoal", &err, Reply::error(err.to_string()))
            }
        }
    }

    fn append_subtasks(&self, titles: Vec<String>) -> Reply {
        match self.update_document(|doc| {
            doc.append_subtasks(titles.iter().cloned());
            Mutation::Commit(())
        }) {
            Ok((doc, ())) => Reply::Document(doc),
            Err(err) => self.store_failure("appendSubtasks", &err, Reply::error(err.to_string())),
        }
    }

    fn set_subtask_completed(&self, index: usize, completed: bool) -> Reply {
        match self.update_document(|doc| {
            if doc.set_subtask_completed(index, completed) {
                Mutation::Commit(true)
            } else {
                Mutation::Skip(false)
            }
        }) {
            Ok((doc, true)) => Reply::Document(doc),
            Ok((_, false)) => Reply::error(SUBTASK_OUT_OF_RANGE),
            Err(err) => {
                self.store_failure("setSubtaskCompleted", &err, Reply::error(err.to_string()))
            }
        }
    }

    fn fetch_assessment(&self, week_key: &str) -> Reply {
        match self.load_document() {
            Ok((mut doc, _)) => Reply::Week(doc.assessments.remove(week_key)),
            Err(err) => self.store_failure("fetchAssessment", &err, Reply::Week(None)),
        }
    }

    fn append_assessment(
        &self,
        week_key: String,
        day: String,
        assessment: Assessment,
    ) -> Reply {
        match self.update_document(|doc| {
            let updated = doc
                .append_assessment(&week_key, &day, assessment.clone())
                .to_vec();
            Mutation::Commit(updated)
        }) {
            Ok((_, updated)) => {
                let mut slice = AssessmentBook::new();
                slice.insert(week_key, BTreeMap::from([(day, updated)]));
                Reply::AssessmentSlice(slice)
            }
            Err(err) => {
                self.store_failure("appendAssessment", &err, Reply::error(err.to_string()))
            }
        }
    }

    fn clear_goal(&self) -> Reply {
        match self.update_document(|doc| {
            doc.clear_goal();
            Mutation::Commit(())
        }) {
            Ok(_) => Reply::text(REPLY_CLEARED),
            Err(err) => self.store_failure("clearGoal", &err, Reply::error(err.to_string())),
        }
    }

    fn save_quick_notes(&self, notes: String) -> Reply {
        match self.store.set(QUICK_NOTES_KEY, &Value::String(notes)) {
            Ok(_) => Reply::success(),
            Err(err) => self.store_failure("saveQuickNotes", &err, Reply::failure(err.to_string())),
        }
    }

    fn convert_quick_notes(&self, format: &str) -> Reply {
        let notes = match self.store.get(QUICK_NOTES_KEY) {
            Ok(stored) => quick_notes_from_stored(stored.map(|entry| entry.value)),
            Err(err) => {
                return self.store_failure(
                    "convertQuickNotes",
                    &err,
                    Reply::failure(err.to_string()),
                )
            }
        };

        let Some(format) = ExportFormat::parse(format) else {
            warn!(
                "event=quick_notes_export module=broker status=rejected error_code=invalid_format"
            );
            return Reply::error(INVALID_FORMAT);
        };

        let artifact = ExportArtifact::quick_notes(format, &notes);
        match self.downloader.download(&artifact) {
            Ok(_) => {
                info!(
                    "event=quick_notes_export module=broker status=ok format={} bytes={}",
                    format.extension(),
                    artifact.content.len()
                );
                Reply::success()
            }
            Err(err) => {
                error!(
                    "event=quick_notes_export module=broker status=error format={} error={}",
                    format.extension(),
                    err
                );
                Reply::failure(err.to_string())
            }
        }
    }

    /// Runs one read-modify-write cycle against the focus document.
    ///
    /// `mutate` may run more than once under `CompareAndSwap`; it always
    /// sees a freshly loaded document.
    fn update_document<T>(
        &self,
        mut mutate: impl FnMut(&mut FocusDocument) -> Mutation<T>,
    ) -> StoreResult<(FocusDocument, T)> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (mut doc, revision) = self.load_document()?;
            let output = match mutate(&mut doc) {
                Mutation::Skip(output) => return Ok((doc, output)),
                Mutation::Commit(output) => output,
            };
            let value = doc.to_value()?;

            let written = match self.consistency {
                WriteConsistency::LastWriteWins => self.store.set(FOCUS_DATA_KEY, &value),
                WriteConsistency::CompareAndSwap => {
                    self.store.compare_and_set(FOCUS_DATA_KEY, &value, revision)
                }
            };

            match written {
                Ok(_) => return Ok((doc, output)),
                Err(StoreError::RevisionConflict { .. }) if attempt < self.max_write_attempts => {
                    warn!(
                        "event=document_write module=broker status=retry error_code=revision_conflict attempt={attempt}"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn store_failure(&self, action: &'static str, err: &StoreError, reply: Reply) -> Reply {
        error!(
            "event=broker_dispatch module=broker status=error action={action} error={err}"
        );
        reply
    }
}
