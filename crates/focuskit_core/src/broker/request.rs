//! Boundary parsing of raw JSON requests into typed actions.
//!
//! # Invariants
//! - Requests without a recognized `action` never become a `Request`.
//! - Payload shape errors are reported before any storage access.

use crate::model::focus::Assessment;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Number, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One typed request accepted by the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// `{ greeting: "hello" }` connectivity handshake.
    Hello,
    Startup,
    FetchGoals,
    AppendCurrentGoal {
        name: String,
    },
    AppendSubtasks {
        titles: Vec<String>,
    },
    SetSubtaskCompleted {
        index: usize,
        completed: bool,
    },
    FetchAssessment {
        week_key: String,
    },
    AppendAssessment {
        week_key: String,
        day: String,
        assessment: Assessment,
    },
    ClearGoal,
    SaveQuickNotes {
        notes: String,
    },
    /// `format` is validated by the handler so it can answer "Invalid format".
    /// A missing or non-string `format` parses as empty.
    ConvertQuickNotes {
        format: String,
    },
}

impl Request {
    /// Parses one raw request object.
    ///
    /// # Errors
    /// - `Unrecognized` when `action` is missing, not a string or unknown.
    /// - `Malformed` when a known action carries an unusable payload.
    pub fn parse(raw: &Value) -> Result<Self, RequestError> {
        if raw.get("greeting").and_then(Value::as_str) == Some("hello") {
            return Ok(Self::Hello);
        }

        let Some(action) = raw.get("action").and_then(Value::as_str) else {
            return Err(RequestError::Unrecognized(None));
        };

        match action {
            "startup" => Ok(Self::Startup),
            "fetchGoals" => Ok(Self::FetchGoals),
            "clearGoal" => Ok(Self::ClearGoal),
            "appendCurrentGoal" => {
                let payload: DataPayload<String> = payload(action, raw)?;
                Ok(Self::AppendCurrentGoal { name: payload.data })
            }
            "appendSubtasks" => {
                let payload: DataPayload<Vec<String>> = payload(action, raw)?;
                Ok(Self::AppendSubtasks {
                    titles: payload.data,
                })
            }
            "setSubtaskCompleted" => {
                let payload: SubtaskCompletedPayload = payload(action, raw)?;
                Ok(Self::SetSubtaskCompleted {
                    index: payload.index,
                    completed: payload.completed,
                })
            }
            "fetchAssessment" => {
                let payload: FetchAssessmentPayload = payload(action, raw)?;
                Ok(Self::FetchAssessment {
                    week_key: payload.sunday,
                })
            }
            "appendAssessment" => {
                let payload: AppendAssessmentPayload = payload(action, raw)?;
                Ok(Self::AppendAssessment {
                    week_key: payload.week_key,
                    day: payload.day_of_week.into_key(),
                    assessment: payload.assessment,
                })
            }
            "saveQuickNotes" => {
                let payload: SaveQuickNotesPayload = payload(action, raw)?;
                Ok(Self::SaveQuickNotes {
                    notes: payload.notes,
                })
            }
            "convertQuickNotes" => {
                let payload: ConvertQuickNotesPayload = payload(action, raw)?;
                let format = match payload.format {
                    Value::String(format) => format,
                    _ => String::new(),
                };
                Ok(Self::ConvertQuickNotes { format })
            }
            other => Err(RequestError::Unrecognized(Some(other.to_string()))),
        }
    }

    /// Stable action label used in logs.
    pub fn action_name(&self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::Startup => "startup",
            Self::FetchGoals => "fetchGoals",
            Self::AppendCurrentGoal { .. } => "appendCurrentGoal",
            Self::AppendSubtasks { .. } => "appendSubtasks",
            Self::SetSubtaskCompleted { .. } => "setSubtaskCompleted",
            Self::FetchAssessment { .. } => "fetchAssessment",
            Self::AppendAssessment { .. } => "appendAssessment",
            Self::ClearGoal => "clearGoal",
            Self::SaveQuickNotes { .. } => "saveQuickNotes",
            Self::ConvertQuickNotes { .. } => "convertQuickNotes",
        }
    }
}

/// Boundary parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// No reply is produced for these.
    Unrecognized(Option<String>),
    Malformed { action: String, detail: String },
}

impl Display for RequestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unrecognized(Some(action)) => write!(f, "unrecognized action `{action}`"),
            Self::Unrecognized(None) => write!(f, "request has no action"),
            Self::Malformed { action, detail } => {
                write!(f, "Malformed request: {action}: {detail}")
            }
        }
    }
}

impl Error for RequestError {}

#[derive(Deserialize)]
struct DataPayload<T> {
    data: T,
}

#[derive(Deserialize)]
struct SubtaskCompletedPayload {
    index: usize,
    completed: bool,
}

#[derive(Deserialize)]
struct FetchAssessmentPayload {
    sunday: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendAssessmentPayload {
    week_key: String,
    day_of_week: DayKey,
    assessment: Assessment,
}

#[derive(Deserialize)]
struct SaveQuickNotesPayload {
    notes: String,
}

#[derive(Deserialize)]
struct ConvertQuickNotesPayload {
    #[serde(default)]
    format: Value,
}

/// Day-of-week arrives as a name (`"Mon"`) or an index (`1`).
#[derive(Deserialize)]
#[serde(untagged)]
enum DayKey {
    Name(String),
    Index(Number),
}

impl DayKey {
    fn into_key(self) -> String {
        match self {
            Self::Name(name) => name,
            Self::Index(index) => index.to_string(),
        }
    }
}

fn payload<T: DeserializeOwned>(action: &str, raw: &Value) -> Result<T, RequestError> {
    T::deserialize(raw).map_err(|err| RequestError::Malformed {
        action: action.to_string(),
        detail: err.to_string(),
    })
}
