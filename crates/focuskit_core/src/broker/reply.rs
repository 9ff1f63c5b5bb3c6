//! Reply shapes produced by the broker.
//!
//! Each action owns its reply shape; there is no shared envelope.

use crate::model::focus::{AssessmentBook, DayAssessments, FocusDocument, GoalsView};
use serde::Serialize;
use serde_json::Value;

pub const REPLY_ONBOARDING: &str = "onboarding";
pub const REPLY_RETURNING: &str = "returning";
pub const REPLY_CLEARED: &str = "cleared";
pub const INVALID_FORMAT: &str = "Invalid format";
pub const SUBTASK_OUT_OF_RANGE: &str = "Subtask index out of range";

/// One broker reply, serialized without a wrapper.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    /// Bare string (`"onboarding"`, `"cleared"`, or a raw failure message).
    Text(String),
    Document(FocusDocument),
    Goals(GoalsView),
    /// One week of assessments, or `null`.
    Week(Option<DayAssessments>),
    /// `{ weekKey: { day: [...] } }` slice after an append.
    AssessmentSlice(AssessmentBook),
    Status(StatusReply),
    Error(ErrorReply),
    Farewell(FarewellReply),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReply {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FarewellReply {
    pub farewell: String,
}

impl Reply {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// `{ error: message }`
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorReply {
            error: message.into(),
        })
    }

    /// `{ success: true }`
    pub fn success() -> Self {
        Self::Status(StatusReply {
            success: true,
            error: None,
        })
    }

    /// `{ success: false, error: message }`
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Status(StatusReply {
            success: false,
            error: Some(message.into()),
        })
    }

    pub fn farewell() -> Self {
        Self::Farewell(FarewellReply {
            farewell: "goodbye".to_string(),
        })
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::Reply;
    use serde_json::json;

    #[test]
    fn status_replies_omit_error_on_success() {
        assert_eq!(
            Reply::success().to_value().expect("serialize"),
            json!({ "success": true })
        );
        assert_eq!(
            Reply::failure("boom").to_value().expect("serialize"),
            json!({ "success": false, "error": "boom" })
        );
    }

    #[test]
    fn empty_week_serializes_as_null() {
        assert_eq!(Reply::Week(None).to_value().expect("serialize"), json!(null));
    }
}
