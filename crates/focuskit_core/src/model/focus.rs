//! Focus document: goal, subtasks and weekly self-assessments.
//!
//! # Invariants
//! - `CurrentGoal::subtasks` is created empty on first append.
//! - `assessments[week][day]` is created empty on first append for that pair.
//! - Subtasks are created with `completed=false` and `studynotes=null`;
//!   `completed` is the only field ever mutated in place.
//! - Keys this module does not model are kept at every nesting level.
//! - Wrongly typed scalars (`name: null`, `completed: "yes"`) read as their
//!   defaults instead of failing the whole document.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Storage key holding the serialized [`FocusDocument`].
pub const FOCUS_DATA_KEY: &str = "focusData";
/// Storage key holding the free-form quick notes string.
pub const QUICK_NOTES_KEY: &str = "quickNotes";

/// Assessments of one week, keyed by day-of-week.
pub type DayAssessments = BTreeMap<String, Vec<Assessment>>;
/// All assessments, keyed by week-key.
pub type AssessmentBook = BTreeMap<String, DayAssessments>;

/// One checklist entry under the active goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub completed: bool,
    /// Read-only for the broker; rendered by the notes surface.
    #[serde(default, deserialize_with = "lenient_optional_string")]
    pub studynotes: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Subtask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            completed: false,
            studynotes: None,
            extra: Map::new(),
        }
    }
}

/// Caller-shaped self-assessment (`{ rating, reflection }` by convention).
///
/// Stored verbatim; the broker only appends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Assessment(pub Value);

/// Active goal slot.
///
/// Both fields are optional so that `{}` (cleared) and `{ subtasks: [] }`
/// (freshly onboarded) stay distinguishable on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentGoal {
    #[serde(
        default,
        deserialize_with = "lenient_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub subtasks: Option<Vec<Subtask>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CurrentGoal {
    /// Goal slot written by onboarding: no name, empty checklist.
    pub fn onboarding() -> Self {
        Self {
            name: None,
            subtasks: Some(Vec::new()),
            extra: Map::new(),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            subtasks: None,
            extra: Map::new(),
        }
    }

    /// Returns whether the slot is `{}`, counting keys this type does not
    /// model.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.subtasks.is_none() && self.extra.is_empty()
    }

    /// Returns the checklist, creating it empty when missing.
    pub fn subtasks_mut(&mut self) -> &mut Vec<Subtask> {
        self.subtasks.get_or_insert_with(Vec::new)
    }
}

/// Read model returned by `fetchGoals`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalsView {
    pub goal: String,
    pub subtasks: Vec<Subtask>,
}

/// Root document persisted under [`FOCUS_DATA_KEY`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusDocument {
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_goal: CurrentGoal,
    #[serde(default, deserialize_with = "null_as_default")]
    pub assessments: AssessmentBook,
    /// Fields this version does not model, carried through writes.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FocusDocument {
    /// Rehydrates a stored value, defaulting every missing field.
    ///
    /// An absent or `null` value yields an empty document.
    pub fn from_stored(value: Option<Value>) -> Result<Self, serde_json::Error> {
        match value {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(value) => serde_json::from_value(value),
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Resets the goal slot for onboarding, keeping assessments.
    pub fn begin_onboarding(&mut self) {
        self.current_goal = CurrentGoal::onboarding();
    }

    /// Replaces the active goal, discarding its subtasks.
    pub fn replace_goal(&mut self, name: impl Into<String>) {
        self.current_goal = CurrentGoal::named(name);
    }

    pub fn clear_goal(&mut self) {
        self.current_goal = CurrentGoal::default();
    }

    /// Appends one fresh subtask per title, preserving existing order.
    pub fn append_subtasks<I, T>(&mut self, titles: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.current_goal
            .subtasks_mut()
            .extend(titles.into_iter().map(Subtask::new));
    }

    /// Sets `completed` on the subtask at `index`.
    ///
    /// Returns `false` without touching the document when `index` is out of
    /// range.
    pub fn set_subtask_completed(&mut self, index: usize, completed: bool) -> bool {
        let Some(subtask) = self
            .current_goal
            .subtasks
            .as_mut()
            .and_then(|subtasks| subtasks.get_mut(index))
        else {
            return false;
        };
        subtask.completed = completed;
        true
    }

    /// Appends one assessment and returns the updated day sequence.
    pub fn append_assessment(
        &mut self,
        week_key: &str,
        day: &str,
        assessment: Assessment,
    ) -> &[Assessment] {
        let entries = self
            .assessments
            .entry(week_key.to_string())
            .or_default()
            .entry(day.to_string())
            .or_default();
        entries.push(assessment);
        entries
    }

    pub fn week_assessments(&self, week_key: &str) -> Option<&DayAssessments> {
        self.assessments.get(week_key)
    }

    pub fn goals_view(&self) -> GoalsView {
        GoalsView {
            goal: self.current_goal.name.clone().unwrap_or_default(),
            subtasks: self.current_goal.subtasks.clone().unwrap_or_default(),
        }
    }
}

/// Decodes the stored quick-notes value.
///
/// Absent or `null` reads as empty; non-string values keep their JSON text.
pub fn quick_notes_from_stored(value: Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(notes)) => notes,
        Some(other) => other.to_string(),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(value) => Ok(Some(value)),
        _ => Ok(None),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_optional_string(deserializer)?.unwrap_or_default())
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?.as_bool().unwrap_or_default())
}
