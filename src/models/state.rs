// States - the nodes of an ASL state graph
//
// ## State Graph Overview
//
// A state machine is a set of **named states** connected by **transitions**:
//
// ```
//     [Validate] --Next--> [Route] --Choices--> [Approve] --End
//                             |
//                             +--Default--> [Reject] (Fail)
// ```
//
// - Transitions always refer to states **by name** inside the same scope
// - Parallel branches and Map iterators own their own nested scope
// - Terminal states are `Succeed`, `Fail` and any state with `End: true`
//
// The structs here mirror the ASL JSON field names one-to-one so that a
// definition read from disk serializes back to the same document.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::condition::ChoiceRule;

/// The three-valued string used by `InputPath`, `OutputPath` and `ResultPath`
///
/// ASL gives "field absent" and `"InputPath": null` different meanings, so a
/// plain `Option<String>` is not enough.
///
/// ## Rust Learning Notes:
///
/// ### Custom Serde + `#[serde(default)]`
/// A missing field never reaches `Deserialize`; `#[serde(default)]` fills it
/// with [`OptionalString::Unset`]. A present field is read as an
/// `Option<String>`, so an explicit `null` becomes [`OptionalString::Null`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum OptionalString {
    #[default]
    Unset,
    Null,
    Value(String),
}

impl OptionalString {
    pub fn is_unset(&self) -> bool {
        matches!(self, OptionalString::Unset)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, OptionalString::Null)
    }

    /// The string, if one was given
    pub fn as_deref(&self) -> Option<&str> {
        match self {
            OptionalString::Value(value) => Some(value),
            OptionalString::Unset | OptionalString::Null => None,
        }
    }
}

impl From<&str> for OptionalString {
    fn from(value: &str) -> Self {
        OptionalString::Value(value.to_string())
    }
}

impl From<Option<String>> for OptionalString {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(value) => OptionalString::Value(value),
            None => OptionalString::Null,
        }
    }
}

impl Serialize for OptionalString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            OptionalString::Value(value) => serializer.serialize_str(value),
            OptionalString::Unset | OptionalString::Null => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for OptionalString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<String>::deserialize(deserializer).map(OptionalString::from)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// An entry of a `Retry` list
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Retrier {
    #[serde(default)]
    pub error_equals: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_rate: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Retrier {
    pub fn new<S: Into<String>>(errors: impl IntoIterator<Item = S>) -> Self {
        Retrier {
            error_equals: errors.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

/// An entry of a `Catch` list
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Catcher {
    #[serde(default)]
    pub error_equals: Vec<String>,

    #[serde(default)]
    pub next: String,

    #[serde(default, skip_serializing_if = "OptionalString::is_unset")]
    pub result_path: OptionalString,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Catcher {
    pub fn new<S: Into<String>, N: Into<String>>(errors: impl IntoIterator<Item = S>, next: N) -> Self {
        Catcher {
            error_equals: errors.into_iter().map(Into::into).collect(),
            next: next.into(),
            ..Default::default()
        }
    }
}

/// A nested `{StartAt, States}` graph owned by a Parallel or Map state
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Branch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default)]
    pub start_at: String,

    #[serde(default)]
    pub states: BTreeMap<String, State>,
}

impl Branch {
    pub fn new<S: Into<String>>(start_at: S) -> Self {
        Branch {
            start_at: start_at.into(),
            ..Default::default()
        }
    }

    pub fn with_state<S: Into<String>>(mut self, name: S, state: State) -> Self {
        self.states.insert(name.into(), state);
        self
    }
}

/// Invoke work identified by `Resource`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default)]
    pub resource: String,

    #[serde(default, skip_serializing_if = "OptionalString::is_unset")]
    pub input_path: OptionalString,

    #[serde(default, skip_serializing_if = "OptionalString::is_unset")]
    pub output_path: OptionalString,

    #[serde(default, skip_serializing_if = "OptionalString::is_unset")]
    pub result_path: OptionalString,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_selector: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_seconds: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_seconds_path: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry: Vec<Retrier>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catch: Vec<Catcher>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub end: bool,
}

/// Pass input to output, optionally injecting `Result`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PassState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default, skip_serializing_if = "OptionalString::is_unset")]
    pub input_path: OptionalString,

    #[serde(default, skip_serializing_if = "OptionalString::is_unset")]
    pub output_path: OptionalString,

    #[serde(default, skip_serializing_if = "OptionalString::is_unset")]
    pub result_path: OptionalString,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub end: bool,
}

/// Branch on the first matching [`ChoiceRule`]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChoiceState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default, skip_serializing_if = "OptionalString::is_unset")]
    pub input_path: OptionalString,

    #[serde(default, skip_serializing_if = "OptionalString::is_unset")]
    pub output_path: OptionalString,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<ChoiceRule>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl ChoiceState {
    /// Name of the next state for this input: the first matching rule's
    /// `Next`, else `Default`
    ///
    /// `None` means no rule matched and there is no default, which ASL
    /// reports at run time as `States.NoChoiceMatched`.
    pub fn choose(&self, input: &Value) -> Option<&str> {
        self.choices
            .iter()
            .find(|rule| rule.matches(input))
            .map(|rule| rule.next.as_str())
            .or(self.default.as_deref())
    }
}

/// Delay for a fixed time or until a timestamp
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WaitState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default, skip_serializing_if = "OptionalString::is_unset")]
    pub input_path: OptionalString,

    #[serde(default, skip_serializing_if = "OptionalString::is_unset")]
    pub output_path: OptionalString,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub end: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SucceedState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default, skip_serializing_if = "OptionalString::is_unset")]
    pub input_path: OptionalString,

    #[serde(default, skip_serializing_if = "OptionalString::is_unset")]
    pub output_path: OptionalString,
}

/// Stop the execution with an error and cause
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FailState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause_path: Option<String>,
}

/// Run every branch against the same input
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParallelState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default, skip_serializing_if = "OptionalString::is_unset")]
    pub input_path: OptionalString,

    #[serde(default, skip_serializing_if = "OptionalString::is_unset")]
    pub output_path: OptionalString,

    #[serde(default, skip_serializing_if = "OptionalString::is_unset")]
    pub result_path: OptionalString,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_selector: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<Branch>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry: Vec<Retrier>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catch: Vec<Catcher>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub end: bool,
}

/// Run the iterator graph once per item of `ItemsPath`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MapState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default, skip_serializing_if = "OptionalString::is_unset")]
    pub input_path: OptionalString,

    #[serde(default, skip_serializing_if = "OptionalString::is_unset")]
    pub output_path: OptionalString,

    #[serde(default, skip_serializing_if = "OptionalString::is_unset")]
    pub result_path: OptionalString,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_selector: Option<Value>,

    #[serde(default, alias = "ItemProcessor", skip_serializing_if = "Option::is_none")]
    pub iterator: Option<Branch>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry: Vec<Retrier>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catch: Vec<Catcher>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub end: bool,
}

/// One node of a state graph, tagged by its ASL `Type`
///
/// ## Rust Learning Notes:
///
/// ### Internally Tagged Enums
/// `#[serde(tag = "Type")]` reads the `Type` field to pick the variant and
/// then deserializes the *same* object into the variant's struct, which is
/// exactly the shape of ASL JSON: `{"Type": "Pass", "Next": "B"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub enum State {
    Task(TaskState),
    Pass(PassState),
    Choice(ChoiceState),
    Wait(WaitState),
    Succeed(SucceedState),
    Fail(FailState),
    Parallel(ParallelState),
    Map(MapState),
}

impl State {
    /// The ASL `Type` name
    pub fn type_name(&self) -> &'static str {
        match self {
            State::Task(_) => "Task",
            State::Pass(_) => "Pass",
            State::Choice(_) => "Choice",
            State::Wait(_) => "Wait",
            State::Succeed(_) => "Succeed",
            State::Fail(_) => "Fail",
            State::Parallel(_) => "Parallel",
            State::Map(_) => "Map",
        }
    }

    pub fn comment(&self) -> Option<&str> {
        match self {
            State::Task(state) => state.comment.as_deref(),
            State::Pass(state) => state.comment.as_deref(),
            State::Choice(state) => state.comment.as_deref(),
            State::Wait(state) => state.comment.as_deref(),
            State::Succeed(state) => state.comment.as_deref(),
            State::Fail(state) => state.comment.as_deref(),
            State::Parallel(state) => state.comment.as_deref(),
            State::Map(state) => state.comment.as_deref(),
        }
    }

    /// `Next` of states that have a single outgoing transition
    pub fn next(&self) -> Option<&str> {
        match self {
            State::Task(state) => state.next.as_deref(),
            State::Pass(state) => state.next.as_deref(),
            State::Wait(state) => state.next.as_deref(),
            State::Parallel(state) => state.next.as_deref(),
            State::Map(state) => state.next.as_deref(),
            State::Choice(_) | State::Succeed(_) | State::Fail(_) => None,
        }
    }

    /// `End: true` on a state that supports it
    pub fn is_end(&self) -> bool {
        match self {
            State::Task(state) => state.end,
            State::Pass(state) => state.end,
            State::Wait(state) => state.end,
            State::Parallel(state) => state.end,
            State::Map(state) => state.end,
            State::Choice(_) | State::Succeed(_) | State::Fail(_) => false,
        }
    }

    /// Succeed, Fail, or any state with `End: true`
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Succeed(_) | State::Fail(_)) || self.is_end()
    }

    pub fn retriers(&self) -> &[Retrier] {
        match self {
            State::Task(state) => &state.retry,
            State::Parallel(state) => &state.retry,
            State::Map(state) => &state.retry,
            _ => &[],
        }
    }

    pub fn catchers(&self) -> &[Catcher] {
        match self {
            State::Task(state) => &state.catch,
            State::Parallel(state) => &state.catch,
            State::Map(state) => &state.catch,
            _ => &[],
        }
    }

    /// Every state name this state can transition to, in declaration order
    pub fn transitions(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = Vec::new();
        if let State::Choice(choice) = self {
            targets.extend(choice.choices.iter().map(|rule| rule.next.as_str()));
            targets.extend(choice.default.as_deref());
        }
        targets.extend(self.next());
        targets.extend(self.catchers().iter().map(|catcher| catcher.next.as_str()));
        targets
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.comment() {
            Some(comment) => write!(f, "{} ({})", self.type_name(), comment),
            None => write!(f, "{}", self.type_name()),
        }
    }
}
