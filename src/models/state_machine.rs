// State machine definitions - assembled freely, then frozen by validation

//! # State Machines
//!
//! Construction happens in two phases:
//!
//! 1. [`StateMachineDefinition`] is a plain, mutable serde struct. Read it
//!    from JSON or assemble it in code; states refer to each other by name so
//!    forward references need no special handling.
//! 2. [`StateMachine`] is produced by running the validator over a
//!    definition. It has no public mutators, so every `StateMachine` value in
//!    the program is known to be structurally sound and to reach a terminal
//!    state.
//!
//! ## Rust Learning Notes:
//!
//! ### TryFrom for Validated Conversions
//! `impl TryFrom<StateMachineDefinition> for StateMachine` makes the
//! validation step the *only* way to obtain a `StateMachine`, and lets callers
//! write `StateMachine::try_from(definition)?`.

use std::collections::BTreeMap;
use std::convert::TryFrom;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::state::{Branch, State};
use crate::config::ValidationConfig;
use crate::engine::validator::Validator;
use crate::{Result, StatesLanguageError};

/// Anything with a `StartAt` and a `States` table
///
/// Implemented by the top-level definition and by the nested graphs of
/// Parallel branches and Map iterators, so the validator walks both the same
/// way.
pub trait StateGraph {
    fn start_at(&self) -> &str;

    fn states(&self) -> &BTreeMap<String, State>;

    fn state(&self, name: &str) -> Option<&State> {
        self.states().get(name)
    }
}

impl StateGraph for Branch {
    fn start_at(&self) -> &str {
        &self.start_at
    }

    fn states(&self) -> &BTreeMap<String, State> {
        &self.states
    }
}

/// The unvalidated, freely editable form of a state machine
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateMachineDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default)]
    pub start_at: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i64>,

    #[serde(default)]
    pub states: BTreeMap<String, State>,
}

impl StateMachineDefinition {
    pub fn new<S: Into<String>>(start_at: S) -> Self {
        StateMachineDefinition {
            start_at: start_at.into(),
            ..Default::default()
        }
    }

    pub fn with_comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_state<S: Into<String>>(mut self, name: S, state: State) -> Self {
        self.states.insert(name.into(), state);
        self
    }

    /// Parse ASL JSON without validating it
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl StateGraph for StateMachineDefinition {
    fn start_at(&self) -> &str {
        &self.start_at
    }

    fn states(&self) -> &BTreeMap<String, State> {
        &self.states
    }
}

/// A validated, immutable state machine
///
/// ```rust
/// use serde_json::json;
/// use states_language::StateMachine;
///
/// let machine = StateMachine::from_json_str(r#"{
///     "StartAt": "Hello",
///     "States": {
///         "Hello": {"Type": "Pass", "Next": "Done"},
///         "Done": {"Type": "Succeed"}
///     }
/// }"#).unwrap();
/// assert_eq!(machine.start_at(), "Hello");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StateMachine {
    definition: StateMachineDefinition,
}

impl StateMachine {
    /// Parse and validate ASL JSON with the default validation settings
    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::try_from(StateMachineDefinition::from_json_str(json)?)
    }

    /// Validate a definition with explicit settings
    pub fn from_definition_with(
        definition: StateMachineDefinition,
        config: &ValidationConfig,
    ) -> Result<Self> {
        Validator::new(config.clone()).validate(&definition)?;
        Ok(StateMachine { definition })
    }

    pub fn start_at(&self) -> &str {
        &self.definition.start_at
    }

    pub fn states(&self) -> &BTreeMap<String, State> {
        &self.definition.states
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.definition.states.get(name)
    }

    pub fn comment(&self) -> Option<&str> {
        self.definition.comment.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.definition.version.as_deref()
    }

    pub fn timeout_seconds(&self) -> Option<i64> {
        self.definition.timeout_seconds
    }

    pub fn definition(&self) -> &StateMachineDefinition {
        &self.definition
    }

    /// Give the definition back for editing; it must be re-validated
    pub fn into_definition(self) -> StateMachineDefinition {
        self.definition
    }

    /// Evaluate the Choice state `state_name` against `input`
    ///
    /// `Ok(None)` means no rule matched and the state has no `Default`.
    pub fn choose(&self, state_name: &str, input: &Value) -> Result<Option<&str>> {
        match self.state(state_name) {
            Some(State::Choice(choice)) => Ok(choice.choose(input)),
            Some(other) => Err(StatesLanguageError::InvalidDefinition(format!(
                "state '{}' is a {} state, not a Choice state",
                state_name,
                other.type_name()
            ))),
            None => Err(StatesLanguageError::InvalidDefinition(format!(
                "state '{}' does not exist",
                state_name
            ))),
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(&self.definition)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.definition)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.definition)?)
    }
}

impl StateGraph for StateMachine {
    fn start_at(&self) -> &str {
        StateMachine::start_at(self)
    }

    fn states(&self) -> &BTreeMap<String, State> {
        StateMachine::states(self)
    }
}

impl TryFrom<StateMachineDefinition> for StateMachine {
    type Error = StatesLanguageError;

    fn try_from(definition: StateMachineDefinition) -> Result<Self> {
        Self::from_definition_with(definition, &ValidationConfig::default())
    }
}
