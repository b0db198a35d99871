// Core domain models for ASL state machines
// Plain data structures plus the parsers that build them

//! # Domain Models Module
//!
//! This module contains the data structures that describe an Amazon States
//! Language document: paths, intrinsic function expressions, choice
//! conditions, states and the state machine that owns them.
//!
//! Nothing in here evaluates a workflow; the engine layer
//! ([`crate::engine`]) builds on these types.
//!
//! ## Rust Learning Notes:
//!
//! ### Re-exports for Clean APIs
//! The `pub use` statements at the bottom create a flat API. Users can import
//! `use states_language::models::Condition` instead of
//! `use states_language::models::condition::Condition`.

// Reference paths (`$.a.b[0]`) and the lenient JSONPath check
pub mod path;

// `States.*` intrinsic function expressions and their parser
pub mod intrinsic;

// Choice rule conditions and their ASL JSON form
pub mod condition;

// State variants, retriers, catchers and nested branches
pub mod state;

// Definitions and validated state machines
pub mod state_machine;

pub use path::{is_valid_json_path, select_token, PathToken, ReferencePath};

pub use intrinsic::{IntrinsicFunction, IntrinsicParam, DEFAULT_MAX_NESTING_DEPTH};

pub use condition::{ChoiceRule, ComparisonOperator, Condition, ExpectedValue, TypeTest, ValueKind};

pub use state::{
    Branch, Catcher, ChoiceState, FailState, MapState, OptionalString, ParallelState, PassState,
    Retrier, State, SucceedState, TaskState, WaitState,
};

pub use state_machine::{StateGraph, StateMachine, StateMachineDefinition};
