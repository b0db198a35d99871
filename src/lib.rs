// States Language - Rust Edition
// Parse, validate and evaluate Amazon States Language state machine definitions

//! # States Language Library
//!
//! This is the library root for working with Amazon States Language (ASL)
//! documents. It ties together the four pieces a workflow service needs before
//! it can run a definition:
//!
//! ## Core Components
//!
//! ### Domain Models
//! - [`ReferencePath`]: the single-node JSONPath subset used by ASL fields
//! - [`IntrinsicFunction`]: parsed `States.*` expressions
//! - [`Condition`] / [`ChoiceRule`]: the predicates of a Choice state
//! - [`State`] / [`StateMachineDefinition`] / [`StateMachine`]: the state graph
//!
//! ### Engine
//!
//! #### [`IntrinsicFunctionRegistry`] - Intrinsic Function Evaluation
//!
//! Maps function names to handlers. Comes pre-loaded with the standard
//! `States.*` library and accepts custom functions:
//!
//! ```rust
//! use serde_json::json;
//! use states_language::{IntrinsicFunction, IntrinsicFunctionRegistry};
//!
//! let registry = IntrinsicFunctionRegistry::with_builtins();
//! let function = IntrinsicFunction::parse("States.Format('hello {}', $.name)").unwrap();
//! let value = registry.call(&function, &json!({"name": "world"}), &json!({})).unwrap();
//! assert_eq!(value, json!("hello world"));
//! ```
//!
//! #### [`Validator`] - State Graph Validation
//!
//! Runs a structural pass over every state (collecting all problems) followed
//! by a reachability pass that proves a terminal state can be reached.
//! [`StateMachine`] can only be built from a definition that passes both.
//!
//! ## Rust Learning Notes:
//!
//! ### Module System
//! `pub mod` declarations pull in `models/`, `engine/` and `config.rs`. The
//! `pub use` re-exports below give callers a flat API, so
//! `states_language::StateMachine` works without knowing the module layout.

// Domain types: paths, intrinsic expressions, conditions, states
pub mod models;

// Intrinsic evaluation, payload templates and graph validation
pub mod engine;

// Layered configuration (defaults, file, environment)
pub mod config;

pub use models::{
    is_valid_json_path, select_token, Branch, Catcher, ChoiceRule, ChoiceState,
    ComparisonOperator, Condition, ExpectedValue, FailState, IntrinsicFunction, IntrinsicParam,
    MapState, OptionalString, ParallelState, PassState, PathToken, ReferencePath, Retrier, State,
    StateMachine, StateMachineDefinition, SucceedState, TaskState, TypeTest, ValueKind, WaitState,
};

pub use engine::{
    intrinsics::{evaluate_expression, CallContext, IntrinsicFunctionRegistry, IntrinsicHandler},
    payload::render_payload,
    validator::{validate, ValidationContext, ValidationException, ValidationProblem, Validator},
};

pub use config::{AslConfig, IntrinsicConfig, LoggingConfig, ValidationConfig};

use thiserror::Error;

/// Error type for every fallible library operation
///
/// ## Rust Learning Notes:
///
/// ### The `thiserror` Crate
/// `#[derive(Error)]` implements `std::error::Error`, `#[error("...")]`
/// provides the `Display` text and `#[from]` generates the `From` impl used by
/// the `?` operator.
#[derive(Error, Debug)]
pub enum StatesLanguageError {
    /// A reference path failed to parse
    #[error("Invalid reference path '{path}': {reason}")]
    InvalidReferencePath { path: String, reason: String },

    /// An intrinsic expression failed to parse, or a call broke a function's
    /// arity or type contract
    #[error("Invalid intrinsic function '{function}': {reason}")]
    InvalidIntrinsicFunction { function: String, reason: String },

    /// No handler is registered under this name
    #[error("Unknown intrinsic function: {name}")]
    UnknownIntrinsicFunction { name: String },

    /// The definition has one or more structural or reachability problems
    #[error(transparent)]
    Validation(#[from] ValidationException),

    /// A definition could not be interpreted at all (e.g. unknown state name)
    #[error("Invalid state machine definition: {0}")]
    InvalidDefinition(String),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StatesLanguageError {
    /// Shorthand used by intrinsic handlers
    pub(crate) fn intrinsic(function: impl Into<String>, reason: impl Into<String>) -> Self {
        StatesLanguageError::InvalidIntrinsicFunction {
            function: function.into(),
            reason: reason.into(),
        }
    }
}

/// Type alias for Results that use the crate error type
pub type Result<T> = std::result::Result<T, StatesLanguageError>;
