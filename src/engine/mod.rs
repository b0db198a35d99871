// States language engine
// Evaluation and validation built on top of the domain models

//! # Engine Module
//!
//! The engine is the layer between the domain models (in `models/`) and the
//! outside world. Models describe *what* a document says; the engine decides
//! whether it is valid and computes values from it.
//!
//! ## Engine Components
//!
//! ### Intrinsic Functions (`intrinsics` module)
//! - `IntrinsicFunctionRegistry` maps `States.*` names to handlers
//! - Parameters are resolved against an input and a context document
//! - Custom functions can be registered next to the built-ins
//!
//! ### Payload Templates (`payload` module)
//! - Renders `Parameters` / `ResultSelector` templates with `.$` keys
//!
//! ### Validator (`validator` module)
//! - Structural checks per state type, collected into one exception
//! - Terminal reachability over the whole graph and every nested branch
//!
//! ## Rust Learning Notes:
//!
//! ### Module Organization Pattern
//! 1. Create a directory with the module name (`engine/`)
//! 2. Add a `mod.rs` file as the module root
//! 3. Declare submodules in `mod.rs`
//! 4. Re-export important types for a clean API

/// Intrinsic function registry and built-in `States.*` functions
pub mod intrinsics;

/// `.$` payload template rendering
pub mod payload;

/// State graph validation
pub mod validator;

pub use intrinsics::{evaluate_expression, CallContext, IntrinsicFunctionRegistry, IntrinsicHandler};

pub use payload::render_payload;

pub use validator::{validate, ValidationContext, ValidationException, ValidationProblem, Validator};
