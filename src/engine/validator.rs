// State graph validation - structural checks followed by terminal reachability

//! # State Graph Validator
//!
//! Validation runs in two passes:
//!
//! 1. **Structural**: every state is checked against the rules for its type.
//!    Problems are *collected*, not returned early, so a user sees every
//!    defect of a definition at once. Each problem carries a context path
//!    such as `State[Route].Choice[1]`.
//! 2. **Reachability**: only when the structural pass is clean. A depth-first
//!    walk from `StartAt` must find at least one path to a terminal state
//!    (`Succeed`, `Fail`, or `End: true`). Parallel branches and Map iterators
//!    are checked the same way as independent graphs.
//!
//! ## Rust Learning Notes:
//!
//! ### Exhaustive Matching as a Visitor
//! `check_state` matches on every [`State`] variant. Adding a new state type
//! makes the match non-exhaustive and the compiler points at the exact place
//! that needs a new rule.
//!
//! ### Generic Graph Walking
//! Both the top-level definition and nested branches implement
//! [`StateGraph`], so `check_graph::<G>` handles every level of nesting with
//! one function.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use super::payload::template_problems;
use crate::config::ValidationConfig;
use crate::models::condition::{parse_timestamp, ChoiceRule, ComparisonOperator, Condition};
use crate::models::intrinsic::IntrinsicFunction;
use crate::models::path::{is_valid_json_path, ReferencePath};
use crate::models::state::{Catcher, OptionalString, Retrier, State};
use crate::models::state_machine::{StateGraph, StateMachineDefinition};

/// The error code that matches every error
pub const ERROR_WILDCARD: &str = "States.ALL";

const NO_TERMINAL_PATH: &str = "No path to a terminal state exists.";

/// One defect found while validating
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationProblem {
    /// Where the problem is, e.g. `State[Foo].Retry[0]`
    pub context: String,
    pub message: String,
}

impl fmt::Display for ValidationProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.message)
    }
}

/// Every problem found in one validation run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct ValidationException {
    problems: Vec<ValidationProblem>,
}

impl ValidationException {
    pub fn new(problems: Vec<ValidationProblem>) -> Self {
        Self { problems }
    }

    pub fn problems(&self) -> &[ValidationProblem] {
        &self.problems
    }

    pub fn into_problems(self) -> Vec<ValidationProblem> {
        self.problems
    }
}

impl fmt::Display for ValidationException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "State machine validation failed with {} problem(s):",
            self.problems.len()
        )?;
        for problem in &self.problems {
            write!(f, "\n  - {}", problem)?;
        }
        Ok(())
    }
}

/// Location inside a definition, rendered as dot-separated segments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationContext {
    segments: Vec<String>,
}

impl ValidationContext {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn state(&self, name: &str) -> Self {
        self.child(format!("State[{}]", name))
    }

    pub fn indexed(&self, kind: &str, index: usize) -> Self {
        self.child(format!("{}[{}]", kind, index))
    }
}

impl fmt::Display for ValidationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            write!(f, "StateMachine")
        } else {
            write!(f, "{}", self.segments.join("."))
        }
    }
}

/// Validate with the default settings
pub fn validate(definition: &StateMachineDefinition) -> Result<(), ValidationException> {
    Validator::default().validate(definition)
}

/// Runs both validation passes with a given [`ValidationConfig`]
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn validate(&self, definition: &StateMachineDefinition) -> Result<(), ValidationException> {
        debug!(
            "Validating state machine with {} top-level states",
            definition.states.len()
        );

        let mut run = ValidationRun {
            config: &self.config,
            problems: Vec::new(),
        };
        let root = ValidationContext::root();

        if let Some(timeout) = definition.timeout_seconds {
            if timeout <= 0 {
                run.report(&root, "TimeoutSeconds must be positive");
            }
        }
        run.check_graph(definition, &root, 0);

        if run.problems.is_empty() && self.config.check_reachability {
            run.check_reachability(definition, &root);
        }

        if run.problems.is_empty() {
            debug!("State machine is valid");
            Ok(())
        } else {
            debug!("State machine has {} validation problem(s)", run.problems.len());
            Err(ValidationException::new(run.problems))
        }
    }
}

struct ValidationRun<'a> {
    config: &'a ValidationConfig,
    problems: Vec<ValidationProblem>,
}

impl<'a> ValidationRun<'a> {
    fn report(&mut self, context: &ValidationContext, message: impl Into<String>) {
        self.problems.push(ValidationProblem {
            context: context.to_string(),
            message: message.into(),
        });
    }

    // -----------------------------------------------------------------------
    // Structural pass
    // -----------------------------------------------------------------------

    fn check_graph<G: StateGraph>(&mut self, graph: &G, context: &ValidationContext, depth: usize) {
        if graph.states().is_empty() {
            self.report(context, "States must contain at least one state");
            return;
        }
        if graph.start_at().is_empty() {
            self.report(context, "StartAt is required");
        } else if graph.state(graph.start_at()).is_none() {
            self.report(
                context,
                format!("StartAt '{}' does not name a state", graph.start_at()),
            );
        }

        for (name, state) in graph.states() {
            self.check_state(graph, state, &context.state(name), depth);
        }
    }

    fn check_state<G: StateGraph>(
        &mut self,
        graph: &G,
        state: &State,
        context: &ValidationContext,
        depth: usize,
    ) {
        match state {
            State::Task(task) => {
                if task.resource.trim().is_empty() {
                    self.report(context, "Resource is required");
                }
                self.check_positive(context, "TimeoutSeconds", task.timeout_seconds);
                self.check_positive(context, "HeartbeatSeconds", task.heartbeat_seconds);
                if let (Some(timeout), Some(heartbeat)) = (task.timeout_seconds, task.heartbeat_seconds) {
                    if heartbeat >= timeout {
                        self.report(context, "HeartbeatSeconds must be smaller than TimeoutSeconds");
                    }
                }
                self.check_exclusive(
                    context,
                    ("TimeoutSeconds", task.timeout_seconds.is_some()),
                    ("TimeoutSecondsPath", task.timeout_seconds_path.is_some()),
                );
                self.check_exclusive(
                    context,
                    ("HeartbeatSeconds", task.heartbeat_seconds.is_some()),
                    ("HeartbeatSecondsPath", task.heartbeat_seconds_path.is_some()),
                );
                self.check_reference_path(context, "TimeoutSecondsPath", task.timeout_seconds_path.as_deref());
                self.check_reference_path(
                    context,
                    "HeartbeatSecondsPath",
                    task.heartbeat_seconds_path.as_deref(),
                );
                self.check_io_paths(context, &task.input_path, &task.output_path);
                self.check_result_path(context, &task.result_path);
                self.check_template(context, "Parameters", task.parameters.as_ref());
                self.check_template(context, "ResultSelector", task.result_selector.as_ref());
                self.check_retriers(context, &task.retry);
                self.check_catchers(graph, context, &task.catch);
                self.check_transition(graph, context, task.next.as_deref(), task.end);
            }

            State::Pass(pass) => {
                self.check_io_paths(context, &pass.input_path, &pass.output_path);
                self.check_result_path(context, &pass.result_path);
                self.check_template(context, "Parameters", pass.parameters.as_ref());
                self.check_transition(graph, context, pass.next.as_deref(), pass.end);
            }

            State::Choice(choice) => {
                if choice.choices.is_empty() {
                    self.report(context, "Choices must contain at least one rule");
                }
                for (index, rule) in choice.choices.iter().enumerate() {
                    self.check_choice_rule(graph, &context.indexed("Choice", index), rule);
                }
                if let Some(default) = &choice.default {
                    if graph.state(default).is_none() {
                        self.report(context, format!("Default '{}' does not name a state", default));
                    }
                }
                self.check_io_paths(context, &choice.input_path, &choice.output_path);
            }

            State::Wait(wait) => {
                let given = [
                    wait.seconds.is_some(),
                    wait.seconds_path.is_some(),
                    wait.timestamp.is_some(),
                    wait.timestamp_path.is_some(),
                ]
                .iter()
                .filter(|set| **set)
                .count();
                if given != 1 {
                    self.report(
                        context,
                        "Exactly one of Seconds, SecondsPath, Timestamp and TimestampPath must be set",
                    );
                }
                if let Some(seconds) = wait.seconds {
                    if seconds < 0 {
                        self.report(context, "Seconds must not be negative");
                    }
                }
                if let Some(timestamp) = &wait.timestamp {
                    if parse_timestamp(timestamp).is_none() {
                        self.report(
                            context,
                            format!("Timestamp '{}' is not an RFC 3339 timestamp", timestamp),
                        );
                    }
                }
                self.check_reference_path(context, "SecondsPath", wait.seconds_path.as_deref());
                self.check_reference_path(context, "TimestampPath", wait.timestamp_path.as_deref());
                self.check_io_paths(context, &wait.input_path, &wait.output_path);
                self.check_transition(graph, context, wait.next.as_deref(), wait.end);
            }

            State::Succeed(succeed) => {
                self.check_io_paths(context, &succeed.input_path, &succeed.output_path);
            }

            State::Fail(fail) => {
                self.check_exclusive(
                    context,
                    ("Error", fail.error.is_some()),
                    ("ErrorPath", fail.error_path.is_some()),
                );
                self.check_exclusive(
                    context,
                    ("Cause", fail.cause.is_some()),
                    ("CausePath", fail.cause_path.is_some()),
                );
                self.check_dynamic_string(context, "ErrorPath", fail.error_path.as_deref());
                self.check_dynamic_string(context, "CausePath", fail.cause_path.as_deref());
            }

            State::Parallel(parallel) => {
                if parallel.branches.is_empty() {
                    self.report(context, "Branches must contain at least one branch");
                }
                if self.check_depth(context, depth) {
                    for (index, branch) in parallel.branches.iter().enumerate() {
                        self.check_graph(branch, &context.indexed("Branch", index), depth + 1);
                    }
                }
                self.check_io_paths(context, &parallel.input_path, &parallel.output_path);
                self.check_result_path(context, &parallel.result_path);
                self.check_template(context, "Parameters", parallel.parameters.as_ref());
                self.check_template(context, "ResultSelector", parallel.result_selector.as_ref());
                self.check_retriers(context, &parallel.retry);
                self.check_catchers(graph, context, &parallel.catch);
                self.check_transition(graph, context, parallel.next.as_deref(), parallel.end);
            }

            State::Map(map) => {
                match &map.iterator {
                    None => self.report(context, "Iterator is required"),
                    Some(iterator) => {
                        if self.check_depth(context, depth) {
                            self.check_graph(iterator, &context.child("Iterator"), depth + 1);
                        }
                    }
                }
                if let Some(max_concurrency) = map.max_concurrency {
                    if max_concurrency < 0 {
                        self.report(context, "MaxConcurrency must not be negative");
                    }
                }
                self.check_reference_path(context, "ItemsPath", map.items_path.as_deref());
                self.check_io_paths(context, &map.input_path, &map.output_path);
                self.check_result_path(context, &map.result_path);
                self.check_template(context, "Parameters", map.parameters.as_ref());
                self.check_template(context, "ResultSelector", map.result_selector.as_ref());
                self.check_retriers(context, &map.retry);
                self.check_catchers(graph, context, &map.catch);
                self.check_transition(graph, context, map.next.as_deref(), map.end);
            }
        }
    }

    /// Returns whether nested graphs one level below `depth` may be checked
    fn check_depth(&mut self, context: &ValidationContext, depth: usize) -> bool {
        if depth >= self.config.max_branch_depth {
            self.report(
                context,
                format!(
                    "Parallel and Map states are nested deeper than {} levels",
                    self.config.max_branch_depth
                ),
            );
            return false;
        }
        true
    }

    fn check_transition<G: StateGraph>(
        &mut self,
        graph: &G,
        context: &ValidationContext,
        next: Option<&str>,
        end: bool,
    ) {
        match (next, end) {
            (Some(_), true) => self.report(context, "Next and End are mutually exclusive"),
            (None, false) => self.report(context, "One of Next or End is required"),
            (Some(next), false) => self.check_target(graph, context, "Next", next),
            (None, true) => {}
        }
    }

    fn check_target<G: StateGraph>(
        &mut self,
        graph: &G,
        context: &ValidationContext,
        field: &str,
        target: &str,
    ) {
        if graph.state(target).is_none() {
            self.report(context, format!("{} '{}' does not name a state", field, target));
        }
    }

    fn check_choice_rule<G: StateGraph>(
        &mut self,
        graph: &G,
        context: &ValidationContext,
        rule: &ChoiceRule,
    ) {
        self.check_target(graph, context, "Next", &rule.next);
        self.check_condition(context, &rule.condition);
    }

    fn check_condition(&mut self, context: &ValidationContext, condition: &Condition) {
        if let Some(variable) = condition.variable() {
            if variable.starts_with("$$") {
                self.report(
                    context,
                    format!("Variable '{}' cannot read the context document", variable),
                );
            } else if !variable.is_empty() && !is_valid_json_path(variable) {
                self.report(context, format!("Variable '{}' is not a valid JSONPath", variable));
            }
        }

        match condition {
            Condition::Binary { .. } | Condition::TypeTest { .. } => {}
            Condition::BinaryPath {
                operator,
                expected_path,
                ..
            } => {
                if *operator == ComparisonOperator::Match {
                    self.report(context, "StringMatches has no path form");
                }
                if expected_path.starts_with("$$") {
                    self.report(
                        context,
                        format!("'{}' cannot read the context document", expected_path),
                    );
                } else if !is_valid_json_path(expected_path) {
                    self.report(
                        context,
                        format!("'{}' is not a valid JSONPath", expected_path),
                    );
                }
            }
            Condition::And(children) | Condition::Or(children) => {
                if children.is_empty() {
                    let operator = if matches!(condition, Condition::And(_)) { "And" } else { "Or" };
                    self.report(context, format!("{} must contain at least one condition", operator));
                }
                for child in children {
                    self.check_condition(context, child);
                }
            }
            Condition::Not(child) => self.check_condition(context, child),
        }
    }

    fn check_retriers(&mut self, context: &ValidationContext, retriers: &[Retrier]) {
        for (index, retrier) in retriers.iter().enumerate() {
            let retrier_context = context.indexed("Retry", index);
            self.check_error_equals(&retrier_context, &retrier.error_equals, index + 1 == retriers.len());

            if let Some(interval) = retrier.interval_seconds {
                if interval <= 0 {
                    self.report(&retrier_context, "IntervalSeconds must be positive");
                }
            }
            if let Some(attempts) = retrier.max_attempts {
                if attempts < 0 {
                    self.report(&retrier_context, "MaxAttempts must not be negative");
                }
            }
            if let Some(rate) = retrier.backoff_rate {
                if rate < 1.0 {
                    self.report(&retrier_context, "BackoffRate must be at least 1.0");
                }
            }
        }
    }

    fn check_catchers<G: StateGraph>(&mut self, graph: &G, context: &ValidationContext, catchers: &[Catcher]) {
        for (index, catcher) in catchers.iter().enumerate() {
            let catcher_context = context.indexed("Catch", index);
            self.check_error_equals(&catcher_context, &catcher.error_equals, index + 1 == catchers.len());
            if catcher.next.is_empty() {
                self.report(&catcher_context, "Next is required");
            } else {
                self.check_target(graph, &catcher_context, "Next", &catcher.next);
            }
            self.check_result_path(&catcher_context, &catcher.result_path);
        }
    }

    fn check_error_equals(&mut self, context: &ValidationContext, errors: &[String], is_last: bool) {
        if errors.is_empty() {
            self.report(context, "ErrorEquals must not be empty");
            return;
        }
        if errors.iter().any(|error| error == ERROR_WILDCARD) {
            if errors.len() > 1 {
                self.report(context, format!("{} must appear alone in ErrorEquals", ERROR_WILDCARD));
            }
            if !is_last {
                self.report(context, format!("{} must only appear in the last entry", ERROR_WILDCARD));
            }
        }
    }

    fn check_positive(&mut self, context: &ValidationContext, field: &str, value: Option<i64>) {
        if let Some(value) = value {
            if value <= 0 {
                self.report(context, format!("{} must be positive", field));
            }
        }
    }

    fn check_exclusive(&mut self, context: &ValidationContext, first: (&str, bool), second: (&str, bool)) {
        if first.1 && second.1 {
            self.report(
                context,
                format!("{} and {} are mutually exclusive", first.0, second.0),
            );
        }
    }

    fn check_reference_path(&mut self, context: &ValidationContext, field: &str, path: Option<&str>) {
        if let Some(path) = path {
            if let Err(err) = ReferencePath::parse(path) {
                self.report(context, format!("{} is invalid: {}", field, err));
            }
        }
    }

    fn check_io_paths(&mut self, context: &ValidationContext, input: &OptionalString, output: &OptionalString) {
        for (field, path) in [("InputPath", input), ("OutputPath", output)] {
            if let Some(path) = path.as_deref() {
                if !is_valid_json_path(path) {
                    self.report(context, format!("{} '{}' is not a valid JSONPath", field, path));
                }
            }
        }
    }

    fn check_result_path(&mut self, context: &ValidationContext, path: &OptionalString) {
        self.check_reference_path(context, "ResultPath", path.as_deref());
    }

    /// `ErrorPath`/`CausePath`: a reference path or an intrinsic function
    fn check_dynamic_string(&mut self, context: &ValidationContext, field: &str, value: Option<&str>) {
        let value = match value {
            Some(value) => value,
            None => return,
        };
        let valid = if let Some(context_path) = value.strip_prefix("$$") {
            ReferencePath::parse(&format!("${}", context_path)).is_ok()
        } else if value.starts_with('$') {
            ReferencePath::parse(value).is_ok()
        } else {
            IntrinsicFunction::parse_with_depth_limit(value, self.config.max_intrinsic_depth).is_ok()
        };
        if !valid {
            self.report(
                context,
                format!("{} '{}' must be a reference path or an intrinsic function", field, value),
            );
        }
    }

    fn check_template(&mut self, context: &ValidationContext, field: &str, template: Option<&serde_json::Value>) {
        if let Some(template) = template {
            for problem in template_problems(template, self.config.max_intrinsic_depth) {
                self.report(context, format!("{}: {}", field, problem));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reachability pass
    // -----------------------------------------------------------------------

    fn check_reachability<G: StateGraph>(&mut self, graph: &G, context: &ValidationContext) {
        let mut resolved = HashMap::new();
        if !explore(graph, graph.start_at(), &mut resolved) {
            debug!("No terminal path from '{}' in {}", graph.start_at(), context);
            self.report(context, NO_TERMINAL_PATH);
        }

        for (name, state) in graph.states() {
            match state {
                State::Parallel(parallel) => {
                    for (index, branch) in parallel.branches.iter().enumerate() {
                        self.check_reachability(branch, &context.state(name).indexed("Branch", index));
                    }
                }
                State::Map(map) => {
                    if let Some(iterator) = &map.iterator {
                        self.check_reachability(iterator, &context.state(name).child("Iterator"));
                    }
                }
                _ => {}
            }
        }
    }
}

/// Depth-first search for a terminal state
///
/// `resolved` caches the answer for every state already explored in this
/// graph, so each state is walked once. A state is recorded as `false` while
/// its walk is in progress, which turns a cycle back into it into a dead end.
/// Catch transitions are not followed.
fn explore<G: StateGraph>(graph: &G, name: &str, resolved: &mut HashMap<String, bool>) -> bool {
    if let Some(known) = resolved.get(name) {
        return *known;
    }
    resolved.insert(name.to_string(), false);

    let reachable = match graph.state(name) {
        None => false,
        Some(state) if state.is_terminal() => true,
        Some(State::Choice(choice)) => {
            let targets = choice
                .default
                .iter()
                .map(String::as_str)
                .chain(choice.choices.iter().map(|rule| rule.next.as_str()));

            // Every target is explored, even after one succeeds
            let mut reachable = false;
            for target in targets {
                reachable |= explore(graph, target, resolved);
            }
            reachable
        }
        Some(other) => match other.next() {
            Some(next) => explore(graph, next, resolved),
            None => false,
        },
    };

    resolved.insert(name.to_string(), reachable);
    reachable
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition(value: serde_json::Value) -> StateMachineDefinition {
        serde_json::from_value(value).unwrap()
    }

    fn problems(value: serde_json::Value) -> Vec<ValidationProblem> {
        match validate(&definition(value)) {
            Ok(()) => Vec::new(),
            Err(exception) => exception.into_problems(),
        }
    }

    fn has_problem(problems: &[ValidationProblem], context: &str, fragment: &str) -> bool {
        problems
            .iter()
            .any(|p| p.context == context && p.message.contains(fragment))
    }

    #[test]
    fn test_valid_machine() {
        let result = validate(&definition(json!({
            "StartAt": "Wait",
            "States": {
                "Wait": {"Type": "Wait", "Seconds": 5, "Next": "Work"},
                "Work": {
                    "Type": "Task",
                    "Resource": "arn:aws:states:::lambda:invoke",
                    "TimeoutSeconds": 60,
                    "HeartbeatSeconds": 10,
                    "Parameters": {"id.$": "$.id", "label.$": "States.Format('job {}', $.id)"},
                    "Retry": [
                        {"ErrorEquals": ["Custom.Error"], "IntervalSeconds": 1, "MaxAttempts": 3, "BackoffRate": 2.0},
                        {"ErrorEquals": ["States.ALL"]}
                    ],
                    "Catch": [{"ErrorEquals": ["States.ALL"], "Next": "Failed", "ResultPath": "$.error"}],
                    "End": true
                },
                "Failed": {"Type": "Fail", "ErrorPath": "$.error.Error", "CausePath": "States.Format('failed: {}', $.error.Cause)"}
            }
        })));
        assert!(result.is_ok(), "{:?}", result);
    }

    #[test]
    fn test_pure_cycle_has_no_terminal_path() {
        let problems = problems(json!({
            "StartAt": "A",
            "States": {
                "A": {"Type": "Pass", "Next": "B"},
                "B": {"Type": "Pass", "Next": "A"}
            }
        }));
        assert_eq!(
            problems,
            vec![ValidationProblem {
                context: "StateMachine".to_string(),
                message: "No path to a terminal state exists.".to_string(),
            }]
        );
    }

    #[test]
    fn test_choice_with_one_terminal_branch_validates() {
        let problems = problems(json!({
            "StartAt": "Loop",
            "States": {
                "Loop": {"Type": "Pass", "Next": "Decide"},
                "Decide": {
                    "Type": "Choice",
                    "Choices": [
                        {"Variable": "$.again", "BooleanEquals": true, "Next": "Loop"},
                        {"Variable": "$.done", "BooleanEquals": true, "Next": "Finish"}
                    ]
                },
                "Finish": {"Type": "Succeed"}
            }
        }));
        assert!(problems.is_empty(), "{:?}", problems);
    }

    #[test]
    fn test_choice_where_every_branch_cycles() {
        let problems = problems(json!({
            "StartAt": "Decide",
            "States": {
                "Decide": {
                    "Type": "Choice",
                    "Choices": [{"Variable": "$.x", "IsPresent": true, "Next": "Back"}],
                    "Default": "Decide"
                },
                "Back": {"Type": "Pass", "Next": "Decide"}
            }
        }));
        assert!(has_problem(&problems, "StateMachine", NO_TERMINAL_PATH));
    }

    #[test]
    fn test_catch_transitions_do_not_count_as_terminal_paths() {
        let problems = problems(json!({
            "StartAt": "Work",
            "States": {
                "Work": {
                    "Type": "Task",
                    "Resource": "worker",
                    "Catch": [{"ErrorEquals": ["States.ALL"], "Next": "Done"}],
                    "Next": "Work"
                },
                "Done": {"Type": "Succeed"}
            }
        }));
        assert!(has_problem(&problems, "StateMachine", NO_TERMINAL_PATH));
    }

    #[test]
    fn test_error_wildcard_placement() {
        let with_others = problems(json!({
            "StartAt": "T",
            "States": {"T": {"Type": "Task", "Resource": "r", "End": true,
                "Retry": [{"ErrorEquals": ["States.ALL", "Custom"]}]}}
        }));
        assert!(has_problem(&with_others, "State[T].Retry[0]", "must appear alone"));

        let not_last = problems(json!({
            "StartAt": "T",
            "States": {"T": {"Type": "Task", "Resource": "r", "End": true,
                "Retry": [{"ErrorEquals": ["States.ALL"]}, {"ErrorEquals": ["Custom"]}]}}
        }));
        assert!(has_problem(&not_last, "State[T].Retry[0]", "last entry"));

        let catch_not_last = problems(json!({
            "StartAt": "T",
            "States": {
                "T": {"Type": "Task", "Resource": "r", "End": true,
                    "Catch": [{"ErrorEquals": ["States.ALL"], "Next": "F"}, {"ErrorEquals": ["X"], "Next": "F"}]},
                "F": {"Type": "Fail"}
            }
        }));
        assert!(has_problem(&catch_not_last, "State[T].Catch[0]", "last entry"));

        let alone = problems(json!({
            "StartAt": "T",
            "States": {"T": {"Type": "Task", "Resource": "r", "End": true,
                "Retry": [{"ErrorEquals": ["States.ALL"]}]}}
        }));
        assert!(alone.is_empty(), "{:?}", alone);
    }

    #[test]
    fn test_retrier_numeric_rules() {
        let problems = problems(json!({
            "StartAt": "T",
            "States": {"T": {"Type": "Task", "Resource": "r", "End": true,
                "Retry": [{"ErrorEquals": [], "IntervalSeconds": 0, "MaxAttempts": -1, "BackoffRate": 0.5}]}}
        }));
        let context = "State[T].Retry[0]";
        assert!(has_problem(&problems, context, "ErrorEquals must not be empty"));
        assert!(has_problem(&problems, context, "IntervalSeconds must be positive"));
        assert!(has_problem(&problems, context, "MaxAttempts must not be negative"));
        assert!(has_problem(&problems, context, "BackoffRate must be at least 1.0"));
    }

    #[test]
    fn test_task_rules_are_all_reported() {
        let problems = problems(json!({
            "StartAt": "T",
            "States": {"T": {
                "Type": "Task",
                "Resource": "",
                "TimeoutSeconds": 10,
                "HeartbeatSeconds": 10,
                "HeartbeatSecondsPath": "$.hb",
                "ResultPath": "$.items[*]",
                "InputPath": "$.a]",
                "Next": "Missing"
            }}
        }));
        let context = "State[T]";
        assert!(has_problem(&problems, context, "Resource is required"));
        assert!(has_problem(&problems, context, "HeartbeatSeconds must be smaller than TimeoutSeconds"));
        assert!(has_problem(&problems, context, "HeartbeatSeconds and HeartbeatSecondsPath are mutually exclusive"));
        assert!(has_problem(&problems, context, "ResultPath is invalid"));
        assert!(has_problem(&problems, context, "InputPath '$.a]'"));
        assert!(has_problem(&problems, context, "Next 'Missing' does not name a state"));
        assert!(!problems.iter().any(|p| p.message == NO_TERMINAL_PATH));
    }

    #[test]
    fn test_next_and_end_rules() {
        let problems = problems(json!({
            "StartAt": "A",
            "States": {
                "A": {"Type": "Pass", "Next": "B", "End": true},
                "B": {"Type": "Pass"}
            }
        }));
        assert!(has_problem(&problems, "State[A]", "mutually exclusive"));
        assert!(has_problem(&problems, "State[B]", "One of Next or End is required"));
    }

    #[test]
    fn test_choice_rules() {
        let problems = problems(json!({
            "StartAt": "C",
            "States": {
                "C": {
                    "Type": "Choice",
                    "Choices": [
                        {"Variable": "$.a", "StringEquals": "x", "Next": "Done"},
                        {"And": [], "Next": "Nowhere"},
                        {"Variable": "a.b", "NumericEqualsPath": "$.c", "Next": "Done"}
                    ],
                    "Default": "Ghost"
                },
                "Empty": {"Type": "Choice"},
                "Done": {"Type": "Succeed"}
            }
        }));
        assert!(has_problem(&problems, "State[C].Choice[1]", "And must contain at least one condition"));
        assert!(has_problem(&problems, "State[C].Choice[1]", "Next 'Nowhere' does not name a state"));
        assert!(has_problem(&problems, "State[C].Choice[2]", "Variable 'a.b' is not a valid JSONPath"));
        assert!(has_problem(&problems, "State[C]", "Default 'Ghost' does not name a state"));
        assert!(has_problem(&problems, "State[Empty]", "Choices must contain at least one rule"));
        assert!(!problems.iter().any(|p| p.context == "State[C].Choice[0]"));
    }

    #[test]
    fn test_wait_rules() {
        let problems = problems(json!({
            "StartAt": "None",
            "States": {
                "None": {"Type": "Wait", "Next": "Two"},
                "Two": {"Type": "Wait", "Seconds": 1, "TimestampPath": "$.t", "Next": "Bad"},
                "Bad": {"Type": "Wait", "Seconds": -1, "Next": "Stamp"},
                "Stamp": {"Type": "Wait", "Timestamp": "tomorrow", "Next": "Path"},
                "Path": {"Type": "Wait", "SecondsPath": "$..s", "End": true}
            }
        }));
        assert!(has_problem(&problems, "State[None]", "Exactly one of"));
        assert!(has_problem(&problems, "State[Two]", "Exactly one of"));
        assert!(has_problem(&problems, "State[Bad]", "Seconds must not be negative"));
        assert!(has_problem(&problems, "State[Stamp]", "not an RFC 3339 timestamp"));
        assert!(has_problem(&problems, "State[Path]", "SecondsPath is invalid"));
    }

    #[test]
    fn test_fail_rules() {
        let problems = problems(json!({
            "StartAt": "Both",
            "States": {
                "Both": {"Type": "Fail", "Error": "E", "ErrorPath": "$.e"},
                "Constant": {"Type": "Fail", "CausePath": "just text"},
                "Good": {"Type": "Fail", "ErrorPath": "$.e", "CausePath": "States.Format('{}', $.c)"}
            }
        }));
        assert!(has_problem(&problems, "State[Both]", "Error and ErrorPath are mutually exclusive"));
        assert!(has_problem(&problems, "State[Constant]", "must be a reference path or an intrinsic function"));
        assert!(!problems.iter().any(|p| p.context == "State[Good]"));
    }

    #[test]
    fn test_fail_paths_may_read_the_context_document() {
        let problems = problems(json!({
            "StartAt": "Stop",
            "States": {
                "Stop": {"Type": "Fail", "ErrorPath": "$$.Execution.Name", "CausePath": "$$.State['Entered Time']"},
                "Broken": {"Type": "Fail", "CausePath": "$$..Name"}
            }
        }));
        assert!(!problems.iter().any(|p| p.context == "State[Stop]"), "{:?}", problems);
        assert!(has_problem(&problems, "State[Broken]", "CausePath '$$..Name'"));
    }

    #[test]
    fn test_conditions_cannot_read_the_context_document() {
        let problems = problems(json!({
            "StartAt": "C",
            "States": {
                "C": {
                    "Type": "Choice",
                    "Choices": [
                        {"Variable": "$$.Execution.Name", "StringEquals": "nightly", "Next": "Done"},
                        {"Variable": "$.limit", "NumericLessThanPath": "$$.Execution.Limit", "Next": "Done"},
                        {"Not": {"Variable": "$.name", "IsPresent": true}, "Next": "Done"}
                    ],
                    "Default": "Done"
                },
                "Done": {"Type": "Succeed"}
            }
        }));
        assert!(has_problem(&problems, "State[C].Choice[0]", "cannot read the context document"));
        assert!(has_problem(&problems, "State[C].Choice[1]", "cannot read the context document"));
        assert!(!problems.iter().any(|p| p.context == "State[C].Choice[2]"));
    }

    #[test]
    fn test_stacked_choices_validate_quickly() {
        let count = 60;
        let mut states = serde_json::Map::new();
        for index in 0..count {
            let next = if index + 1 == count {
                "Done".to_string()
            } else {
                format!("C{}", index + 1)
            };
            states.insert(
                format!("C{}", index),
                json!({
                    "Type": "Choice",
                    "Choices": [{"Variable": "$.flag", "IsPresent": true, "Next": next}],
                    "Default": next
                }),
            );
        }
        states.insert("Done".to_string(), json!({"Type": "Succeed"}));
        let definition = definition(json!({"StartAt": "C0", "States": states}));

        let started = std::time::Instant::now();
        assert!(validate(&definition).is_ok());
        assert!(started.elapsed() < std::time::Duration::from_secs(5));

        // Same shape with the last Choice looping back instead of finishing
        let mut looping = definition.clone();
        looping.states.remove("Done");
        looping.states.insert(
            "Done".to_string(),
            serde_json::from_value(json!({"Type": "Pass", "Next": "C0"})).unwrap(),
        );
        let err = validate(&looping).unwrap_err();
        assert_eq!(err.problems()[0].message, NO_TERMINAL_PATH);
    }

    #[test]
    fn test_parallel_and_map_nested_validation() {
        let problems = problems(json!({
            "StartAt": "P",
            "States": {
                "P": {
                    "Type": "Parallel",
                    "Branches": [
                        {"StartAt": "Ok", "States": {"Ok": {"Type": "Succeed"}}},
                        {"StartAt": "Missing", "States": {"X": {"Type": "Task", "End": true}}}
                    ],
                    "Next": "M"
                },
                "M": {"Type": "Map", "ItemsPath": "$.items", "MaxConcurrency": -1, "End": true},
                "EmptyParallel": {"Type": "Parallel", "End": true}
            }
        }));
        assert!(has_problem(&problems, "State[P].Branch[1]", "StartAt 'Missing' does not name a state"));
        assert!(has_problem(&problems, "State[P].Branch[1].State[X]", "Resource is required"));
        assert!(has_problem(&problems, "State[M]", "Iterator is required"));
        assert!(has_problem(&problems, "State[M]", "MaxConcurrency must not be negative"));
        assert!(has_problem(&problems, "State[EmptyParallel]", "Branches must contain at least one branch"));
    }

    #[test]
    fn test_branch_reachability_is_independent() {
        let problems = problems(json!({
            "StartAt": "P",
            "States": {
                "P": {
                    "Type": "Parallel",
                    "Branches": [
                        {"StartAt": "A", "States": {"A": {"Type": "Pass", "Next": "A"}}},
                        {"StartAt": "B", "States": {"B": {"Type": "Pass", "End": true}}}
                    ],
                    "End": true
                },
                "M": {
                    "Type": "Map",
                    "Iterator": {"StartAt": "Spin", "States": {"Spin": {"Type": "Wait", "Seconds": 1, "Next": "Spin"}}},
                    "End": true
                }
            }
        }));
        assert_eq!(problems.len(), 2, "{:?}", problems);
        assert!(has_problem(&problems, "State[P].Branch[0]", NO_TERMINAL_PATH));
        assert!(has_problem(&problems, "State[M].Iterator", NO_TERMINAL_PATH));
    }

    #[test]
    fn test_branch_depth_limit() {
        let mut branch = json!({"StartAt": "Leaf", "States": {"Leaf": {"Type": "Succeed"}}});
        for _ in 0..3 {
            branch = json!({
                "StartAt": "Nest",
                "States": {"Nest": {"Type": "Parallel", "Branches": [branch], "End": true}}
            });
        }
        let definition: StateMachineDefinition = serde_json::from_value(branch).unwrap();

        let shallow = Validator::new(ValidationConfig {
            max_branch_depth: 2,
            ..Default::default()
        });
        let err = shallow.validate(&definition).unwrap_err();
        assert!(err.problems()[0].message.contains("nested deeper than 2 levels"));

        assert!(Validator::default().validate(&definition).is_ok());
    }

    #[test]
    fn test_machine_level_rules() {
        let empty = problems(json!({"StartAt": "A", "States": {}}));
        assert!(has_problem(&empty, "StateMachine", "States must contain at least one state"));

        let bad = problems(json!({
            "StartAt": "Nope",
            "TimeoutSeconds": 0,
            "States": {"A": {"Type": "Succeed"}}
        }));
        assert!(has_problem(&bad, "StateMachine", "TimeoutSeconds must be positive"));
        assert!(has_problem(&bad, "StateMachine", "StartAt 'Nope' does not name a state"));
    }

    #[test]
    fn test_template_problems_are_reported() {
        let problems = problems(json!({
            "StartAt": "T",
            "States": {"T": {"Type": "Task", "Resource": "r", "End": true,
                "ResultSelector": {"value.$": "States.Format('unterminated"}}}
        }));
        assert!(has_problem(&problems, "State[T]", "ResultSelector: 'value.$'"));
    }

    #[test]
    fn test_reachability_can_be_disabled() {
        let definition = definition(json!({
            "StartAt": "A",
            "States": {"A": {"Type": "Pass", "Next": "A"}}
        }));
        let validator = Validator::new(ValidationConfig {
            check_reachability: false,
            ..Default::default()
        });
        assert!(validator.validate(&definition).is_ok());
    }

    #[test]
    fn test_exception_message_lists_every_problem() {
        let exception = ValidationException::new(vec![
            ValidationProblem { context: "State[A]".to_string(), message: "first".to_string() },
            ValidationProblem { context: "State[B]".to_string(), message: "second".to_string() },
        ]);
        assert_eq!(
            exception.to_string(),
            "State machine validation failed with 2 problem(s):\n  - State[A]: first\n  - State[B]: second"
        );
    }

    #[test]
    fn test_context_rendering() {
        let root = ValidationContext::root();
        assert_eq!(root.to_string(), "StateMachine");
        assert_eq!(root.state("Foo").indexed("Choice", 1).to_string(), "State[Foo].Choice[1]");
    }
}
