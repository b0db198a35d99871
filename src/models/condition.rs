// Choice conditions - the predicates a Choice state evaluates against its input

//! # Choice Condition Module
//!
//! A Choice state picks its next state by evaluating [`ChoiceRule`]s in order.
//! Each rule wraps a [`Condition`] tree built from three kinds of leaves plus
//! the usual logical combinators.
//!
//! ## Key Concepts
//!
//! - **Binary value**: compare the value at `Variable` with a literal
//!   (`StringEquals`, `NumericLessThan`, `TimestampGreaterThanEquals`, ...)
//! - **Binary path**: compare two values from the same document
//!   (`NumericLessThanPath`, ...)
//! - **Type test**: classify the value at `Variable` (`IsNull`, `IsPresent`, ...)
//! - **Composite**: `And`, `Or`, `Not`
//!
//! Matching is **total**: missing paths, type mismatches and malformed
//! timestamps all evaluate to `false` so that a rule simply does not select
//! its branch.
//!
//! ## Rust Learning Notes:
//!
//! ### Box<Condition> for Recursion
//! `Not` holds a `Box<Condition>` because the enum would otherwise contain
//! itself and have infinite size. `And`/`Or` use `Vec`, which is already
//! heap-allocated.
//!
//! ### Hand-written Serde Impls
//! ASL encodes the operator in the *key* (`"NumericLessThan": 5`) rather than
//! in a tag field, which serde's derive attributes cannot express. We convert
//! through `serde_json::Value` in [`Condition::from_json`] / [`Condition::to_json`]
//! and delegate `Serialize`/`Deserialize` to them.

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset, SecondsFormat};
use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};

use super::path::select_token;
use crate::{Result, StatesLanguageError};

/// Comparison applied by a binary condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Anchored wildcard match, strings only (`StringMatches`)
    Match,
}

impl ComparisonOperator {
    fn key_suffix(self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "Equals",
            ComparisonOperator::Gt => "GreaterThan",
            ComparisonOperator::Gte => "GreaterThanEquals",
            ComparisonOperator::Lt => "LessThan",
            ComparisonOperator::Lte => "LessThanEquals",
            ComparisonOperator::Match => "Matches",
        }
    }

    fn from_key_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "Equals" => Some(ComparisonOperator::Eq),
            "GreaterThan" => Some(ComparisonOperator::Gt),
            "GreaterThanEquals" => Some(ComparisonOperator::Gte),
            "LessThan" => Some(ComparisonOperator::Lt),
            "LessThanEquals" => Some(ComparisonOperator::Lte),
            "Matches" => Some(ComparisonOperator::Match),
            _ => None,
        }
    }

    /// Apply an ordering result to this operator
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            ComparisonOperator::Eq => ordering == Ordering::Equal,
            ComparisonOperator::Gt => ordering == Ordering::Greater,
            ComparisonOperator::Gte => ordering != Ordering::Less,
            ComparisonOperator::Lt => ordering == Ordering::Less,
            ComparisonOperator::Lte => ordering != Ordering::Greater,
            ComparisonOperator::Match => false,
        }
    }
}

/// The type family a comparison works on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    Numeric,
    Boolean,
    Timestamp,
}

impl ValueKind {
    fn key_prefix(self) -> &'static str {
        match self {
            ValueKind::String => "String",
            ValueKind::Numeric => "Numeric",
            ValueKind::Boolean => "Boolean",
            ValueKind::Timestamp => "Timestamp",
        }
    }

    const ALL: [ValueKind; 4] = [
        ValueKind::String,
        ValueKind::Numeric,
        ValueKind::Boolean,
        ValueKind::Timestamp,
    ];
}

/// Literal operand of a binary value condition
#[derive(Debug, Clone, PartialEq)]
pub enum ExpectedValue {
    String(String),
    Numeric(Number),
    Boolean(bool),
    Timestamp(DateTime<FixedOffset>),
}

impl ExpectedValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ExpectedValue::String(_) => ValueKind::String,
            ExpectedValue::Numeric(_) => ValueKind::Numeric,
            ExpectedValue::Boolean(_) => ValueKind::Boolean,
            ExpectedValue::Timestamp(_) => ValueKind::Timestamp,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            ExpectedValue::String(value) => Value::String(value.clone()),
            ExpectedValue::Numeric(value) => Value::Number(value.clone()),
            ExpectedValue::Boolean(value) => Value::Bool(*value),
            ExpectedValue::Timestamp(value) => {
                Value::String(value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

/// Unary type tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTest {
    IsNull,
    IsPresent,
    IsNumeric,
    IsString,
    IsBoolean,
    IsTimestamp,
}

impl TypeTest {
    const ALL: [TypeTest; 6] = [
        TypeTest::IsNull,
        TypeTest::IsPresent,
        TypeTest::IsNumeric,
        TypeTest::IsString,
        TypeTest::IsBoolean,
        TypeTest::IsTimestamp,
    ];

    fn key(self) -> &'static str {
        match self {
            TypeTest::IsNull => "IsNull",
            TypeTest::IsPresent => "IsPresent",
            TypeTest::IsNumeric => "IsNumeric",
            TypeTest::IsString => "IsString",
            TypeTest::IsBoolean => "IsBoolean",
            TypeTest::IsTimestamp => "IsTimestamp",
        }
    }

    /// Classify a value that is known to exist
    fn classify(self, value: &Value) -> bool {
        match self {
            TypeTest::IsNull => value.is_null(),
            TypeTest::IsPresent => true,
            TypeTest::IsNumeric => value.is_number(),
            TypeTest::IsString => value.is_string(),
            TypeTest::IsBoolean => value.is_boolean(),
            TypeTest::IsTimestamp => value.as_str().and_then(parse_timestamp).is_some(),
        }
    }
}

/// A predicate over a JSON document
///
/// ```rust
/// use serde_json::json;
/// use states_language::Condition;
///
/// let condition = Condition::string_equals("$.foo", "bar");
/// assert!(condition.matches(&json!({"foo": "bar"})));
/// assert!(!condition.matches(&json!({"foo": 42})));
/// assert!(!condition.matches(&json!({})));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Compare the value at `variable` with a literal; an empty variable
    /// means the whole document
    Binary {
        variable: String,
        operator: ComparisonOperator,
        expected: ExpectedValue,
    },

    /// Compare the values at `variable` and `expected_path`
    BinaryPath {
        variable: String,
        operator: ComparisonOperator,
        kind: ValueKind,
        expected_path: String,
    },

    /// Classify the value at `variable`; `expected = false` inverts the test
    TypeTest {
        variable: String,
        test: TypeTest,
        expected: bool,
    },

    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn binary<S: Into<String>>(
        variable: S,
        operator: ComparisonOperator,
        expected: ExpectedValue,
    ) -> Self {
        Condition::Binary {
            variable: variable.into(),
            operator,
            expected,
        }
    }

    pub fn binary_path<S: Into<String>, P: Into<String>>(
        variable: S,
        operator: ComparisonOperator,
        kind: ValueKind,
        expected_path: P,
    ) -> Self {
        Condition::BinaryPath {
            variable: variable.into(),
            operator,
            kind,
            expected_path: expected_path.into(),
        }
    }

    pub fn type_test<S: Into<String>>(variable: S, test: TypeTest, expected: bool) -> Self {
        Condition::TypeTest {
            variable: variable.into(),
            test,
            expected,
        }
    }

    pub fn string_equals<S: Into<String>, V: Into<String>>(variable: S, value: V) -> Self {
        Self::binary(
            variable,
            ComparisonOperator::Eq,
            ExpectedValue::String(value.into()),
        )
    }

    pub fn string_matches<S: Into<String>, V: Into<String>>(variable: S, pattern: V) -> Self {
        Self::binary(
            variable,
            ComparisonOperator::Match,
            ExpectedValue::String(pattern.into()),
        )
    }

    pub fn numeric<S: Into<String>, N: Into<Number>>(
        variable: S,
        operator: ComparisonOperator,
        value: N,
    ) -> Self {
        Self::binary(variable, operator, ExpectedValue::Numeric(value.into()))
    }

    pub fn boolean_equals<S: Into<String>>(variable: S, value: bool) -> Self {
        Self::binary(variable, ComparisonOperator::Eq, ExpectedValue::Boolean(value))
    }

    pub fn is_present<S: Into<String>>(variable: S, expected: bool) -> Self {
        Self::type_test(variable, TypeTest::IsPresent, expected)
    }

    pub fn and(children: Vec<Condition>) -> Self {
        Condition::And(children)
    }

    pub fn or(children: Vec<Condition>) -> Self {
        Condition::Or(children)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: Condition) -> Self {
        Condition::Not(Box::new(child))
    }

    /// Evaluate against a document; never fails
    ///
    /// ## Rust Learning Notes:
    ///
    /// ### Exhaustive Matching
    /// Every variant is handled here. Adding a variant to [`Condition`]
    /// makes this `match` fail to compile until the new case is covered.
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Condition::Binary {
                variable,
                operator,
                expected,
            } => resolve(document, variable)
                .map_or(false, |operand| compare_with_literal(operand, *operator, expected)),

            Condition::BinaryPath {
                variable,
                operator,
                kind,
                expected_path,
            } => match (resolve(document, variable), resolve(document, expected_path)) {
                (Some(left), Some(right)) => compare_values(left, *operator, *kind, right),
                _ => false,
            },

            Condition::TypeTest {
                variable,
                test,
                expected,
            } => match (test, resolve(document, variable)) {
                (TypeTest::IsPresent, found) => found.is_some() == *expected,
                (_, None) => false,
                (test, Some(value)) => test.classify(value) == *expected,
            },

            Condition::And(children) => children.iter().all(|child| child.matches(document)),
            Condition::Or(children) => children.iter().any(|child| child.matches(document)),
            Condition::Not(child) => !child.matches(document),
        }
    }

    /// The `Variable` this node reads, if it is a leaf
    pub fn variable(&self) -> Option<&str> {
        match self {
            Condition::Binary { variable, .. }
            | Condition::BinaryPath { variable, .. }
            | Condition::TypeTest { variable, .. } => Some(variable),
            Condition::And(_) | Condition::Or(_) | Condition::Not(_) => None,
        }
    }

    /// Parse the ASL JSON form of a condition
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| invalid("condition must be a JSON object"))?;

        if let Some(children) = object.get("And") {
            return Ok(Condition::And(parse_children("And", children)?));
        }
        if let Some(children) = object.get("Or") {
            return Ok(Condition::Or(parse_children("Or", children)?));
        }
        if let Some(child) = object.get("Not") {
            return Ok(Condition::not(Condition::from_json(child)?));
        }

        let variable = match object.get("Variable") {
            None => String::new(),
            Some(Value::String(variable)) => variable.clone(),
            Some(_) => return Err(invalid("'Variable' must be a string")),
        };

        let mut operators = object
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "Variable" | "Comment" | "Next"));
        let (key, operand) = operators
            .next()
            .ok_or_else(|| invalid("condition has no comparison operator"))?;
        if let Some((extra, _)) = operators.next() {
            return Err(invalid(format!(
                "condition has more than one comparison operator ('{}' and '{}')",
                key, extra
            )));
        }

        if let Some(test) = TypeTest::ALL.iter().find(|test| test.key() == key.as_str()) {
            let expected = operand
                .as_bool()
                .ok_or_else(|| invalid(format!("'{}' must be a boolean", key)))?;
            return Ok(Condition::type_test(variable, *test, expected));
        }

        let (kind, operator, is_path) = parse_comparison_key(key)
            .ok_or_else(|| invalid(format!("unknown comparison operator '{}'", key)))?;

        if is_path {
            let expected_path = operand
                .as_str()
                .ok_or_else(|| invalid(format!("'{}' must be a path string", key)))?;
            return Ok(Condition::binary_path(variable, operator, kind, expected_path));
        }

        let expected = match (kind, operand) {
            (ValueKind::String, Value::String(value)) => ExpectedValue::String(value.clone()),
            (ValueKind::Numeric, Value::Number(value)) => ExpectedValue::Numeric(value.clone()),
            (ValueKind::Boolean, Value::Bool(value)) => ExpectedValue::Boolean(*value),
            (ValueKind::Timestamp, Value::String(value)) => ExpectedValue::Timestamp(
                parse_timestamp(value)
                    .ok_or_else(|| invalid(format!("'{}' is not an RFC 3339 timestamp", value)))?,
            ),
            _ => {
                return Err(invalid(format!(
                    "'{}' expects a {} operand",
                    key,
                    kind.key_prefix().to_lowercase()
                )))
            }
        };
        Ok(Condition::binary(variable, operator, expected))
    }

    /// Render the ASL JSON form of a condition
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        match self {
            Condition::Binary {
                variable,
                operator,
                expected,
            } => {
                insert_variable(&mut object, variable);
                object.insert(
                    comparison_key(expected.kind(), *operator, false),
                    expected.to_json(),
                );
            }
            Condition::BinaryPath {
                variable,
                operator,
                kind,
                expected_path,
            } => {
                insert_variable(&mut object, variable);
                object.insert(
                    comparison_key(*kind, *operator, true),
                    Value::String(expected_path.clone()),
                );
            }
            Condition::TypeTest {
                variable,
                test,
                expected,
            } => {
                insert_variable(&mut object, variable);
                object.insert(test.key().to_string(), Value::Bool(*expected));
            }
            Condition::And(children) => {
                object.insert(
                    "And".to_string(),
                    Value::Array(children.iter().map(Condition::to_json).collect()),
                );
            }
            Condition::Or(children) => {
                object.insert(
                    "Or".to_string(),
                    Value::Array(children.iter().map(Condition::to_json).collect()),
                );
            }
            Condition::Not(child) => {
                object.insert("Not".to_string(), child.to_json());
            }
        }
        Value::Object(object)
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Condition::from_json(&value).map_err(D::Error::custom)
    }
}

/// A top-level entry of a Choice state's `Choices` array
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceRule {
    pub condition: Condition,
    pub next: String,
    pub comment: Option<String>,
}

impl ChoiceRule {
    pub fn new<S: Into<String>>(condition: Condition, next: S) -> Self {
        ChoiceRule {
            condition,
            next: next.into(),
            comment: None,
        }
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.condition.matches(document)
    }
}

impl Serialize for ChoiceRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut value = self.condition.to_json();
        if let Value::Object(object) = &mut value {
            object.insert("Next".to_string(), Value::String(self.next.clone()));
            if let Some(comment) = &self.comment {
                object.insert("Comment".to_string(), Value::String(comment.clone()));
            }
        }
        value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ChoiceRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let next = match value.get("Next") {
            Some(Value::String(next)) => next.clone(),
            Some(_) => return Err(D::Error::custom("choice rule 'Next' must be a string")),
            None => return Err(D::Error::custom("choice rule is missing 'Next'")),
        };
        let comment = value
            .get("Comment")
            .and_then(Value::as_str)
            .map(str::to_string);
        let condition = Condition::from_json(&value).map_err(D::Error::custom)?;
        Ok(ChoiceRule {
            condition,
            next,
            comment,
        })
    }
}

fn invalid(reason: impl Into<String>) -> StatesLanguageError {
    StatesLanguageError::InvalidDefinition(reason.into())
}

fn insert_variable(object: &mut Map<String, Value>, variable: &str) {
    if !variable.is_empty() {
        object.insert("Variable".to_string(), Value::String(variable.to_string()));
    }
}

fn parse_children(key: &str, children: &Value) -> Result<Vec<Condition>> {
    children
        .as_array()
        .ok_or_else(|| invalid(format!("'{}' must be an array of conditions", key)))?
        .iter()
        .map(Condition::from_json)
        .collect()
}

fn comparison_key(kind: ValueKind, operator: ComparisonOperator, is_path: bool) -> String {
    format!(
        "{}{}{}",
        kind.key_prefix(),
        operator.key_suffix(),
        if is_path { "Path" } else { "" }
    )
}

fn parse_comparison_key(key: &str) -> Option<(ValueKind, ComparisonOperator, bool)> {
    let (body, is_path) = match key.strip_suffix("Path") {
        Some(body) => (body, true),
        None => (key, false),
    };
    ValueKind::ALL.iter().find_map(|kind| {
        let operator = ComparisonOperator::from_key_suffix(body.strip_prefix(kind.key_prefix())?)?;
        let allowed = match (kind, operator) {
            (ValueKind::String, ComparisonOperator::Match) => !is_path,
            (_, ComparisonOperator::Match) => false,
            (ValueKind::Boolean, operator) => operator == ComparisonOperator::Eq,
            _ => true,
        };
        allowed.then_some((*kind, operator, is_path))
    })
}

/// Resolve a variable; empty means the whole document
fn resolve<'a>(document: &'a Value, variable: &str) -> Option<&'a Value> {
    if variable.is_empty() {
        return Some(document);
    }
    if !document.is_object() {
        return None;
    }
    select_token(document, variable)
}

fn compare_with_literal(operand: &Value, operator: ComparisonOperator, expected: &ExpectedValue) -> bool {
    match (expected, operand) {
        (ExpectedValue::String(pattern), Value::String(actual))
            if operator == ComparisonOperator::Match =>
        {
            wildcard_match(pattern, actual)
        }
        (ExpectedValue::String(expected), Value::String(actual)) => {
            operator.accepts(actual.as_str().cmp(expected.as_str()))
        }
        (ExpectedValue::Numeric(expected), Value::Number(actual)) => {
            compare_numbers(actual, expected).map_or(false, |ordering| operator.accepts(ordering))
        }
        (ExpectedValue::Boolean(expected), Value::Bool(actual)) => {
            operator == ComparisonOperator::Eq && actual == expected
        }
        (ExpectedValue::Timestamp(expected), Value::String(actual)) => parse_timestamp(actual)
            .map_or(false, |actual| operator.accepts(actual.cmp(expected))),
        _ => false,
    }
}

fn compare_values(left: &Value, operator: ComparisonOperator, kind: ValueKind, right: &Value) -> bool {
    if operator == ComparisonOperator::Match {
        return false;
    }
    match (kind, left, right) {
        (ValueKind::String, Value::String(left), Value::String(right)) => {
            operator.accepts(left.cmp(right))
        }
        (ValueKind::Numeric, Value::Number(left), Value::Number(right)) => {
            compare_numbers(left, right).map_or(false, |ordering| operator.accepts(ordering))
        }
        (ValueKind::Boolean, Value::Bool(left), Value::Bool(right)) => {
            operator == ComparisonOperator::Eq && left == right
        }
        (ValueKind::Timestamp, Value::String(left), Value::String(right)) => {
            match (parse_timestamp(left), parse_timestamp(right)) {
                (Some(left), Some(right)) => operator.accepts(left.cmp(&right)),
                _ => false,
            }
        }
        _ => false,
    }
}

/// Integer comparison when both sides are integers, float otherwise
pub(crate) fn compare_numbers(left: &Number, right: &Number) -> Option<Ordering> {
    if let (Some(left), Some(right)) = (left.as_i64(), right.as_i64()) {
        return Some(left.cmp(&right));
    }
    if let (Some(left), Some(right)) = (left.as_u64(), right.as_u64()) {
        return Some(left.cmp(&right));
    }
    left.as_f64()?.partial_cmp(&right.as_f64()?)
}

pub(crate) fn parse_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(text).ok()
}

/// Anchored wildcard match: `*` is any run of characters, `?` exactly one,
/// and `\` makes the next character literal
fn wildcard_match(pattern: &str, candidate: &str) -> bool {
    let mut expression = String::from("(?s)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => expression.push_str(".*"),
            '?' => expression.push('.'),
            '\\' => {
                let literal = chars.next().unwrap_or('\\');
                expression.push_str(&regex::escape(&literal.to_string()));
            }
            other => expression.push_str(&regex::escape(&other.to_string())),
        }
    }
    expression.push('$');

    match Regex::new(&expression) {
        Ok(regex) => regex.is_match(candidate),
        Err(err) => {
            tracing::debug!("wildcard pattern '{}' did not compile: {}", pattern, err);
            false
        }
    }
}
