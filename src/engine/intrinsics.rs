// Intrinsic function registry and the standard States.* library

//! # Intrinsic Function Evaluation
//!
//! [`IntrinsicFunctionRegistry`] maps function names to handlers and evaluates
//! parsed [`IntrinsicFunction`] trees against an input document and a context
//! document.
//!
//! ## Evaluation Rules
//!
//! - `$$`-paths read the context document (one leading `$` is stripped, so
//!   `$$.Execution.Id` becomes `$.Execution.Id` on the context)
//! - `$`-paths read the input document
//! - a path that selects nothing is an error
//! - nested calls are evaluated eagerly, depth-first, left to right
//!
//! ## Rust Learning Notes:
//!
//! ### Trait Objects in a HashMap
//! Handlers are stored as `Arc<dyn Fn(...) + Send + Sync>`. Plain `fn` items
//! and closures both coerce into that type, so built-ins and user-registered
//! functions live in the same table.
//!
//! ### Borrowing Discipline Instead of Locks
//! `register`/`unregister` take `&mut self` and `call` takes `&self`. Once a
//! registry is populated it can be wrapped in an `Arc` and shared between
//! threads for concurrent calls; the borrow checker rules out mutation while
//! any call is in flight.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use lazy_static::lazy_static;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Number, Value};
use sha2::Digest;
use tracing::debug;

use crate::config::IntrinsicConfig;
use crate::models::condition::compare_numbers;
use crate::models::intrinsic::{IntrinsicFunction, IntrinsicParam};
use crate::models::path::select_token;
use crate::{Result, StatesLanguageError};

/// Signature every intrinsic function implements
///
/// The handler receives the unevaluated call (so it can inspect parameter
/// kinds) and a [`CallContext`] for resolving parameters into values.
pub type IntrinsicHandler =
    Arc<dyn Fn(&IntrinsicFunction, &CallContext<'_>) -> Result<Value> + Send + Sync>;

/// Everything a handler needs to resolve its parameters
pub struct CallContext<'a> {
    registry: &'a IntrinsicFunctionRegistry,
    input: &'a Value,
    context: &'a Value,
}

impl<'a> CallContext<'a> {
    pub fn input(&self) -> &Value {
        self.input
    }

    pub fn context(&self) -> &Value {
        self.context
    }

    pub fn config(&self) -> &IntrinsicConfig {
        &self.registry.config
    }

    /// Turn one parameter into a JSON value, evaluating nested calls
    pub fn resolve(&self, param: &IntrinsicParam) -> Result<Value> {
        match param {
            IntrinsicParam::Null => Ok(Value::Null),
            IntrinsicParam::Boolean(value) => Ok(Value::Bool(*value)),
            IntrinsicParam::String(value) => Ok(Value::String(value.clone())),
            IntrinsicParam::Integer(value) => Ok(Value::from(*value)),
            IntrinsicParam::Decimal(value) => Number::from_f64(*value)
                .map(Value::Number)
                .ok_or_else(|| {
                    StatesLanguageError::intrinsic(param.to_string(), "decimal is not a finite number")
                }),
            IntrinsicParam::Path(path) => self.resolve_path(path),
            IntrinsicParam::Function(function) => self.registry.invoke(function, self),
        }
    }

    /// Resolve every parameter of `function` in order
    pub fn resolve_all(&self, function: &IntrinsicFunction) -> Result<Vec<Value>> {
        function.params.iter().map(|param| self.resolve(param)).collect()
    }

    fn resolve_path(&self, path: &str) -> Result<Value> {
        let (document, expression) = if let Some(stripped) = path.strip_prefix('$') {
            if stripped.starts_with('$') {
                (self.context, stripped)
            } else {
                (self.input, path)
            }
        } else {
            return Err(StatesLanguageError::intrinsic(
                path,
                "path must start with '$' or '$$'",
            ));
        };

        select_token(document, expression)
            .cloned()
            .ok_or_else(|| StatesLanguageError::intrinsic(path, "path does not exist in the document"))
    }
}

/// Name → handler table for intrinsic functions
///
/// ```rust
/// use serde_json::{json, Value};
/// use states_language::{IntrinsicFunction, IntrinsicFunctionRegistry};
///
/// let mut registry = IntrinsicFunctionRegistry::with_builtins();
/// registry.register("My.Double", |function, ctx| {
///     let value = ctx.resolve(&function.params[0])?;
///     Ok(json!(value.as_i64().unwrap_or_default() * 2))
/// });
///
/// let function = IntrinsicFunction::parse("My.Double($.n)").unwrap();
/// assert_eq!(registry.call(&function, &json!({"n": 21}), &Value::Null).unwrap(), json!(42));
/// ```
#[derive(Clone)]
pub struct IntrinsicFunctionRegistry {
    functions: HashMap<String, IntrinsicHandler>,
    config: IntrinsicConfig,
}

impl fmt::Debug for IntrinsicFunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntrinsicFunctionRegistry")
            .field("functions", &self.list_function_names())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for IntrinsicFunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl IntrinsicFunctionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
            config: IntrinsicConfig::default(),
        }
    }

    /// A registry holding the standard `States.*` functions
    pub fn with_builtins() -> Self {
        Self::with_config(IntrinsicConfig::default())
    }

    /// Built-ins with explicit limits
    pub fn with_config(config: IntrinsicConfig) -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
            config,
        };

        registry.register("States.Format", format);
        registry.register("States.StringToJson", string_to_json);
        registry.register("States.JsonToString", json_to_string);
        registry.register("States.Array", array);
        registry.register("States.ArrayPartition", array_partition);
        registry.register("States.ArrayContains", array_contains);
        registry.register("States.ArrayRange", array_range);
        registry.register("States.ArrayGetItem", array_get_item);
        registry.register("States.ArrayLength", array_length);
        registry.register("States.ArrayUnique", array_unique);
        registry.register("States.Base64Encode", base64_encode);
        registry.register("States.Base64Decode", base64_decode);
        registry.register("States.Hash", hash);
        registry.register("States.JsonMerge", json_merge);
        registry.register("States.MathRandom", math_random);
        registry.register("States.MathAdd", math_add);
        registry.register("States.StringSplit", string_split);
        registry.register("States.UUID", uuid);

        registry
    }

    pub fn config(&self) -> &IntrinsicConfig {
        &self.config
    }

    /// Insert or replace a function
    pub fn register<S, F>(&mut self, name: S, handler: F)
    where
        S: Into<String>,
        F: Fn(&IntrinsicFunction, &CallContext<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!("Registering intrinsic function {}", name);
        self.functions.insert(name, Arc::new(handler));
    }

    /// Remove a function; returns whether it was registered
    pub fn unregister(&mut self, name: &str) -> bool {
        self.functions.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted
    pub fn list_function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Evaluate a parsed call
    pub fn call(&self, function: &IntrinsicFunction, input: &Value, context: &Value) -> Result<Value> {
        let ctx = CallContext {
            registry: self,
            input,
            context,
        };
        self.invoke(function, &ctx)
    }

    /// Parse `text` with this registry's nesting limit and evaluate it
    pub fn evaluate(&self, text: &str, input: &Value, context: &Value) -> Result<Value> {
        let function = IntrinsicFunction::parse_with_depth_limit(text, self.config.max_nesting_depth)?;
        self.call(&function, input, context)
    }

    fn invoke(&self, function: &IntrinsicFunction, ctx: &CallContext<'_>) -> Result<Value> {
        let handler = self.functions.get(&function.name).ok_or_else(|| {
            StatesLanguageError::UnknownIntrinsicFunction {
                name: function.name.clone(),
            }
        })?;
        debug!("Evaluating intrinsic function {}", function.name);
        handler(function, ctx)
    }
}

lazy_static! {
    static ref BUILTIN_REGISTRY: IntrinsicFunctionRegistry = IntrinsicFunctionRegistry::with_builtins();
}

/// Parse and evaluate `text` against the shared built-in registry
pub fn evaluate_expression(text: &str, input: &Value, context: &Value) -> Result<Value> {
    BUILTIN_REGISTRY.evaluate(text, input, context)
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn invalid(function: &IntrinsicFunction, reason: impl Into<String>) -> StatesLanguageError {
    StatesLanguageError::intrinsic(function.to_string(), reason)
}

fn expect_arity(function: &IntrinsicFunction, min: usize, max: usize) -> Result<()> {
    let count = function.params.len();
    if count < min || count > max {
        let expected = if min == max {
            format!("{}", min)
        } else if max == usize::MAX {
            format!("at least {}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(invalid(
            function,
            format!("expected {} argument(s), got {}", expected, count),
        ));
    }
    Ok(())
}

fn string_arg<'v>(function: &IntrinsicFunction, value: &'v Value, position: usize) -> Result<&'v str> {
    value
        .as_str()
        .ok_or_else(|| invalid(function, format!("argument {} must be a string", position + 1)))
}

fn integer_arg(function: &IntrinsicFunction, value: &Value, position: usize) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| invalid(function, format!("argument {} must be an integer", position + 1)))
}

fn array_arg<'v>(function: &IntrinsicFunction, value: &'v Value, position: usize) -> Result<&'v Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| invalid(function, format!("argument {} must be an array", position + 1)))
}

fn object_arg<'v>(
    function: &IntrinsicFunction,
    value: &'v Value,
    position: usize,
) -> Result<&'v Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| invalid(function, format!("argument {} must be an object", position + 1)))
}

// ---------------------------------------------------------------------------
// Built-in functions
// ---------------------------------------------------------------------------

/// `States.Format(template, args...)`
fn format(function: &IntrinsicFunction, ctx: &CallContext<'_>) -> Result<Value> {
    expect_arity(function, 1, usize::MAX)?;
    let values = ctx.resolve_all(function)?;
    let template = string_arg(function, &values[0], 0)?;
    let args = &values[1..];

    let mut output = String::new();
    let mut next_arg = 0usize;
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                output.push(c);
                if let Some(escaped) = chars.next() {
                    output.push(escaped);
                }
            }
            '{' if chars.peek() == Some(&'}') => {
                chars.next();
                let arg = args.get(next_arg).ok_or_else(|| {
                    invalid(
                        function,
                        format!("template has more placeholders than the {} argument(s) given", args.len()),
                    )
                })?;
                output.push_str(&format_scalar(function, arg, next_arg + 1)?);
                next_arg += 1;
            }
            _ => output.push(c),
        }
    }

    if next_arg != args.len() {
        return Err(invalid(
            function,
            format!(
                "template has {} placeholder(s) but {} argument(s) were given",
                next_arg,
                args.len()
            ),
        ));
    }

    Ok(Value::String(output.replace("\\{", "{").replace("\\}", "}")))
}

fn format_scalar(function: &IntrinsicFunction, value: &Value, position: usize) -> Result<String> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        Value::Null => Ok("null".to_string()),
        Value::Array(_) | Value::Object(_) => Err(invalid(
            function,
            format!("argument {} must be a string, number, boolean or null", position + 1),
        )),
    }
}

/// `States.StringToJson(string)`
fn string_to_json(function: &IntrinsicFunction, ctx: &CallContext<'_>) -> Result<Value> {
    expect_arity(function, 1, 1)?;
    if !matches!(
        function.params[0],
        IntrinsicParam::String(_) | IntrinsicParam::Function(_)
    ) {
        return Err(invalid(function, "argument must be a string literal or a function"));
    }
    let value = ctx.resolve(&function.params[0])?;
    let text = string_arg(function, &value, 0)?;
    serde_json::from_str(text).map_err(|err| invalid(function, format!("argument is not valid JSON: {}", err)))
}

/// `States.JsonToString(path)`
fn json_to_string(function: &IntrinsicFunction, ctx: &CallContext<'_>) -> Result<Value> {
    expect_arity(function, 1, 1)?;
    if !matches!(function.params[0], IntrinsicParam::Path(_)) {
        return Err(invalid(function, "argument must be a path"));
    }
    let value = ctx.resolve(&function.params[0])?;
    Ok(Value::String(serde_json::to_string(&value)?))
}

/// `States.Array(values...)`
fn array(function: &IntrinsicFunction, ctx: &CallContext<'_>) -> Result<Value> {
    Ok(Value::Array(ctx.resolve_all(function)?))
}

/// `States.ArrayPartition(array, size)`
fn array_partition(function: &IntrinsicFunction, ctx: &CallContext<'_>) -> Result<Value> {
    expect_arity(function, 2, 2)?;
    let values = ctx.resolve_all(function)?;
    let items = array_arg(function, &values[0], 0)?;
    let size = integer_arg(function, &values[1], 1)?;
    if size <= 0 {
        return Err(invalid(function, "chunk size must be greater than zero"));
    }
    Ok(Value::Array(
        items
            .chunks(size as usize)
            .map(|chunk| Value::Array(chunk.to_vec()))
            .collect(),
    ))
}

/// `States.ArrayContains(array, value)`
fn array_contains(function: &IntrinsicFunction, ctx: &CallContext<'_>) -> Result<Value> {
    expect_arity(function, 2, 2)?;
    let values = ctx.resolve_all(function)?;
    let items = array_arg(function, &values[0], 0)?;
    Ok(Value::Bool(items.iter().any(|item| json_equals(item, &values[1]))))
}

/// `States.ArrayRange(start, end, step)`, both ends inclusive
fn array_range(function: &IntrinsicFunction, ctx: &CallContext<'_>) -> Result<Value> {
    expect_arity(function, 3, 3)?;
    let values = ctx.resolve_all(function)?;
    let start = integer_arg(function, &values[0], 0)? as i128;
    let end = integer_arg(function, &values[1], 1)? as i128;
    let step = integer_arg(function, &values[2], 2)? as i128;
    if step == 0 {
        return Err(invalid(function, "step must not be zero"));
    }

    let count = if (step > 0 && start <= end) || (step < 0 && start >= end) {
        (end - start) / step + 1
    } else {
        0
    };
    let limit = ctx.config().max_array_range_items;
    if count > limit as i128 {
        return Err(invalid(
            function,
            format!("range would produce {} items, more than the limit of {}", count, limit),
        ));
    }

    Ok(Value::Array(
        (0..count)
            .map(|index| Value::from((start + index * step) as i64))
            .collect(),
    ))
}

/// `States.ArrayGetItem(array, index)`
fn array_get_item(function: &IntrinsicFunction, ctx: &CallContext<'_>) -> Result<Value> {
    expect_arity(function, 2, 2)?;
    let values = ctx.resolve_all(function)?;
    let items = array_arg(function, &values[0], 0)?;
    let index = integer_arg(function, &values[1], 1)?;
    usize::try_from(index)
        .ok()
        .and_then(|index| items.get(index))
        .cloned()
        .ok_or_else(|| {
            invalid(
                function,
                format!("index {} is out of bounds for an array of length {}", index, items.len()),
            )
        })
}

/// `States.ArrayLength(array)`
fn array_length(function: &IntrinsicFunction, ctx: &CallContext<'_>) -> Result<Value> {
    expect_arity(function, 1, 1)?;
    let values = ctx.resolve_all(function)?;
    Ok(Value::from(array_arg(function, &values[0], 0)?.len()))
}

/// `States.ArrayUnique(array)`, keeping first occurrences in order
fn array_unique(function: &IntrinsicFunction, ctx: &CallContext<'_>) -> Result<Value> {
    expect_arity(function, 1, 1)?;
    let values = ctx.resolve_all(function)?;
    let items = array_arg(function, &values[0], 0)?;

    let mut unique: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !unique.iter().any(|seen| json_equals(seen, item)) {
            unique.push(item.clone());
        }
    }
    Ok(Value::Array(unique))
}

/// Structural equality where numbers compare by value, so `7` equals `7.0`
fn json_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => {
            compare_numbers(left, right) == Some(Ordering::Equal)
        }
        (Value::Array(left), Value::Array(right)) => {
            left.len() == right.len() && left.iter().zip(right).all(|(l, r)| json_equals(l, r))
        }
        (Value::Object(left), Value::Object(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .all(|(key, value)| right.get(key).map_or(false, |other| json_equals(value, other)))
        }
        (left, right) => left == right,
    }
}

/// `States.Base64Encode(string)`
fn base64_encode(function: &IntrinsicFunction, ctx: &CallContext<'_>) -> Result<Value> {
    expect_arity(function, 1, 1)?;
    let values = ctx.resolve_all(function)?;
    let text = string_arg(function, &values[0], 0)?;
    Ok(Value::String(BASE64.encode(text.as_bytes())))
}

/// `States.Base64Decode(string)`
fn base64_decode(function: &IntrinsicFunction, ctx: &CallContext<'_>) -> Result<Value> {
    expect_arity(function, 1, 1)?;
    let values = ctx.resolve_all(function)?;
    let text = string_arg(function, &values[0], 0)?;
    let bytes = BASE64
        .decode(text)
        .map_err(|err| invalid(function, format!("argument is not valid base64: {}", err)))?;
    String::from_utf8(bytes)
        .map(Value::String)
        .map_err(|_| invalid(function, "decoded bytes are not valid UTF-8"))
}

/// `States.Hash(data, algorithm)`
fn hash(function: &IntrinsicFunction, ctx: &CallContext<'_>) -> Result<Value> {
    expect_arity(function, 2, 2)?;
    let values = ctx.resolve_all(function)?;
    let data = match &values[0] {
        Value::String(text) => text.clone(),
        other => serde_json::to_string(other)?,
    };
    let algorithm = string_arg(function, &values[1], 1)?;

    let digest = match algorithm {
        "MD5" => hex::encode(md5::Md5::digest(data.as_bytes())),
        "SHA-1" => hex::encode(sha1::Sha1::digest(data.as_bytes())),
        "SHA-256" => hex::encode(sha2::Sha256::digest(data.as_bytes())),
        "SHA-384" => hex::encode(sha2::Sha384::digest(data.as_bytes())),
        "SHA-512" => hex::encode(sha2::Sha512::digest(data.as_bytes())),
        other => {
            return Err(invalid(
                function,
                format!(
                    "unsupported hash algorithm '{}' (expected MD5, SHA-1, SHA-256, SHA-384 or SHA-512)",
                    other
                ),
            ))
        }
    };
    Ok(Value::String(digest))
}

/// `States.JsonMerge(left, right, deep)`
fn json_merge(function: &IntrinsicFunction, ctx: &CallContext<'_>) -> Result<Value> {
    expect_arity(function, 3, 3)?;
    let values = ctx.resolve_all(function)?;
    let left = object_arg(function, &values[0], 0)?;
    let right = object_arg(function, &values[1], 1)?;
    let deep = values[2]
        .as_bool()
        .ok_or_else(|| invalid(function, "argument 3 must be a boolean"))?;

    let mut merged = left.clone();
    merge_into(&mut merged, right, deep);
    Ok(Value::Object(merged))
}

fn merge_into(target: &mut Map<String, Value>, source: &Map<String, Value>, deep: bool) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) if deep => {
                merge_into(existing, incoming, deep);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// `States.MathRandom(min, max[, seed])`, both bounds inclusive
fn math_random(function: &IntrinsicFunction, ctx: &CallContext<'_>) -> Result<Value> {
    expect_arity(function, 2, 3)?;
    let values = ctx.resolve_all(function)?;
    let min = integer_arg(function, &values[0], 0)?;
    let max = integer_arg(function, &values[1], 1)?;
    if min > max {
        return Err(invalid(
            function,
            format!("lower bound {} is greater than upper bound {}", min, max),
        ));
    }

    let value = match values.get(2) {
        Some(seed) => {
            let seed = integer_arg(function, seed, 2)?;
            StdRng::seed_from_u64(seed as u64).gen_range(min..=max)
        }
        None => rand::thread_rng().gen_range(min..=max),
    };
    Ok(Value::from(value))
}

/// `States.MathAdd(a, b)`
fn math_add(function: &IntrinsicFunction, ctx: &CallContext<'_>) -> Result<Value> {
    expect_arity(function, 2, 2)?;
    let values = ctx.resolve_all(function)?;
    let (left, right) = match (&values[0], &values[1]) {
        (Value::Number(left), Value::Number(right)) => (left, right),
        _ => return Err(invalid(function, "both arguments must be numbers")),
    };

    if let (Some(left), Some(right)) = (left.as_i64(), right.as_i64()) {
        return left
            .checked_add(right)
            .map(Value::from)
            .ok_or_else(|| invalid(function, "integer overflow"));
    }

    let sum = left.as_f64().unwrap_or_default() + right.as_f64().unwrap_or_default();
    Number::from_f64(sum)
        .map(Value::Number)
        .ok_or_else(|| invalid(function, "result is not a finite number"))
}

/// `States.StringSplit(string, delimiters)`; every character of
/// `delimiters` separates, empty pieces are dropped
fn string_split(function: &IntrinsicFunction, ctx: &CallContext<'_>) -> Result<Value> {
    expect_arity(function, 2, 2)?;
    let values = ctx.resolve_all(function)?;
    let text = string_arg(function, &values[0], 0)?;
    let delimiters: Vec<char> = string_arg(function, &values[1], 1)?.chars().collect();

    Ok(Value::Array(
        text.split(|c: char| delimiters.contains(&c))
            .filter(|piece| !piece.is_empty())
            .map(|piece| Value::String(piece.to_string()))
            .collect(),
    ))
}

/// `States.UUID()`
fn uuid(function: &IntrinsicFunction, _ctx: &CallContext<'_>) -> Result<Value> {
    expect_arity(function, 0, 0)?;
    Ok(Value::String(uuid::Uuid::new_v4().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(text: &str, input: Value) -> Result<Value> {
        evaluate_expression(text, &input, &json!({}))
    }

    fn assert_invalid(result: Result<Value>) {
        assert!(
            matches!(result, Err(StatesLanguageError::InvalidIntrinsicFunction { .. })),
            "expected InvalidIntrinsicFunction, got {:?}",
            result
        );
    }

    #[test]
    fn test_format() {
        assert_eq!(eval("States.Format('hello {}', 'world')", json!({})).unwrap(), json!("hello world"));
        assert_eq!(
            evaluate_expression("States.Format('{} {}', $.a, $$.b)", &json!({"a": "hello"}), &json!({"b": "world"}))
                .unwrap(),
            json!("hello world")
        );
        assert_eq!(
            eval("States.Format('{} is {} ({})', $.n, true, null)", json!({"n": 1.5})).unwrap(),
            json!("1.5 is true (null)")
        );
    }

    #[test]
    fn test_format_escapes_and_errors() {
        assert_eq!(
            eval(r"States.Format('\{\} means {}', 'nothing')", json!({})).unwrap(),
            json!("{} means nothing")
        );
        assert_invalid(eval("States.Format('{} {}', 'one')", json!({})));
        assert_invalid(eval("States.Format('{}', 'one', 'two')", json!({})));
        assert_invalid(eval("States.Format('{}', $.obj)", json!({"obj": {"a": 1}})));
        assert_invalid(eval("States.Format(42)", json!({})));
    }

    #[test]
    fn test_json_string_round_trip() {
        let input = json!({"payload": {"a": [1, 2, {"b": null}]}});
        let text = eval("States.JsonToString($.payload)", input.clone()).unwrap();
        assert_eq!(text, json!(r#"{"a":[1,2,{"b":null}]}"#));

        let parsed = eval("States.StringToJson(States.JsonToString($.payload))", input.clone()).unwrap();
        assert_eq!(parsed, input["payload"]);

        assert_invalid(eval("States.JsonToString('literal')", json!({})));
        assert_invalid(eval("States.StringToJson(42)", json!({})));
        assert_invalid(eval("States.StringToJson('{not json')", json!({})));
    }

    #[test]
    fn test_array_builds_and_keeps_nulls() {
        assert_eq!(
            eval("States.Array(1, null, 'x', $.v, States.Array())", json!({"v": true})).unwrap(),
            json!([1, null, "x", true, []])
        );
    }

    #[test]
    fn test_array_range() {
        assert_eq!(eval("States.ArrayRange(41, 48, 2)", json!({})).unwrap(), json!([41, 43, 45, 47]));
        assert_eq!(eval("States.ArrayRange(48, 41, -2)", json!({})).unwrap(), json!([48, 46, 44, 42]));
        assert_eq!(eval("States.ArrayRange(1, 5, -1)", json!({})).unwrap(), json!([]));
        assert_eq!(eval("States.ArrayRange(3, 3, 1)", json!({})).unwrap(), json!([3]));
        assert_invalid(eval("States.ArrayRange(1, 5, 0)", json!({})));
        assert_invalid(eval("States.ArrayRange(0, 5000, 1)", json!({})));
    }

    #[test]
    fn test_array_range_limit_is_configurable() {
        let registry = IntrinsicFunctionRegistry::with_config(IntrinsicConfig {
            max_array_range_items: 3,
            ..Default::default()
        });
        assert!(registry.evaluate("States.ArrayRange(1, 3, 1)", &json!({}), &json!({})).is_ok());
        assert_invalid(registry.evaluate("States.ArrayRange(1, 4, 1)", &json!({}), &json!({})));
    }

    #[test]
    fn test_array_membership_compares_numbers_by_value() {
        let input = json!({
            "floats": [7.0, 2.5],
            "nested": [{"n": 1.0, "tags": [3.0]}],
            "wanted": {"n": 1, "tags": [3]},
            "mixed": [1, 1.0, 2]
        });
        assert_eq!(eval("States.ArrayContains($.floats, 7)", input.clone()).unwrap(), json!(true));
        assert_eq!(eval("States.ArrayContains($.floats, 2)", input.clone()).unwrap(), json!(false));
        assert_eq!(eval("States.ArrayContains($.nested, $.wanted)", input.clone()).unwrap(), json!(true));
        assert_eq!(eval("States.ArrayUnique($.mixed)", input).unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_array_utilities() {
        let input = json!({"array": [1, 2, 2, 2, 7, -13, -5]});
        let unique = eval("States.ArrayUnique($.array)", input.clone()).unwrap();
        let mut unique_items: Vec<i64> = unique.as_array().unwrap().iter().map(|v| v.as_i64().unwrap()).collect();
        unique_items.sort();
        assert_eq!(unique_items, vec![-13, -5, 1, 2, 7]);
        assert_eq!(unique, json!([1, 2, 7, -13, -5]));

        assert_eq!(eval("States.ArrayLength($.array)", input.clone()).unwrap(), json!(7));
        assert_eq!(eval("States.ArrayContains($.array, 7)", input.clone()).unwrap(), json!(true));
        assert_eq!(eval("States.ArrayContains($.array, 8)", input.clone()).unwrap(), json!(false));
        assert_eq!(eval("States.ArrayGetItem($.array, 4)", input.clone()).unwrap(), json!(7));
        assert_invalid(eval("States.ArrayGetItem($.array, 7)", input.clone()));
        assert_invalid(eval("States.ArrayGetItem($.array, -1)", input.clone()));
        assert_eq!(
            eval("States.ArrayPartition($.array, 3)", input.clone()).unwrap(),
            json!([[1, 2, 2], [2, 7, -13], [-5]])
        );
        assert_invalid(eval("States.ArrayPartition($.array, 0)", input.clone()));
        assert_invalid(eval("States.ArrayLength('nope')", input));
    }

    #[test]
    fn test_base64() {
        assert_eq!(eval("States.Base64Encode('Data to encode')", json!({})).unwrap(), json!("RGF0YSB0byBlbmNvZGU="));
        assert_eq!(eval("States.Base64Decode('RGF0YSB0byBlbmNvZGU=')", json!({})).unwrap(), json!("Data to encode"));
        assert_invalid(eval("States.Base64Decode('***')", json!({})));
    }

    #[test]
    fn test_hash() {
        assert_eq!(
            eval("States.Hash('abc', 'SHA-256')", json!({})).unwrap(),
            json!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        assert_eq!(
            eval("States.Hash('abc', 'MD5')", json!({})).unwrap(),
            json!("900150983cd24fb0d6963f7d28e17f72")
        );
        assert_eq!(
            eval("States.Hash('abc', 'SHA-1')", json!({})).unwrap(),
            json!("a9993e364706816aba3e25717850c26c9cd0d89d")
        );
        for algorithm in ["SHA-384", "SHA-512"] {
            let text = format!("States.Hash('abc', '{}')", algorithm);
            assert!(eval(&text, json!({})).is_ok());
        }
        assert_invalid(eval("States.Hash('abc', 'CRC32')", json!({})));
    }

    #[test]
    fn test_json_merge_shallow_and_deep() {
        let input = json!({
            "a": {"x": {"p": 1, "q": 2}, "keep": true},
            "b": {"x": {"q": 3}, "new": 1}
        });
        assert_eq!(
            eval("States.JsonMerge($.a, $.b, false)", input.clone()).unwrap(),
            json!({"x": {"q": 3}, "keep": true, "new": 1})
        );
        assert_eq!(
            eval("States.JsonMerge($.a, $.b, true)", input.clone()).unwrap(),
            json!({"x": {"p": 1, "q": 3}, "keep": true, "new": 1})
        );
        assert_invalid(eval("States.JsonMerge($.a, 1, false)", input));
    }

    #[test]
    fn test_math_random_is_inclusive_and_seedable() {
        let first = eval("States.MathRandom(1, 100, 42)", json!({})).unwrap();
        let second = eval("States.MathRandom(1, 100, 42)", json!({})).unwrap();
        assert_eq!(first, second);
        let value = first.as_i64().unwrap();
        assert!((1..=100).contains(&value));

        assert_eq!(eval("States.MathRandom(7, 7)", json!({})).unwrap(), json!(7));
        assert_invalid(eval("States.MathRandom(10, 1)", json!({})));
    }

    #[test]
    fn test_math_add() {
        assert_eq!(eval("States.MathAdd(111, -1)", json!({})).unwrap(), json!(110));
        assert_eq!(eval("States.MathAdd($.a, 0.5)", json!({"a": 1})).unwrap(), json!(1.5));
        assert_invalid(eval("States.MathAdd(9223372036854775807, 1)", json!({})));
        assert_invalid(eval("States.MathAdd('1', 1)", json!({})));
    }

    #[test]
    fn test_string_split() {
        assert_eq!(
            eval("States.StringSplit('1,2,,3;4', ',;')", json!({})).unwrap(),
            json!(["1", "2", "3", "4"])
        );
    }

    #[test]
    fn test_uuid_is_v4_and_unique() {
        let first = eval("States.UUID()", json!({})).unwrap();
        let second = eval("States.UUID()", json!({})).unwrap();
        assert_ne!(first, second);
        let parsed = uuid::Uuid::parse_str(first.as_str().unwrap()).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
        assert_invalid(eval("States.UUID(1)", json!({})));
    }

    #[test]
    fn test_path_resolution() {
        let input = json!({"a": {"b": [10, 20]}});
        let context = json!({"Execution": {"Id": "exec-1"}});
        assert_eq!(
            evaluate_expression("States.Array($.a.b[1], $$.Execution.Id)", &input, &context).unwrap(),
            json!([20, "exec-1"])
        );
        assert_invalid(evaluate_expression("States.Array($.missing)", &input, &context));
    }

    #[test]
    fn test_register_and_unregister() {
        let mut registry = IntrinsicFunctionRegistry::new();
        assert!(registry.list_function_names().is_empty());

        let function = IntrinsicFunction::parse("Custom.Echo($.v)").unwrap();
        assert!(matches!(
            registry.call(&function, &json!({"v": 1}), &json!({})),
            Err(StatesLanguageError::UnknownIntrinsicFunction { .. })
        ));

        registry.register("Custom.Echo", |function, ctx| ctx.resolve(&function.params[0]));
        assert!(registry.contains("Custom.Echo"));
        assert_eq!(registry.call(&function, &json!({"v": 1}), &json!({})).unwrap(), json!(1));

        registry.register("Custom.Echo", |_, _| Ok(json!("replaced")));
        assert_eq!(registry.call(&function, &json!({"v": 1}), &json!({})).unwrap(), json!("replaced"));

        assert!(registry.unregister("Custom.Echo"));
        assert!(!registry.unregister("Custom.Echo"));
        assert!(!registry.contains("Custom.Echo"));
    }

    #[test]
    fn test_builtins_are_listed() {
        let names = IntrinsicFunctionRegistry::with_builtins().list_function_names();
        assert_eq!(names.len(), 18);
        assert!(names.contains(&"States.Format".to_string()));
        assert!(names.contains(&"States.UUID".to_string()));
    }

    #[test]
    fn test_nested_unknown_function_fails() {
        assert!(matches!(
            eval("States.Array(Nope.Fn())", json!({})),
            Err(StatesLanguageError::UnknownIntrinsicFunction { .. })
        ));
    }

    #[test]
    fn test_registry_is_shareable_across_threads() {
        let registry = Arc::new(IntrinsicFunctionRegistry::with_builtins());
        let handles: Vec<_> = (0..4)
            .map(|n| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry
                        .evaluate("States.MathAdd($.n, 1)", &json!({"n": n}), &json!({}))
                        .unwrap()
                })
            })
            .collect();
        let results: Vec<Value> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results, vec![json!(1), json!(2), json!(3), json!(4)]);
    }
}
