// Payload templates - Parameters and ResultSelector rendering

//! # Payload Templates
//!
//! `Parameters` and `ResultSelector` hold JSON templates. A key ending in
//! `.$` marks a dynamic value: the `.$` is dropped from the output key and the
//! string value is either a path (`$.order.id`, `$$.Execution.Id`) or an
//! intrinsic function call (`States.Format('{}', $.name)`). Every other value
//! is copied as-is, recursing into nested objects and arrays.
//!
//! ```rust
//! use serde_json::json;
//! use states_language::{render_payload, IntrinsicFunctionRegistry};
//!
//! let template = json!({"greeting.$": "States.Format('hi {}', $.name)", "fixed": 1});
//! let registry = IntrinsicFunctionRegistry::with_builtins();
//! let rendered = render_payload(&template, &json!({"name": "Ada"}), &json!({}), &registry).unwrap();
//! assert_eq!(rendered, json!({"greeting": "hi Ada", "fixed": 1}));
//! ```

use serde_json::{Map, Value};

use super::intrinsics::IntrinsicFunctionRegistry;
use crate::models::intrinsic::IntrinsicFunction;
use crate::models::path::{is_valid_json_path, select_token};
use crate::{Result, StatesLanguageError};

const DYNAMIC_SUFFIX: &str = ".$";

/// Render a template against the input and context documents
pub fn render_payload(
    template: &Value,
    input: &Value,
    context: &Value,
    registry: &IntrinsicFunctionRegistry,
) -> Result<Value> {
    match template {
        Value::Object(fields) => {
            let mut rendered = Map::with_capacity(fields.len());
            for (key, value) in fields {
                match key.strip_suffix(DYNAMIC_SUFFIX) {
                    Some(name) => {
                        let expression = value.as_str().ok_or_else(|| {
                            StatesLanguageError::InvalidDefinition(format!(
                                "the value of '{}' must be a string",
                                key
                            ))
                        })?;
                        rendered.insert(
                            name.to_string(),
                            render_expression(expression, input, context, registry)?,
                        );
                    }
                    None => {
                        rendered.insert(key.clone(), render_payload(value, input, context, registry)?);
                    }
                }
            }
            Ok(Value::Object(rendered))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| render_payload(item, input, context, registry))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

fn render_expression(
    expression: &str,
    input: &Value,
    context: &Value,
    registry: &IntrinsicFunctionRegistry,
) -> Result<Value> {
    if !expression.starts_with('$') {
        return registry.evaluate(expression, input, context);
    }

    let (document, path) = match expression.strip_prefix("$$") {
        Some(rest) => (context, format!("${}", rest)),
        None => (input, expression.to_string()),
    };
    select_token(document, &path)
        .cloned()
        .ok_or_else(|| StatesLanguageError::InvalidReferencePath {
            path: expression.to_string(),
            reason: "path does not select a value".to_string(),
        })
}

/// Static check of a template: every `.$` value must be a path or an
/// intrinsic function. Returns one message per offending key.
pub(crate) fn template_problems(template: &Value, max_intrinsic_depth: usize) -> Vec<String> {
    let mut problems = Vec::new();
    collect_template_problems(template, max_intrinsic_depth, &mut problems);
    problems
}

fn collect_template_problems(template: &Value, max_depth: usize, problems: &mut Vec<String>) {
    match template {
        Value::Object(fields) => {
            for (key, value) in fields {
                if !key.ends_with(DYNAMIC_SUFFIX) {
                    collect_template_problems(value, max_depth, problems);
                    continue;
                }
                match value.as_str() {
                    Some(expression) if expression.starts_with('$') => {
                        if !is_valid_json_path(expression) {
                            problems.push(format!(
                                "'{}' is not a valid path: {}",
                                key, expression
                            ));
                        }
                    }
                    Some(expression) => {
                        if let Err(err) = IntrinsicFunction::parse_with_depth_limit(expression, max_depth) {
                            problems.push(format!("'{}' is not a valid intrinsic function: {}", key, err));
                        }
                    }
                    None => problems.push(format!(
                        "'{}' must hold a path or an intrinsic function string",
                        key
                    )),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_template_problems(item, max_depth, problems);
            }
        }
        _ => {}
    }
}
