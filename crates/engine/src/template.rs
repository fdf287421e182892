//! # Template Evaluation
//!
//! Property strings may contain `${...}` expressions that are resolved against
//! an [`EvaluationContext`] just before a node executes.
//!
//! ## Syntax
//!
//! - `${a.b.0.c}` navigates data entries: map keys, list indices, or object
//!   attributes. Any miss along the way yields null.
//! - `${fn(x,y)}` calls a host function bound under `fn` with the raw
//!   argument texts `"x"` and `"y"`.
//! - Expressions nest: in `${state.${env.key}}` the inner expression is
//!   resolved first and its text becomes part of the outer path.
//!
//! A string that consists of exactly one expression evaluates to the
//! expression's value with its type preserved. Anywhere else the value is
//! spliced into the surrounding text.
//!
//! ```rust
//! use nodeflow_engine::{EvaluationContext, template::evaluate_template};
//! use serde_json::json;
//!
//! let mut context = EvaluationContext::new();
//! context.insert("state", json!({"count": 3, "name": "posts"}));
//!
//! assert_eq!(evaluate_template("${state.count}", &context), json!(3));
//! assert_eq!(evaluate_template("${state.name}: ${state.count}", &context), json!("posts: 3"));
//! ```

use serde_json::{Map, Value};
use tracing::warn;

use nodeflow_util::coerce::stringify;

use crate::context::{ContextValue, EvaluationContext};

const OPEN: &str = "${";
const CLOSE: char = '}';

/// Evaluates every `${...}` expression in `input`.
///
/// Strings without an expression come back unchanged. An unterminated `${`
/// is left as literal text.
pub fn evaluate_template(input: &str, context: &EvaluationContext) -> Value {
    let mut text = input.to_string();
    let mut start = 0;
    // Each splice strictly removes a `${`, so the input length bounds the work.
    let mut splices_left = input.len() + 1;

    while let Some(offset) = text[start..].find(OPEN) {
        let open = start + offset;
        let Some(close_offset) = text[open..].find(CLOSE) else {
            break;
        };
        let close = open + close_offset;
        let body_start = open + OPEN.len();

        if let Some(inner) = text[body_start..close].rfind(OPEN) {
            start = body_start + inner;
            continue;
        }

        let resolved = resolve_expression(&text[body_start..close], context);
        if open == 0 && close + 1 == text.len() {
            return resolved;
        }
        if splices_left == 0 {
            warn!(template = input, "template expansion did not converge; returning partial text");
            break;
        }
        splices_left -= 1;
        text.replace_range(open..=close, &stringify(&resolved));
        start = 0;
    }
    Value::String(text)
}

/// Evaluates templates inside `value` in place, recursing through lists and maps.
pub fn evaluate_value(value: &mut Value, context: &EvaluationContext) {
    match value {
        Value::String(text) => {
            if text.contains(OPEN) {
                *value = evaluate_template(text, context);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|item| evaluate_value(item, context)),
        Value::Object(map) => map.values_mut().for_each(|item| evaluate_value(item, context)),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Returns an evaluated copy of a node's property map.
pub fn evaluate_properties(properties: &Map<String, Value>, context: &EvaluationContext) -> Map<String, Value> {
    let mut resolved = properties.clone();
    resolved.values_mut().for_each(|value| evaluate_value(value, context));
    resolved
}

/// Resolves the body of a single `${...}` expression.
pub fn resolve_expression(expression: &str, context: &EvaluationContext) -> Value {
    if let Some((name, rest)) = expression.split_once('(')
        && let Some(ContextValue::Function(function)) = context.get(name)
    {
        let raw_arguments = rest.strip_suffix(')').unwrap_or(rest);
        let arguments: Vec<&str> = if raw_arguments.is_empty() {
            Vec::new()
        } else {
            raw_arguments.split(',').collect()
        };
        return function.call(&arguments);
    }

    let mut segments = expression.split('.');
    let root = segments.next().unwrap_or_default();
    match context.get(root) {
        None | Some(ContextValue::Function(_)) => Value::Null,
        Some(ContextValue::Data(value)) => navigate(value, segments),
        Some(ContextValue::Object(object)) => match segments.next() {
            None => object.snapshot(),
            Some(attribute) => match object.attribute(attribute) {
                Some(value) => navigate(&value, segments),
                None => Value::Null,
            },
        },
    }
}

fn navigate<'a>(root: &Value, segments: impl Iterator<Item = &'a str>) -> Value {
    let mut current = root;
    for segment in segments {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|index| items.get(index)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Value::Null,
        }
    }
    current.clone()
}
