//! Merge reducers for blackboard keys.
//!
//! A reducer combines the value already stored under a key with an
//! incoming one. Built-ins are pure and total over JSON values: inputs
//! outside a reducer's natural domain are coerced rather than rejected.

use std::cmp::Ordering;

use serde_json::{Number, Value};

/// Binary merge applied by [`crate::blackboard::Blackboard::merge`].
pub trait Reducer: Send + Sync {
    /// Combine the stored value with an incoming one.
    fn merge(&self, current: &Value, incoming: Value) -> Value;

    /// Reducer name for logging.
    fn name(&self) -> &str;
}

/// Concatenates sequences. `null` counts as empty, a scalar as a
/// one-element sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListAppend;

impl Reducer for ListAppend {
    fn merge(&self, current: &Value, incoming: Value) -> Value {
        let mut merged = into_sequence(current.clone());
        merged.extend(into_sequence(incoming));
        Value::Array(merged)
    }

    fn name(&self) -> &str {
        "list_append"
    }
}

/// Keeps the larger number. A non-numeric side loses to a numeric one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericMax;

impl Reducer for NumericMax {
    fn merge(&self, current: &Value, incoming: Value) -> Value {
        match compare_numbers(current, &incoming) {
            Some(Ordering::Less) => incoming,
            Some(_) => current.clone(),
            None if current.is_number() => current.clone(),
            None => incoming,
        }
    }

    fn name(&self) -> &str {
        "numeric_max"
    }
}

/// Union of two sets encoded as JSON arrays, keeping first-seen order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetUnion;

impl Reducer for SetUnion {
    fn merge(&self, current: &Value, incoming: Value) -> Value {
        let mut merged: Vec<Value> = Vec::new();
        for item in into_sequence(current.clone())
            .into_iter()
            .chain(into_sequence(incoming))
        {
            if !merged.contains(&item) {
                merged.push(item);
            }
        }
        Value::Array(merged)
    }

    fn name(&self) -> &str {
        "set_union"
    }
}

/// Adds numbers, staying in integers while both sides are integers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericSum;

impl Reducer for NumericSum {
    fn merge(&self, current: &Value, incoming: Value) -> Value {
        if let (Some(a), Some(b)) = (as_integer(current), as_integer(&incoming)) {
            if let Some(sum) = a.checked_add(b) {
                return Value::Number(sum.into());
            }
        }
        let a = current.as_f64().unwrap_or(0.0);
        let b = incoming.as_f64().unwrap_or(0.0);
        Number::from_f64(a + b).map_or(Value::Null, Value::Number)
    }

    fn name(&self) -> &str {
        "numeric_sum"
    }
}

/// Adapter turning a closure into a [`Reducer`].
pub struct FnReducer<F> {
    name: String,
    merge_fn: F,
}

impl<F> FnReducer<F>
where
    F: Fn(&Value, Value) -> Value + Send + Sync,
{
    pub fn new(name: impl Into<String>, merge_fn: F) -> Self {
        Self {
            name: name.into(),
            merge_fn,
        }
    }
}

impl<F> Reducer for FnReducer<F>
where
    F: Fn(&Value, Value) -> Value + Send + Sync,
{
    fn merge(&self, current: &Value, incoming: Value) -> Value {
        (self.merge_fn)(current, incoming)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Order two JSON numbers, exactly when both are integers.
///
/// `None` if either side is not a number.
fn compare_numbers(a: &Value, b: &Value) -> Option<Ordering> {
    match (as_wide_integer(a), as_wide_integer(b)) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

fn as_wide_integer(value: &Value) -> Option<i128> {
    value
        .as_i64()
        .map(i128::from)
        .or_else(|| value.as_u64().map(i128::from))
}

/// Integer view of a value; non-numbers count as zero.
fn as_integer(value: &Value) -> Option<i64> {
    if value.is_number() {
        value.as_i64()
    } else {
        Some(0)
    }
}

fn into_sequence(value: Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    }
}
