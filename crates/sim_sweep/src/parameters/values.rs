use std::fmt;

use serde::{Deserialize, Serialize};

/// A single parameter value handed to the simulator.
///
/// Floats always render with a decimal point (`90.0`, not `90`) so a build-time
/// definition keeps its floating type on the C side and the persisted text parses
/// back to the same variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(value) => Some(*value as f64),
            ParamValue::Float(value) => Some(*value),
            ParamValue::Text(_) => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, ParamValue::Text(_))
    }

    /// Parse persisted text: integer first, then float, otherwise text.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if let Ok(value) = trimmed.parse::<i64>() {
            return ParamValue::Int(value);
        }
        if let Ok(value) = trimmed.parse::<f64>() {
            return ParamValue::Float(value);
        }
        ParamValue::Text(trimmed.to_string())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(value) => write!(f, "{value}"),
            ParamValue::Float(value) => f.write_str(&format_float(*value)),
            ParamValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

/// Shortest text that parses back to exactly the same `f64`, always keeping a
/// decimal point or exponent.
pub fn format_float(value: f64) -> String {
    format!("{value:?}")
}

/// The set of values one swept dimension takes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Values {
    /// `start, start + step, ...` strictly below `stop`.
    IntRange { start: i64, stop: i64, step: i64 },
    /// Float counterpart of `IntRange`; the i-th value is `start + i * step`.
    FloatRange { start: f64, stop: f64, step: f64 },
    /// Explicit values, kept in the given order.
    List { values: Vec<ParamValue> },
}

impl Values {
    pub fn range(start: i64, stop: i64, step: i64) -> Self {
        Values::IntRange { start, stop, step }
    }

    pub fn float_range(start: f64, stop: f64, step: f64) -> Self {
        Values::FloatRange { start, stop, step }
    }

    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParamValue>,
    {
        Values::List {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Expand into concrete values. Non-positive steps yield nothing; validation
    /// reports them before generation.
    pub fn materialize(&self) -> Vec<ParamValue> {
        match self {
            Values::IntRange { start, stop, step } => {
                if *step <= 0 {
                    return Vec::new();
                }
                let mut values = Vec::new();
                let mut current = *start;
                while current < *stop {
                    values.push(ParamValue::Int(current));
                    current = match current.checked_add(*step) {
                        Some(next) => next,
                        None => break,
                    };
                }
                values
            }
            Values::FloatRange { start, stop, step } => {
                if step.is_nan() || *step <= 0.0 || !start.is_finite() || !stop.is_finite() {
                    return Vec::new();
                }
                // Tolerance keeps `stop` exclusive despite accumulated rounding.
                let limit = stop - step * 1e-9;
                (0usize..)
                    .map(|i| start + i as f64 * step)
                    .take_while(|value| *value < limit)
                    .map(ParamValue::Float)
                    .collect()
            }
            Values::List { values } => values.clone(),
        }
    }

    pub(crate) fn has_valid_step(&self) -> bool {
        match self {
            Values::IntRange { step, .. } => *step > 0,
            Values::FloatRange { step, .. } => step.is_finite() && *step > 0.0,
            Values::List { .. } => true,
        }
    }
}
