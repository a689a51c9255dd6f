//! Typed values and the record converters used on the write path.
//!
//! Target parsers receive records as [`Value`]s. Before a record can be
//! encoded it goes through two steps:
//!
//! 1. [`convert_to_record`] checks the record is a flat list matching the
//!    schema and coerces every field to its column's [`DataType`].
//! 2. [`convert_record_to_strings`] renders every coerced scalar as text.
//!
//! Both steps fail with a [`RecordError`] naming the offending element's type,
//! which the caller attaches to the record's metadata.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RecordError;
use crate::schema::{DataType, Schema};

/// A dynamically typed value.
///
/// Deserializes from JSON without tags: `null`, booleans, integers, floats,
/// strings, arrays and objects map to the variant of the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Short name of the value's shape, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::List(_) | Value::Map(_))
    }

    /// Builds a list of string values, the shape a source parser row takes
    /// once handed to a target parser.
    pub fn from_raw<I, S>(fields: I) -> Value
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(fields.into_iter().map(|f| Value::String(f.into())).collect())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

/// A value could not be coerced to the requested type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to convert '{from}' to {to}")]
pub struct ConversionError {
    /// [`Value::type_name`] of the rejected value.
    pub from: &'static str,
    pub to: DataType,
}

impl DataType {
    /// Coerces `value` to this type.
    ///
    /// `Null` is accepted by every type and stays `Null`. Strings are parsed
    /// (after trimming) for numeric and boolean targets; composite values
    /// are never coerced.
    pub fn convert(&self, value: &Value) -> Result<Value, ConversionError> {
        let failed = || ConversionError {
            from: value.type_name(),
            to: *self,
        };

        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),

            (DataType::String, v) => to_text(v).map(Value::String),

            (DataType::Integer, Value::Integer(i)) => Ok(Value::Integer(*i)),
            (DataType::Integer, Value::Float(f)) if is_integral(*f) => Ok(Value::Integer(*f as i64)),
            (DataType::Integer, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| failed()),

            (DataType::Float, Value::Integer(i)) => Ok(Value::Float(*i as f64)),
            (DataType::Float, Value::Float(f)) => Ok(Value::Float(*f)),
            (DataType::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| failed()),

            (DataType::Boolean, Value::Bool(b)) => Ok(Value::Bool(*b)),
            (DataType::Boolean, Value::Integer(0)) => Ok(Value::Bool(false)),
            (DataType::Boolean, Value::Integer(1)) => Ok(Value::Bool(true)),
            (DataType::Boolean, Value::String(s)) => parse_bool(s).map(Value::Bool).ok_or_else(failed),

            _ => Err(failed()),
        }
    }
}

fn is_integral(f: f64) -> bool {
    f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Renders a scalar as text. `Null` becomes the empty string.
pub fn to_text(value: &Value) -> Result<String, ConversionError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Float(f) => Ok(f.to_string()),
        Value::String(s) => Ok(s.clone()),
        Value::List(_) | Value::Map(_) => Err(ConversionError {
            from: value.type_name(),
            to: DataType::String,
        }),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            scalar => match to_text(scalar) {
                Ok(text) => f.write_str(&text),
                Err(_) => Err(fmt::Error),
            },
        }
    }
}

/// Coerces a record to `schema`.
///
/// The record must be a [`Value::List`] with exactly one field per column.
pub fn convert_to_record(record: &Value, schema: &Schema) -> Result<Vec<Value>, RecordError> {
    let Value::List(fields) = record else {
        return Err(RecordError::Shape {
            found: record.type_name(),
        });
    };

    if fields.len() != schema.len() {
        return Err(RecordError::Arity {
            expected: schema.len(),
            found: fields.len(),
        });
    }

    fields
        .iter()
        .zip(schema)
        .map(|(value, column)| {
            column
                .data_type
                .convert(value)
                .map_err(|source| RecordError::Conversion {
                    column: column.name.clone(),
                    source,
                })
        })
        .collect()
}

/// Renders every field of a coerced record as text, preserving order.
pub fn convert_record_to_strings(fields: &[Value]) -> Result<Vec<String>, RecordError> {
    fields
        .iter()
        .enumerate()
        .map(|(index, value)| to_text(value).map_err(|source| RecordError::Stringify { index, source }))
        .collect()
}
