//! Scalar values stored in a series column.
//!
//! A [`Value`] is anything a getter can report for one field in one sample:
//! a number, a string, a boolean or null. It serializes untagged, so a
//! column of values is a plain JSON array on disk.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A JSON-compatible scalar recorded for one field of one row.
///
/// Integers and floats are kept apart so that a value read back from disk
/// compares equal to the value that was recorded: `5` stays `Int(5)` and
/// `5.0` stays `Float(5.0)`.
///
/// # Example
///
/// ```rust
/// use metronome::Value;
///
/// let power = Value::from(42.5);
/// assert_eq!(power.as_f64(), Some(42.5));
///
/// let label = Value::from("idle");
/// assert_eq!(label.as_f64(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// JSON `null`.
    Null,
    /// A boolean flag.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating point number. Non-finite values serialize as `null`.
    Float(f64),
    /// A string.
    Text(String),
}

impl Value {
    /// Returns the numeric view of this value, used for plotting.
    ///
    /// Booleans map to `0.0`/`1.0`; null and text have no numeric view.
    #[allow(clippy::cast_precision_loss)] // plotting tolerates precision loss above 2^53
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Null | Self::Text(_) => None,
        }
    }

    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
