//! Raw value type shared by parameter definitions and workload returns.
//!
//! Parameter values are handed to `setup` unchanged, and workload return
//! values are compared by the execution validator. Both travel as a
//! [`BenchValue`], a small JSON-like enum with two deviations from
//! `serde_json::Value`: floats keep their full range (`NaN` included), and
//! equality treats `NaN == NaN` as true so a validator comparing two
//! `NaN`-producing workloads does not report a spurious mismatch.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A parameter or workload return value.
///
/// Everything except [`List`](BenchValue::List) and [`Map`](BenchValue::Map)
/// counts as a primitive and has a canonical display string; non-primitive
/// parameter values must be given an explicit display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BenchValue {
    /// The unit value; the return of workloads that produce nothing.
    Unit,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// An unsigned integer outside `i64` range.
    UInt(u64),
    /// A double-precision float. `NaN` is allowed and compares equal to itself.
    Float(f64),
    /// A string.
    Text(String),
    /// An ordered sequence of values.
    List(Vec<BenchValue>),
    /// A string-keyed mapping.
    Map(BTreeMap<String, BenchValue>),
}

impl BenchValue {
    /// Whether this value is a primitive (has a canonical display string).
    pub fn is_primitive(&self) -> bool {
        !matches!(self, BenchValue::List(_) | BenchValue::Map(_))
    }

    /// The canonical display string for a primitive value.
    ///
    /// Returns `None` for lists and maps; those need a caller-supplied
    /// display name when used as parameter values.
    pub fn display_name(&self) -> Option<String> {
        match self {
            BenchValue::Unit => Some("()".to_string()),
            BenchValue::Bool(b) => Some(b.to_string()),
            BenchValue::Int(i) => Some(i.to_string()),
            BenchValue::UInt(u) => Some(u.to_string()),
            BenchValue::Float(f) => Some(f.to_string()),
            BenchValue::Text(s) => Some(s.clone()),
            BenchValue::List(_) | BenchValue::Map(_) => None,
        }
    }
}

impl PartialEq for BenchValue {
    fn eq(&self, other: &Self) -> bool {
        use BenchValue::*;
        match (self, other) {
            (Unit, Unit) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (UInt(a), UInt(b)) => a == b,
            (Int(a), UInt(b)) | (UInt(b), Int(a)) => {
                u64::try_from(*a).map(|a| a == *b).unwrap_or(false)
            }
            (Float(a), Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Text(a), Text(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for BenchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.display_name() {
            Some(name) => f.write_str(&name),
            None => match self {
                BenchValue::List(items) => write!(f, "[{} items]", items.len()),
                BenchValue::Map(entries) => write!(f, "{{{} entries}}", entries.len()),
                _ => unreachable!("primitives always have a display name"),
            },
        }
    }
}

impl From<()> for BenchValue {
    fn from(_: ()) -> Self {
        BenchValue::Unit
    }
}

impl From<bool> for BenchValue {
    fn from(v: bool) -> Self {
        BenchValue::Bool(v)
    }
}

impl From<i32> for BenchValue {
    fn from(v: i32) -> Self {
        BenchValue::Int(v.into())
    }
}

impl From<i64> for BenchValue {
    fn from(v: i64) -> Self {
        BenchValue::Int(v)
    }
}

impl From<u32> for BenchValue {
    fn from(v: u32) -> Self {
        BenchValue::Int(v.into())
    }
}

impl From<u64> for BenchValue {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => BenchValue::Int(i),
            Err(_) => BenchValue::UInt(v),
        }
    }
}

impl From<usize> for BenchValue {
    fn from(v: usize) -> Self {
        BenchValue::from(v as u64)
    }
}

impl From<f64> for BenchValue {
    fn from(v: f64) -> Self {
        BenchValue::Float(v)
    }
}

impl From<&str> for BenchValue {
    fn from(v: &str) -> Self {
        BenchValue::Text(v.to_string())
    }
}

impl From<String> for BenchValue {
    fn from(v: String) -> Self {
        BenchValue::Text(v)
    }
}

impl<T: Into<BenchValue>> From<Vec<T>> for BenchValue {
    fn from(v: Vec<T>) -> Self {
        BenchValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<BenchValue>> From<Option<T>> for BenchValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => BenchValue::Unit,
        }
    }
}
