//! The primitive value type and its widening lattice.

use std::fmt;

/// A single scalar value carried by the expression evaluator and by
/// cell accessors that need to move a typed value out of a column
/// without borrowing the batch's arena.
///
/// `Date` is a signed count of days from 1970-01-01; `Timestamp` is a
/// signed count of microseconds from the same epoch. Strings here are
/// owned, used for values that escape a single evaluation step (e.g.
/// literals, function results copied out of scratch). Hot paths read
/// columns directly via `Batch::get_*` instead of boxing through this
/// enum.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Date(i32),
    Timestamp(i64),
}

impl Value {
    pub fn type_of(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Bool(_) => DataType::Bool,
            Value::Int64(_) => DataType::Int64,
            Value::Float64(_) => DataType::Float64,
            Value::String(_) => DataType::String,
            Value::Date(_) => DataType::Date,
            Value::Timestamp(_) => DataType::Timestamp,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness used by boolean short-circuit evaluation: non-null and
    /// non-zero values are truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int64(i) => *i != 0,
            Value::Float64(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Date(d) => *d != 0,
            Value::Timestamp(t) => *t != 0,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(i) => Some(*i as f64),
            Value::Float64(f) => Some(*f),
            Value::Date(d) => Some(*d as f64),
            Value::Timestamp(t) => Some(*t as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            Value::Date(d) => Some(*d as i64),
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Lossless text rendering used by key-building operators (unique,
    /// group-agg, join, frequency): `\N` for null, otherwise the
    /// canonical scalar form.
    pub fn key_repr(&self) -> String {
        match self {
            Value::Null => "\\N".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int64(i) => i.to_string(),
            Value::Float64(f) => format!("{f}"),
            Value::String(s) => s.clone(),
            Value::Date(d) => crate::dates::format_date(*d),
            Value::Timestamp(t) => crate::dates::format_timestamp(*t),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, ""),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int64(i) => write!(f, "{i}"),
            Value::Float64(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{}", crate::dates::format_date(*d)),
            Value::Timestamp(t) => write!(f, "{}", crate::dates::format_timestamp(*t)),
        }
    }
}

/// The column/value type tag. Ordered so that `as u8` respects the
/// widening lattice `Null < Int64 < Float64 < String` used by the CSV
/// decoder's type detector; `Date`/`Timestamp` sit outside that chain
/// and widen to `Timestamp` or, on mismatch, to `String`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Null,
    Bool,
    Int64,
    Float64,
    String,
    Date,
    Timestamp,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Null => "null",
            DataType::Bool => "bool",
            DataType::Int64 => "int64",
            DataType::Float64 => "float64",
            DataType::String => "string",
            DataType::Date => "date",
            DataType::Timestamp => "timestamp",
        }
    }

    /// Widening-lattice meet of two detected types, used by the CSV
    /// decoder while it is still sampling the first batch.
    pub fn widen(self, other: DataType) -> DataType {
        use DataType::*;
        if self == other {
            return self;
        }
        match (self, other) {
            (Null, t) | (t, Null) => t,
            (Int64, Float64) | (Float64, Int64) => Float64,
            (Date, Timestamp) | (Timestamp, Date) => Timestamp,
            (Int64, Int64) => Int64,
            _ => String,
        }
    }
}
