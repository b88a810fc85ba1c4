use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::geometry::{Crs, Geometry, GeometryValue};

/// The declared kind of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeKind {
    Bool,
    Int,
    Float,
    Text,
    /// Geometry attribute, optionally tagged with the CRS its values use.
    Geometry(Option<Crs>),
}

impl AttributeKind {
    pub fn is_geometry(&self) -> bool {
        matches!(self, AttributeKind::Geometry(_))
    }

    pub fn crs(&self) -> Option<&Crs> {
        match self {
            AttributeKind::Geometry(crs) => crs.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeKind::Bool => f.write_str("bool"),
            AttributeKind::Int => f.write_str("int"),
            AttributeKind::Float => f.write_str("float"),
            AttributeKind::Text => f.write_str("text"),
            AttributeKind::Geometry(Some(crs)) => write!(f, "geometry<{}>", crs),
            AttributeKind::Geometry(None) => f.write_str("geometry"),
        }
    }
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Geometry(GeometryValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_geometry(&self) -> Option<&GeometryValue> {
        match self {
            Value::Geometry(v) => Some(v),
            _ => None,
        }
    }

    /// Whether this value may be stored in an attribute of `kind`.
    /// `Null` fits every kind; nillability is checked separately.
    pub fn fits(&self, kind: &AttributeKind) -> bool {
        matches!(
            (self, kind),
            (Value::Null, _)
                | (Value::Bool(_), AttributeKind::Bool)
                | (Value::Int(_), AttributeKind::Int)
                | (Value::Int(_), AttributeKind::Float)
                | (Value::Float(_), AttributeKind::Float)
                | (Value::Text(_), AttributeKind::Text)
                | (Value::Geometry(_), AttributeKind::Geometry(_))
        )
    }

    /// Convert into the representation `kind` stores. Integers widen to
    /// floats for float attributes; everything else is returned unchanged.
    pub(crate) fn coerce(self, kind: &AttributeKind) -> Value {
        match (self, kind) {
            (Value::Int(v), AttributeKind::Float) => Value::Float(v as f64),
            (value, _) => value,
        }
    }

    /// Comparison used by filters. `None` when the two values are not
    /// comparable (different kinds, nulls, geometries).
    pub fn partial_compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    /// Total order used by sorting: nulls first, then booleans, numbers,
    /// text and finally geometries (which compare equal to each other).
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.partial_compare(other).unwrap_or(Ordering::Equal))
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
            Value::Geometry(_) => 4,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{:?}", v),
            Value::Geometry(g) => match &g.crs {
                Some(crs) => write!(f, "{:?} @ {}", g.geometry, crs),
                None => write!(f, "{:?}", g.geometry),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Geometry> for Value {
    fn from(v: Geometry) -> Self {
        Value::Geometry(GeometryValue::new(v))
    }
}

impl From<GeometryValue> for Value {
    fn from(v: GeometryValue) -> Self {
        Value::Geometry(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
