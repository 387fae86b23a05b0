//! The universal runtime value type flowing through expressions, storage,
//! and results.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Edge, Node};

/// A Cypher runtime value.
///
/// Deliberately narrow compared to a general property-graph type system:
/// no maps-as-values, no temporal or spatial types, no raw bytes. Property
/// maps on nodes/edges are a separate concept (`PropertyMap`), not a
/// `Value` variant, so there is exactly one way to represent "the
/// properties of a node" in this engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Dense float vector, used by similarity search (`cosineSimilarity`,
    /// KNN vector-search planning).
    Vector(Vec<f32>),
    List(Vec<Value>),
    Node(Box<Node>),
    Edge(Box<Edge>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::String(_) => "STRING",
            Value::Vector(_) => "VECTOR",
            Value::List(_) => "LIST",
            Value::Node(_) => "NODE",
            Value::Edge(_) => "EDGE",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Cypher truthiness: everything is truthy except `NULL` and `false`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            _ => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }
}

// ============================================================================
// Conversions (From impls)
// ============================================================================

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}
impl From<Vec<f32>> for Value {
    fn from(v: Vec<f32>) -> Self {
        Value::Vector(v)
    }
}
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Value::Vector(v) => write!(f, "<vector[{}]>", v.len()),
            Value::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Node(n) => write!(f, "{n:?}"),
            Value::Edge(e) => write!(f, "{e:?}"),
        }
    }
}

// ============================================================================
// Comparison and equality
// ============================================================================

impl Value {
    /// Orders two values for `ORDER BY`. Numeric variants are promoted to
    /// `f64` before comparing, so `1 < 1.5` holds regardless of which side
    /// is the integer. Returns `None` for incomparable pairs (including any
    /// pair touching `NULL`, per three-valued Cypher semantics).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            _ if self.is_numeric() && other.is_numeric() => {
                self.as_float().unwrap().partial_cmp(&other.as_float().unwrap())
            }
            _ => None,
        }
    }

    /// Equality used consistently by every comparison path that needs it:
    /// filter `=`/`<>`, `IN`, `CASE` matching, `DISTINCT`, `ORDER BY`
    /// tie-breaking, and aggregate grouping. Numeric variants compare equal
    /// across `Int`/`Float` after promotion; every other pair falls back to
    /// structural equality. `NULL` is never equal to anything, including
    /// itself.
    pub fn values_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            _ if self.is_numeric() && other.is_numeric() => self.as_float() == other.as_float(),
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.values_equal(y))
            }
            (Value::Vector(a), Value::Vector(b)) => a == b,
            _ => self == other,
        }
    }

    /// A hashable key for grouping/DISTINCT: numeric values are normalized
    /// to their bit-for-bit `f64` representation so that `1` and `1.0` land
    /// in the same bucket, consistent with [`values_equal`].
    pub fn group_key(&self) -> String {
        match self {
            Value::Null => "∅".to_string(),
            Value::Bool(b) => format!("b:{b}"),
            _ if self.is_numeric() => format!("n:{}", self.as_float().unwrap().to_bits()),
            Value::String(s) => format!("s:{s}"),
            Value::Vector(v) => format!("v:{v:?}"),
            Value::List(l) => format!("l:[{}]", l.iter().map(|x| x.group_key()).collect::<Vec<_>>().join(",")),
            Value::Node(n) => format!("N:{}", n.id.0),
            Value::Edge(e) => format!("E:{}", e.id.0),
        }
    }
}
