//! Value model
//!
//! This module defines [`Value`], the tagged value model every bin, key,
//! operation argument and policy override is expressed in. Host bindings
//! convert their native objects into this model; the core never inspects
//! host values directly.
//!
//! ## Type rules
//!
//! - `Int(1) != Float(1.0)`: different types are never equal
//! - `Blob` is not `String`, `GeoJson` is not `String`
//! - `Map` keeps insertion order; lookups compare keys with `==`
//! - `Wildcard` and `Infinity` only appear as CDT range bounds
//!
//! ## Ordering
//!
//! [`Value::cdt_cmp`] implements the collection ordering used for rank and
//! value-range selection: values order first by type
//! (`Nil < Bool < Int < String < List < Map < Blob < Float < GeoJson`),
//! then by content. `Infinity` sorts after everything and `Wildcard` matches
//! anything.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Wire particle type of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ParticleType {
    /// Nil
    Null = 0,
    /// 64-bit integer
    Integer = 1,
    /// 64-bit float
    Float = 2,
    /// UTF-8 string
    String = 3,
    /// Raw bytes
    Blob = 4,
    /// Boolean
    Bool = 17,
    /// HyperLogLog sketch
    Hll = 18,
    /// Ordered map
    Map = 19,
    /// List
    List = 20,
    /// GeoJSON document
    GeoJson = 23,
}

/// A value stored in a bin, used as a key, or passed as an argument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Absent / null value
    Nil,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float (IEEE-754)
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Blob(Vec<u8>),
    /// List of values
    List(Vec<Value>),
    /// Map with insertion-ordered entries
    Map(Vec<(Value, Value)>),
    /// GeoJSON document
    GeoJson(String),
    /// Serialized HyperLogLog sketch
    Hll(Vec<u8>),
    /// Matches any value in CDT range bounds
    Wildcard,
    /// Sorts after every value in CDT range bounds
    Infinity,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.iter().any(|(k2, v2)| k == k2 && v == v2))
            }
            (Value::GeoJson(a), Value::GeoJson(b)) => a == b,
            (Value::Hll(a), Value::Hll(b)) => a == b,
            (Value::Wildcard, Value::Wildcard) => true,
            (Value::Infinity, Value::Infinity) => true,
            _ => false,
        }
    }
}

impl Value {
    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "Nil",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Blob(_) => "Blob",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::GeoJson(_) => "GeoJson",
            Value::Hll(_) => "Hll",
            Value::Wildcard => "Wildcard",
            Value::Infinity => "Infinity",
        }
    }

    /// Wire particle type, `None` for the range sentinels
    pub fn particle_type(&self) -> Option<ParticleType> {
        Some(match self {
            Value::Nil => ParticleType::Null,
            Value::Bool(_) => ParticleType::Bool,
            Value::Int(_) => ParticleType::Integer,
            Value::Float(_) => ParticleType::Float,
            Value::String(_) => ParticleType::String,
            Value::Blob(_) => ParticleType::Blob,
            Value::List(_) => ParticleType::List,
            Value::Map(_) => ParticleType::Map,
            Value::GeoJson(_) => ParticleType::GeoJson,
            Value::Hll(_) => ParticleType::Hll,
            Value::Wildcard | Value::Infinity => return None,
        })
    }

    /// Check if this is a nil value
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Get as bool if this is a Bool value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 if this is an Int value
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if this is a Float value
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as &str if this is a String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as byte slice if this is a Blob value
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Get as list slice if this is a List value
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Get map entries if this is a Map value
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a map entry by string key
    ///
    /// Returns `None` if this is not a map or the key is absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    /// Build a map value from string keys
    pub fn map_from<I, K>(entries: I) -> Value
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (Value::String(k.into()), v))
                .collect(),
        )
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Nil => 1,
            Value::Bool(_) => 2,
            Value::Int(_) => 3,
            Value::String(_) => 4,
            Value::List(_) => 5,
            Value::Map(_) => 6,
            Value::Blob(_) | Value::Hll(_) => 7,
            Value::Float(_) => 8,
            Value::GeoJson(_) => 9,
            Value::Wildcard => 0,
            Value::Infinity => 10,
        }
    }

    /// Collection ordering used by rank and range selection.
    pub fn cdt_cmp(&self, other: &Value) -> Ordering {
        if matches!(self, Value::Wildcard) || matches!(other, Value::Wildcard) {
            return Ordering::Equal;
        }
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::GeoJson(a), Value::GeoJson(b)) => a.cmp(b),
            (Value::Blob(a), Value::Blob(b)) | (Value::Hll(a), Value::Hll(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.cdt_cmp(y) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Map(a), Value::Map(b)) => a.len().cmp(&b.len()),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Blob(b) => write!(f, "<blob {} bytes>", b.len()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::GeoJson(g) => write!(f, "geojson({})", g),
            Value::Hll(b) => write!(f, "<hll {} bytes>", b.len()),
            Value::Wildcard => write!(f, "*"),
            Value::Infinity => write!(f, "inf"),
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Blob(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Blob(b.to_vec())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Nil)
    }
}
