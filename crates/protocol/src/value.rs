//! Dynamic record values
//!
//! A [`Value`] is the tagged sum carried in event records. It mirrors the
//! MessagePack data model: variable-width integers, floats, booleans, strings
//! and byte strings, arrays, and string-keyed maps.
//!
//! The string/bytes contract: the wire distinguishes them, but any reader
//! that expects a string accepts UTF-8 byte strings. [`Value::as_str`]
//! implements that contract; use it instead of matching on [`Value::Str`].

use std::collections::BTreeMap;

use serde::ser::{Serialize, Serializer};

/// A record is a string-keyed map of dynamic values.
pub type Record = BTreeMap<String, Value>;

/// Dynamic value type for event records.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Map(Record),
}

impl Value {
    /// String view of the value; accepts UTF-8 byte strings.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Byte view of the value; strings are their UTF-8 bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Str(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(u) => Some(*u),
            Value::Int(i) => u64::try_from(*i).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::UInt(u) => Some(*u as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Convert to the MessagePack representation.
    pub fn to_wire(&self) -> rmpv::Value {
        match self {
            Value::Nil => rmpv::Value::Nil,
            Value::Bool(b) => rmpv::Value::Boolean(*b),
            Value::Int(i) => rmpv::Value::Integer((*i).into()),
            Value::UInt(u) => rmpv::Value::Integer((*u).into()),
            Value::Float(f) => rmpv::Value::F64(*f),
            Value::Str(s) => rmpv::Value::String(s.clone().into()),
            Value::Bytes(b) => rmpv::Value::Binary(b.clone()),
            Value::Array(items) => {
                rmpv::Value::Array(items.iter().map(Value::to_wire).collect())
            }
            Value::Map(map) => rmpv::Value::Map(
                map.iter()
                    .map(|(k, v)| (rmpv::Value::String(k.clone().into()), v.to_wire()))
                    .collect(),
            ),
        }
    }

    /// Convert from the MessagePack representation.
    ///
    /// Extension values have no place in the record model and collapse to
    /// `Nil`. Non-string map keys are stringified.
    pub fn from_wire(value: rmpv::Value) -> Value {
        match value {
            rmpv::Value::Nil => Value::Nil,
            rmpv::Value::Boolean(b) => Value::Bool(b),
            rmpv::Value::Integer(i) => match i.as_i64() {
                Some(n) => Value::Int(n),
                None => i.as_u64().map(Value::UInt).unwrap_or(Value::Nil),
            },
            rmpv::Value::F32(f) => Value::Float(f64::from(f)),
            rmpv::Value::F64(f) => Value::Float(f),
            rmpv::Value::String(s) => match s.into_str() {
                Some(s) => Value::Str(s),
                None => Value::Nil,
            },
            rmpv::Value::Binary(b) => Value::Bytes(b),
            rmpv::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_wire).collect())
            }
            rmpv::Value::Map(pairs) => {
                let mut map = Record::new();
                for (k, v) in pairs {
                    let key = match k {
                        rmpv::Value::String(s) => match s.into_str() {
                            Some(s) => s,
                            None => continue,
                        },
                        rmpv::Value::Binary(b) => String::from_utf8_lossy(&b).into_owned(),
                        rmpv::Value::Integer(i) => i.to_string(),
                        _ => continue,
                    };
                    map.insert(key, Value::from_wire(v));
                }
                Value::Map(map)
            }
            rmpv::Value::Ext(..) => Value::Nil,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Nil => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::UInt(u) => serializer.serialize_u64(*u),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            // Serialised forms are for human-facing sinks; the UTF-8 contract
            // lets byte strings degrade to lossy text.
            Value::Bytes(b) => serializer.serialize_str(&String::from_utf8_lossy(b)),
            Value::Array(items) => serializer.collect_seq(items),
            Value::Map(map) => serializer.collect_map(map),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Value::UInt(u)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Record> for Value {
    fn from(map: Record) -> Self {
        Value::Map(map)
    }
}
