//! Dynamic column values and logical field types.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Logical type tag of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Bool,
    Int,
    Float,
    String,
    Enum,
    Uuid,
    Bytes,
    Json,
    Time,
    /// Opaque values passed through untouched.
    Other,
}

impl FieldType {
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Int | FieldType::Float)
    }

    /// Whether `value` may be written to a column of this type.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (FieldType::Json | FieldType::Other, _) => true,
            (FieldType::Bool, Value::Bool(_))
            | (FieldType::Int, Value::Int(_))
            | (FieldType::Float, Value::Float(_) | Value::Int(_))
            | (FieldType::String | FieldType::Enum, Value::String(_))
            | (FieldType::Uuid, Value::Uuid(_))
            | (FieldType::Bytes, Value::Bytes(_))
            | (FieldType::Time, Value::Time(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Bool => "bool",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::String => "string",
            FieldType::Enum => "enum",
            FieldType::Uuid => "uuid",
            FieldType::Bytes => "bytes",
            FieldType::Json => "json",
            FieldType::Time => "time",
            FieldType::Other => "other",
        };
        f.write_str(name)
    }
}

/// A single column value, either written by a mutation or read back from a row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Json(serde_json::Value),
    Time(DateTime<Utc>),
}

/// Hashable form of a [`Value`], used to match rows across queries.
///
/// Values that compare equal in the database map to the same key, so a UUID
/// read back as text matches the [`Value::Uuid`] it was written from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Uuid(_) => "uuid",
            Value::Json(_) => "json",
            Value::Time(_) => "time",
        }
    }

    pub fn key(&self) -> Option<Key> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(Key::Int(i64::from(*b))),
            Value::Int(i) => Some(Key::Int(*i)),
            Value::Float(f) if f.fract() == 0.0 => Some(Key::Int(*f as i64)),
            Value::Float(f) => Some(Key::Text(f.to_string())),
            Value::String(s) => Some(Key::Text(s.clone())),
            Value::Bytes(b) => Some(Key::Bytes(b.clone())),
            Value::Uuid(u) => Some(Key::Text(u.to_string())),
            Value::Json(j) => Some(Key::Text(j.to_string())),
            Value::Time(t) => Some(Key::Text(t.to_rfc3339())),
        }
    }

    /// Convert to a JSON document, as stored in JSON-typed columns.
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::from(i),
            Value::Float(f) => serde_json::Value::from(f),
            Value::String(s) => serde_json::Value::String(s),
            Value::Bytes(b) => serde_json::Value::from(b),
            Value::Uuid(u) => serde_json::Value::String(u.to_string()),
            Value::Json(j) => j,
            Value::Time(t) => serde_json::Value::String(t.to_rfc3339()),
        }
    }

    /// Interpret a raw driver value as `ty`.
    ///
    /// Drivers hand back storage classes (text, integer, blob, ...); this
    /// restores the logical type declared by the caller.
    pub fn coerce(self, ty: FieldType) -> Result<Value, String> {
        let value = match (ty, self) {
            (_, Value::Null) => Value::Null,
            (FieldType::Other, v) => v,
            (FieldType::Bool, Value::Bool(b)) => Value::Bool(b),
            (FieldType::Bool, Value::Int(i)) => Value::Bool(i != 0),
            (FieldType::Int, Value::Int(i)) => Value::Int(i),
            (FieldType::Int, Value::Bool(b)) => Value::Int(i64::from(b)),
            (FieldType::Int, Value::Float(f)) if f.fract() == 0.0 => Value::Int(f as i64),
            (FieldType::Float, Value::Float(f)) => Value::Float(f),
            (FieldType::Float, Value::Int(i)) => Value::Float(i as f64),
            (FieldType::String | FieldType::Enum, Value::String(s)) => Value::String(s),
            (FieldType::Uuid, Value::Uuid(u)) => Value::Uuid(u),
            (FieldType::Uuid, Value::String(s)) => {
                Value::Uuid(Uuid::parse_str(&s).map_err(|e| format!("invalid uuid {s:?}: {e}"))?)
            }
            (FieldType::Uuid, Value::Bytes(b)) => {
                Value::Uuid(Uuid::from_slice(&b).map_err(|e| format!("invalid uuid bytes: {e}"))?)
            }
            (FieldType::Bytes, Value::Bytes(b)) => Value::Bytes(b),
            (FieldType::Bytes, Value::String(s)) => Value::Bytes(s.into_bytes()),
            (FieldType::Json, Value::Json(j)) => Value::Json(j),
            (FieldType::Json, Value::String(s)) => Value::Json(
                serde_json::from_str(&s).map_err(|e| format!("invalid json document: {e}"))?,
            ),
            (FieldType::Json, Value::Bytes(b)) => Value::Json(
                serde_json::from_slice(&b).map_err(|e| format!("invalid json document: {e}"))?,
            ),
            (FieldType::Time, Value::Time(t)) => Value::Time(t),
            (FieldType::Time, Value::String(s)) => Value::Time(parse_time(&s)?),
            (ty, v) => return Err(format!("cannot read {} value as {ty}", v.kind())),
        };
        Ok(value)
    }
}

/// Parse RFC 3339 text, falling back to SQLite's `YYYY-MM-DD HH:MM:SS` form.
pub(crate) fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| format!("invalid datetime {s:?}: {e}"))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Uuid(u) => write!(f, "{u}"),
            Value::Json(j) => write!(f, "{j}"),
            Value::Time(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i64 => Int,
    i32 => Int,
    u32 => Int,
    i16 => Int,
    f64 => Float,
    f32 => Float,
    String => String,
    &str => String,
    Vec<u8> => Bytes,
    Uuid => Uuid,
    serde_json::Value => Json,
    DateTime<Utc> => Time,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
