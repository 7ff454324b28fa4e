use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::spec::{FieldSpec, FieldType, IdStrategy, NodeSpec, Value};

/// A Rust type stored as one row of one table.
pub trait Entity: Sized + Send + 'static {
    const TABLE: &'static str;
    /// Name used in not-found errors.
    const LABEL: &'static str;
    const ID_COLUMN: &'static str = "id";
    const ID_TYPE: FieldType = FieldType::Int;

    /// Non-ID columns. FK columns the entity holds must be listed so that
    /// edges keyed by them can be loaded.
    fn columns() -> &'static [&'static str];

    fn column_type(column: &str) -> FieldType;

    fn id_strategy() -> IdStrategy {
        IdStrategy::Sequence
    }

    fn from_values(columns: &[String], values: Vec<Value>) -> Result<Self>;

    /// Current value of `column`, `Value::Null` for unknown columns.
    fn value(&self, column: &str) -> Value;

    fn id(&self) -> Value {
        self.value(Self::ID_COLUMN)
    }

    fn node_spec() -> NodeSpec {
        NodeSpec::new(Self::TABLE, FieldSpec::column(Self::ID_COLUMN, Self::ID_TYPE))
            .columns(Self::columns().iter().copied())
            .id_strategy(Self::id_strategy())
            .with_label(Self::LABEL)
    }

    fn scan_types(columns: &[String]) -> Vec<FieldType> {
        columns
            .iter()
            .map(|c| match c.as_str() {
                c if c == Self::ID_COLUMN => Self::ID_TYPE,
                c => Self::column_type(c),
            })
            .collect()
    }
}

/// Conversion out of a coerced [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: Value) -> std::result::Result<Self, String>;
}

fn mismatch<T>(expected: &str, value: &Value) -> std::result::Result<T, String> {
    Err(format!("expected {expected}, got {}", value.kind()))
}

impl FromValue for Value {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        Ok(value)
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        value.as_i64().map_or_else(|| mismatch("int", &value), Ok)
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        let i = i64::from_value(value)?;
        i32::try_from(i).map_err(|e| format!("{i} out of range: {e}"))
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            v => mismatch("float", &v),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        value.as_bool().map_or_else(|| mismatch("bool", &value), Ok)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::String(s) => Ok(s),
            v => mismatch("string", &v),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Uuid(u) => Ok(u),
            v => mismatch("uuid", &v),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Bytes(b) => Ok(b),
            v => mismatch("bytes", &v),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Json(j) => Ok(j),
            v => mismatch("json", &v),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Time(t) => Ok(t),
            v => mismatch("time", &v),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            v => T::from_value(v).map(Some),
        }
    }
}

/// One selected row, keyed by column name. Helps implementing
/// [`Entity::from_values`] for partial projections: columns that were not
/// selected read as NULL.
#[derive(Debug, Clone, Default)]
pub struct Record {
    values: HashMap<String, Value>,
}

impl Record {
    pub fn new(columns: &[String], values: Vec<Value>) -> Self {
        Self {
            values: columns.iter().cloned().zip(values).collect(),
        }
    }

    pub fn get<T: FromValue>(&mut self, column: &str) -> Result<T> {
        let value = self.values.remove(column).unwrap_or(Value::Null);
        T::from_value(value).map_err(|reason| Error::validation(column, reason))
    }
}
