//! Typed input records.
//!
//! Records reach the processor as ordered lists of named, typed fields. The
//! host adapter builds them; [`record_from_json`] covers the common case of
//! JSON objects, optionally guided by a declared [`InputSchema`].
//!
//! # Type Mapping Rules
//!
//! With a declared type the JSON value must match it:
//! 1. `int` / `long` -> JSON integer within range
//! 2. `float` / `double` -> any JSON number
//! 3. `boolean` -> JSON boolean
//! 4. `bytes` -> base64 string
//! 5. `timestamp` -> RFC 3339 string or epoch milliseconds
//! 6. `string` -> JSON string, other scalars are kept as their JSON text
//!
//! Without a declared type, integers become `long`, other numbers `double`,
//! and nested arrays/objects are kept as compact JSON text.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{DeidError, Result};

/// Declared type of an inbound field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Int,
    Long,
    String,
    Bytes,
    Float,
    Double,
    Boolean,
    Timestamp,
}

/// A typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i32),
    Long(i64),
    String(String),
    Bytes(Vec<u8>),
    Float(f32),
    Double(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Null,
}

/// A named field of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

/// An inbound record: named fields in declared order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<Field>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to append a field.
    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.push(name, value);
        self
    }

    /// Appends a field.
    pub fn push(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.push(Field {
            name: name.into(),
            value,
        });
    }

    /// Fields in declared order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Looks up a field value by name.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Field names in declared order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// A declared field of the input schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// Declared schema of the inbound stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSchema {
    pub fields: Vec<SchemaField>,
}

impl InputSchema {
    /// Declared type of a field, if any.
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.field_type)
    }

    /// Declared field names in order.
    pub fn column_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

/// Converts a JSON object into a typed record.
///
/// # Errors
/// Returns [`DeidError::InvalidRecord`] if the value is not an object or a
/// field does not match its declared type.
pub fn record_from_json(value: &Value, schema: Option<&InputSchema>) -> Result<Record> {
    let object = value
        .as_object()
        .ok_or_else(|| DeidError::invalid_record("expected a JSON object"))?;

    let mut record = Record::new();
    for (name, raw) in object {
        let declared = schema.and_then(|s| s.field_type(name));
        let value = match declared {
            Some(field_type) => typed_value(name, raw, field_type)?,
            None => inferred_value(raw),
        };
        record.push(name.clone(), value);
    }
    Ok(record)
}

fn inferred_value(raw: &Value) -> FieldValue {
    match raw {
        Value::Null => FieldValue::Null,
        Value::Bool(b) => FieldValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => FieldValue::Long(i),
            None => n
                .as_f64()
                .map_or_else(|| FieldValue::String(n.to_string()), FieldValue::Double),
        },
        Value::String(s) => FieldValue::String(s.clone()),
        other => FieldValue::String(other.to_string()),
    }
}

fn typed_value(name: &str, raw: &Value, field_type: FieldType) -> Result<FieldValue> {
    if raw.is_null() {
        return Ok(FieldValue::Null);
    }

    let mismatch = || {
        DeidError::invalid_record(format!(
            "field '{}' does not match declared type {:?}",
            name, field_type
        ))
    };

    let value = match field_type {
        FieldType::Int => {
            let wide = raw.as_i64().ok_or_else(mismatch)?;
            FieldValue::Int(i32::try_from(wide).map_err(|_| mismatch())?)
        }
        FieldType::Long => FieldValue::Long(raw.as_i64().ok_or_else(mismatch)?),
        #[allow(clippy::cast_possible_truncation)]
        FieldType::Float => FieldValue::Float(raw.as_f64().ok_or_else(mismatch)? as f32),
        FieldType::Double => FieldValue::Double(raw.as_f64().ok_or_else(mismatch)?),
        FieldType::Boolean => FieldValue::Boolean(raw.as_bool().ok_or_else(mismatch)?),
        FieldType::Bytes => {
            let text = raw.as_str().ok_or_else(mismatch)?;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(text)
                .map_err(|e| {
                    DeidError::invalid_record(format!(
                        "field '{}' is not valid base64: {}",
                        name, e
                    ))
                })?;
            FieldValue::Bytes(bytes)
        }
        FieldType::Timestamp => FieldValue::Timestamp(parse_timestamp(raw).ok_or_else(mismatch)?),
        FieldType::String => match raw {
            Value::String(s) => FieldValue::String(s.clone()),
            other => FieldValue::String(other.to_string()),
        },
    };
    Ok(value)
}

fn parse_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}
