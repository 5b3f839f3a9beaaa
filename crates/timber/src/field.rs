//! Structured record fields
//!
//! Fields render as `key=value` pairs appended to the message. Values keep
//! their type until render time so numeric and binary data are not forced
//! through string formatting at the call site.

use std::fmt;

use chrono::{DateTime, Utc};

/// A typed field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Binary(Vec<u8>),
    Array(Vec<FieldValue>),
    Object(Vec<(String, FieldValue)>),
    Datetime(DateTime<Utc>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Binary(bytes) => {
                f.write_str("0x")?;
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            FieldValue::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            FieldValue::Object(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{key}={value}")?;
                }
                f.write_str("}")
            }
            FieldValue::Datetime(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

/// One `key=value` pair attached to a record
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: String,
    pub value: FieldValue,
}

impl Field {
    /// String field
    pub fn str(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: FieldValue::Str(value.into()),
        }
    }

    /// Integer field
    pub fn int(key: impl Into<String>, value: i64) -> Self {
        Self {
            key: key.into(),
            value: FieldValue::Int(value),
        }
    }

    /// Float field
    pub fn float(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value: FieldValue::Float(value),
        }
    }

    /// Boolean field
    pub fn bool(key: impl Into<String>, value: bool) -> Self {
        Self {
            key: key.into(),
            value: FieldValue::Bool(value),
        }
    }

    /// Raw bytes, rendered as hex
    pub fn binary(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: FieldValue::Binary(value.into()),
        }
    }

    /// Timestamp field
    pub fn datetime(key: impl Into<String>, value: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            value: FieldValue::Datetime(value),
        }
    }

    /// Array field
    pub fn array(key: impl Into<String>, items: Vec<FieldValue>) -> Self {
        Self {
            key: key.into(),
            value: FieldValue::Array(items),
        }
    }

    /// Nested object field
    pub fn object(key: impl Into<String>, entries: Vec<(String, FieldValue)>) -> Self {
        Self {
            key: key.into(),
            value: FieldValue::Object(entries),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}
