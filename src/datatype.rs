// used for persistence
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

// used for timestamp attributes
use chrono::NaiveDateTime;
// used for decimal numbers
use bigdecimal::BigDecimal;

// used when parsing a string to a decimal
use std::str::FromStr;
// used to print out readable forms of a value
use std::fmt;
// used to overload common operations for the decimal wrapper
use std::ops;

use crate::error::{GraftError, Result};

/// The kind of an attribute value, as declared in the schema catalog.
///
/// Every kind has a stable identifier (`uid`) used when attribute values
/// are persisted, so a store can be restored without guessing at types.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
pub enum ValueKind {
    Text,
    Integer,
    Decimal,
    Boolean,
    Bytes,
    Instant,
}

impl ValueKind {
    pub const fn uid(self) -> u8 {
        match self {
            ValueKind::Text => 1,
            ValueKind::Integer => 2,
            ValueKind::Decimal => 3,
            ValueKind::Boolean => 4,
            ValueKind::Bytes => 5,
            ValueKind::Instant => 6,
        }
    }
    pub const fn name(self) -> &'static str {
        match self {
            ValueKind::Text => "Text",
            ValueKind::Integer => "Integer",
            ValueKind::Decimal => "Decimal",
            ValueKind::Boolean => "Boolean",
            ValueKind::Bytes => "Bytes",
            ValueKind::Instant => "Instant",
        }
    }
    pub fn from_uid(uid: u8) -> Result<ValueKind> {
        match uid {
            1 => Ok(ValueKind::Text),
            2 => Ok(ValueKind::Integer),
            3 => Ok(ValueKind::Decimal),
            4 => Ok(ValueKind::Boolean),
            5 => Ok(ValueKind::Bytes),
            6 => Ok(ValueKind::Instant),
            _ => Err(GraftError::Store(format!("unknown value kind identifier {uid}"))),
        }
    }
    // Only text and numeric values can appear in a declared unique key.
    pub const fn key_eligible(self) -> bool {
        matches!(self, ValueKind::Text | ValueKind::Integer | ValueKind::Decimal)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A tagged attribute value. Records hold these in their attribute maps,
/// validated against the schema catalog at set time. The ordering is
/// only meaningful between values of the same kind, which is all a
/// sorted query compares.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Debug)]
pub enum Value {
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Boolean(bool),
    Bytes(Vec<u8>),
    Instant(NaiveDateTime),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Text(_) => ValueKind::Text,
            Value::Integer(_) => ValueKind::Integer,
            Value::Decimal(_) => ValueKind::Decimal,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Instant(_) => ValueKind::Instant,
        }
    }
    /// Reconstruct a value of a known kind from a persisted SQLite column.
    pub fn restore(kind: ValueKind, column: ValueRef) -> Result<Value> {
        let value = match kind {
            ValueKind::Text => Value::Text(
                column.as_str().map_err(rusqlite::Error::from)?.to_owned(),
            ),
            ValueKind::Integer => Value::Integer(
                column.as_i64().map_err(rusqlite::Error::from)?,
            ),
            ValueKind::Decimal => {
                let text = column.as_str().map_err(rusqlite::Error::from)?;
                Value::Decimal(Decimal::from_str(text).ok_or_else(|| {
                    GraftError::Store(format!("'{text}' is not a decimal number"))
                })?)
            }
            ValueKind::Boolean => Value::Boolean(
                column.as_i64().map_err(rusqlite::Error::from)? != 0,
            ),
            ValueKind::Bytes => Value::Bytes(
                column.as_blob().map_err(rusqlite::Error::from)?.to_owned(),
            ),
            ValueKind::Instant => Value::Instant(
                NaiveDateTime::column_result(column).map_err(rusqlite::Error::from)?,
            ),
        };
        Ok(value)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Value::Text(t) => t.to_sql(),
            Value::Integer(i) => i.to_sql(),
            Value::Decimal(d) => d.to_sql(),
            Value::Boolean(b) => Ok(ToSqlOutput::from(*b as i64)),
            Value::Bytes(b) => Ok(ToSqlOutput::from(b.as_slice())),
            Value::Instant(t) => t.to_sql(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Text(t) => write!(f, "{}", t),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Instant(t) => write!(f, "{}", t),
        }
    }
}

impl From<&str> for Value {
    fn from(t: &str) -> Self {
        Value::Text(t.to_owned())
    }
}
impl From<String> for Value {
    fn from(t: String) -> Self {
        Value::Text(t)
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

#[derive(Eq, PartialEq, Hash, PartialOrd, Ord, Clone, Debug)]
pub struct Decimal(BigDecimal);

impl Decimal {
    pub fn from_str(s: &str) -> Option<Decimal> {
        match BigDecimal::from_str(s) {
            Ok(decimal) => Some(Decimal(decimal)),
            _ => None,
        }
    }
}
impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl FromSql for Decimal {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        BigDecimal::from_str(text)
            .map(Decimal)
            .map_err(|e| rusqlite::types::FromSqlError::Other(Box::new(e)))
    }
}
impl ToSql for Decimal {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.to_string()))
    }
}
impl ops::Deref for Decimal {
    type Target = BigDecimal;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
