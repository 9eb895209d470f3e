use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::error::DbError;

/// Values that can be stored in a database row or bound to a named placeholder.
///
/// The same enum is used by both backends so calling code never branches on driver types:
/// ```rust
/// use sql_ambient::prelude::*;
///
/// let params = params! {
///     "user_id" => 123,
///     "name" => "alice",
///     "active" => true,
/// };
/// assert_eq!(params["user_id"], RowValues::Int(123));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RowValues::Bool(value) => Some(*value),
            RowValues::Int(1) => Some(true),
            RowValues::Int(0) => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            // SQLite hands timestamps back as text
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt);
            }
        }
        None
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            RowValues::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            RowValues::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            RowValues::Int(_) => "int",
            RowValues::Float(_) => "float",
            RowValues::Text(_) => "text",
            RowValues::Bool(_) => "bool",
            RowValues::Timestamp(_) => "timestamp",
            RowValues::Null => "null",
            RowValues::JSON(_) => "json",
            RowValues::Blob(_) => "blob",
        }
    }
}

impl Serialize for RowValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RowValues::Int(i) => serializer.serialize_i64(*i),
            RowValues::Float(f) => serializer.serialize_f64(*f),
            RowValues::Text(s) => serializer.serialize_str(s),
            RowValues::Bool(b) => serializer.serialize_bool(*b),
            RowValues::Timestamp(dt) => {
                serializer.collect_str(&dt.format("%Y-%m-%dT%H:%M:%S%.f"))
            }
            RowValues::Null => serializer.serialize_none(),
            RowValues::JSON(value) => value.serialize(serializer),
            RowValues::Blob(bytes) => serializer.serialize_bytes(bytes),
        }
    }
}

macro_rules! impl_from_for_row_values {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for RowValues {
                fn from(value: $ty) -> Self {
                    RowValues::$variant(value.into())
                }
            }
        )*
    };
}

impl_from_for_row_values! {
    i64 => Int,
    i32 => Int,
    i16 => Int,
    u32 => Int,
    f64 => Float,
    f32 => Float,
    bool => Bool,
    String => Text,
    &str => Text,
    NaiveDateTime => Timestamp,
    JsonValue => JSON,
    Vec<u8> => Blob,
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// Named parameters for a query, keyed by placeholder name.
///
/// Keys that no placeholder references are ignored, so one parameter set can be shared
/// across several queries.
pub type Params = HashMap<String, RowValues>;

/// Build a [`Params`] map from `"name" => value` pairs.
#[macro_export]
macro_rules! params {
    () => {
        $crate::Params::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut params = $crate::Params::new();
        $(
            params.insert(::std::string::String::from($key), $crate::RowValues::from($value));
        )+
        params
    }};
}

/// Conversion from a [`RowValues`] into a concrete Rust type.
pub trait FromRowValue: Sized {
    /// Convert the value, reporting the column it came from on mismatch.
    ///
    /// # Errors
    /// Returns `DbError::ConversionError` if the value has an incompatible type.
    fn from_row_value(value: &RowValues, column: &str) -> Result<Self, DbError>;
}

fn mismatch(value: &RowValues, column: &str, wanted: &str) -> DbError {
    DbError::ConversionError(format!(
        "column '{column}' holds a {} value, not {wanted}",
        value.type_name()
    ))
}

impl FromRowValue for i64 {
    fn from_row_value(value: &RowValues, column: &str) -> Result<Self, DbError> {
        value
            .as_int()
            .copied()
            .ok_or_else(|| mismatch(value, column, "an integer"))
    }
}

impl FromRowValue for i32 {
    fn from_row_value(value: &RowValues, column: &str) -> Result<Self, DbError> {
        let wide = i64::from_row_value(value, column)?;
        i32::try_from(wide).map_err(|e| {
            DbError::ConversionError(format!("column '{column}' out of range for i32: {e}"))
        })
    }
}

impl FromRowValue for f64 {
    fn from_row_value(value: &RowValues, column: &str) -> Result<Self, DbError> {
        value
            .as_float()
            .ok_or_else(|| mismatch(value, column, "a float"))
    }
}

impl FromRowValue for bool {
    fn from_row_value(value: &RowValues, column: &str) -> Result<Self, DbError> {
        value
            .as_bool()
            .ok_or_else(|| mismatch(value, column, "a bool"))
    }
}

impl FromRowValue for String {
    fn from_row_value(value: &RowValues, column: &str) -> Result<Self, DbError> {
        value
            .as_text()
            .map(ToOwned::to_owned)
            .ok_or_else(|| mismatch(value, column, "text"))
    }
}

impl FromRowValue for NaiveDateTime {
    fn from_row_value(value: &RowValues, column: &str) -> Result<Self, DbError> {
        value
            .as_timestamp()
            .ok_or_else(|| mismatch(value, column, "a timestamp"))
    }
}

impl FromRowValue for Vec<u8> {
    fn from_row_value(value: &RowValues, column: &str) -> Result<Self, DbError> {
        value
            .as_blob()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| mismatch(value, column, "a blob"))
    }
}

impl FromRowValue for JsonValue {
    fn from_row_value(value: &RowValues, column: &str) -> Result<Self, DbError> {
        serde_json::to_value(value).map_err(|e| {
            DbError::ConversionError(format!("column '{column}' is not representable as JSON: {e}"))
        })
    }
}

impl FromRowValue for RowValues {
    fn from_row_value(value: &RowValues, _column: &str) -> Result<Self, DbError> {
        Ok(value.clone())
    }
}

impl<T: FromRowValue> FromRowValue for Option<T> {
    fn from_row_value(value: &RowValues, column: &str) -> Result<Self, DbError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_row_value(value, column).map(Some)
        }
    }
}

/// The backend family selected once, at initialization.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Multi-connection network database behind a pool (`PostgreSQL`).
    #[serde(alias = "postgres")]
    Networked,
    /// Single-handle embedded database (`SQLite`).
    #[serde(alias = "sqlite")]
    Embedded,
}

impl BackendKind {
    /// Operations this backend implements.
    #[must_use]
    pub fn capabilities(self) -> &'static [Operation] {
        match self {
            BackendKind::Networked => &Operation::ALL,
            BackendKind::Embedded => &[
                Operation::Store,
                Operation::ExecuteSql,
                Operation::Connect,
                Operation::Middleware,
                Operation::Shutdown,
            ],
        }
    }

    #[must_use]
    pub fn supports(self, operation: Operation) -> bool {
        self.capabilities().contains(&operation)
    }

    /// Fail with `BackendNotImplemented` unless `operation` is supported.
    ///
    /// # Errors
    /// Returns `DbError::BackendNotImplemented` naming the operation and this backend.
    pub fn require(self, operation: Operation) -> Result<(), DbError> {
        if self.supports(operation) {
            Ok(())
        } else {
            Err(DbError::not_implemented(operation, self))
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Networked => "networked",
            BackendKind::Embedded => "embedded",
        })
    }
}

/// Facade operations, used for capability checks and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Store,
    Execute,
    ExecuteSql,
    Connect,
    Transaction,
    Middleware,
    Shutdown,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::Store,
        Operation::Execute,
        Operation::ExecuteSql,
        Operation::Connect,
        Operation::Transaction,
        Operation::Middleware,
        Operation::Shutdown,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Store => "store",
            Operation::Execute => "execute",
            Operation::ExecuteSql => "execute_sql",
            Operation::Connect => "connect",
            Operation::Transaction => "transaction",
            Operation::Middleware => "get_middleware",
            Operation::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
