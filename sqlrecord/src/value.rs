//! Dynamically typed SQL values
//!
//! `SqlValue` is the only value type that crosses the driver boundary: bound
//! parameters go out as `SqlValue`s and raw row cells come back as `SqlValue`s.
//! Typed conversion back into record fields happens through [`FromSqlValue`].

use std::fmt;

/// A single SQL value as seen by the driver boundary
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
    Bytes(Vec<u8>),
}

impl SqlValue {
    /// Whether this is SQL `NULL`
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Short name of the value's type, used in decode error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "NULL",
            SqlValue::Integer(_) => "integer",
            SqlValue::Real(_) => "real",
            SqlValue::Text(_) => "text",
            SqlValue::Boolean(_) => "boolean",
            SqlValue::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Integer(value) => write!(f, "{}", value),
            SqlValue::Real(value) => write!(f, "{}", value),
            SqlValue::Text(value) => write!(f, "{}", value),
            SqlValue::Boolean(value) => write!(f, "{}", value),
            SqlValue::Bytes(value) => write!(f, "[{} bytes]", value.len()),
        }
    }
}

/// Declared value type of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    I16,
    I32,
    I64,
    F32,
    F64,
    Text,
    Bool,
    Bytes,
}

impl ValueKind {
    /// Whether the kind holds whole numbers (eligible for identity columns)
    pub fn is_integer(self) -> bool {
        matches!(self, ValueKind::I16 | ValueKind::I32 | ValueKind::I64)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::I16 => "i16",
            ValueKind::I32 => "i32",
            ValueKind::I64 => "i64",
            ValueKind::F32 => "f32",
            ValueKind::F64 => "f64",
            ValueKind::Text => "text",
            ValueKind::Bool => "bool",
            ValueKind::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(value: $ty) -> Self {
                    SqlValue::Integer(i64::from(value))
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for SqlValue {
    fn from(value: f32) -> Self {
        SqlValue::Real(f64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Boolean(value)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<&String> for SqlValue {
    fn from(value: &String) -> Self {
        SqlValue::Text(value.clone())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Bytes(value)
    }
}

impl From<&[u8]> for SqlValue {
    fn from(value: &[u8]) -> Self {
        SqlValue::Bytes(value.to_vec())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => SqlValue::Null,
        }
    }
}

/// Why a `SqlValue` could not be converted into a Rust type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    /// `NULL` where the target type cannot represent it
    #[error("unexpected NULL")]
    UnexpectedNull,

    /// The value's type cannot be converted into the target type
    #[error("expected {expected}, found {found}")]
    Mismatch { expected: &'static str, found: &'static str },

    /// An integer does not fit the target width
    #[error("value {value} does not fit in {target}")]
    OutOfRange { target: &'static str, value: i64 },
}

/// Conversion from a raw `SqlValue` into a typed record field
pub trait FromSqlValue: Sized {
    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError>;
}

impl FromSqlValue for i64 {
    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Integer(value) => Ok(value),
            SqlValue::Null => Err(ConversionError::UnexpectedNull),
            other => Err(ConversionError::Mismatch {
                expected: "integer",
                found: other.type_name(),
            }),
        }
    }
}

macro_rules! impl_narrow_integer {
    ($($ty:ty => $name:literal),*) => {
        $(
            impl FromSqlValue for $ty {
                fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
                    let wide = i64::from_sql_value(value)?;
                    <$ty>::try_from(wide).map_err(|_| ConversionError::OutOfRange {
                        target: $name,
                        value: wide,
                    })
                }
            }
        )*
    };
}

impl_narrow_integer!(i16 => "i16", i32 => "i32");

impl FromSqlValue for f64 {
    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Real(value) => Ok(value),
            // SQLite stores whole-valued REALs written as integers
            SqlValue::Integer(value) => Ok(value as f64),
            SqlValue::Null => Err(ConversionError::UnexpectedNull),
            other => Err(ConversionError::Mismatch {
                expected: "real",
                found: other.type_name(),
            }),
        }
    }
}

impl FromSqlValue for f32 {
    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        f64::from_sql_value(value).map(|value| value as f32)
    }
}

impl FromSqlValue for bool {
    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Boolean(value) => Ok(value),
            SqlValue::Integer(0) => Ok(false),
            SqlValue::Integer(1) => Ok(true),
            SqlValue::Null => Err(ConversionError::UnexpectedNull),
            other => Err(ConversionError::Mismatch {
                expected: "boolean",
                found: other.type_name(),
            }),
        }
    }
}

impl FromSqlValue for String {
    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Text(value) => Ok(value),
            SqlValue::Null => Err(ConversionError::UnexpectedNull),
            other => Err(ConversionError::Mismatch {
                expected: "text",
                found: other.type_name(),
            }),
        }
    }
}

impl FromSqlValue for Vec<u8> {
    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Bytes(value) => Ok(value),
            SqlValue::Null => Err(ConversionError::UnexpectedNull),
            other => Err(ConversionError::Mismatch {
                expected: "bytes",
                found: other.type_name(),
            }),
        }
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_converts_to_null() {
        let value: SqlValue = Option::<i32>::None.into();
        assert!(value.is_null());
        assert_eq!(SqlValue::from(Some("x")), SqlValue::Text("x".to_string()));
    }

    #[test]
    fn test_narrowing_rejects_overflow() {
        let result = i32::from_sql_value(SqlValue::Integer(i64::from(i32::MAX) + 1));
        assert!(matches!(result, Err(ConversionError::OutOfRange { target: "i32", .. })));
        assert_eq!(i32::from_sql_value(SqlValue::Integer(97)), Ok(97));
    }

    #[test]
    fn test_null_into_non_nullable() {
        assert_eq!(
            String::from_sql_value(SqlValue::Null),
            Err(ConversionError::UnexpectedNull)
        );
        assert_eq!(Option::<String>::from_sql_value(SqlValue::Null), Ok(None));
    }

    #[test]
    fn test_bool_from_sqlite_integers() {
        assert_eq!(bool::from_sql_value(SqlValue::Integer(1)), Ok(true));
        assert_eq!(bool::from_sql_value(SqlValue::Integer(0)), Ok(false));
        assert!(bool::from_sql_value(SqlValue::Integer(2)).is_err());
    }

    #[test]
    fn test_text_into_integer_is_mismatch() {
        let result = i64::from_sql_value(SqlValue::Text("23".to_string()));
        assert_eq!(
            result,
            Err(ConversionError::Mismatch {
                expected: "integer",
                found: "text"
            })
        );
    }

    #[test]
    fn test_conversion_error_messages() {
        assert_eq!(ConversionError::UnexpectedNull.to_string(), "unexpected NULL");
        assert_eq!(
            ConversionError::OutOfRange {
                target: "i16",
                value: 70000
            }
            .to_string(),
            "value 70000 does not fit in i16"
        );

        // Usable as a boxed source error
        let error: Box<dyn std::error::Error> = Box::new(ConversionError::Mismatch {
            expected: "integer",
            found: "text",
        });
        assert_eq!(error.to_string(), "expected integer, found text");
    }
}
