//! Typed records and row materialization
//!
//! A [`Record`] binds an application struct to its static descriptor at
//! compile time. [`materialize`] converts a raw [`RowSet`] into a `Vec` of that
//! struct, reading each field from the column at the same ordinal position
//! schema derivation used.

use crate::database::RowSet;
use crate::schema::RecordDescriptor;
use crate::value::{ConversionError, FromSqlValue, SqlValue};
use thiserror::Error;

/// An application type stored as one table row
///
/// # Example
///
/// ```
/// use sqlrecord::{DecodeError, FieldDescriptor, Record, RecordDescriptor, RowReader, SqlValue, ValueKind};
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Person {
///     id: i32,
///     name: String,
///     age: i32,
/// }
///
/// static PERSON: RecordDescriptor = RecordDescriptor::new(
///     "Person",
///     &[
///         FieldDescriptor::new("id", ValueKind::I32).identity(),
///         FieldDescriptor::new("name", ValueKind::Text),
///         FieldDescriptor::new("age", ValueKind::I32),
///     ],
/// );
///
/// impl Record for Person {
///     fn descriptor() -> &'static RecordDescriptor {
///         &PERSON
///     }
///
///     fn values(&self) -> Vec<SqlValue> {
///         vec![self.name.clone().into(), self.age.into()]
///     }
///
///     fn from_row(row: &RowReader<'_>) -> Result<Self, DecodeError> {
///         Ok(Person {
///             id: row.get("id")?,
///             name: row.get("name")?,
///             age: row.get("age")?,
///         })
///     }
/// }
/// ```
pub trait Record: Sized + 'static {
    /// Static column metadata for this type
    fn descriptor() -> &'static RecordDescriptor;

    /// Values of every non-identity field, in descriptor order
    fn values(&self) -> Vec<SqlValue>;

    /// Build one instance from a materialized row
    fn from_row(row: &RowReader<'_>) -> Result<Self, DecodeError>;
}

/// Read access to one raw row, checked against the record descriptor
#[derive(Debug)]
pub struct RowReader<'a> {
    descriptor: &'static RecordDescriptor,
    row_index: usize,
    values: &'a [SqlValue],
}

impl<'a> RowReader<'a> {
    pub fn new(
        descriptor: &'static RecordDescriptor,
        row_index: usize,
        values: &'a [SqlValue],
    ) -> Self {
        Self {
            descriptor,
            row_index,
            values,
        }
    }

    /// Read the field named `field`
    pub fn get<T: FromSqlValue>(&self, field: &str) -> Result<T, DecodeError> {
        let index = self
            .descriptor
            .field_index(field)
            .ok_or_else(|| DecodeError::UnknownField {
                record: self.descriptor.name,
                field: field.to_string(),
            })?;
        self.get_at(index)
    }

    /// Read the field at ordinal position `index`
    pub fn get_at<T: FromSqlValue>(&self, index: usize) -> Result<T, DecodeError> {
        let field = self
            .descriptor
            .fields
            .get(index)
            .ok_or_else(|| DecodeError::UnknownField {
                record: self.descriptor.name,
                field: format!("#{}", index),
            })?;
        let value = self.values.get(index).ok_or(DecodeError::ColumnCount {
            expected: self.descriptor.fields.len(),
            found: self.values.len(),
        })?;

        if value.is_null() && !field.nullable {
            return Err(DecodeError::UnexpectedNull {
                row: self.row_index,
                field: field.name,
            });
        }

        T::from_sql_value(value.clone()).map_err(|reason| DecodeError::Conversion {
            row: self.row_index,
            field: field.name,
            reason,
        })
    }
}

/// Failure converting a raw row into a record
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("row has {found} columns, record expects {expected}")]
    ColumnCount { expected: usize, found: usize },

    #[error("column {position} is `{found}`, record expects `{expected}`")]
    ColumnName {
        position: usize,
        expected: String,
        found: String,
    },

    #[error("row {row}: NULL in non-nullable field `{field}`")]
    UnexpectedNull { row: usize, field: &'static str },

    #[error("row {row}: field `{field}`: {reason}")]
    Conversion {
        row: usize,
        field: &'static str,
        reason: ConversionError,
    },

    #[error("record `{record}` has no field `{field}`")]
    UnknownField { record: &'static str, field: String },
}

/// Convert every row of `rows` into an `R`
///
/// An empty row set yields an empty vector.
///
/// # Errors
///
/// Returns a [`DecodeError`] when the column list or a row's width differs
/// from `R`'s descriptor, or when a value does not convert to its field type.
pub fn materialize<R: Record>(rows: RowSet) -> Result<Vec<R>, DecodeError> {
    let descriptor = R::descriptor();
    let expected = descriptor.fields.len();

    if !rows.columns.is_empty() {
        if rows.columns.len() != expected {
            return Err(DecodeError::ColumnCount {
                expected,
                found: rows.columns.len(),
            });
        }
        for (position, (field, column)) in descriptor.fields.iter().zip(&rows.columns).enumerate() {
            if field.column != column {
                return Err(DecodeError::ColumnName {
                    position,
                    expected: field.column.to_string(),
                    found: column.clone(),
                });
            }
        }
    }

    rows.rows
        .iter()
        .enumerate()
        .map(|(row_index, row)| {
            if row.len() != expected {
                return Err(DecodeError::ColumnCount {
                    expected,
                    found: row.len(),
                });
            }
            R::from_row(&RowReader::new(descriptor, row_index, row))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDescriptor;
    use crate::value::ValueKind;

    #[derive(Debug, Clone, PartialEq)]
    struct Person {
        id: i32,
        name: String,
        age: i32,
        nickname: Option<String>,
    }

    static PERSON: RecordDescriptor = RecordDescriptor::new(
        "Person",
        &[
            FieldDescriptor::new("id", ValueKind::I32).identity(),
            FieldDescriptor::new("name", ValueKind::Text),
            FieldDescriptor::new("age", ValueKind::I32),
            FieldDescriptor::new("nickname", ValueKind::Text).nullable(),
        ],
    );

    impl Record for Person {
        fn descriptor() -> &'static RecordDescriptor {
            &PERSON
        }

        fn values(&self) -> Vec<SqlValue> {
            vec![
                self.name.clone().into(),
                self.age.into(),
                self.nickname.clone().into(),
            ]
        }

        fn from_row(row: &RowReader<'_>) -> Result<Self, DecodeError> {
            Ok(Person {
                id: row.get("id")?,
                name: row.get("name")?,
                age: row.get("age")?,
                nickname: row.get("nickname")?,
            })
        }
    }

    fn columns() -> Vec<String> {
        ["id", "name", "age", "nickname"]
            .iter()
            .map(|name| name.to_string())
            .collect()
    }

    fn row(id: i64, name: &str, age: i64, nickname: SqlValue) -> Vec<SqlValue> {
        vec![
            SqlValue::Integer(id),
            SqlValue::Text(name.to_string()),
            SqlValue::Integer(age),
            nickname,
        ]
    }

    #[test]
    fn test_materialize_rows_in_order() {
        let rows = RowSet {
            columns: columns(),
            rows: vec![
                row(1, "Jacoby Joukema", 23, SqlValue::Null),
                row(3, "John Henry Eden", 97, SqlValue::Text("Eden".to_string())),
            ],
            rows_affected: 2,
        };

        let people: Vec<Person> = materialize(rows).unwrap();
        assert_eq!(people.len(), 2);
        assert_eq!(people[0].name, "Jacoby Joukema");
        assert_eq!(people[0].nickname, None);
        assert_eq!(people[1].id, 3);
        assert_eq!(people[1].nickname.as_deref(), Some("Eden"));
    }

    #[test]
    fn test_empty_row_set_is_empty_vec() {
        let people: Vec<Person> = materialize(RowSet::default()).unwrap();
        assert!(people.is_empty());
    }

    #[test]
    fn test_null_in_non_nullable_field() {
        let mut bad = row(1, "x", 1, SqlValue::Null);
        bad[2] = SqlValue::Null;
        let rows = RowSet {
            columns: columns(),
            rows: vec![bad],
            rows_affected: 1,
        };
        let error = materialize::<Person>(rows).unwrap_err();
        assert!(matches!(
            error,
            DecodeError::UnexpectedNull { row: 0, field: "age" }
        ));
    }

    #[test]
    fn test_wrong_value_type() {
        let mut bad = row(1, "x", 1, SqlValue::Null);
        bad[2] = SqlValue::Text("old".to_string());
        let rows = RowSet {
            columns: Vec::new(),
            rows: vec![bad],
            rows_affected: 1,
        };
        let error = materialize::<Person>(rows).unwrap_err();
        assert!(matches!(error, DecodeError::Conversion { field: "age", .. }));
    }

    #[test]
    fn test_column_count_mismatch() {
        let rows = RowSet {
            columns: Vec::new(),
            rows: vec![vec![SqlValue::Integer(1)]],
            rows_affected: 1,
        };
        assert!(matches!(
            materialize::<Person>(rows),
            Err(DecodeError::ColumnCount {
                expected: 4,
                found: 1
            })
        ));
    }

    #[test]
    fn test_column_name_mismatch() {
        let mut renamed = columns();
        renamed[1] = "full_name".to_string();
        let rows = RowSet {
            columns: renamed,
            rows: Vec::new(),
            rows_affected: 0,
        };
        assert!(matches!(
            materialize::<Person>(rows),
            Err(DecodeError::ColumnName { position: 1, .. })
        ));
    }
}
