//! Record descriptors and table schema derivation
//!
//! A record type declares its columns once, in a `static` [`RecordDescriptor`]
//! built from `const` [`FieldDescriptor`] builders. [`RecordDescriptor::derive_table`]
//! validates that declaration and turns it into a [`TableSchema`] that can emit
//! `CREATE TABLE IF NOT EXISTS` for either dialect.
//!
//! ```
//! use sqlrecord::{FieldDescriptor, RecordDescriptor, ValueKind};
//!
//! static PERSON: RecordDescriptor = RecordDescriptor::new(
//!     "Person",
//!     &[
//!         FieldDescriptor::new("id", ValueKind::I32).sql_type("SERIAL").options(&["PRIMARY KEY"]).identity(),
//!         FieldDescriptor::new("name", ValueKind::Text),
//!         FieldDescriptor::new("age", ValueKind::I32),
//!         FieldDescriptor::new("email", ValueKind::Text),
//!     ],
//! );
//!
//! let schema = PERSON.derive_table("people").unwrap();
//! assert_eq!(schema.identity_column().name, "id");
//! ```

use crate::dialect::Dialect;
use crate::value::ValueKind;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Static metadata for one field of a record type
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    /// Field name on the Rust type
    pub name: &'static str,

    /// Column name in the table (defaults to the field name)
    pub column: &'static str,

    /// Declared value type
    pub kind: ValueKind,

    /// Explicit storage type, overriding the default mapping for `kind`
    pub sql_type: Option<&'static str>,

    /// Column options appended verbatim (e.g. "UNIQUE")
    pub options: &'static [&'static str],

    /// Whether the column may hold NULL
    pub nullable: bool,

    /// Whether this is the store-generated identity column
    pub identity: bool,
}

impl FieldDescriptor {
    pub const fn new(name: &'static str, kind: ValueKind) -> Self {
        Self {
            name,
            column: name,
            kind,
            sql_type: None,
            options: &[],
            nullable: false,
            identity: false,
        }
    }

    pub const fn column(self, column: &'static str) -> Self {
        Self { column, ..self }
    }

    pub const fn sql_type(self, sql_type: &'static str) -> Self {
        Self {
            sql_type: Some(sql_type),
            ..self
        }
    }

    pub const fn options(self, options: &'static [&'static str]) -> Self {
        Self { options, ..self }
    }

    pub const fn nullable(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }

    /// Mark the field as the identity column
    pub const fn identity(self) -> Self {
        Self {
            identity: true,
            ..self
        }
    }

    fn claims_primary_key(&self) -> bool {
        self.options.iter().any(|option| is_primary_key_option(option))
    }
}

/// Static metadata for one record type: its fields in declaration order
#[derive(Debug, Clone, Copy)]
pub struct RecordDescriptor {
    /// Record type name, used in error messages
    pub name: &'static str,

    /// Fields in column order
    pub fields: &'static [FieldDescriptor],
}

impl RecordDescriptor {
    pub const fn new(name: &'static str, fields: &'static [FieldDescriptor]) -> Self {
        Self { name, fields }
    }

    /// Ordinal position of the field named `name`
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    /// Ordinal position of the field stored in column `column`
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.column == column)
    }

    /// Validate the descriptor and derive the column definitions for `table`
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] when the record has no fields, no identity
    /// column or more than one, when a storage type is unrecognized or does
    /// not fit the field's value type, or when two fields share a column.
    pub fn derive_table(&self, table: &str) -> Result<TableSchema, SchemaError> {
        if self.fields.is_empty() {
            return Err(SchemaError::EmptyRecord {
                record: self.name.to_string(),
            });
        }

        let mut columns = Vec::with_capacity(self.fields.len());
        let mut seen_columns = HashSet::new();
        let mut identity: Option<usize> = None;

        for (index, field) in self.fields.iter().enumerate() {
            if !seen_columns.insert(field.column) {
                return Err(SchemaError::DuplicateColumn {
                    record: self.name.to_string(),
                    column: field.column.to_string(),
                });
            }

            let is_identity = field.identity || field.claims_primary_key();
            if is_identity {
                if let Some(first) = identity {
                    return Err(SchemaError::DuplicateIdentity {
                        record: self.name.to_string(),
                        first: self.fields[first].name.to_string(),
                        second: field.name.to_string(),
                    });
                }
                identity = Some(index);
            }

            let sql_type = match field.sql_type {
                Some(declared) => {
                    declared
                        .parse::<SqlType>()
                        .map_err(|_| SchemaError::UnrecognizedType {
                            field: field.name.to_string(),
                            sql_type: declared.to_string(),
                        })?
                }
                None => SqlType::default_for(field.kind, is_identity),
            };

            if !sql_type.accepts(field.kind) {
                return Err(SchemaError::IncompatibleType {
                    field: field.name.to_string(),
                    kind: field.kind,
                    sql_type: sql_type.to_string(),
                });
            }

            if is_identity && !(field.kind.is_integer() && sql_type.is_integer()) {
                return Err(SchemaError::NonIntegerIdentity {
                    field: field.name.to_string(),
                    sql_type: sql_type.to_string(),
                });
            }

            columns.push(ColumnDefinition {
                name: field.column.to_string(),
                kind: field.kind,
                sql_type,
                options: field.options.iter().map(|option| option.to_string()).collect(),
                nullable: field.nullable && !is_identity,
                is_identity,
            });
        }

        let identity = identity.ok_or_else(|| SchemaError::MissingIdentity {
            record: self.name.to_string(),
        })?;

        Ok(TableSchema {
            table: table.to_string(),
            record: self.name,
            columns,
            identity,
        })
    }
}

/// Derived definition of one column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    /// Column name
    pub name: String,

    /// Declared value type of the backing field
    pub kind: ValueKind,

    /// Storage type
    pub sql_type: SqlType,

    /// Options appended verbatim after the type
    pub options: Vec<String>,

    /// Whether the column allows NULL values
    pub nullable: bool,

    /// Whether this is the identity column
    pub is_identity: bool,
}

/// Complete derived schema for one table
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    /// Name of the table
    pub table: String,

    /// Name of the record type the schema was derived from
    pub record: &'static str,

    /// Columns in descriptor order
    pub columns: Vec<ColumnDefinition>,

    /// Ordinal position of the identity column
    pub identity: usize,
}

impl TableSchema {
    pub fn identity_column(&self) -> &ColumnDefinition {
        &self.columns[self.identity]
    }

    /// Columns supplied by the caller on insert, in descriptor order
    pub fn insert_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|column| !column.is_identity)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Render `CREATE TABLE IF NOT EXISTS` for this schema
    pub fn create_table_sql(&self, dialect: Dialect) -> String {
        let definitions: Vec<String> = self
            .columns
            .iter()
            .map(|column| Self::column_sql(column, dialect))
            .collect();

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            dialect.quote_identifier(&self.table),
            definitions.join(", ")
        )
    }

    fn column_sql(column: &ColumnDefinition, dialect: Dialect) -> String {
        let mut parts = vec![dialect.quote_identifier(&column.name)];

        if column.is_identity {
            match dialect {
                // Only the exact `INTEGER PRIMARY KEY` spelling aliases the rowid
                Dialect::Sqlite => parts.push("INTEGER PRIMARY KEY AUTOINCREMENT".to_string()),
                Dialect::Postgres => {
                    parts.push(column.sql_type.serial_name().to_string());
                    parts.push("PRIMARY KEY".to_string());
                }
            }
            parts.extend(
                column
                    .options
                    .iter()
                    .filter(|option| {
                        !is_primary_key_option(option)
                            && !option.trim().eq_ignore_ascii_case("AUTOINCREMENT")
                    })
                    .cloned(),
            );
        } else {
            parts.push(column.sql_type.render(dialect));
            if !column.nullable {
                parts.push("NOT NULL".to_string());
            }
            parts.extend(column.options.iter().cloned());
        }

        parts.join(" ")
    }
}

/// Storage types understood by schema derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    SmallInt,
    Integer,
    BigInt,
    Serial,
    BigSerial,
    Real,
    DoublePrecision,
    Text,
    Varchar(u32),
    Boolean,
    Bytea,
}

impl SqlType {
    /// Default storage type for a declared value type
    pub fn default_for(kind: ValueKind, identity: bool) -> Self {
        match (kind, identity) {
            (ValueKind::I16 | ValueKind::I32, true) => SqlType::Serial,
            (ValueKind::I64, true) => SqlType::BigSerial,
            (ValueKind::I16, false) => SqlType::SmallInt,
            (ValueKind::I32, false) => SqlType::Integer,
            (ValueKind::I64, false) => SqlType::BigInt,
            (ValueKind::F32, _) => SqlType::Real,
            (ValueKind::F64, _) => SqlType::DoublePrecision,
            (ValueKind::Text, _) => SqlType::Text,
            (ValueKind::Bool, _) => SqlType::Boolean,
            (ValueKind::Bytes, _) => SqlType::Bytea,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            SqlType::SmallInt
                | SqlType::Integer
                | SqlType::BigInt
                | SqlType::Serial
                | SqlType::BigSerial
        )
    }

    /// Whether a field of `kind` can be stored in this type
    pub fn accepts(self, kind: ValueKind) -> bool {
        match kind {
            ValueKind::I16 | ValueKind::I32 | ValueKind::I64 => self.is_integer(),
            ValueKind::F32 | ValueKind::F64 => {
                matches!(self, SqlType::Real | SqlType::DoublePrecision)
            }
            ValueKind::Text => matches!(self, SqlType::Text | SqlType::Varchar(_)),
            ValueKind::Bool => self == SqlType::Boolean,
            ValueKind::Bytes => self == SqlType::Bytea,
        }
    }

    /// Store-generated PostgreSQL type of the same width
    ///
    /// Identity columns are always generated, even when the descriptor
    /// overrides them with a plain integer type.
    pub fn serial_name(self) -> &'static str {
        match self {
            SqlType::SmallInt => "SMALLSERIAL",
            SqlType::BigInt | SqlType::BigSerial => "BIGSERIAL",
            _ => "SERIAL",
        }
    }

    /// Type name as written in DDL for `dialect`
    pub fn render(self, dialect: Dialect) -> String {
        match (self, dialect) {
            (SqlType::Serial | SqlType::BigSerial, Dialect::Sqlite) => "INTEGER".to_string(),
            (SqlType::Bytea, Dialect::Sqlite) => "BLOB".to_string(),
            (other, _) => other.to_string(),
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::SmallInt => write!(f, "SMALLINT"),
            SqlType::Integer => write!(f, "INTEGER"),
            SqlType::BigInt => write!(f, "BIGINT"),
            SqlType::Serial => write!(f, "SERIAL"),
            SqlType::BigSerial => write!(f, "BIGSERIAL"),
            SqlType::Real => write!(f, "REAL"),
            SqlType::DoublePrecision => write!(f, "DOUBLE PRECISION"),
            SqlType::Text => write!(f, "TEXT"),
            SqlType::Varchar(length) => write!(f, "VARCHAR({})", length),
            SqlType::Boolean => write!(f, "BOOLEAN"),
            SqlType::Bytea => write!(f, "BYTEA"),
        }
    }
}

/// Error returned when parsing an unknown storage type name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized SQL type `{0}`")]
pub struct UnknownSqlType(pub String);

impl FromStr for SqlType {
    type Err = UnknownSqlType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();

        let sql_type = match normalized.as_str() {
            "SMALLINT" | "INT2" => SqlType::SmallInt,
            "INTEGER" | "INT" | "INT4" => SqlType::Integer,
            "BIGINT" | "INT8" => SqlType::BigInt,
            "SERIAL" | "SERIAL4" => SqlType::Serial,
            "BIGSERIAL" | "SERIAL8" => SqlType::BigSerial,
            "REAL" | "FLOAT4" => SqlType::Real,
            "DOUBLE PRECISION" | "DOUBLE" | "FLOAT8" => SqlType::DoublePrecision,
            "TEXT" => SqlType::Text,
            "BOOLEAN" | "BOOL" => SqlType::Boolean,
            "BYTEA" | "BLOB" => SqlType::Bytea,
            other => {
                let length = other
                    .strip_prefix("VARCHAR(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .and_then(|length| length.trim().parse::<u32>().ok())
                    .filter(|length| *length > 0);
                match length {
                    Some(length) => SqlType::Varchar(length),
                    None => return Err(UnknownSqlType(value.to_string())),
                }
            }
        };

        Ok(sql_type)
    }
}

/// Errors raised while deriving or ensuring a table schema
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("record `{record}` declares no fields")]
    EmptyRecord { record: String },

    #[error("record `{record}` has no identity column")]
    MissingIdentity { record: String },

    #[error("record `{record}` declares two identity columns: `{first}` and `{second}`")]
    DuplicateIdentity {
        record: String,
        first: String,
        second: String,
    },

    #[error("record `{record}` maps two fields to column `{column}`")]
    DuplicateColumn { record: String, column: String },

    #[error("field `{field}` declares unrecognized SQL type `{sql_type}`")]
    UnrecognizedType { field: String, sql_type: String },

    #[error("field `{field}` of type {kind} cannot be stored as {sql_type}")]
    IncompatibleType {
        field: String,
        kind: ValueKind,
        sql_type: String,
    },

    #[error("identity field `{field}` must be integer-typed, found {sql_type}")]
    NonIntegerIdentity { field: String, sql_type: String },

    #[error("existing table `{table}` has columns {found:?}, expected {expected:?}")]
    TableMismatch {
        table: String,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

fn is_primary_key_option(option: &str) -> bool {
    option
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .eq_ignore_ascii_case("PRIMARY KEY")
}
