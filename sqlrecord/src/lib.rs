//! # sqlrecord
//!
//! Typed relational access for plain Rust structs.
//!
//! Describe a struct once with a static [`RecordDescriptor`], implement
//! [`Record`] for it, and the [`Connection`] derives the table, creates it on
//! demand, and moves instances in and out of SQLite or PostgreSQL.
//!
//! ## Features
//!
//! - Table derivation from record descriptors, validated before any SQL runs
//! - Idempotent `CREATE TABLE IF NOT EXISTS` plus column-set verification
//! - Insert with generated identity, select (all, filtered, by id), update,
//!   delete and count
//! - Parameterized statements for every runtime value
//! - SQLite and PostgreSQL behind cargo features
//!
//! ## Filters
//!
//! `select_where` accepts either a structured [`Filter`] or raw SQL text. Raw
//! text is placed into the `WHERE` clause verbatim and must never carry
//! untrusted input.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use sqlrecord::{
//!     connect, ConnectionConfig, DecodeError, FieldDescriptor, Filter, Record,
//!     RecordDescriptor, RowReader, SqlValue, ValueKind,
//! };
//!
//! struct Person {
//!     id: i32,
//!     name: String,
//!     age: i32,
//! }
//!
//! static PERSON: RecordDescriptor = RecordDescriptor::new(
//!     "Person",
//!     &[
//!         FieldDescriptor::new("id", ValueKind::I32).sql_type("SERIAL").identity(),
//!         FieldDescriptor::new("name", ValueKind::Text),
//!         FieldDescriptor::new("age", ValueKind::I32),
//!     ],
//! );
//!
//! impl Record for Person {
//!     fn descriptor() -> &'static RecordDescriptor {
//!         &PERSON
//!     }
//!
//!     fn values(&self) -> Vec<SqlValue> {
//!         vec![self.name.clone().into(), self.age.into()]
//!     }
//!
//!     fn from_row(row: &RowReader<'_>) -> Result<Self, DecodeError> {
//!         Ok(Person {
//!             id: row.get("id")?,
//!             name: row.get("name")?,
//!             age: row.get("age")?,
//!         })
//!     }
//! }
//!
//! fn main() -> sqlrecord::Result<()> {
//!     let mut connection = connect(ConnectionConfig::sqlite(":memory:"))?;
//!     connection.ensure_table::<Person>("people")?;
//!
//!     let id = connection.insert("people", &Person { id: 0, name: "Jacoby Joukema".into(), age: 23 })?;
//!     let adults: Vec<Person> = connection.select_where("people", Filter::column("age").ge(18))?;
//!     assert_eq!(adults[0].id as i64, id);
//!
//!     connection.close();
//!     Ok(())
//! }
//! ```

// Public modules
pub mod config;
pub mod connection;
pub mod database;
pub mod dialect;
pub mod materialize;
pub mod query;
pub mod schema;
pub mod value;

// Public exports
pub use config::{ConnectionConfig, ConnectionError, DriverKind};
pub use connection::{connect, Connection, ConnectionState, StateError};
pub use database::{Driver, DriverError, RowSet};
pub use dialect::Dialect;
pub use materialize::{materialize, DecodeError, Record, RowReader};
pub use query::{ColumnFilter, Filter, Operator, QueryBuilder, QueryError, Statement};
pub use schema::{ColumnDefinition, FieldDescriptor, RecordDescriptor, SchemaError, SqlType, TableSchema};
pub use value::{ConversionError, FromSqlValue, SqlValue, ValueKind};

#[cfg(feature = "sqlite")]
pub use database::sqlite::SqliteDriver;

#[cfg(feature = "postgres")]
pub use database::postgres::PostgresDriver;

// Error type
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Schema error on table `{table}`: {source}")]
    Schema {
        table: String,
        #[source]
        source: SchemaError,
    },

    #[error("Query error{}: {source}{}", on_table(.table), in_statement(.statement))]
    Query {
        table: Option<String>,
        statement: Option<String>,
        #[source]
        source: QueryError,
    },

    #[error("Decode error on table `{table}`: {source}")]
    Decode {
        table: String,
        #[source]
        source: DecodeError,
    },

    #[error(transparent)]
    State(#[from] StateError),

    #[error("Statement timed out after {elapsed:?}{}: {statement}", on_table(.table))]
    Timeout {
        table: Option<String>,
        statement: String,
        elapsed: Duration,
    },
}

fn on_table(table: &Option<String>) -> String {
    table
        .as_deref()
        .map(|table| format!(" on table `{}`", table))
        .unwrap_or_default()
}

fn in_statement(statement: &Option<String>) -> String {
    statement
        .as_deref()
        .map(|statement| format!(" (statement: {})", statement))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;
