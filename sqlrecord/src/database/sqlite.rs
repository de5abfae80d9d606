//! SQLite driver implementation

use crate::config::{ConnectionConfig, ConnectionError};
use crate::database::traits::{Driver, DriverError, RowSet};
use crate::dialect::Dialect;
use crate::query::Statement;
use crate::value::SqlValue;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteRow};
use sqlx::{Column, Connection, Row, Sqlite, SqliteConnection, TypeInfo, ValueRef};
use std::str::FromStr;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// SQLite driver owning a single connection
pub struct SqliteDriver {
    connection: Option<SqliteConnection>,
}

impl SqliteDriver {
    /// Open the database file named by `config.database`
    ///
    /// `:memory:` opens a private in-memory database that lives as long as
    /// this driver. Missing database files are created.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, ConnectionError> {
        let options = if config.database == ":memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|error| ConnectionError::InvalidConfig(error.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&config.database)
                .create_if_missing(true)
        };

        let connection = SqliteConnection::connect_with(&options)
            .await
            .map_err(|error| ConnectionError::Unreachable {
                target: config.database.clone(),
                reason: error.to_string(),
            })?;

        Ok(Self {
            connection: Some(connection),
        })
    }

    fn session(&mut self) -> Result<&mut SqliteConnection, DriverError> {
        self.connection.as_mut().ok_or(DriverError::Closed)
    }

    /// Bind one value to the query
    fn bind_value<'q>(query: SqliteQuery<'q>, value: &SqlValue) -> SqliteQuery<'q> {
        match value {
            SqlValue::Null => query.bind(Option::<String>::None),
            SqlValue::Integer(value) => query.bind(*value),
            SqlValue::Real(value) => query.bind(*value),
            SqlValue::Text(value) => query.bind(value.clone()),
            SqlValue::Boolean(value) => query.bind(*value),
            SqlValue::Bytes(value) => query.bind(value.clone()),
        }
    }

    /// Convert a SQLite row to a vector of values in column order
    fn row_to_values(row: &SqliteRow) -> Result<Vec<SqlValue>, DriverError> {
        (0..row.columns().len())
            .map(|index| Self::extract_column_value(row, index))
            .collect()
    }

    /// Extract a column value from a SQLite row
    ///
    /// SQLite is dynamically typed: the storage class of the value itself
    /// (INTEGER, REAL, TEXT, BLOB, NULL) decides the conversion, not the
    /// declared column type.
    fn extract_column_value(row: &SqliteRow, index: usize) -> Result<SqlValue, DriverError> {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(SqlValue::Null);
        }
        let storage_class = raw.type_info().name().to_string();

        let value = match storage_class.as_str() {
            "INTEGER" => SqlValue::Integer(row.try_get::<i64, _>(index)?),
            "REAL" => SqlValue::Real(row.try_get::<f64, _>(index)?),
            "TEXT" => SqlValue::Text(row.try_get::<String, _>(index)?),
            "BLOB" => SqlValue::Bytes(row.try_get::<Vec<u8>, _>(index)?),
            other => {
                return Err(DriverError::Column {
                    column: row.columns()[index].name().to_string(),
                    reason: format!("unsupported storage class {}", other),
                })
            }
        };

        Ok(value)
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn run(&mut self, statement: &Statement) -> Result<RowSet, DriverError> {
        let session = self.session()?;

        let mut query = sqlx::query(&statement.sql);
        for value in &statement.params {
            query = Self::bind_value(query, value);
        }

        if !statement.returns_rows {
            // For DDL/UPDATE/DELETE, use execute() to get affected rows
            let result = query.execute(&mut *session).await?;
            return Ok(RowSet {
                rows_affected: result.rows_affected(),
                ..RowSet::default()
            });
        }

        let rows = query.fetch_all(&mut *session).await?;

        let columns = rows
            .first()
            .map(|first_row| {
                first_row
                    .columns()
                    .iter()
                    .map(|column| column.name().to_string())
                    .collect()
            })
            .unwrap_or_default();

        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            values.push(Self::row_to_values(row)?);
        }

        Ok(RowSet {
            columns,
            rows_affected: values.len() as u64,
            rows: values,
        })
    }

    async fn table_columns(&mut self, table: &str) -> Result<Vec<String>, DriverError> {
        let session = self.session()?;

        // PRAGMA table_info returns: cid, name, type, notnull, dflt_value, pk
        let table_info_query = format!(
            "PRAGMA table_info({})",
            Dialect::Sqlite.quote_identifier(table)
        );
        let column_rows = sqlx::query(&table_info_query)
            .fetch_all(&mut *session)
            .await?;

        column_rows
            .iter()
            .map(|row| row.try_get::<String, _>("name").map_err(DriverError::from))
            .collect()
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        match self.connection.take() {
            Some(connection) => connection.close().await.map_err(DriverError::from),
            None => Ok(()),
        }
    }
}
