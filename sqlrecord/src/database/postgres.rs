//! PostgreSQL driver implementation

use crate::config::{ConnectionConfig, ConnectionError};
use crate::database::traits::{Driver, DriverError, RowSet};
use crate::dialect::Dialect;
use crate::query::Statement;
use crate::value::{SqlValue, ValueKind};
use async_trait::async_trait;
use sqlx::encode::{Encode, IsNull};
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgConnectOptions, PgRow, PgTypeInfo};
use sqlx::{Column, Connection, PgConnection, Postgres, Row, Type, TypeInfo};

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// A `NULL` parameter declared with the type of the column it targets
///
/// PostgreSQL does not coerce a `TEXT` typed NULL into other column types, so
/// the declared type has to follow the column.
#[derive(Debug, Clone)]
struct TypedNull(PgTypeInfo);

impl TypedNull {
    /// `NULL` typed for a column of `kind`; untyped parameters fall back to TEXT
    fn for_kind(kind: Option<ValueKind>) -> Self {
        let type_info = match kind {
            Some(ValueKind::I16) => <i16 as Type<Postgres>>::type_info(),
            Some(ValueKind::I32) => <i32 as Type<Postgres>>::type_info(),
            Some(ValueKind::I64) => <i64 as Type<Postgres>>::type_info(),
            Some(ValueKind::F32) => <f32 as Type<Postgres>>::type_info(),
            Some(ValueKind::F64) => <f64 as Type<Postgres>>::type_info(),
            Some(ValueKind::Bool) => <bool as Type<Postgres>>::type_info(),
            Some(ValueKind::Bytes) => <Vec<u8> as Type<Postgres>>::type_info(),
            Some(ValueKind::Text) | None => <String as Type<Postgres>>::type_info(),
        };
        TypedNull(type_info)
    }
}

impl Type<Postgres> for TypedNull {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }

    fn compatible(_ty: &PgTypeInfo) -> bool {
        true
    }
}

impl<'q> Encode<'q, Postgres> for TypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(self.0.clone())
    }
}

/// SQLSTATE codes PostgreSQL uses for rejected credentials
const AUTHENTICATION_FAILURE_CODES: [&str; 2] = ["28000", "28P01"];

/// PostgreSQL driver owning a single connection
pub struct PostgresDriver {
    connection: Option<PgConnection>,
}

impl PostgresDriver {
    /// Connect to the server described by `config`
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::Authentication`] when the server rejects the
    ///   credentials
    /// - [`ConnectionError::Unreachable`] for every other failure
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, ConnectionError> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        let connection = PgConnection::connect_with(&options)
            .await
            .map_err(|error| Self::classify_connect_error(config, error))?;

        Ok(Self {
            connection: Some(connection),
        })
    }

    fn classify_connect_error(config: &ConnectionConfig, error: sqlx::Error) -> ConnectionError {
        if let sqlx::Error::Database(database_error) = &error {
            let code = database_error.code();
            if code
                .as_deref()
                .map(|code| AUTHENTICATION_FAILURE_CODES.contains(&code))
                .unwrap_or(false)
            {
                return ConnectionError::Authentication {
                    user: config.user.clone(),
                    reason: database_error.message().to_string(),
                };
            }
        }

        ConnectionError::Unreachable {
            target: format!("{}:{}/{}", config.host, config.port, config.database),
            reason: error.to_string(),
        }
    }

    fn session(&mut self) -> Result<&mut PgConnection, DriverError> {
        self.connection.as_mut().ok_or(DriverError::Closed)
    }

    /// Bind one value to the query
    ///
    /// Integers are sent as INT8 and reals as FLOAT8; PostgreSQL applies
    /// assignment casts for narrower columns. `NULL` takes the type of the
    /// target column when `kind` is known.
    fn bind_value<'q>(
        query: PgQuery<'q>,
        value: &SqlValue,
        kind: Option<ValueKind>,
    ) -> PgQuery<'q> {
        match value {
            SqlValue::Null => query.bind(TypedNull::for_kind(kind)),
            SqlValue::Integer(value) => query.bind(*value),
            SqlValue::Real(value) => query.bind(*value),
            SqlValue::Text(value) => query.bind(value.clone()),
            SqlValue::Boolean(value) => query.bind(*value),
            SqlValue::Bytes(value) => query.bind(value.clone()),
        }
    }

    /// Convert a PostgreSQL row to a vector of values in column order
    fn row_to_values(row: &PgRow) -> Result<Vec<SqlValue>, DriverError> {
        let mut values = Vec::with_capacity(row.columns().len());

        for (index, column) in row.columns().iter().enumerate() {
            let type_info = column.type_info();
            let type_name = type_info.name();

            let value = match type_name {
                "BOOL" => row
                    .try_get::<Option<bool>, _>(index)?
                    .map(SqlValue::Boolean),
                "INT2" | "SMALLINT" | "SMALLSERIAL" => row
                    .try_get::<Option<i16>, _>(index)?
                    .map(|value| SqlValue::Integer(i64::from(value))),
                "INT4" | "INT" | "INTEGER" | "SERIAL" => row
                    .try_get::<Option<i32>, _>(index)?
                    .map(|value| SqlValue::Integer(i64::from(value))),
                "INT8" | "BIGINT" | "BIGSERIAL" => row
                    .try_get::<Option<i64>, _>(index)?
                    .map(SqlValue::Integer),
                "FLOAT4" | "REAL" => row
                    .try_get::<Option<f32>, _>(index)?
                    .map(|value| SqlValue::Real(f64::from(value))),
                "FLOAT8" | "DOUBLE PRECISION" => row
                    .try_get::<Option<f64>, _>(index)?
                    .map(SqlValue::Real),
                "TEXT" | "VARCHAR" | "CHAR" | "NAME" | "BPCHAR" => row
                    .try_get::<Option<String>, _>(index)?
                    .map(SqlValue::Text),
                "BYTEA" => row
                    .try_get::<Option<Vec<u8>>, _>(index)?
                    .map(SqlValue::Bytes),
                other => {
                    return Err(DriverError::Column {
                        column: column.name().to_string(),
                        reason: format!("unsupported column type {}", other),
                    })
                }
            };

            values.push(value.unwrap_or(SqlValue::Null));
        }

        Ok(values)
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn run(&mut self, statement: &Statement) -> Result<RowSet, DriverError> {
        let session = self.session()?;

        let mut query = sqlx::query(&statement.sql);
        for (index, value) in statement.params.iter().enumerate() {
            query = Self::bind_value(query, value, statement.param_kind(index));
        }

        if !statement.returns_rows {
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

        let column_query = r#"
            SELECT column_name
            FROM information_schema.columns
            WHERE table_schema = current_schema()
              AND table_name = $1
            ORDER BY ordinal_position
        "#;

        let column_rows = sqlx::query(column_query)
            .bind(table)
            .fetch_all(&mut *session)
            .await?;

        column_rows
            .iter()
            .map(|row| row.try_get::<String, _>("column_name").map_err(DriverError::from))
            .collect()
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        match self.connection.take() {
            Some(connection) => connection.close().await.map_err(DriverError::from),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverKind;
    use crate::dialect::Dialect;
    use crate::query::QueryBuilder;
    use crate::schema::{FieldDescriptor, RecordDescriptor};

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            database: "testdb".to_string(),
            user: "peopledemo".to_string(),
            password: "peoplepw".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            driver: DriverKind::Postgres,
        }
    }

    #[test]
    fn test_io_failure_is_unreachable() {
        let error = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        match PostgresDriver::classify_connect_error(&config(), error) {
            ConnectionError::Unreachable { target, .. } => {
                assert_eq!(target, "localhost:5432/testdb")
            }
            other => panic!("expected unreachable, got {:?}", other),
        }
    }

    fn null_type(kind: Option<ValueKind>) -> String {
        let null = TypedNull::for_kind(kind);
        let produced = <TypedNull as Encode<'_, Postgres>>::produces(&null).unwrap();
        produced.name().to_string()
    }

    #[test]
    fn test_null_takes_column_type() {
        assert_eq!(null_type(Some(ValueKind::I16)), "INT2");
        assert_eq!(null_type(Some(ValueKind::I32)), "INT4");
        assert_eq!(null_type(Some(ValueKind::I64)), "INT8");
        assert_eq!(null_type(Some(ValueKind::F64)), "FLOAT8");
        assert_eq!(null_type(Some(ValueKind::Bool)), "BOOL");
        assert_eq!(null_type(Some(ValueKind::Bytes)), "BYTEA");
        assert_eq!(null_type(Some(ValueKind::Text)), "TEXT");
        assert_eq!(null_type(None), "TEXT");
    }

    #[test]
    fn test_nullable_integer_insert_binds_integer_null() {
        static SCORED: RecordDescriptor = RecordDescriptor::new(
            "Scored",
            &[
                FieldDescriptor::new("id", ValueKind::I32).identity(),
                FieldDescriptor::new("name", ValueKind::Text),
                FieldDescriptor::new("score", ValueKind::I32).nullable(),
            ],
        );
        let schema = SCORED.derive_table("scores").unwrap();
        let statement = QueryBuilder::new(&schema, Dialect::Postgres)
            .insert(vec!["late".into(), SqlValue::Null])
            .unwrap();

        assert_eq!(statement.params[1], SqlValue::Null);
        assert_eq!(null_type(statement.param_kind(1)), "INT4");
    }
}
