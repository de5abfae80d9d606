//! Connection lifecycle and the caller-facing CRUD API
//!
//! A [`Connection`] owns one driver session and a private current-thread
//! `tokio` runtime that drives it, so every call blocks until the database
//! has answered. Statements issued through one connection run in the order
//! they were submitted.
//!
//! # Lifecycle
//!
//! ```text
//! Unconfigured --open--> Connected --ensure_table--> SchemaEnsured --> Ready
//!                            |                                           |
//!                            +-------------------close-------------------+--> Closed
//! ```
//!
//! CRUD calls are accepted in `Connected` and `Ready`. `Closed` is terminal;
//! repeating [`Connection::close`] is a no-op.
//!
//! A `Connection` is a blocking API and must not be used or dropped from
//! inside another async runtime. It must not be shared between call sites
//! without external serialization (e.g. a mutex).

use crate::config::{ConnectionConfig, ConnectionError};
use crate::database::{self, Driver, RowSet};
use crate::dialect::Dialect;
use crate::materialize::{materialize, DecodeError, Record};
use crate::query::{Filter, QueryBuilder, QueryError, Statement};
use crate::schema::{SchemaError, TableSchema};
use crate::value::{FromSqlValue, SqlValue};
use crate::{Error, Result};
use std::any::TypeId;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// Lifecycle state of a [`Connection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created without configuration; only `open` is valid
    Unconfigured,
    /// Session established, no table ensured yet
    Connected,
    /// Table DDL is being applied
    SchemaEnsured,
    /// At least one table ensured; CRUD calls accepted
    Ready,
    /// Session released; terminal
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Unconfigured => "unconfigured",
            ConnectionState::Connected => "connected",
            ConnectionState::SchemaEnsured => "ensuring schema",
            ConnectionState::Ready => "ready",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Operation invoked outside its valid lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot {operation}: connection is {state}")]
pub struct StateError {
    pub operation: &'static str,
    pub state: ConnectionState,
}

/// Open a connection with the given configuration
///
/// # Errors
///
/// Returns [`Error::Connection`] when the configuration is incomplete, the
/// driver kind is unavailable, the host cannot be reached, or the server
/// rejects the credentials.
pub fn connect(config: ConnectionConfig) -> Result<Connection> {
    let mut connection = Connection::new();
    connection.open(config)?;
    Ok(connection)
}

/// A live database session plus the configuration used to open it
pub struct Connection {
    runtime: Option<Runtime>,
    driver: Option<Box<dyn Driver>>,
    config: Option<ConnectionConfig>,
    state: ConnectionState,
    schemas: HashMap<(String, TypeId), Arc<TableSchema>>,
    statement_timeout: Option<Duration>,
}

impl Connection {
    /// Create an unconfigured connection; call [`Connection::open`] next
    pub fn new() -> Self {
        Self {
            runtime: None,
            driver: None,
            config: None,
            state: ConnectionState::Unconfigured,
            schemas: HashMap::new(),
            statement_timeout: None,
        }
    }

    /// Wrap an already connected driver
    ///
    /// This is the entry point for drivers implemented outside this crate.
    pub fn from_driver(driver: Box<dyn Driver>) -> Result<Self> {
        let mut connection = Self::new();
        connection.runtime = Some(build_runtime()?);
        connection.driver = Some(driver);
        connection.state = ConnectionState::Connected;
        Ok(connection)
    }

    /// Validate `config` and establish the session
    pub fn open(&mut self, config: ConnectionConfig) -> Result<()> {
        self.require_state("open", &[ConnectionState::Unconfigured])?;
        config.validate()?;

        let started_at = Instant::now();
        info!(driver = %config.driver, database = %config.database, "opening connection");

        if self.runtime.is_none() {
            self.runtime = Some(build_runtime()?);
        }
        let runtime = self.runtime.as_ref().ok_or(StateError {
            operation: "open",
            state: self.state,
        })?;

        let driver = match runtime.block_on(database::open_driver(&config)) {
            Ok(driver) => driver,
            Err(error) => {
                warn!(
                    driver = %config.driver,
                    duration_ms = started_at.elapsed().as_millis() as u64,
                    %error,
                    "connection failed"
                );
                return Err(error.into());
            }
        };

        info!(
            driver = %config.driver,
            duration_ms = started_at.elapsed().as_millis() as u64,
            "connection established"
        );

        self.driver = Some(driver);
        self.config = Some(config);
        self.state = ConnectionState::Connected;
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Configuration used to open the connection, if it was opened with one
    pub fn config(&self) -> Option<&ConnectionConfig> {
        self.config.as_ref()
    }

    /// Dialect of the open session
    pub fn dialect(&self) -> Result<Dialect> {
        self.driver
            .as_ref()
            .map(|driver| driver.dialect())
            .ok_or_else(|| {
                StateError {
                    operation: "query the dialect",
                    state: self.state,
                }
                .into()
            })
    }

    /// Deadline applied to every subsequent statement; `None` waits forever
    ///
    /// A statement that exceeds the deadline fails with [`Error::Timeout`].
    /// Close the connection after a timeout: the session may be left
    /// mid-statement.
    pub fn set_statement_timeout(&mut self, timeout: Option<Duration>) {
        self.statement_timeout = timeout;
    }

    /// Run a raw statement
    ///
    /// Every statement issued by this connection, including the ones built
    /// by the typed operations, passes through here.
    pub fn execute(&mut self, statement: &Statement) -> Result<RowSet> {
        self.run(None, statement)
    }

    /// Create `table` for record type `R` if it does not exist
    ///
    /// Re-running against an existing table with the same columns neither
    /// fails nor touches its data.
    ///
    /// # Errors
    ///
    /// - [`Error::Schema`] when `R`'s descriptor is invalid (before any
    ///   statement is sent), or when the existing table's column set differs
    ///   from the descriptor
    /// - [`Error::Query`] when the DDL fails
    pub fn ensure_table<R: Record>(&mut self, table: &str) -> Result<()> {
        self.require_open("ensure a table")?;
        let schema = self.schema_for::<R>(table)?;

        let previous = self.state;
        self.state = ConnectionState::SchemaEnsured;
        let result = self.apply_schema(&schema);
        self.state = match result {
            Ok(()) => ConnectionState::Ready,
            Err(_) => previous,
        };
        result
    }

    /// Insert `record`, returning the identity generated by the store
    pub fn insert<R: Record>(&mut self, table: &str, record: &R) -> Result<i64> {
        self.require_open("insert")?;
        let schema = self.schema_for::<R>(table)?;
        let statement = QueryBuilder::new(&schema, self.dialect()?)
            .insert(record.values())
            .map_err(|source| query_error(table, None, source))?;

        let rows = self.run(Some(table), &statement)?;
        let identity = rows
            .scalar()
            .cloned()
            .ok_or_else(|| query_error(table, Some(&statement), QueryError::MissingIdentity))?;

        let field = R::descriptor().fields[schema.identity].name;
        let id = i64::from_sql_value(identity).map_err(|reason| Error::Decode {
            table: table.to_string(),
            source: DecodeError::Conversion {
                row: 0,
                field,
                reason,
            },
        })?;

        debug!(table, id, "record inserted");
        Ok(id)
    }

    /// Every row of `table`, ordered by identity
    pub fn select_all<R: Record>(&mut self, table: &str) -> Result<Vec<R>> {
        self.select::<R>(table, None)
    }

    /// Rows of `table` matching `filter`, ordered by identity
    ///
    /// A `&str` filter is inserted into the `WHERE` clause verbatim; never
    /// pass text that came from untrusted input. Use a structured
    /// [`Filter`] for values supplied at runtime.
    pub fn select_where<R: Record>(
        &mut self,
        table: &str,
        filter: impl Into<Filter>,
    ) -> Result<Vec<R>> {
        let filter = filter.into();
        self.select::<R>(table, Some(&filter))
    }

    /// The row of `table` with identity `id`
    pub fn select_by_id<R: Record>(&mut self, table: &str, id: i64) -> Result<Option<R>> {
        self.require_open("select")?;
        let schema = self.schema_for::<R>(table)?;
        let statement = QueryBuilder::new(&schema, self.dialect()?).select_by_id(id);
        let rows = self.run(Some(table), &statement)?;
        let mut records = decode::<R>(table, rows)?;
        Ok(records.pop())
    }

    /// Overwrite every non-identity column of the row with identity `id`
    ///
    /// Returns whether a row was updated.
    pub fn update<R: Record>(&mut self, table: &str, id: i64, record: &R) -> Result<bool> {
        self.require_open("update")?;
        let schema = self.schema_for::<R>(table)?;
        let statement = QueryBuilder::new(&schema, self.dialect()?)
            .update(id, record.values())
            .map_err(|source| query_error(table, None, source))?;
        let rows = self.run(Some(table), &statement)?;
        Ok(rows.rows_affected > 0)
    }

    /// Delete the rows of `table` matching `filter`, returning how many
    pub fn delete_where<R: Record>(
        &mut self,
        table: &str,
        filter: impl Into<Filter>,
    ) -> Result<u64> {
        self.require_open("delete")?;
        let filter = filter.into();
        let schema = self.schema_for::<R>(table)?;
        let statement = QueryBuilder::new(&schema, self.dialect()?)
            .delete(&filter)
            .map_err(|source| query_error(table, None, source))?;
        let rows = self.run(Some(table), &statement)?;
        Ok(rows.rows_affected)
    }

    /// Number of rows in `table`, optionally filtered
    pub fn count<R: Record>(&mut self, table: &str, filter: Option<Filter>) -> Result<u64> {
        self.require_open("count")?;
        let schema = self.schema_for::<R>(table)?;
        let statement = QueryBuilder::new(&schema, self.dialect()?)
            .count(filter.as_ref())
            .map_err(|source| query_error(table, None, source))?;
        let rows = self.run(Some(table), &statement)?;

        let count = rows.scalar().cloned().unwrap_or(SqlValue::Integer(0));
        let count = i64::from_sql_value(count).map_err(|reason| Error::Decode {
            table: table.to_string(),
            source: DecodeError::Conversion {
                row: 0,
                field: "count",
                reason,
            },
        })?;
        Ok(count.max(0) as u64)
    }

    /// Release the session
    ///
    /// Safe to call more than once; later calls do nothing. A failure to
    /// close cleanly is logged, the session is dropped regardless.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }

        if let (Some(runtime), Some(mut driver)) = (self.runtime.as_ref(), self.driver.take()) {
            if let Err(error) = runtime.block_on(driver.close()) {
                warn!(%error, "failed to close session cleanly");
            }
            info!("connection closed");
        }

        self.schemas.clear();
        self.state = ConnectionState::Closed;
    }

    fn select<R: Record>(&mut self, table: &str, filter: Option<&Filter>) -> Result<Vec<R>> {
        self.require_open("select")?;
        let schema = self.schema_for::<R>(table)?;
        let statement = QueryBuilder::new(&schema, self.dialect()?)
            .select(filter)
            .map_err(|source| query_error(table, None, source))?;
        let rows = self.run(Some(table), &statement)?;
        decode::<R>(table, rows)
    }

    /// Derived schema for (`table`, `R`), cached for the connection's lifetime
    fn schema_for<R: Record>(&mut self, table: &str) -> Result<Arc<TableSchema>> {
        let key = (table.to_string(), TypeId::of::<R>());
        if let Some(schema) = self.schemas.get(&key) {
            return Ok(Arc::clone(schema));
        }

        let schema = R::descriptor()
            .derive_table(table)
            .map(Arc::new)
            .map_err(|source| Error::Schema {
                table: table.to_string(),
                source,
            })?;
        self.schemas.insert(key, Arc::clone(&schema));
        Ok(schema)
    }

    fn apply_schema(&mut self, schema: &TableSchema) -> Result<()> {
        let table = schema.table.as_str();
        let statement = QueryBuilder::new(schema, self.dialect()?).create_table();
        self.run(Some(table), &statement)?;

        let found = self.table_columns(table)?;
        let expected: BTreeSet<&str> = schema.column_names().into_iter().collect();
        let actual: BTreeSet<&str> = found.iter().map(String::as_str).collect();
        if expected != actual {
            return Err(Error::Schema {
                table: table.to_string(),
                source: SchemaError::TableMismatch {
                    table: table.to_string(),
                    expected: schema.column_names().iter().map(|name| name.to_string()).collect(),
                    found,
                },
            });
        }

        info!(table, record = schema.record, "table ensured");
        Ok(())
    }

    fn table_columns(&mut self, table: &str) -> Result<Vec<String>> {
        let (runtime, driver) = self.session("inspect a table")?;
        runtime
            .block_on(driver.table_columns(table))
            .map_err(|error| query_error(table, None, QueryError::Driver(error)))
    }

    /// The single choke point through which statements reach the driver
    fn run(&mut self, table: Option<&str>, statement: &Statement) -> Result<RowSet> {
        let statement_timeout = self.statement_timeout;
        let (runtime, driver) = self.session("execute a statement")?;

        let started_at = Instant::now();
        let outcome = match statement_timeout {
            // The timer registers with the runtime, so it is created inside `block_on`
            Some(limit) => runtime.block_on(async {
                tokio::time::timeout(limit, driver.run(statement)).await
            }),
            None => Ok(runtime.block_on(driver.run(statement))),
        };
        let duration_ms = started_at.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(rows)) => {
                debug!(
                    sql = %statement.sql,
                    params = statement.params.len(),
                    rows = rows.rows.len(),
                    rows_affected = rows.rows_affected,
                    duration_ms,
                    "statement executed"
                );
                Ok(rows)
            }
            Ok(Err(error)) => {
                debug!(sql = %statement.sql, duration_ms, %error, "statement failed");
                Err(Error::Query {
                    table: table.map(str::to_string),
                    statement: Some(statement.sql.clone()),
                    source: QueryError::Driver(error),
                })
            }
            Err(_) => {
                warn!(sql = %statement.sql, duration_ms, "statement timed out");
                Err(Error::Timeout {
                    table: table.map(str::to_string),
                    statement: statement.sql.clone(),
                    elapsed: started_at.elapsed(),
                })
            }
        }
    }

    fn session(&mut self, operation: &'static str) -> Result<(&Runtime, &mut Box<dyn Driver>)> {
        self.require_open(operation)?;
        match (self.runtime.as_ref(), self.driver.as_mut()) {
            (Some(runtime), Some(driver)) => Ok((runtime, driver)),
            _ => Err(StateError {
                operation,
                state: self.state,
            }
            .into()),
        }
    }

    fn require_open(&self, operation: &'static str) -> Result<()> {
        self.require_state(
            operation,
            &[
                ConnectionState::Connected,
                ConnectionState::SchemaEnsured,
                ConnectionState::Ready,
            ],
        )
    }

    fn require_state(&self, operation: &'static str, allowed: &[ConnectionState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(StateError {
                operation,
                state: self.state,
            }
            .into())
        }
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("statement_timeout", &self.statement_timeout)
            .finish_non_exhaustive()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

fn build_runtime() -> std::result::Result<Runtime, ConnectionError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(ConnectionError::Runtime)
}

fn decode<R: Record>(table: &str, rows: RowSet) -> Result<Vec<R>> {
    materialize::<R>(rows).map_err(|source| Error::Decode {
        table: table.to_string(),
        source,
    })
}

fn query_error(table: &str, statement: Option<&Statement>, source: QueryError) -> Error {
    Error::Query {
        table: Some(table.to_string()),
        statement: statement.map(|statement| statement.sql.clone()),
        source,
    }
}
