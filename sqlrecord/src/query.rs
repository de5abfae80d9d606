//! Statement and filter construction
//!
//! [`QueryBuilder`] turns a derived [`TableSchema`] into parameterized SQL.
//! Column lists are always emitted in descriptor order, which is what the
//! materializer relies on when it reads rows back by ordinal.

use crate::database::DriverError;
use crate::dialect::Dialect;
use crate::schema::TableSchema;
use crate::value::{SqlValue, ValueKind};
use thiserror::Error;

/// SQL text plus its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text with dialect placeholders
    pub sql: String,

    /// Parameters in placeholder order
    pub params: Vec<SqlValue>,

    /// Declared kind of the column each parameter targets, when known
    ///
    /// Drivers that type their parameters use it to send a `NULL` with the
    /// column's type instead of text.
    pub param_kinds: Vec<Option<ValueKind>>,

    /// Whether the statement produces rows (SELECT, INSERT ... RETURNING)
    pub returns_rows: bool,
}

impl Statement {
    /// A statement that does not produce rows (DDL, UPDATE, DELETE)
    pub fn execute(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            param_kinds: Vec::new(),
            returns_rows: false,
        }
    }

    /// A statement that produces rows
    pub fn query(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            param_kinds: Vec::new(),
            returns_rows: true,
        }
    }

    /// Append a positional parameter
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self.param_kinds.push(None);
        self
    }

    /// Append a positional parameter targeting a column of `kind`
    pub fn bind_typed(mut self, value: impl Into<SqlValue>, kind: ValueKind) -> Self {
        self.params.push(value.into());
        self.param_kinds.push(Some(kind));
        self
    }

    /// Declared kind of the parameter at 0-based `index`, if known
    pub fn param_kind(&self, index: usize) -> Option<ValueKind> {
        self.param_kinds.get(index).copied().flatten()
    }
}

/// Parameters collected while rendering a statement
#[derive(Debug, Default)]
struct Params {
    values: Vec<SqlValue>,
    kinds: Vec<Option<ValueKind>>,
}

impl Params {
    /// Append a value, returning its 1-based position
    fn push(&mut self, value: SqlValue, kind: ValueKind) -> usize {
        self.values.push(value);
        self.kinds.push(Some(kind));
        self.values.len()
    }
}

/// Comparison operators for structured filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
}

impl Operator {
    fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "<>",
            Operator::Lt => "<",
            Operator::LtEq => "<=",
            Operator::Gt => ">",
            Operator::GtEq => ">=",
            Operator::Like => "LIKE",
        }
    }
}

/// Row filter for SELECT, COUNT and DELETE
///
/// # Security Warning
///
/// [`Filter::Raw`] text is inserted into the `WHERE` clause verbatim. Never
/// build it from untrusted input; use the structured variants, which bind
/// their values as parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Condition text passed through verbatim (e.g. `age >= 75`)
    Raw(String),

    /// `<column> <operator> <bound value>`
    Compare {
        column: String,
        operator: Operator,
        value: SqlValue,
    },

    /// `<column> IS NULL` or `<column> IS NOT NULL`
    Null { column: String, negated: bool },

    /// Conjunction of filters
    And(Vec<Filter>),
}

impl Filter {
    /// Raw condition text, inserted verbatim
    pub fn raw(condition: impl Into<String>) -> Self {
        Filter::Raw(condition.into())
    }

    /// Start a structured predicate on `column`
    pub fn column(column: impl Into<String>) -> ColumnFilter {
        ColumnFilter {
            column: column.into(),
        }
    }

    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And(filters.into_iter().collect())
    }

    /// Render the condition, appending bound values to `params`
    fn render(
        &self,
        schema: &TableSchema,
        dialect: Dialect,
        params: &mut Params,
    ) -> Result<String, QueryError> {
        match self {
            Filter::Raw(condition) => {
                if condition.trim().is_empty() {
                    return Err(QueryError::EmptyFilter);
                }
                Ok(format!("({})", condition))
            }
            Filter::Compare {
                column,
                operator,
                value,
            } => {
                let (column, kind) = checked_column(schema, dialect, column)?;
                let position = params.push(value.clone(), kind);
                Ok(format!(
                    "{} {} {}",
                    column,
                    operator.as_sql(),
                    dialect.placeholder(position)
                ))
            }
            Filter::Null { column, negated } => {
                let (column, _) = checked_column(schema, dialect, column)?;
                let test = if *negated { "IS NOT NULL" } else { "IS NULL" };
                Ok(format!("{} {}", column, test))
            }
            Filter::And(filters) => {
                if filters.is_empty() {
                    return Err(QueryError::EmptyFilter);
                }
                let parts = filters
                    .iter()
                    .map(|filter| filter.render(schema, dialect, params))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({})", parts.join(" AND ")))
            }
        }
    }
}

impl From<&str> for Filter {
    fn from(condition: &str) -> Self {
        Filter::Raw(condition.to_string())
    }
}

impl From<String> for Filter {
    fn from(condition: String) -> Self {
        Filter::Raw(condition)
    }
}

/// Builder for a structured predicate on one column
#[derive(Debug, Clone)]
pub struct ColumnFilter {
    column: String,
}

impl ColumnFilter {
    fn compare(self, operator: Operator, value: impl Into<SqlValue>) -> Filter {
        Filter::Compare {
            column: self.column,
            operator,
            value: value.into(),
        }
    }

    pub fn eq(self, value: impl Into<SqlValue>) -> Filter {
        self.compare(Operator::Eq, value)
    }

    pub fn ne(self, value: impl Into<SqlValue>) -> Filter {
        self.compare(Operator::NotEq, value)
    }

    pub fn lt(self, value: impl Into<SqlValue>) -> Filter {
        self.compare(Operator::Lt, value)
    }

    pub fn le(self, value: impl Into<SqlValue>) -> Filter {
        self.compare(Operator::LtEq, value)
    }

    pub fn gt(self, value: impl Into<SqlValue>) -> Filter {
        self.compare(Operator::Gt, value)
    }

    pub fn ge(self, value: impl Into<SqlValue>) -> Filter {
        self.compare(Operator::GtEq, value)
    }

    pub fn like(self, pattern: impl Into<String>) -> Filter {
        self.compare(Operator::Like, SqlValue::Text(pattern.into()))
    }

    pub fn is_null(self) -> Filter {
        Filter::Null {
            column: self.column,
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Filter {
        Filter::Null {
            column: self.column,
            negated: true,
        }
    }
}

/// Errors raised while building or running a statement
#[derive(Debug, Error)]
pub enum QueryError {
    /// Record supplied a different number of values than insertable columns
    #[error("expected {expected} values, got {found}")]
    ValueCount { expected: usize, found: usize },

    /// Structured filter names a column the table does not have
    #[error("unknown column `{0}`")]
    UnknownColumn(String),

    /// Filter has no condition
    #[error("filter is empty")]
    EmptyFilter,

    /// Table has no columns besides the identity
    #[error("table has no columns to update")]
    NothingToUpdate,

    /// INSERT did not return the generated identity
    #[error("insert did not return a generated identity")]
    MissingIdentity,

    /// Driver-reported failure
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Builds statements for one derived table schema
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<'a> {
    schema: &'a TableSchema,
    dialect: Dialect,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(schema: &'a TableSchema, dialect: Dialect) -> Self {
        Self { schema, dialect }
    }

    fn table(&self) -> String {
        self.dialect.quote_identifier(&self.schema.table)
    }

    fn identity(&self) -> String {
        self.dialect
            .quote_identifier(&self.schema.identity_column().name)
    }

    fn select_list(&self) -> String {
        self.schema
            .columns
            .iter()
            .map(|column| self.dialect.quote_identifier(&column.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn insert_kinds(&self) -> Vec<Option<ValueKind>> {
        self.schema
            .insert_columns()
            .map(|column| Some(column.kind))
            .collect()
    }

    fn check_value_count(&self, values: &[SqlValue]) -> Result<(), QueryError> {
        let expected = self.schema.insert_columns().count();
        if values.len() != expected {
            return Err(QueryError::ValueCount {
                expected,
                found: values.len(),
            });
        }
        Ok(())
    }

    /// `CREATE TABLE IF NOT EXISTS` for the schema
    pub fn create_table(&self) -> Statement {
        Statement::execute(self.schema.create_table_sql(self.dialect))
    }

    /// INSERT naming every non-identity column, returning the identity
    ///
    /// `values` must hold one value per non-identity column, in descriptor
    /// order.
    pub fn insert(&self, values: Vec<SqlValue>) -> Result<Statement, QueryError> {
        self.check_value_count(&values)?;

        let columns: Vec<String> = self
            .schema
            .insert_columns()
            .map(|column| self.dialect.quote_identifier(&column.name))
            .collect();

        let sql = if columns.is_empty() {
            format!(
                "INSERT INTO {} DEFAULT VALUES RETURNING {}",
                self.table(),
                self.identity()
            )
        } else {
            let placeholders: Vec<String> = (1..=columns.len())
                .map(|index| self.dialect.placeholder(index))
                .collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                self.table(),
                columns.join(", "),
                placeholders.join(", "),
                self.identity()
            )
        };

        Ok(Statement {
            sql,
            params: values,
            param_kinds: self.insert_kinds(),
            returns_rows: true,
        })
    }

    /// SELECT every column, optionally filtered, ordered by identity
    pub fn select(&self, filter: Option<&Filter>) -> Result<Statement, QueryError> {
        let mut params = Params::default();
        let where_clause = self.where_clause(filter, &mut params)?;

        Ok(Statement {
            sql: format!(
                "SELECT {} FROM {}{} ORDER BY {}",
                self.select_list(),
                self.table(),
                where_clause,
                self.identity()
            ),
            params: params.values,
            param_kinds: params.kinds,
            returns_rows: true,
        })
    }

    /// SELECT the single row with identity `id`
    pub fn select_by_id(&self, id: i64) -> Statement {
        Statement {
            sql: format!(
                "SELECT {} FROM {} WHERE {} = {}",
                self.select_list(),
                self.table(),
                self.identity(),
                self.dialect.placeholder(1)
            ),
            params: vec![SqlValue::Integer(id)],
            param_kinds: vec![Some(self.schema.identity_column().kind)],
            returns_rows: true,
        }
    }

    /// UPDATE every non-identity column of the row with identity `id`
    pub fn update(&self, id: i64, values: Vec<SqlValue>) -> Result<Statement, QueryError> {
        self.check_value_count(&values)?;

        let assignments: Vec<String> = self
            .schema
            .insert_columns()
            .enumerate()
            .map(|(index, column)| {
                format!(
                    "{} = {}",
                    self.dialect.quote_identifier(&column.name),
                    self.dialect.placeholder(index + 1)
                )
            })
            .collect();

        if assignments.is_empty() {
            return Err(QueryError::NothingToUpdate);
        }

        let mut params = values;
        params.push(SqlValue::Integer(id));
        let mut param_kinds = self.insert_kinds();
        param_kinds.push(Some(self.schema.identity_column().kind));

        Ok(Statement {
            sql: format!(
                "UPDATE {} SET {} WHERE {} = {}",
                self.table(),
                assignments.join(", "),
                self.identity(),
                self.dialect.placeholder(params.len())
            ),
            params,
            param_kinds,
            returns_rows: false,
        })
    }

    /// DELETE the rows matching `filter`
    ///
    /// A filter is mandatory; there is no unfiltered delete.
    pub fn delete(&self, filter: &Filter) -> Result<Statement, QueryError> {
        let mut params = Params::default();
        let where_clause = self.where_clause(Some(filter), &mut params)?;

        Ok(Statement {
            sql: format!("DELETE FROM {}{}", self.table(), where_clause),
            params: params.values,
            param_kinds: params.kinds,
            returns_rows: false,
        })
    }

    /// SELECT COUNT(*), optionally filtered
    pub fn count(&self, filter: Option<&Filter>) -> Result<Statement, QueryError> {
        let mut params = Params::default();
        let where_clause = self.where_clause(filter, &mut params)?;

        Ok(Statement {
            sql: format!("SELECT COUNT(*) FROM {}{}", self.table(), where_clause),
            params: params.values,
            param_kinds: params.kinds,
            returns_rows: true,
        })
    }

    /// Build a WHERE clause from an optional filter
    fn where_clause(
        &self,
        filter: Option<&Filter>,
        params: &mut Params,
    ) -> Result<String, QueryError> {
        match filter {
            Some(filter) => Ok(format!(
                " WHERE {}",
                filter.render(self.schema, self.dialect, params)?
            )),
            None => Ok(String::new()),
        }
    }
}

/// Quoted name and declared kind of `column`, which must exist in `schema`
fn checked_column(
    schema: &TableSchema,
    dialect: Dialect,
    column: &str,
) -> Result<(String, ValueKind), QueryError> {
    let definition = schema
        .column(column)
        .ok_or_else(|| QueryError::UnknownColumn(column.to_string()))?;
    Ok((dialect.quote_identifier(&definition.name), definition.kind))
}
