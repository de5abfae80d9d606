//! SQL spelling differences between the supported backends

/// SQL dialect spoken by a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Quote an identifier (table or column name) to prevent SQL injection
    ///
    /// Both PostgreSQL and SQLite use double quotes for identifiers. Embedded
    /// double quotes are escaped by doubling them.
    pub fn quote_identifier(self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    /// Positional placeholder for the 1-based parameter `index`
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::Sqlite => "?".to_string(),
        }
    }
}
