//! Connection configuration
//!
//! Every field is required and there are no defaults. A configuration can be
//! built in code or read from a JSON document:
//!
//! ```json
//! {
//!   "database": "testdb",
//!   "user": "demo",
//!   "password": "secret",
//!   "host": "localhost",
//!   "port": 5432,
//!   "driver": "postgres"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Database backend to connect to
///
/// Names are matched case-insensitively, in code and in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum DriverKind {
    Postgres,
    Sqlite,
}

impl DriverKind {
    fn requires_server(self) -> bool {
        matches!(self, DriverKind::Postgres)
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::Postgres => write!(f, "postgres"),
            DriverKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl FromStr for DriverKind {
    type Err = ConnectionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DriverKind::Postgres),
            "sqlite" | "sqlite3" => Ok(DriverKind::Sqlite),
            other => Err(ConnectionError::UnknownDriver(other.to_string())),
        }
    }
}

impl TryFrom<String> for DriverKind {
    type Error = ConnectionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Settings used to open a [`Connection`](crate::Connection)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Database name, or the file path (`:memory:` for a private in-memory
    /// database) for SQLite
    pub database: String,

    /// User name
    pub user: String,

    /// User password
    pub password: String,

    /// Host of the database server
    pub host: String,

    /// Port of the database server
    pub port: u16,

    /// The SQL driver required
    pub driver: DriverKind,
}

impl ConnectionConfig {
    /// Configuration for a SQLite database file (or `:memory:`)
    ///
    /// SQLite does not use network settings or credentials; they are left
    /// empty.
    pub fn sqlite(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            user: String::new(),
            password: String::new(),
            host: String::new(),
            port: 0,
            driver: DriverKind::Sqlite,
        }
    }

    /// Parse a configuration from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConnectionError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|error| ConnectionError::InvalidConfig(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConnectionError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|error| {
            ConnectionError::InvalidConfig(format!("cannot read {}: {}", path.display(), error))
        })?;
        Self::from_json_str(&contents)
    }

    /// Check that every field required by the driver is present
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::InvalidConfig`] naming the first missing
    /// field.
    pub fn validate(&self) -> Result<(), ConnectionError> {
        if self.database.trim().is_empty() {
            return Err(ConnectionError::missing("database"));
        }

        if self.driver.requires_server() {
            if self.host.trim().is_empty() {
                return Err(ConnectionError::missing("host"));
            }
            if self.port == 0 {
                return Err(ConnectionError::missing("port"));
            }
            if self.user.trim().is_empty() {
                return Err(ConnectionError::missing("user"));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("driver", &self.driver)
            .finish()
    }
}

/// Failure to configure or establish a session
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Configuration is malformed or missing a required field
    #[error("invalid connection configuration: {0}")]
    InvalidConfig(String),

    /// Driver name is not one of the known kinds
    #[error("unknown driver kind `{0}`")]
    UnknownDriver(String),

    /// Driver kind is known but its cargo feature is disabled
    #[error("driver `{0}` is not enabled in this build")]
    DriverNotEnabled(DriverKind),

    /// Host could not be reached or the database could not be opened
    #[error("cannot reach {target}: {reason}")]
    Unreachable { target: String, reason: String },

    /// Server rejected the credentials
    #[error("authentication failed for user `{user}`: {reason}")]
    Authentication { user: String, reason: String },

    /// The runtime driving the session could not start
    #[error("failed to start connection runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl ConnectionError {
    fn missing(field: &str) -> Self {
        ConnectionError::InvalidConfig(format!("`{}` is required", field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSTGRES_JSON: &str = r#"{
        "database": "testdb",
        "user": "peopledemo",
        "password": "peoplepw",
        "host": "localhost",
        "port": 5432,
        "driver": "postgres"
    }"#;

    #[test]
    fn test_parse_postgres_config() {
        let config = ConnectionConfig::from_json_str(POSTGRES_JSON).unwrap();
        assert_eq!(config.driver, DriverKind::Postgres);
        assert_eq!(config.port, 5432);
        assert_eq!(config.user, "peopledemo");
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let json = r#"{"database": "testdb", "user": "u", "password": "p", "host": "h", "driver": "postgres"}"#;
        let error = ConnectionConfig::from_json_str(json).unwrap_err();
        assert!(matches!(error, ConnectionError::InvalidConfig(_)));
        assert!(error.to_string().contains("port"));
    }

    #[test]
    fn test_unknown_driver_is_rejected() {
        let json = POSTGRES_JSON.replace("\"postgres\"", "\"oracle\"");
        assert!(ConnectionConfig::from_json_str(&json).is_err());
        assert!(matches!(
            "oracle".parse::<DriverKind>(),
            Err(ConnectionError::UnknownDriver(name)) if name == "oracle"
        ));
    }

    #[test]
    fn test_driver_aliases() {
        assert_eq!("PostgreSQL".parse::<DriverKind>().unwrap(), DriverKind::Postgres);
        assert_eq!("sqlite3".parse::<DriverKind>().unwrap(), DriverKind::Sqlite);
        let json = POSTGRES_JSON.replace("\"postgres\"", "\"pg\"");
        assert_eq!(
            ConnectionConfig::from_json_str(&json).unwrap().driver,
            DriverKind::Postgres
        );
    }

    #[test]
    fn test_driver_name_is_case_insensitive_in_json() {
        for name in ["PostgreSQL", "Postgres", "PG"] {
            let json = POSTGRES_JSON.replace("\"postgres\"", &format!("\"{}\"", name));
            assert_eq!(
                ConnectionConfig::from_json_str(&json).unwrap().driver,
                DriverKind::Postgres
            );
        }

        let json = POSTGRES_JSON.replace("\"postgres\"", "\"SQLite3\"");
        assert_eq!(
            ConnectionConfig::from_json_str(&json).unwrap().driver,
            DriverKind::Sqlite
        );

        let json = POSTGRES_JSON.replace("\"postgres\"", "\"Oracle\"");
        let error = ConnectionConfig::from_json_str(&json).unwrap_err();
        assert!(error.to_string().contains("unknown driver kind `oracle`"));
    }

    #[test]
    fn test_driver_kind_serializes_lowercase() {
        let config = ConnectionConfig::sqlite("people.db");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"driver\":\"sqlite\""));
        assert_eq!(ConnectionConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_empty_host_is_rejected_for_postgres() {
        let mut config = ConnectionConfig::from_json_str(POSTGRES_JSON).unwrap();
        config.host = "  ".to_string();
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("host"));
    }

    #[test]
    fn test_sqlite_needs_only_database() {
        assert!(ConnectionConfig::sqlite(":memory:").validate().is_ok());
        assert!(ConnectionConfig::sqlite("").validate().is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = ConnectionConfig::from_json_str(POSTGRES_JSON).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("peoplepw"));
        assert!(rendered.contains("<redacted>"));
    }
}
