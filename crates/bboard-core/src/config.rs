//! Database connection configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{BoardError, Result};

/// Default MySQL/MariaDB port
pub const DEFAULT_PORT: u16 = 3306;

/// Where and how to open a database session.
///
/// Timeouts are stored in milliseconds so the struct round-trips through
/// TOML and JSON unchanged.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Server host name or address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Login user
    pub user: String,
    /// Login password
    pub password: Option<String>,
    /// Database (schema) to select after login
    pub database: String,
    /// Connection character set
    pub charset: String,
    /// Connection collation
    pub collation: String,
    /// Time allowed for the TCP connect and handshake
    pub connect_timeout_ms: u64,
    /// Time allowed for a query to return its result
    pub read_timeout_ms: u64,
    /// Time allowed for a data-modifying statement
    pub write_timeout_ms: u64,
    /// Whether sessions run with autocommit enabled
    pub autocommit: bool,
}

impl DatabaseConfig {
    /// Create a configuration for the given host and database with defaults
    pub fn new(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the login credentials
    pub fn with_credentials(mut self, user: impl Into<String>, password: Option<String>) -> Self {
        self.user = user.into();
        self.password = password;
        self
    }

    /// Set the character set and collation
    pub fn with_charset(mut self, charset: impl Into<String>, collation: impl Into<String>) -> Self {
        self.charset = charset.into();
        self.collation = collation.into();
        self
    }

    /// Set the connect timeout in milliseconds
    pub fn with_connect_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    /// Set the read and write timeouts in milliseconds
    pub fn with_io_timeouts_ms(mut self, read_ms: u64, write_ms: u64) -> Self {
        self.read_timeout_ms = read_ms;
        self.write_timeout_ms = write_ms;
        self
    }

    /// Enable or disable autocommit for new sessions
    pub fn with_autocommit(mut self, autocommit: bool) -> Self {
        self.autocommit = autocommit;
        self
    }

    /// Get the connect timeout as a Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Get the read timeout as a Duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Get the write timeout as a Duration
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Check the configuration for values no session could be opened with
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(BoardError::Configuration("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(BoardError::Configuration("port must be greater than 0".into()));
        }
        if self.user.trim().is_empty() {
            return Err(BoardError::Configuration("user must not be empty".into()));
        }
        if !is_identifier(&self.charset) || !is_identifier(&self.collation) {
            return Err(BoardError::Configuration(format!(
                "invalid charset/collation: {}/{}",
                self.charset, self.collation
            )));
        }
        for (name, value) in [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("read_timeout_ms", self.read_timeout_ms),
            ("write_timeout_ms", self.write_timeout_ms),
        ] {
            if value == 0 {
                return Err(BoardError::Configuration(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Charset and collation names are spliced into `SET NAMES`, so only plain
/// identifiers are accepted.
fn is_identifier(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Default for DatabaseConfig {
    /// Defaults:
    /// - localhost:3306, user `root`, no password, no database
    /// - utf8mb4 / utf8mb4_unicode_ci
    /// - connect timeout 60s, read/write timeouts 30s
    /// - autocommit off
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            user: "root".to_string(),
            password: None,
            database: String::new(),
            charset: "utf8mb4".to_string(),
            collation: "utf8mb4_unicode_ci".to_string(),
            connect_timeout_ms: 60_000,
            read_timeout_ms: 30_000,
            write_timeout_ms: 30_000,
            autocommit: false,
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("charset", &self.charset)
            .field("collation", &self.collation)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("read_timeout_ms", &self.read_timeout_ms)
            .field("write_timeout_ms", &self.write_timeout_ms)
            .field("autocommit", &self.autocommit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DatabaseConfig::default();
        assert_eq!(config.port, 3306);
        assert_eq!(config.charset, "utf8mb4");
        assert_eq!(config.connect_timeout(), Duration::from_secs(60));
        assert!(!config.autocommit);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = DatabaseConfig::new("dbnas", "board_db")
            .with_port(3307)
            .with_credentials("board_user", Some("secret".into()))
            .with_io_timeouts_ms(1_000, 2_000)
            .with_autocommit(true);

        assert_eq!(config.host, "dbnas");
        assert_eq!(config.database, "board_db");
        assert_eq!(config.port, 3307);
        assert_eq!(config.user, "board_user");
        assert_eq!(config.read_timeout(), Duration::from_secs(1));
        assert_eq!(config.write_timeout(), Duration::from_secs(2));
        assert!(config.autocommit);
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = DatabaseConfig::default().with_credentials("u", Some("hunter2".into()));
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(DatabaseConfig::default().with_port(0).validate().is_err());
        assert!(DatabaseConfig::new("", "db").validate().is_err());
        assert!(
            DatabaseConfig::default()
                .with_charset("utf8mb4; DROP TABLE posts", "x")
                .validate()
                .is_err()
        );
        assert!(
            DatabaseConfig::default()
                .with_connect_timeout_ms(0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_deserialize_partial_uses_defaults() {
        let config: DatabaseConfig =
            serde_json::from_str(r#"{"host":"dbnas","database":"board_db"}"#).unwrap();
        assert_eq!(config.host, "dbnas");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.collation, "utf8mb4_unicode_ci");
    }
}
