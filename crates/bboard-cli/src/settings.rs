//! Configuration file loading for the bboard binary

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bboard_connection::ManagerConfig;
use bboard_core::DatabaseConfig;
use serde::{Deserialize, Serialize};

#[cfg(test)]
mod tests;

const REDACTED: &str = "<redacted>";

/// Everything the binary reads from `bboard.toml`.
///
/// ```toml
/// [database]
/// host = "db.internal"
/// database = "board"
///
/// [pool]
/// max_connections = 10
///
/// [retry]
/// max_attempts = 3
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseConfig,
    /// `[pool]`, `[retry]` and `reinitialize_after_shutdown`
    #[serde(flatten)]
    pub manager: ManagerConfig,
    pub logging: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Filter used when `RUST_LOG` is unset
    pub filter: String,
    /// Also write JSON logs to a daily-rolling file
    pub json_file: bool,
    /// Where JSON log files go; defaults to the platform data directory
    pub dir: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info,bboard_connection=info,bboard_driver_mysql=info".to_string(),
            json_file: false,
            dir: None,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from the default location if it exists.
    ///
    /// Environment overrides are applied after the file and the result is
    /// validated before it is returned.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    tracing::debug!("no configuration file found, using defaults");
                    Self::default()
                }
            },
        };
        settings.apply_env_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration from {:?}", path))?;
        let settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file {:?}", path))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(settings)
    }

    /// Apply `BBOARD_DB_*` overrides using `lookup` to read variables
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db = &mut self.database;
        if let Some(host) = lookup("BBOARD_DB_HOST") {
            db.host = host;
        }
        if let Some(port) = lookup("BBOARD_DB_PORT") {
            db.port = port
                .parse()
                .with_context(|| format!("BBOARD_DB_PORT is not a valid port: {:?}", port))?;
        }
        if let Some(user) = lookup("BBOARD_DB_USER") {
            db.user = user;
        }
        if let Some(password) = lookup("BBOARD_DB_PASSWORD") {
            db.password = Some(password);
        }
        if let Some(name) = lookup("BBOARD_DB_NAME") {
            db.database = name;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.database
            .validate()
            .context("Invalid [database] configuration")?;
        self.manager
            .pool
            .validate()
            .context("Invalid [pool] configuration")?;
        self.manager
            .retry
            .validate()
            .context("Invalid [retry] configuration")?;
        Ok(())
    }

    /// A copy safe to print: the password is replaced
    pub fn redacted(&self) -> Self {
        let mut settings = self.clone();
        if settings.database.password.is_some() {
            settings.database.password = Some(REDACTED.to_string());
        }
        settings
    }

    /// The effective configuration as TOML, password redacted
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(&self.redacted()).context("Failed to render configuration")
    }
}

/// `<config dir>/bboard/bboard.toml`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("bboard").join("bboard.toml"))
}
