//! Configuration.
//!
//! Settings are read from a TOML file:
//!
//! ```toml
//! [database]
//! url = "postgres://localhost/app"
//! table = "migrations"
//! transactional = true
//!
//! [migrations]
//! dir = "migrations"
//! extension = "sql"
//! timeout_secs = 300
//! ```
//!
//! Lookup order when no file is given explicitly: `./sqlshift.toml`, then
//! `<config dir>/sqlshift/config.toml`, then built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{MigrateError, MigrateResult};
use crate::source::FileSource;
use crate::store::SqlStore;

/// Name of the project-local config file.
pub const CONFIG_FILE: &str = "sqlshift.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: DatabaseConfig,
    pub migrations: MigrationsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Connection URL (`postgres://...` or `sqlite://...`).
    pub url: Option<String>,
    /// Bookkeeping table name.
    pub table: String,
    /// Run each action in its own transaction.
    pub transactional: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            table: "migrations".to_string(),
            transactional: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationsConfig {
    pub dir: PathBuf,
    pub extension: String,
    /// Abort a run that takes longer than this. The in-flight action rolls back.
    pub timeout_secs: Option<u64>,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("migrations"),
            extension: "sql".to_string(),
            timeout_secs: None,
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> MigrateResult<Self> {
        toml::from_str(content).map_err(|e| MigrateError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> MigrateResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MigrateError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| MigrateError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load `explicit` if given (it must exist), otherwise search the default locations.
    pub fn load(explicit: Option<&Path>) -> MigrateResult<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        for path in Self::search_paths() {
            if path.is_file() {
                debug!(path = %path.display(), "Loading config");
                return Self::from_file(&path);
            }
        }

        Ok(Self::default())
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("sqlshift").join("config.toml"));
        }
        paths
    }

    pub fn database_url(&self) -> MigrateResult<&str> {
        self.database.url.as_deref().ok_or_else(|| {
            MigrateError::Config(format!(
                "No database URL. Use --database-url, set SQLSHIFT_DATABASE_URL or add [database] url to {}",
                CONFIG_FILE
            ))
        })
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.migrations.timeout_secs.map(Duration::from_secs)
    }

    pub fn source(&self) -> FileSource {
        FileSource::new(&self.migrations.dir).with_extension(&self.migrations.extension)
    }

    /// Connect the store described by `[database]`.
    pub async fn connect(&self) -> MigrateResult<SqlStore> {
        Ok(SqlStore::connect(self.database_url()?)
            .await?
            .with_table(&self.database.table)?
            .with_transactions(self.database.transactional))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.database.table, "migrations");
        assert!(config.database.transactional);
        assert_eq!(config.migrations.dir, PathBuf::from("migrations"));
        assert!(config.timeout().is_none());
        assert!(config.database_url().is_err());
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(
            r#"
            [database]
            url = "sqlite::memory:"
            table = "meta.schema_versions"
            transactional = false

            [migrations]
            dir = "db/migrations"
            extension = "pgsql"
            timeout_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.database_url().unwrap(), "sqlite::memory:");
        assert_eq!(config.database.table, "meta.schema_versions");
        assert!(!config.database.transactional);
        assert_eq!(config.migrations.extension, "pgsql");
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.source().dir(), Path::new("db/migrations"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = Config::from_toml("[database]\nurll = \"x\"").unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
