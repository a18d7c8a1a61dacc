//! Connection configuration and connection setup.
//!
//! The configuration file is a JSON object of named sections, each holding
//! the parameters for one database:
//!
//! ```json
//! { "sqlite": { "path": "catalog.sqlite", "journal_mode": "WAL" } }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LoadError, is_privilege_error};

pub const DEFAULT_CONFIG_PATH: &str = "database.json";
pub const DEFAULT_CONFIG_SECTION: &str = "sqlite";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    pub path: PathBuf,

    #[serde(default = "default_journal_mode")]
    pub journal_mode: String,

    #[serde(default = "default_synchronous")]
    pub synchronous: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_create_if_missing")]
    pub create_if_missing: bool,
}

fn default_journal_mode() -> String {
    "WAL".to_string()
}

fn default_synchronous() -> String {
    "NORMAL".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_create_if_missing() -> bool {
    true
}

impl ConnectionConfig {
    pub fn for_path(path: PathBuf) -> Self {
        Self {
            path,
            journal_mode: default_journal_mode(),
            synchronous: default_synchronous(),
            busy_timeout_ms: default_busy_timeout_ms(),
            create_if_missing: default_create_if_missing(),
        }
    }
}

/// Reads one section of the configuration file. A relative `path` inside the
/// section resolves against the configuration file's directory.
pub fn load_config(config_path: &Path, section: &str) -> Result<ConnectionConfig, LoadError> {
    let raw = fs::read(config_path).map_err(|err| {
        LoadError::Config(format!("failed to read {}: {err}", config_path.display()))
    })?;
    let mut sections: BTreeMap<String, ConnectionConfig> = serde_json::from_slice(&raw)
        .map_err(|err| {
            LoadError::Config(format!("failed to parse {}: {err}", config_path.display()))
        })?;

    let mut config = sections.remove(section).ok_or_else(|| {
        LoadError::Config(format!(
            "section {section} not found in {}",
            config_path.display()
        ))
    })?;

    if config.path.is_relative() {
        if let Some(base) = config_path
            .parent()
            .filter(|base| !base.as_os_str().is_empty())
        {
            config.path = base.join(&config.path);
        }
    }

    Ok(config)
}

/// Picks the configuration for a run. An explicit `--db-path` wins over the
/// file's `path` and makes a missing default configuration file acceptable.
pub fn resolve_config(
    config_path: Option<&Path>,
    section: &str,
    db_path_override: Option<&Path>,
) -> Result<ConnectionConfig, LoadError> {
    let explicit = config_path.is_some();
    let config_path = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));

    let mut config = match (config_path.exists(), db_path_override) {
        (true, _) => load_config(config_path, section)?,
        (false, Some(db_path)) if !explicit => ConnectionConfig::for_path(db_path.to_path_buf()),
        (false, _) => {
            return Err(LoadError::Config(format!(
                "configuration file not found: {} (pass --config or --db-path)",
                config_path.display()
            )));
        }
    };

    if let Some(db_path) = db_path_override {
        config.path = db_path.to_path_buf();
    }

    Ok(config)
}

/// Opens the single connection used for the whole run. No retry: a failure
/// here ends the run.
pub fn open_connection(config: &ConnectionConfig) -> Result<Connection, LoadError> {
    let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    if config.create_if_missing {
        flags |= OpenFlags::SQLITE_OPEN_CREATE;
    }

    let connection_error = |source: rusqlite::Error| {
        if is_privilege_error(&source) {
            LoadError::Privilege {
                path: config.path.clone(),
                source,
            }
        } else {
            LoadError::Connection {
                path: config.path.clone(),
                source,
            }
        }
    };

    let connection = Connection::open_with_flags(&config.path, flags).map_err(connection_error)?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(connection_error)?;
    let journal_mode: String = connection
        .pragma_update_and_check(None, "journal_mode", &config.journal_mode, |row| row.get(0))
        .map_err(connection_error)?;
    connection
        .pragma_update(None, "synchronous", &config.synchronous)
        .map_err(connection_error)?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .map_err(connection_error)?;

    debug!(path = %config.path.display(), journal_mode = %journal_mode, "opened database");

    Ok(connection)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("database.json");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn load_config_applies_defaults_and_resolves_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(dir.path(), r#"{"sqlite": {"path": "catalog.sqlite"}}"#);

        let config = load_config(&config_path, "sqlite").unwrap();

        assert_eq!(config.path, dir.path().join("catalog.sqlite"));
        assert_eq!(config.journal_mode, "WAL");
        assert_eq!(config.synchronous, "NORMAL");
        assert_eq!(config.busy_timeout_ms, 5000);
        assert!(config.create_if_missing);
    }

    #[test]
    fn load_config_reports_missing_section() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(dir.path(), r#"{"other": {"path": "x.sqlite"}}"#);

        let err = load_config(&config_path, "sqlite").unwrap_err();
        assert!(matches!(err, LoadError::Config(ref message) if message.contains("section sqlite")));
    }

    #[test]
    fn load_config_rejects_unknown_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(
            dir.path(),
            r#"{"sqlite": {"path": "x.sqlite", "hostname": "db"}}"#,
        );

        assert!(matches!(
            load_config(&config_path, "sqlite"),
            Err(LoadError::Config(_))
        ));
    }

    #[test]
    fn resolve_config_prefers_db_path_override() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(
            dir.path(),
            r#"{"sqlite": {"path": "x.sqlite", "busy_timeout_ms": 10}}"#,
        );
        let override_path = dir.path().join("override.sqlite");

        let config = resolve_config(Some(&config_path), "sqlite", Some(&override_path)).unwrap();

        assert_eq!(config.path, override_path);
        assert_eq!(config.busy_timeout_ms, 10);
    }

    #[test]
    fn resolve_config_requires_an_explicit_file_to_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let db_path = dir.path().join("catalog.sqlite");

        let err = resolve_config(Some(&missing), "sqlite", Some(&db_path)).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INPUT);
    }

    #[test]
    fn open_connection_reports_missing_directory_as_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConnectionConfig::for_path(dir.path().join("absent").join("catalog.sqlite"));

        let err = open_connection(&config).unwrap_err();
        assert!(matches!(err, LoadError::Connection { .. }));
        assert_eq!(err.exit_code(), crate::error::EXIT_DATABASE);
    }

    #[test]
    fn open_connection_enables_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConnectionConfig::for_path(dir.path().join("catalog.sqlite"));

        let connection = open_connection(&config).unwrap();
        let enabled: i64 = connection
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
