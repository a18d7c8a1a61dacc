//! Error taxonomy for a load run and the exit code each class maps to.

use std::path::PathBuf;

use thiserror::Error;

pub const EXIT_OK: u8 = 0;
pub const EXIT_INPUT: u8 = 2;
pub const EXIT_DATABASE: u8 = 3;
pub const EXIT_UNCLASSIFIED: u8 = 4;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error(
        "no files matching {pattern} found in: {}\nHint: check your filenames or point --data-path to a specific JSON file.",
        .dir.display()
    )]
    NoMatchingFiles { dir: PathBuf, pattern: &'static str },

    #[error("failed to read JSON {file}: {reason}")]
    UnreadableFile { file: String, reason: String },

    #[error("invalid JSON in {file} (line {line}, col {column}): {message}")]
    MalformedJson {
        file: String,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("failed to read JSON {file}: JSON root must be a list")]
    NotAnArray { file: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(
        "could not open the database at {} (wrong path, missing directory, or locked file): {source}",
        .path.display()
    )]
    Connection {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("permission denied: cannot create tables in {}: {source}", .path.display())]
    Privilege {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("schema setup failed: {0}")]
    Schema(#[source] rusqlite::Error),

    #[error("DB insert failed while processing {file} ({stage}): {source}")]
    Upsert {
        file: String,
        stage: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cancelled by user (Ctrl+C)")]
    Cancelled,
}

impl LoadError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::PathNotFound(_)
            | Self::NoMatchingFiles { .. }
            | Self::UnreadableFile { .. }
            | Self::MalformedJson { .. }
            | Self::NotAnArray { .. }
            | Self::Config(_)
            | Self::Cancelled => EXIT_INPUT,
            Self::Connection { .. }
            | Self::Privilege { .. }
            | Self::Schema(_)
            | Self::Upsert { .. } => EXIT_DATABASE,
        }
    }

    /// Decode failures are isolated to their file when scanning a directory.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            Self::UnreadableFile { .. } | Self::MalformedJson { .. } | Self::NotAnArray { .. }
        )
    }

    /// Operator guidance printed after the error line.
    pub fn remediation(&self) -> Vec<String> {
        match self {
            Self::Privilege { path, .. } => {
                let dir = path
                    .parent()
                    .filter(|parent| !parent.as_os_str().is_empty())
                    .map(|parent| parent.display().to_string())
                    .unwrap_or_else(|| ".".to_string());
                vec![
                    "The database user lacks write access to the database file or its directory."
                        .to_string(),
                    "Fix by running as the owning user, or grant write access:".to_string(),
                    format!("  chmod u+w {}", path.display()),
                    format!("  chmod u+w {dir}"),
                ]
            }
            Self::Connection { .. } => vec![
                "Check the database path in the configuration file (or --db-path) and that its directory exists."
                    .to_string(),
            ],
            _ => Vec::new(),
        }
    }
}

/// Privilege-class SQLite failures: read-only store, OS permission denial, or
/// an authorizer refusing the statement.
pub fn is_privilege_error(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(
            rusqlite::ErrorCode::ReadOnly
                | rusqlite::ErrorCode::PermissionDenied
                | rusqlite::ErrorCode::AuthorizationForStatementDenied
        )
    )
}

/// Exit code for any error that reached the top of a command.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<LoadError>()
        .map(LoadError::exit_code)
        .unwrap_or(EXIT_UNCLASSIFIED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_class() {
        assert_eq!(LoadError::PathNotFound(PathBuf::from("x")).exit_code(), EXIT_INPUT);
        assert_eq!(LoadError::Cancelled.exit_code(), EXIT_INPUT);
        assert_eq!(
            LoadError::NotAnArray {
                file: "products_1.json".to_string()
            }
            .exit_code(),
            EXIT_INPUT
        );
        assert_eq!(
            LoadError::Schema(rusqlite::Error::InvalidQuery).exit_code(),
            EXIT_DATABASE
        );
    }

    #[test]
    fn exit_code_for_sees_through_context() {
        let err = anyhow::Error::new(LoadError::Config("missing section".to_string()))
            .context("while loading");
        assert_eq!(exit_code_for(&err), EXIT_INPUT);

        let other = anyhow::anyhow!("boom");
        assert_eq!(exit_code_for(&other), EXIT_UNCLASSIFIED);
    }

    #[test]
    fn privilege_remediation_names_file_and_directory() {
        let err = LoadError::Privilege {
            path: PathBuf::from("/srv/catalog/catalog.sqlite"),
            source: rusqlite::Error::InvalidQuery,
        };
        let lines = err.remediation();
        assert!(lines.iter().any(|line| line == "  chmod u+w /srv/catalog/catalog.sqlite"));
        assert!(lines.iter().any(|line| line == "  chmod u+w /srv/catalog"));
    }
}
