use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

use crate::error::LoadError;

pub const SOURCE_FILE_PATTERN: &str = "products_*.json";
const SOURCE_FILE_REGEX: &str = r"^products_.*\.json$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    SingleFile,
    Directory,
}

#[derive(Debug, Clone)]
pub struct SourceSet {
    pub kind: SourceKind,
    pub files: Vec<PathBuf>,
}

/// Resolves the input path to the files of one run. Directory matches are
/// sorted by file name: when two files carry the same id, the later one wins.
pub fn discover_source_files(data_path: &Path) -> Result<SourceSet> {
    if !data_path.exists() {
        return Err(LoadError::PathNotFound(absolute_or_given(data_path)).into());
    }

    if data_path.is_file() {
        return Ok(SourceSet {
            kind: SourceKind::SingleFile,
            files: vec![data_path.to_path_buf()],
        });
    }

    let pattern =
        Regex::new(SOURCE_FILE_REGEX).context("failed to compile source file name regex")?;
    let entries = fs::read_dir(data_path).map_err(|err| LoadError::UnreadableFile {
        file: data_path.display().to_string(),
        reason: err.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| LoadError::UnreadableFile {
            file: data_path.display().to_string(),
            reason: err.to_string(),
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| pattern.is_match(name));
        if matches {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    if files.is_empty() {
        return Err(LoadError::NoMatchingFiles {
            dir: absolute_or_given(data_path),
            pattern: SOURCE_FILE_PATTERN,
        }
        .into());
    }

    debug!(dir = %data_path.display(), files = files.len(), "discovered source files");

    Ok(SourceSet {
        kind: SourceKind::Directory,
        files,
    })
}

pub(crate) fn absolute_or_given(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
