use std::collections::HashMap;
use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;

use rusqlite::{Connection, Transaction};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{EXIT_DATABASE, EXIT_INPUT, EXIT_OK, LoadError};
use crate::interrupt::CancelFlag;
use crate::model::{FileOutcome, FileStatus, ImageRow, ProductRecord, RunTotals};
use crate::report::Reporter;
use crate::util::{display_file_name, sha256_file};

use super::batch::{batches, batches_by_key};
use super::discover::{SourceKind, SourceSet};
use super::upsert::{clear_images, upsert_images, upsert_products};
use super::validate::validate_items;

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub batch_size: NonZeroUsize,
    pub image_batch_size: NonZeroUsize,
    pub page_size: NonZeroUsize,
    pub image_page_size: NonZeroUsize,
    pub normalize_images: bool,
}

pub const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(1000).unwrap();
pub const DEFAULT_IMAGE_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(2000).unwrap();
pub const DEFAULT_PAGE_SIZE: NonZeroUsize = NonZeroUsize::new(2000).unwrap();
pub const DEFAULT_IMAGE_PAGE_SIZE: NonZeroUsize = NonZeroUsize::new(5000).unwrap();

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            image_batch_size: DEFAULT_IMAGE_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            image_page_size: DEFAULT_IMAGE_PAGE_SIZE,
            normalize_images: false,
        }
    }
}

/// Counts for one committed file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileLoad {
    pub file: String,
    pub items_read: usize,
    pub products_upserted: usize,
    pub images_upserted: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub totals: RunTotals,
    pub files: Vec<FileOutcome>,
    /// Set when a stop request arrived; files after that point were skipped.
    pub cancelled: bool,
}

impl RunOutcome {
    /// 0 when every file committed. Otherwise a database failure takes
    /// precedence over an unreadable file. A cancelled run is an input-class
    /// outcome whatever its files did.
    pub fn exit_code(&self) -> u8 {
        if self.cancelled {
            return EXIT_INPUT;
        }

        let mut failed = self
            .files
            .iter()
            .filter(|outcome| outcome.status != FileStatus::Committed)
            .map(|outcome| outcome.exit_code);

        match failed.next() {
            None => EXIT_OK,
            Some(first) => failed.fold(first, |code, next| {
                if next == EXIT_DATABASE { next } else { code }
            }),
        }
    }

    fn record_committed(&mut self, load: FileLoad, sha256: Option<String>) {
        self.totals.files_committed += 1;
        self.totals.products_upserted += load.products_upserted;
        self.totals.images_upserted += load.images_upserted;
        self.totals.rejected += load.rejected;
        self.files.push(FileOutcome {
            file: load.file,
            sha256,
            status: FileStatus::Committed,
            items_read: load.items_read,
            products_upserted: load.products_upserted,
            images_upserted: load.images_upserted,
            rejected: load.rejected,
            error: None,
            exit_code: EXIT_OK,
        });
    }

    fn record_failed(&mut self, file: String, sha256: Option<String>, err: &LoadError) {
        self.totals.files_failed += 1;
        self.files.push(FileOutcome {
            file,
            sha256,
            status: if err.is_decode() {
                FileStatus::Unreadable
            } else {
                FileStatus::RolledBack
            },
            items_read: 0,
            products_upserted: 0,
            images_upserted: 0,
            rejected: 0,
            error: Some(err.to_string()),
            exit_code: err.exit_code(),
        });
    }
}

/// Loads every file of `sources` in order, one transaction per file. A failed
/// file is reported and the run moves on; only a decode failure of a sole
/// input file ends the run with an error. A stop request is honoured between
/// files and once more after the last one, leaving `cancelled` set on the
/// returned outcome so the caller can still report what was committed.
pub fn run_pipeline(
    connection: &mut Connection,
    sources: &SourceSet,
    options: &PipelineOptions,
    reporter: &dyn Reporter,
    cancel: &CancelFlag,
) -> Result<RunOutcome, LoadError> {
    let mut outcome = RunOutcome::default();
    outcome.totals.files_found = sources.files.len();

    for path in &sources.files {
        if cancel.is_cancelled() {
            break;
        }

        let file = display_file_name(path);
        let sha256 = match sha256_file(path) {
            Ok(digest) => Some(digest),
            Err(err) => {
                debug!(file = %file, error = %err, "could not hash source file");
                None
            }
        };

        match load_file(connection, path, options, reporter) {
            Ok(load) => {
                reporter.info(&format!(
                    "Loaded {} products from {}",
                    load.products_upserted, load.file
                ));
                outcome.record_committed(load, sha256);
            }
            Err(err) if err.is_decode() && sources.kind == SourceKind::SingleFile => {
                return Err(err);
            }
            Err(err) => {
                reporter.error(&err.to_string());
                outcome.record_failed(file, sha256, &err);
            }
        }
    }

    if cancel.is_cancelled() {
        outcome.cancelled = true;
        reporter.warn(&format!(
            "Stopping early: {} of {} file(s) processed.",
            outcome.files.len(),
            sources.files.len()
        ));
    }

    Ok(outcome)
}

/// Reads, validates and upserts one file inside its own transaction. On any
/// write error the transaction is rolled back and nothing from the file
/// remains.
pub fn load_file(
    connection: &mut Connection,
    path: &Path,
    options: &PipelineOptions,
    reporter: &dyn Reporter,
) -> Result<FileLoad, LoadError> {
    let file = display_file_name(path);

    let items = decode_products(path)?;

    let batch = validate_items(&items, &file);
    if !batch.rejections.is_empty() {
        reporter.warn(&format!(
            "{file}: skipped {} item(s) with missing/invalid 'id'",
            batch.rejections.len()
        ));
        for rejection in &batch.rejections {
            debug!(file = %file, index = rejection.index, reason = %rejection.reason, "rejected item");
        }
    }

    let tx = connection.transaction().map_err(|source| LoadError::Upsert {
        file: file.clone(),
        stage: "begin transaction".to_string(),
        source,
    })?;

    let applied = apply_records(&tx, &file, &batch.records, options);
    let (products_upserted, images_upserted) = match applied {
        Ok(counts) => counts,
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                warn!(file = %file, error = %rollback_err, "rollback failed");
            }
            warn!(file = %file, "rolled back file transaction");
            return Err(err);
        }
    };

    tx.commit().map_err(|source| LoadError::Upsert {
        file: file.clone(),
        stage: "commit".to_string(),
        source,
    })?;

    info!(
        file = %file,
        items = items.len(),
        products = products_upserted,
        images = images_upserted,
        rejected = batch.rejections.len(),
        "committed file"
    );

    Ok(FileLoad {
        file,
        items_read: items.len(),
        products_upserted,
        images_upserted,
        rejected: batch.rejections.len(),
    })
}

fn apply_records(
    tx: &Transaction<'_>,
    file: &str,
    records: &[ProductRecord],
    options: &PipelineOptions,
) -> Result<(usize, usize), LoadError> {
    let mut products_upserted = 0;
    for (index, chunk) in batches(records, options.batch_size).enumerate() {
        products_upserted += upsert_products(tx, chunk, options.page_size).map_err(|source| {
            LoadError::Upsert {
                file: file.to_string(),
                stage: format!("product chunk {index}, {}", id_span(chunk, |r| r.id)),
                source,
            }
        })?;
        debug!(file, chunk = index, rows = chunk.len(), "applied product chunk");
    }

    if !options.normalize_images {
        return Ok((products_upserted, 0));
    }

    // Only the last occurrence of an id in the file defines its image set,
    // matching the last-wins product row.
    let last_occurrence: HashMap<i64, usize> = records
        .iter()
        .enumerate()
        .map(|(index, record)| (record.id, index))
        .collect();

    let mut image_rows: Vec<ImageRow> = Vec::new();
    let mut without_images: Vec<i64> = Vec::new();
    for (index, record) in records.iter().enumerate() {
        if last_occurrence.get(&record.id) != Some(&index) {
            continue;
        }
        let rows = record.image_rows();
        if rows.is_empty() {
            without_images.push(record.id);
        }
        image_rows.extend(rows);
    }

    clear_images(tx, &without_images).map_err(|source| LoadError::Upsert {
        file: file.to_string(),
        stage: "clearing images of products without images".to_string(),
        source,
    })?;

    let mut images_upserted = 0;
    for (index, chunk) in
        batches_by_key(&image_rows, options.image_batch_size, |row| row.product_id).enumerate()
    {
        images_upserted += upsert_images(tx, chunk, options.image_page_size).map_err(|source| {
            LoadError::Upsert {
                file: file.to_string(),
                stage: format!("image chunk {index}, {}", id_span(chunk, |r| r.product_id)),
                source,
            }
        })?;
        debug!(file, chunk = index, rows = chunk.len(), "applied image chunk");
    }

    Ok((products_upserted, images_upserted))
}

fn id_span<T>(chunk: &[T], id: impl Fn(&T) -> i64) -> String {
    match (chunk.first(), chunk.last()) {
        (Some(first), Some(last)) => format!("ids {}..{}", id(first), id(last)),
        _ => "empty chunk".to_string(),
    }
}

/// Decodes one snapshot file; the root must be a JSON array.
pub fn decode_products(path: &Path) -> Result<Vec<Value>, LoadError> {
    let file = display_file_name(path);
    let raw = fs::read(path).map_err(|err| LoadError::UnreadableFile {
        file: file.clone(),
        reason: err.to_string(),
    })?;

    match serde_json::from_slice::<Value>(&raw) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => Err(LoadError::NotAnArray { file }),
        Err(err) => Err(LoadError::MalformedJson {
            file,
            line: err.line(),
            column: err.column(),
            message: json_error_message(&err),
        }),
    }
}

/// serde_json appends " at line X column Y" to its message; the position is
/// reported separately.
fn json_error_message(err: &serde_json::Error) -> String {
    let text = err.to_string();
    let suffix = format!(" at line {} column {}", err.line(), err.column());
    text.strip_suffix(&suffix).map(str::to_string).unwrap_or(text)
}
