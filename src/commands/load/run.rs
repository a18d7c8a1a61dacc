use anyhow::Result;
use tracing::{info, warn};

use crate::cli::LoadArgs;
use crate::config::{open_connection, resolve_config};
use crate::error::LoadError;
use crate::interrupt::CancelFlag;
use crate::model::RunSummary;
use crate::report::Reporter;
use crate::util::{now_utc_string, write_json_pretty};

use super::db_setup::{DB_SCHEMA_VERSION, ensure_schema};
use super::discover::{absolute_or_given, discover_source_files};
use super::pipeline::{PipelineOptions, run_pipeline};

/// Runs one load end to end and returns the process exit code. Run-level
/// failures (path, configuration, connection, privilege) come back as errors;
/// per-file failures are folded into the exit code. A cancelled run still
/// reports its partial totals and writes the summary before returning
/// [`LoadError::Cancelled`].
pub fn run(args: LoadArgs, reporter: &dyn Reporter, cancel: &CancelFlag) -> Result<u8> {
    let started_at = now_utc_string();

    let sources = discover_source_files(&args.data_path)?;
    reporter.info(&format!(
        "Found {} file(s) from {}",
        sources.files.len(),
        absolute_or_given(&args.data_path).display()
    ));

    let config = resolve_config(
        args.connection.config.as_deref(),
        &args.connection.config_section,
        args.connection.db_path.as_deref(),
    )?;
    let mut connection = open_connection(&config)?;
    reporter.info(&format!(
        "Connected to the SQLite database at {}.",
        config.path.display()
    ));

    ensure_schema(&connection, &config.path, args.normalize_images)?;

    let options = pipeline_options(&args);
    info!(?options, files = sources.files.len(), "starting load");

    let outcome = run_pipeline(&mut connection, &sources, &options, reporter, cancel)?;
    let exit_code = outcome.exit_code();
    let cancelled = outcome.cancelled;

    reporter.info(&format!(
        "{}. products={}, images={}, rejected={}",
        if cancelled { "Stopped" } else { "Done" },
        outcome.totals.products_upserted,
        outcome.totals.images_upserted,
        outcome.totals.rejected
    ));
    if outcome.totals.files_failed > 0 {
        reporter.error(&format!(
            "{} of {} file(s) failed to load; their changes were rolled back.",
            outcome.totals.files_failed, outcome.totals.files_found
        ));
    }

    if let Some(summary_path) = &args.summary_path {
        let summary = RunSummary {
            manifest_version: 1,
            db_schema_version: DB_SCHEMA_VERSION.to_string(),
            started_at,
            finished_at: now_utc_string(),
            data_path: args.data_path.display().to_string(),
            db_path: config.path.display().to_string(),
            normalize_images: args.normalize_images,
            cancelled,
            exit_code,
            totals: outcome.totals,
            files: outcome.files,
        };

        match write_json_pretty(summary_path, &summary) {
            Ok(()) => info!(path = %summary_path.display(), "wrote run summary"),
            Err(err) => {
                warn!(error = %err, "failed to write run summary");
                reporter.warn(&format!("could not write run summary: {err:#}"));
            }
        }
    }

    if cancelled {
        return Err(LoadError::Cancelled.into());
    }

    Ok(exit_code)
}

/// Image chunks default to twice the product chunk size.
pub(crate) fn pipeline_options(args: &LoadArgs) -> PipelineOptions {
    PipelineOptions {
        batch_size: args.batch_size,
        image_batch_size: args
            .image_batch_size
            .unwrap_or_else(|| args.batch_size.saturating_add(args.batch_size.get())),
        page_size: args.page_size,
        image_page_size: args.image_page_size,
        normalize_images: args.normalize_images,
    }
}
