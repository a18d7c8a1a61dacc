use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_SECTION;

#[derive(Parser, Debug)]
#[command(
    name = "catalog-loader",
    version,
    about = "Bulk-load product catalog JSON snapshots into SQLite"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upsert every product snapshot file into the database.
    Load(LoadArgs),
    /// Create the target tables and indexes without loading data.
    InitSchema(InitSchemaArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// JSON file of named connection sections (default: ./database.json).
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_CONFIG_SECTION)]
    pub config_section: String,

    /// Overrides the database path from the configuration file.
    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct LoadArgs {
    /// A single JSON file, or a directory scanned for products_*.json.
    #[arg(long, default_value = "./data")]
    pub data_path: PathBuf,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Also maintain one product_images row per image URL.
    #[arg(long, default_value_t = false)]
    pub normalize_images: bool,

    #[arg(long, default_value = "1000")]
    pub batch_size: NonZeroUsize,

    /// Defaults to twice --batch-size.
    #[arg(long)]
    pub image_batch_size: Option<NonZeroUsize>,

    /// Maximum product rows per INSERT statement.
    #[arg(long, default_value = "2000")]
    pub page_size: NonZeroUsize,

    /// Maximum image rows per INSERT statement.
    #[arg(long, default_value = "5000")]
    pub image_page_size: NonZeroUsize,

    #[arg(long)]
    pub summary_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct InitSchemaArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[arg(long, default_value_t = false)]
    pub normalize_images: bool,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn load_defaults_match_pipeline_defaults() {
        let cli = Cli::parse_from(["catalog-loader", "load"]);
        let Commands::Load(args) = cli.command else {
            panic!("expected load command");
        };

        assert_eq!(args.data_path, PathBuf::from("./data"));
        assert_eq!(args.batch_size.get(), 1000);
        assert_eq!(args.page_size.get(), 2000);
        assert_eq!(args.image_page_size.get(), 5000);
        assert_eq!(args.image_batch_size, None);
        assert_eq!(args.connection.config_section, "sqlite");
        assert!(!args.normalize_images);
    }

    #[test]
    fn zero_batch_size_is_a_usage_error() {
        let err = Cli::try_parse_from(["catalog-loader", "load", "--batch-size", "0"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
