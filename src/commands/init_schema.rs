use anyhow::Result;

use crate::cli::InitSchemaArgs;
use crate::commands::load::{DB_SCHEMA_VERSION, ensure_schema};
use crate::config::{open_connection, resolve_config};
use crate::report::Reporter;

pub fn run(args: InitSchemaArgs, reporter: &dyn Reporter) -> Result<()> {
    let config = resolve_config(
        args.connection.config.as_deref(),
        &args.connection.config_section,
        args.connection.db_path.as_deref(),
    )?;
    let connection = open_connection(&config)?;

    ensure_schema(&connection, &config.path, args.normalize_images)?;

    reporter.info(&format!(
        "Schema {DB_SCHEMA_VERSION} ready in {} (image table: {}).",
        config.path.display(),
        if args.normalize_images { "yes" } else { "no" }
    ));

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rusqlite::Connection;

    use super::*;
    use crate::cli::ConnectionArgs;
    use crate::config::DEFAULT_CONFIG_SECTION;
    use crate::report::MemoryReporter;

    fn table_names(connection: &Connection) -> Vec<String> {
        let mut statement = connection
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        statement
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn creates_tables_and_reports_the_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("database.json");
        fs::write(&config_path, r#"{"sqlite": {"path": "ignored.sqlite"}}"#).unwrap();
        let db_path = dir.path().join("catalog.sqlite");
        let args = InitSchemaArgs {
            connection: ConnectionArgs {
                config: Some(config_path),
                config_section: DEFAULT_CONFIG_SECTION.to_string(),
                db_path: Some(db_path.clone()),
            },
            normalize_images: true,
        };
        let reporter = MemoryReporter::default();

        run(args, &reporter).unwrap();

        let connection = Connection::open(&db_path).unwrap();
        assert_eq!(
            table_names(&connection),
            vec!["metadata", "product_images", "products"]
        );
        let products: i64 = connection
            .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))
            .unwrap();
        assert_eq!(products, 0);
        assert!(!dir.path().join("ignored.sqlite").exists());
        assert_eq!(
            reporter.infos(),
            vec![format!(
                "Schema {DB_SCHEMA_VERSION} ready in {} (image table: yes).",
                db_path.display()
            )]
        );
    }
}
