use std::path::Path;

use rusqlite::Connection;
use tracing::debug;

use crate::error::{LoadError, is_privilege_error};
use crate::util::now_utc_string;

pub const DB_SCHEMA_VERSION: &str = "1.0.0";

const DDL_PRODUCTS: &str = "
    CREATE TABLE IF NOT EXISTS products (
      id INTEGER PRIMARY KEY,
      name TEXT,
      url_key TEXT,
      price NUMERIC,
      description TEXT,
      images TEXT,
      source_file TEXT,
      ingested_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f+00:00', 'now'))
    );

    CREATE INDEX IF NOT EXISTS idx_products_price ON products(price);
    CREATE INDEX IF NOT EXISTS idx_products_url_key ON products(url_key);
";

const DDL_IMAGES: &str = "
    CREATE TABLE IF NOT EXISTS product_images (
      product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
      position INTEGER NOT NULL,
      image_url TEXT NOT NULL,
      PRIMARY KEY (product_id, position)
    );

    CREATE INDEX IF NOT EXISTS idx_product_images_url ON product_images(image_url);
";

const DDL_METADATA: &str = "
    CREATE TABLE IF NOT EXISTS metadata (
      key TEXT PRIMARY KEY,
      value TEXT NOT NULL
    );
";

/// Creates the target tables and indexes; existing ones are left as they
/// are. The image table is only needed when normalization is enabled.
/// Privilege failures map to [`LoadError::Privilege`] so the run can stop
/// before touching any data.
pub fn ensure_schema(
    connection: &Connection,
    db_path: &Path,
    normalize_images: bool,
) -> Result<(), LoadError> {
    let classify = |source: rusqlite::Error| {
        if is_privilege_error(&source) {
            LoadError::Privilege {
                path: db_path.to_path_buf(),
                source,
            }
        } else {
            LoadError::Schema(source)
        }
    };

    connection.execute_batch(DDL_PRODUCTS).map_err(classify)?;
    if normalize_images {
        connection.execute_batch(DDL_IMAGES).map_err(classify)?;
    }
    connection.execute_batch(DDL_METADATA).map_err(classify)?;

    connection
        .execute(
            "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            [DB_SCHEMA_VERSION],
        )
        .map_err(classify)?;
    connection
        .execute(
            "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            [now_utc_string()],
        )
        .map_err(classify)?;

    debug!(normalize_images, version = DB_SCHEMA_VERSION, "schema ensured");

    Ok(())
}
