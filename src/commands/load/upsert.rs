use std::collections::BTreeSet;
use std::num::NonZeroUsize;

use chrono::Utc;
use rusqlite::{Transaction, ToSql};
use tracing::debug;

use crate::model::{ImageRow, ProductRecord};

/// Bind-parameter ceiling of the bundled SQLite build.
const MAX_BIND_PARAMETERS: usize = 32_766;
const PRODUCT_COLUMNS: usize = 8;
const IMAGE_COLUMNS: usize = 3;

/// Inserts `rows` into `products`; an existing id has every non-key column
/// overwritten and `ingested_at` refreshed. Rows are sent `page_size` per
/// statement at most. Returns the number of rows submitted.
pub fn upsert_products(
    tx: &Transaction<'_>,
    rows: &[ProductRecord],
    page_size: NonZeroUsize,
) -> rusqlite::Result<usize> {
    let per_statement = rows_per_statement(page_size, PRODUCT_COLUMNS);

    for page in rows.chunks(per_statement) {
        let ingested_at = Utc::now();
        let sql = product_upsert_sql(page.len());
        let mut statement = tx.prepare_cached(&sql)?;

        let mut values: Vec<&dyn ToSql> = Vec::with_capacity(page.len() * PRODUCT_COLUMNS);
        for row in page {
            values.push(&row.id);
            values.push(&row.name);
            values.push(&row.url_key);
            values.push(&row.price);
            values.push(&row.description);
            values.push(&row.images_json);
            values.push(&row.source_file);
            values.push(&ingested_at);
        }

        statement.execute(values.as_slice())?;
    }

    debug!(rows = rows.len(), per_statement, "upserted product rows");
    Ok(rows.len())
}

/// Replaces the image sets of every product present in `rows`: existing
/// image rows of those products are deleted, then the new rows inserted with
/// overwrite on `(product_id, position)`. Taking the transaction keeps both
/// phases inside the caller's unit of work.
pub fn upsert_images(
    tx: &Transaction<'_>,
    rows: &[ImageRow],
    page_size: NonZeroUsize,
) -> rusqlite::Result<usize> {
    let product_ids: Vec<i64> = rows
        .iter()
        .map(|row| row.product_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    clear_images(tx, &product_ids)?;

    let per_statement = rows_per_statement(page_size, IMAGE_COLUMNS);
    for page in rows.chunks(per_statement) {
        let sql = image_upsert_sql(page.len());
        let mut statement = tx.prepare_cached(&sql)?;

        let mut values: Vec<&dyn ToSql> = Vec::with_capacity(page.len() * IMAGE_COLUMNS);
        for row in page {
            values.push(&row.product_id);
            values.push(&row.position);
            values.push(&row.image_url);
        }

        statement.execute(values.as_slice())?;
    }

    debug!(rows = rows.len(), products = product_ids.len(), "replaced image rows");
    Ok(rows.len())
}

/// Deletes all image rows of the given products. Returns the deleted count.
pub fn clear_images(tx: &Transaction<'_>, product_ids: &[i64]) -> rusqlite::Result<usize> {
    let mut deleted = 0;
    for ids in product_ids.chunks(MAX_BIND_PARAMETERS) {
        let sql = format!(
            "DELETE FROM product_images WHERE product_id IN ({})",
            placeholders(ids.len())
        );
        let mut statement = tx.prepare_cached(&sql)?;
        deleted += statement.execute(rusqlite::params_from_iter(ids))?;
    }
    Ok(deleted)
}

fn rows_per_statement(page_size: NonZeroUsize, columns: usize) -> usize {
    page_size.get().min(MAX_BIND_PARAMETERS / columns)
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn values_clause(rows: usize, columns: usize) -> String {
    let row = format!("({})", placeholders(columns));
    vec![row.as_str(); rows].join(",\n")
}

fn product_upsert_sql(rows: usize) -> String {
    format!(
        "
        INSERT INTO products(id, name, url_key, price, description, images, source_file, ingested_at)
        VALUES {}
        ON CONFLICT(id) DO UPDATE SET
          name=excluded.name,
          url_key=excluded.url_key,
          price=excluded.price,
          description=excluded.description,
          images=excluded.images,
          source_file=excluded.source_file,
          ingested_at=excluded.ingested_at
        ",
        values_clause(rows, PRODUCT_COLUMNS)
    )
}

fn image_upsert_sql(rows: usize) -> String {
    format!(
        "
        INSERT INTO product_images(product_id, position, image_url)
        VALUES {}
        ON CONFLICT(product_id, position) DO UPDATE SET
          image_url=excluded.image_url
        ",
        values_clause(rows, IMAGE_COLUMNS)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_per_statement_respects_bind_limit() {
        let page = NonZeroUsize::new(10_000).unwrap();
        assert_eq!(rows_per_statement(page, PRODUCT_COLUMNS), 4095);
        assert_eq!(rows_per_statement(page, IMAGE_COLUMNS), 10_000);

        let small = NonZeroUsize::new(3).unwrap();
        assert_eq!(rows_per_statement(small, PRODUCT_COLUMNS), 3);
    }

    #[test]
    fn values_clause_repeats_one_group_per_row() {
        assert_eq!(values_clause(2, 3), "(?, ?, ?),\n(?, ?, ?)");
    }
}
