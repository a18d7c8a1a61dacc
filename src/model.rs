use rusqlite::types::Value as SqlValue;
use serde::Serialize;
use serde_json::Value;

/// One validated catalog item, ready to be bound into an upsert.
///
/// Non-key fields are carried as loosely typed SQL values: ingestion is
/// permissive and stores whatever JSON type the snapshot held.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    pub id: i64,
    pub name: Option<SqlValue>,
    pub url_key: Option<SqlValue>,
    pub price: Option<SqlValue>,
    pub description: Option<SqlValue>,
    pub images: Value,
    pub images_json: String,
    pub source_file: String,
}

impl ProductRecord {
    /// Image rows for normalization mode. Falsy entries are skipped but keep
    /// their slot, so positions always match the source array index.
    pub fn image_rows(&self) -> Vec<ImageRow> {
        let Value::Array(entries) = &self.images else {
            return Vec::new();
        };

        entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| is_truthy(entry))
            .map(|(position, entry)| ImageRow {
                product_id: self.id,
                position: position as i64,
                image_url: match entry {
                    Value::String(url) => url.clone(),
                    other => other.to_string(),
                },
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRow {
    pub product_id: i64,
    pub position: i64,
    pub image_url: String,
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Committed,
    RolledBack,
    Unreadable,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub file: String,
    pub sha256: Option<String>,
    pub status: FileStatus,
    pub items_read: usize,
    pub products_upserted: usize,
    pub images_upserted: usize,
    pub rejected: usize,
    pub error: Option<String>,
    #[serde(skip)]
    pub exit_code: u8,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunTotals {
    pub files_found: usize,
    pub files_committed: usize,
    pub files_failed: usize,
    pub products_upserted: usize,
    pub images_upserted: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub manifest_version: u32,
    pub db_schema_version: String,
    pub started_at: String,
    pub finished_at: String,
    pub data_path: String,
    pub db_path: String,
    pub normalize_images: bool,
    pub cancelled: bool,
    pub exit_code: u8,
    pub totals: RunTotals,
    pub files: Vec<FileOutcome>,
}
