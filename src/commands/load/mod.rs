mod batch;
mod db_setup;
mod discover;
mod pipeline;
mod run;
mod upsert;
mod validate;

pub use db_setup::{DB_SCHEMA_VERSION, ensure_schema};
pub use run::run;
