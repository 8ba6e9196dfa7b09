//! SQL helpers: identifier quoting and extraction of SQL from model output.

pub mod dialect;
pub mod extract;

pub use dialect::Dialect;
pub use extract::{extract_sql, ExtractionError};
