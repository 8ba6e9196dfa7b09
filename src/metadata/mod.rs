//! Database metadata: schema description types and live introspection.

mod introspect;
mod types;

pub use introspect::introspect;
pub use types::{ColumnInfo, ForeignKeyRef, SchemaDescription, TableSchema};
