//! Semantic layer: the document model and its lock-guarded store.

mod layer;
mod store;

pub use layer::{LayerError, SemanticLayer, TableSpec};
pub use store::{LayerSnapshot, SemanticLayerStore, StoreError, StoreResult};
