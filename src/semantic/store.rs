//! Owned, lock-guarded semantic layer state.
//!
//! The store keeps the live [`SemanticLayer`] together with its compiled
//! prompt text. Both are replaced under one write lock, so a reader can never
//! see a layer paired with text rendered from a different layer.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::layer::SemanticLayer;

/// Errors from persisting the semantic layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A layer and the prompt text compiled from it.
#[derive(Debug, Clone)]
pub struct LayerSnapshot {
    pub layer: Arc<SemanticLayer>,
    pub compiled: Arc<str>,
}

impl LayerSnapshot {
    fn new(layer: SemanticLayer) -> Self {
        let compiled: Arc<str> = Arc::from(layer.compile());
        Self {
            layer: Arc::new(layer),
            compiled,
        }
    }
}

/// Single-writer, multi-reader store for the semantic layer.
pub struct SemanticLayerStore {
    path: PathBuf,
    state: RwLock<LayerSnapshot>,
    /// Serializes file writes so concurrent saves never interleave.
    save_lock: Mutex<()>,
}

impl SemanticLayerStore {
    /// Create an empty store bound to `path` without touching the file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: RwLock::new(LayerSnapshot::new(SemanticLayer::default())),
            save_lock: Mutex::new(()),
        }
    }

    /// Create a store and load the document at `path` into it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let store = Self::new(path);
        store.reload();
        store
    }

    /// The configured document path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted document.
    ///
    /// A missing, unreadable or malformed file yields the empty layer.
    pub fn load(&self) -> SemanticLayer {
        read_layer(&self.path)
    }

    /// Current in-memory layer.
    pub fn get(&self) -> SemanticLayer {
        self.snapshot().layer.as_ref().clone()
    }

    /// Current compiled prompt text.
    pub fn compiled(&self) -> String {
        self.snapshot().compiled.to_string()
    }

    /// Layer and compiled text, read together.
    pub fn snapshot(&self) -> LayerSnapshot {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the in-memory layer. `None` becomes the empty layer.
    pub fn set(&self, layer: Option<SemanticLayer>) {
        // Compile outside the lock; swap both halves inside it.
        let next = LayerSnapshot::new(layer.unwrap_or_default());
        debug!(tables = next.layer.tables.len(), "semantic layer replaced");
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Discard in-memory edits and re-read the document.
    pub fn reload(&self) -> SemanticLayer {
        let layer = self.load();
        self.set(Some(layer.clone()));
        info!(path = %self.path.display(), tables = layer.tables.len(), "semantic layer loaded");
        layer
    }

    /// Write the current layer as pretty JSON to `path` (default: the
    /// configured path), creating parent directories as needed.
    pub fn save(&self, path: Option<&Path>) -> StoreResult<PathBuf> {
        let target = path.unwrap_or(self.path.as_path()).to_path_buf();
        let _guard = self.save_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut json = serde_json::to_string_pretty(self.snapshot().layer.as_ref())?;
        json.push('\n');

        let io_err = |source: io::Error| StoreError::Io {
            path: target.clone(),
            source,
        };

        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        // Write-then-rename so readers of the file never see a partial document.
        let tmp = target.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &target).map_err(io_err)?;

        info!(path = %target.display(), "semantic layer saved");
        Ok(target)
    }
}

fn read_layer(path: &Path) -> SemanticLayer {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no semantic layer file; starting empty");
            return SemanticLayer::default();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable semantic layer file; starting empty");
            return SemanticLayer::default();
        }
    };

    // `null` is accepted and treated like an absent document.
    match serde_json::from_str::<Option<SemanticLayer>>(&content) {
        Ok(Some(layer)) => match layer.validate() {
            Ok(()) => layer,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "invalid semantic layer; starting empty");
                SemanticLayer::default()
            }
        },
        Ok(None) => SemanticLayer::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed semantic layer JSON; starting empty");
            SemanticLayer::default()
        }
    }
}
