mod clock;
mod file_local;
mod memory;
mod paths;
pub mod sqlite;
mod traits;

pub use clock::{Clock, FixedClock, SystemClock};
pub use file_local::FileLocalStorage;
pub use memory::{MemoryDocumentStore, MemoryLocalStorage};
pub use paths::UserPaths;
pub use traits::{DocumentStore, LocalStorage};

use serde_json::Value;

/// Hard ceiling on operations in one batched write.
pub const MAX_BATCH_OPERATIONS: usize = 500;

/// Errors from the store collaborators.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Batch of {ops} operations exceeds the limit of {limit}")]
    BatchTooLarge { ops: usize, limit: usize },
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid document path: {0}")]
    InvalidPath(String),
}

/// Options for [`DocumentStore::set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Merge into the existing document instead of replacing it.
    pub merge: bool,
}

impl SetOptions {
    pub fn merge() -> Self {
        Self { merge: true }
    }
}

/// One `set` inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub struct BatchWrite {
    pub path: String,
    pub data: Value,
}

/// An all-or-nothing group of document writes.
///
/// Collect writes with [`WriteBatch::set`], then hand the batch to
/// [`DocumentStore::commit`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<BatchWrite>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: impl Into<String>, data: Value) -> &mut Self {
        self.writes.push(BatchWrite {
            path: path.into(),
            data,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[BatchWrite] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<BatchWrite> {
        self.writes
    }

    /// Reject batches over [`MAX_BATCH_OPERATIONS`] before touching storage.
    pub fn check_size(&self) -> Result<(), PersistenceError> {
        if self.writes.len() > MAX_BATCH_OPERATIONS {
            return Err(PersistenceError::BatchTooLarge {
                ops: self.writes.len(),
                limit: MAX_BATCH_OPERATIONS,
            });
        }
        Ok(())
    }
}

/// Deep-merge `patch` into `target`. Objects merge key by key; any other
/// value replaces what was there.
pub fn merge_json(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match existing.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Split a document path into `(collection, doc_id)`.
///
/// Document paths have an even number of non-empty segments.
pub fn split_doc_path(path: &str) -> Result<(&str, &str), PersistenceError> {
    let segments = path.split('/').count();
    if path.is_empty() || segments % 2 != 0 || path.split('/').any(str::is_empty) {
        return Err(PersistenceError::InvalidPath(path.to_string()));
    }
    let idx = path
        .rfind('/')
        .ok_or_else(|| PersistenceError::InvalidPath(path.to_string()))?;
    Ok((&path[..idx], &path[idx + 1..]))
}
