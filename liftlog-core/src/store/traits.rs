//! Collaborator contracts for the two storage tiers.
//!
//! [`DocumentStore`] is the remote, durable tier: asynchronous, may fail on
//! any call. [`LocalStorage`] is the synchronous per-device tier that the
//! session buffer mirrors itself into.
//!
//! Methods return `impl Future + Send` rather than using `async fn` so that
//! the futures are guaranteed `Send` and can be driven from `tokio::spawn`.
//! Implementations are free to write `async fn`.

use super::{PersistenceError, SetOptions, WriteBatch};
use serde_json::Value;
use std::future::Future;

/// Document database with per-document reads and writes, collection
/// queries and batched commits.
pub trait DocumentStore: Send + Sync {
    /// Read one document. `None` when it does not exist.
    fn get(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Option<Value>, PersistenceError>> + Send;

    /// Write one document, replacing it or merging into it.
    fn set(
        &self,
        path: &str,
        data: Value,
        options: SetOptions,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;

    /// Create a document with a store-generated id inside `collection`.
    fn add(
        &self,
        collection: &str,
        data: Value,
    ) -> impl Future<Output = Result<String, PersistenceError>> + Send;

    /// Every document directly inside `collection`, as `(id, data)`.
    fn list(
        &self,
        collection: &str,
    ) -> impl Future<Output = Result<Vec<(String, Value)>, PersistenceError>> + Send;

    /// Apply every write in `batch`, or none of them.
    ///
    /// Implementations must reject batches larger than
    /// [`super::MAX_BATCH_OPERATIONS`].
    fn commit(
        &self,
        batch: WriteBatch,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

/// Synchronous key-value store local to this device.
///
/// Survives process restarts; is not shared between devices.
pub trait LocalStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), PersistenceError>;
    fn remove_item(&self, key: &str) -> Result<(), PersistenceError>;
}

impl<T: DocumentStore> DocumentStore for std::sync::Arc<T> {
    fn get(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Option<Value>, PersistenceError>> + Send {
        (**self).get(path)
    }

    fn set(
        &self,
        path: &str,
        data: Value,
        options: SetOptions,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send {
        (**self).set(path, data, options)
    }

    fn add(
        &self,
        collection: &str,
        data: Value,
    ) -> impl Future<Output = Result<String, PersistenceError>> + Send {
        (**self).add(collection, data)
    }

    fn list(
        &self,
        collection: &str,
    ) -> impl Future<Output = Result<Vec<(String, Value)>, PersistenceError>> + Send {
        (**self).list(collection)
    }

    fn commit(
        &self,
        batch: WriteBatch,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send {
        (**self).commit(batch)
    }
}

impl<T: LocalStorage> LocalStorage for std::sync::Arc<T> {
    fn get_item(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), PersistenceError> {
        (**self).remove_item(key)
    }
}
