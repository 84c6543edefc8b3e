//! In-process store backends with failure injection, for tests and demos.

use super::traits::{DocumentStore, LocalStorage};
use super::{merge_json, split_doc_path, PersistenceError, SetOptions, WriteBatch};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryState {
    docs: BTreeMap<String, Value>,
    fail_reads: usize,
    fail_writes: usize,
    fail_adds: usize,
    fail_commit_attempts: HashSet<usize>,
    commit_attempts: usize,
    commits: usize,
    sets: usize,
}

/// A [`DocumentStore`] held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    state: Mutex<MemoryState>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next `n` calls to `get`/`list` fail.
    pub fn fail_next_reads(&self, n: usize) {
        self.state().fail_reads = n;
    }

    /// Make the next `n` calls to `set` fail.
    pub fn fail_next_writes(&self, n: usize) {
        self.state().fail_writes = n;
    }

    /// Make the next `n` calls to `add` fail.
    pub fn fail_next_adds(&self, n: usize) {
        self.state().fail_adds = n;
    }

    /// Make the `attempt`-th call to `commit` (1-based, counted over the
    /// store's lifetime) fail without applying anything.
    pub fn fail_commit(&self, attempt: usize) {
        self.state().fail_commit_attempts.insert(attempt);
    }

    /// Number of batches committed successfully.
    pub fn commit_count(&self) -> usize {
        self.state().commits
    }

    /// Number of successful single-document `set` calls.
    pub fn set_count(&self) -> usize {
        self.state().sets
    }

    /// Snapshot of one document.
    pub fn document(&self, path: &str) -> Option<Value> {
        self.state().docs.get(path).cloned()
    }

    /// Seed a document directly, bypassing failure injection.
    pub fn insert(&self, path: impl Into<String>, data: Value) {
        self.state().docs.insert(path.into(), data);
    }

    pub fn collection_len(&self, collection: &str) -> usize {
        let state = self.state();
        collection_entries(&state.docs, collection).count()
    }
}

fn collection_entries<'a>(
    docs: &'a BTreeMap<String, Value>,
    collection: &'a str,
) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
    docs.iter().filter_map(move |(path, value)| {
        let rest = path.strip_prefix(collection)?.strip_prefix('/')?;
        (!rest.contains('/')).then_some((rest, value))
    })
}

fn apply_set(docs: &mut BTreeMap<String, Value>, path: String, data: Value, merge: bool) {
    match docs.get_mut(&path) {
        Some(existing) if merge => merge_json(existing, data),
        _ => {
            docs.insert(path, data);
        }
    }
}

fn injected(what: &str) -> PersistenceError {
    PersistenceError::Unavailable(format!("injected {what} failure"))
}

impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, PersistenceError> {
        split_doc_path(path)?;
        let mut state = self.state();
        if state.fail_reads > 0 {
            state.fail_reads -= 1;
            return Err(injected("read"));
        }
        Ok(state.docs.get(path).cloned())
    }

    async fn set(
        &self,
        path: &str,
        data: Value,
        options: SetOptions,
    ) -> Result<(), PersistenceError> {
        split_doc_path(path)?;
        let mut state = self.state();
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            return Err(injected("write"));
        }
        apply_set(&mut state.docs, path.to_string(), data, options.merge);
        state.sets += 1;
        Ok(())
    }

    async fn add(&self, collection: &str, data: Value) -> Result<String, PersistenceError> {
        let mut state = self.state();
        if state.fail_adds > 0 {
            state.fail_adds -= 1;
            return Err(injected("add"));
        }
        let id = uuid::Uuid::new_v4().simple().to_string();
        let path = format!("{collection}/{id}");
        split_doc_path(&path)?;
        state.docs.insert(path, data);
        Ok(id)
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, PersistenceError> {
        let mut state = self.state();
        if state.fail_reads > 0 {
            state.fail_reads -= 1;
            return Err(injected("read"));
        }
        Ok(collection_entries(&state.docs, collection)
            .map(|(id, value)| (id.to_string(), value.clone()))
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), PersistenceError> {
        batch.check_size()?;
        for write in batch.writes() {
            split_doc_path(&write.path)?;
        }
        let mut state = self.state();
        state.commit_attempts += 1;
        let attempt = state.commit_attempts;
        if state.fail_commit_attempts.remove(&attempt) {
            return Err(injected("commit"));
        }
        for write in batch.into_writes() {
            apply_set(&mut state.docs, write.path, write.data, false);
        }
        state.commits += 1;
        Ok(())
    }
}

/// A [`LocalStorage`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryLocalStorage {
    items: Mutex<HashMap<String, String>>,
    read_only: AtomicBool,
}

impl MemoryLocalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// While set, `set_item` and `remove_item` fail as a full or locked-down
    /// browser store would. Reads keep working.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), PersistenceError> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable(
                "local storage is read-only".to_string(),
            ));
        }
        Ok(())
    }
}

impl LocalStorage for MemoryLocalStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.items().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.check_writable()?;
        self.items().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), PersistenceError> {
        self.check_writable()?;
        self.items().remove(key);
        Ok(())
    }
}
