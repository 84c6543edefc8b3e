//! SQLite-backed durable store.
//!
//! [`Database`] wraps a `sqlx::SqlitePool` configured with WAL mode and
//! embedded migrations (`migrations/001_documents.sql`).
//!
//! [`SqliteDocumentStore`] implements [`crate::store::DocumentStore`] on a
//! single `documents` table keyed by full document path. Each row also
//! records its parent collection so collection queries are an index scan.
//! Every write, including a single `set`, runs inside a transaction; a
//! batch commit is one transaction.

mod database;
mod document_store;

pub use database::Database;
pub use document_store::SqliteDocumentStore;
