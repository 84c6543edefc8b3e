//! SQLite implementation of [`DocumentStore`].

use serde_json::Value;
use sqlx::{Sqlite, SqlitePool, Transaction};

use super::Database;
use crate::store::traits::DocumentStore;
use crate::store::{merge_json, split_doc_path, PersistenceError, SetOptions, WriteBatch};

pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

async fn upsert(
    tx: &mut Transaction<'_, Sqlite>,
    path: &str,
    data: &Value,
) -> Result<(), PersistenceError> {
    let (collection, doc_id) = split_doc_path(path)?;
    let json = serde_json::to_string(data)?;
    sqlx::query(
        r#"
        INSERT INTO documents (path, collection, doc_id, data, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(path) DO UPDATE SET
            data = excluded.data,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(path)
    .bind(collection)
    .bind(doc_id)
    .bind(json)
    .bind(chrono::Utc::now().timestamp())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn fetch(
    tx: &mut Transaction<'_, Sqlite>,
    path: &str,
) -> Result<Option<Value>, PersistenceError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT data FROM documents WHERE path = ?")
        .bind(path)
        .fetch_optional(&mut **tx)
        .await?;
    row.map(|(data,)| serde_json::from_str(&data).map_err(PersistenceError::from))
        .transpose()
}

impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, PersistenceError> {
        split_doc_path(path)?;
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM documents WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(data,)| serde_json::from_str(&data)).transpose()?)
    }

    async fn set(
        &self,
        path: &str,
        data: Value,
        options: SetOptions,
    ) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await?;
        let data = match (options.merge, fetch(&mut tx, path).await?) {
            (true, Some(mut existing)) => {
                merge_json(&mut existing, data);
                existing
            }
            _ => data,
        };
        upsert(&mut tx, path, &data).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn add(&self, collection: &str, data: Value) -> Result<String, PersistenceError> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let path = format!("{collection}/{id}");
        let mut tx = self.pool.begin().await?;
        upsert(&mut tx, &path, &data).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, PersistenceError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT doc_id, data FROM documents WHERE collection = ? ORDER BY doc_id",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, data)| Ok((id, serde_json::from_str(&data)?)))
            .collect()
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), PersistenceError> {
        batch.check_size()?;
        let ops = batch.len();
        let mut tx = self.pool.begin().await?;
        for write in batch.writes() {
            upsert(&mut tx, &write.path, &write.data).await?;
        }
        tx.commit().await?;
        tracing::debug!(ops, "Committed write batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> SqliteDocumentStore {
        let db = Database::new_in_memory().await.unwrap();
        SqliteDocumentStore::new(&db)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = store().await;
        store
            .set("users/u1/rateLimits/coach", json!({"count": 1}), SetOptions::default())
            .await
            .unwrap();
        let doc = store.get("users/u1/rateLimits/coach").await.unwrap();
        assert_eq!(doc, Some(json!({"count": 1})));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = store().await;
        assert_eq!(store.get("users/u1/rateLimits/none").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_replaces_without_merge() {
        let store = store().await;
        store.set("c/a", json!({"x": 1, "y": 2}), SetOptions::default()).await.unwrap();
        store.set("c/a", json!({"y": 3}), SetOptions::default()).await.unwrap();
        assert_eq!(store.get("c/a").await.unwrap(), Some(json!({"y": 3})));
    }

    #[tokio::test]
    async fn test_set_merge() {
        let store = store().await;
        store.set("c/a", json!({"x": 1, "y": 2}), SetOptions::default()).await.unwrap();
        store.set("c/a", json!({"y": 3}), SetOptions::merge()).await.unwrap();
        assert_eq!(store.get("c/a").await.unwrap(), Some(json!({"x": 1, "y": 3})));
    }

    #[tokio::test]
    async fn test_add_and_list() {
        let store = store().await;
        let a = store.add("users/u1/sessions", json!({"n": 1})).await.unwrap();
        let b = store.add("users/u1/sessions", json!({"n": 2})).await.unwrap();
        assert_ne!(a, b);
        store.add("users/u2/sessions", json!({"n": 3})).await.unwrap();

        let listed = store.list("users/u1/sessions").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|(id, v)| id == &a && v == &json!({"n": 1})));
    }

    #[tokio::test]
    async fn test_commit_batch() {
        let store = store().await;
        let mut batch = WriteBatch::new();
        batch.set("c/a", json!(1)).set("c/b", json!(2));
        store.commit(batch).await.unwrap();
        assert_eq!(store.list("c").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_commit_invalid_path_rolls_back() {
        let store = store().await;
        let mut batch = WriteBatch::new();
        batch.set("c/a", json!(1)).set("c", json!(2));
        assert!(store.commit(batch).await.is_err());
        assert_eq!(store.get("c/a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_commit_rejects_oversized_batch() {
        let store = store().await;
        let mut batch = WriteBatch::new();
        for i in 0..501 {
            batch.set(format!("c/{i}"), json!(i));
        }
        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(err, PersistenceError::BatchTooLarge { .. }));
        assert!(store.list("c").await.unwrap().is_empty());
    }
}
