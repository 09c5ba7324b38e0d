use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use rusqlite::Connection;
use serde_json::Value;
use std::sync::{Mutex, MutexGuard};

use super::{DocumentStore, Filter, matches};

/// SQLite-backed document store. Each row is one JSON document.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the documents table. Use `":memory:"` for tests.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("failed to open document database")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                body       TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS documents_collection ON documents (collection);",
        )
        .context("failed to create documents table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("document store lock poisoned"))
    }

    /// All rows of a collection as `(id, document)`, in insertion order.
    fn rows(conn: &Connection, collection: &str) -> Result<Vec<(i64, Value)>> {
        let mut stmt =
            conn.prepare("SELECT id, body FROM documents WHERE collection = ?1 ORDER BY id ASC")?;
        let raw = stmt
            .query_map([collection], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter()
            .map(|(id, body)| -> Result<(i64, Value)> { Ok((id, serde_json::from_str(&body)?)) })
            .collect()
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert_one(&self, collection: &str, document: Value) -> Result<String> {
        let body = serde_json::to_string(&document)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO documents (collection, body) VALUES (?1, ?2)",
            [collection, body.as_str()],
        )?;
        Ok(conn.last_insert_rowid().to_string())
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>> {
        let conn = self.lock()?;
        Ok(Self::rows(&conn, collection)?
            .into_iter()
            .map(|(_, doc)| doc)
            .filter(|doc| matches(doc, filter))
            .collect())
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let conn = self.lock()?;
        if filter.is_empty() {
            let deleted = conn.execute("DELETE FROM documents WHERE collection = ?1", [collection])?;
            return Ok(deleted as u64);
        }

        let doomed: Vec<i64> = Self::rows(&conn, collection)?
            .into_iter()
            .filter(|(_, doc)| matches(doc, filter))
            .map(|(id, _)| id)
            .collect();
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM documents WHERE id = ?1")?;
            for id in &doomed {
                stmt.execute([id])?;
            }
        }
        tx.commit()?;
        Ok(doomed.len() as u64)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let conn = self.lock()?;
        let count = Self::rows(&conn, collection)?
            .iter()
            .filter(|(_, doc)| matches(doc, filter))
            .count();
        Ok(count as u64)
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT collection FROM documents ORDER BY collection ASC")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::filter_eq;
    use serde_json::json;

    #[tokio::test]
    async fn insert_returns_increasing_ids() {
        let store = SqliteStore::in_memory().unwrap();
        let a = store.insert_one("c", json!({"n": 1})).await.unwrap();
        let b = store.insert_one("c", json!({"n": 2})).await.unwrap();
        assert!(b.parse::<i64>().unwrap() > a.parse::<i64>().unwrap());
    }

    #[tokio::test]
    async fn collections_are_isolated() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_one("a", json!({"n": 1})).await.unwrap();
        store.insert_one("b", json!({"n": 2})).await.unwrap();

        let docs = store.find("a", &Filter::new()).await.unwrap();
        assert_eq!(docs, vec![json!({"n": 1})]);
        assert_eq!(store.list_collections().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn filtered_delete_keeps_others() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_one("c", json!({"u": "x"})).await.unwrap();
        store.insert_one("c", json!({"u": "y"})).await.unwrap();
        store.insert_one("c", json!({"u": "x"})).await.unwrap();

        let deleted = store.delete_many("c", &filter_eq("u", "x")).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.count("c", &Filter::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_all_with_empty_filter() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_one("c", json!({})).await.unwrap();
        store.insert_one("c", json!({})).await.unwrap();
        store.insert_one("other", json!({})).await.unwrap();

        assert_eq!(store.delete_many("c", &Filter::new()).await.unwrap(), 2);
        assert_eq!(store.count("other", &Filter::new()).await.unwrap(), 1);
    }

    #[test]
    fn persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.db");
        let path_str = path.to_str().unwrap();

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            {
                let store = SqliteStore::open(path_str).unwrap();
                store.insert_one("c", json!({"kept": true})).await.unwrap();
            }
            let store = SqliteStore::open(path_str).unwrap();
            assert_eq!(store.count("c", &filter_eq("kept", true)).await.unwrap(), 1);
        });
    }

    #[tokio::test]
    async fn filtered_delete_is_committed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.db");
        let path_str = path.to_str().unwrap();

        {
            let store = SqliteStore::open(path_str).unwrap();
            for u in ["x", "y", "x", "x"] {
                store.insert_one("c", json!({"u": u})).await.unwrap();
            }
            assert_eq!(store.delete_many("c", &filter_eq("u", "x")).await.unwrap(), 3);
        }

        let store = SqliteStore::open(path_str).unwrap();
        assert_eq!(store.count("c", &Filter::new()).await.unwrap(), 1);
        assert_eq!(store.count("c", &filter_eq("u", "y")).await.unwrap(), 1);
        // The connection is usable again after the transaction closes.
        store.insert_one("c", json!({"u": "z"})).await.unwrap();
    }
}
