//! Persistent [`Storage`] on a single SQLite file.
//!
//! Queries run on tokio's blocking pool against one shared connection.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{prefix_upper_bound, Entry, Storage};

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at `path`, creating missing parent
    /// directories, and migrate it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)?,
            _ => {}
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// A throwaway database that lives as long as the store.
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<F, T>(&self, query: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|poison| StoreError::Poisoned(poison.to_string()))?;
            query(&guard)
        })
        .await
        .map_err(|join| StoreError::Task(join.to_string()))?
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entry> {
    Ok((row.get(0)?, row.get(1)?))
}

#[async_trait]
impl Storage for SqliteStore {
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let key = key.to_vec();
        let value = value.to_vec();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let key = key.to_vec();
        self.with_conn(move |conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn has(&self, key: &[u8]) -> Result<bool> {
        let key = key.to_vec();
        self.with_conn(move |conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM kv WHERE key = ?1", params![key], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        let key = key.to_vec();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }

    async fn get_all(&self) -> Result<Vec<Entry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM kv ORDER BY key")?;
            let rows = stmt.query_map([], row_to_entry)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn get_all_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Entry>> {
        let lower = prefix.to_vec();
        let upper = prefix_upper_bound(prefix);
        self.with_conn(move |conn| match upper {
            Some(upper) => {
                let mut stmt = conn.prepare(
                    "SELECT key, value FROM kv WHERE key >= ?1 AND key < ?2 ORDER BY key",
                )?;
                let rows = stmt.query_map(params![lower, upper], row_to_entry)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            }
            None => {
                let mut stmt =
                    conn.prepare("SELECT key, value FROM kv WHERE key >= ?1 ORDER BY key")?;
                let rows = stmt.query_map(params![lower], row_to_entry)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            }
        })
        .await
    }

    async fn delete_all(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM kv", [])?;
            Ok(())
        })
        .await
    }

    async fn delete_all_with_prefix(&self, prefix: &[u8]) -> Result<()> {
        let lower = prefix.to_vec();
        let upper = prefix_upper_bound(prefix);
        self.with_conn(move |conn| {
            let removed = match upper {
                Some(upper) => conn.execute(
                    "DELETE FROM kv WHERE key >= ?1 AND key < ?2",
                    params![lower, upper],
                )?,
                None => conn.execute("DELETE FROM kv WHERE key >= ?1", params![lower])?,
            };
            tracing::trace!(removed, "deleted entries by prefix");
            Ok(())
        })
        .await
    }
}
