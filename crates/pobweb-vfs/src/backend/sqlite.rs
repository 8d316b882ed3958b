//! SQLite-backed key-value store.
//!
//! One table, one connection behind a mutex, every call on the blocking
//! pool. Conditional puts use `ON CONFLICT DO NOTHING`, so `IfAbsent` is
//! atomic here.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};

use super::{KvBackend, KvHead, KvRecord, ListEntry, ListPage, Metadata, PutMode, PutOutcome};
use crate::error::{KvError, KvResult};

const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key      TEXT PRIMARY KEY NOT NULL,
    value    BLOB NOT NULL,
    metadata TEXT
);
"#;

#[derive(Clone)]
pub struct SqliteKv {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteKv").finish_non_exhaustive()
    }
}

impl SqliteKv {
    /// Open a file-backed store, creating the schema if needed.
    pub fn open(path: &Path) -> KvResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(&conn)?;
        Ok(Self::wrap(conn))
    }

    /// Create an in-memory store (for testing).
    pub fn memory() -> KvResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(&conn)?;
        Ok(Self::wrap(conn))
    }

    fn wrap(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn init_connection(conn: &Connection) -> KvResult<()> {
        // reports "memory" for in-memory databases
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.execute_batch(KV_SCHEMA)?;
        Ok(())
    }

    async fn with_conn<T, F>(&self, f: F) -> KvResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> KvResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| KvError::Unavailable {
                message: "sqlite connection mutex poisoned".to_string(),
            })?;
            f(&guard)
        })
        .await
        .map_err(|e| KvError::Unavailable {
            message: format!("blocking task failed: {e}"),
        })?
    }
}

fn parse_metadata(key: &str, raw: Option<String>) -> KvResult<Option<Metadata>> {
    raw.map(|text| {
        serde_json::from_str::<Metadata>(&text).map_err(|e| KvError::CorruptMetadata {
            key: key.to_string(),
            reason: e.to_string(),
        })
    })
    .transpose()
}

fn encode_metadata(metadata: Option<&Metadata>) -> KvResult<Option<String>> {
    metadata
        .map(|m| {
            serde_json::to_string(m).map_err(|e| KvError::Unavailable {
                message: format!("metadata serialization failed: {e}"),
            })
        })
        .transpose()
}

#[async_trait]
impl KvBackend for SqliteKv {
    async fn get(&self, key: &str) -> KvResult<Option<KvRecord>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let row: Option<(Vec<u8>, Option<String>)> = conn
                .query_row(
                    "SELECT value, metadata FROM kv WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            row.map(|(value, metadata)| {
                Ok(KvRecord {
                    value: Bytes::from(value),
                    metadata: parse_metadata(&key, metadata)?,
                })
            })
            .transpose()
        })
        .await
    }

    async fn head(&self, key: &str) -> KvResult<Option<KvHead>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let row: Option<(i64, Option<String>)> = conn
                .query_row(
                    "SELECT length(value), metadata FROM kv WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            row.map(|(size, metadata)| {
                Ok(KvHead {
                    size: u64::try_from(size).unwrap_or(0),
                    metadata: parse_metadata(&key, metadata)?,
                })
            })
            .transpose()
        })
        .await
    }

    async fn put(
        &self,
        key: &str,
        value: Bytes,
        metadata: Option<Metadata>,
        mode: PutMode,
    ) -> KvResult<PutOutcome> {
        let key = key.to_string();
        let metadata = encode_metadata(metadata.as_ref())?;
        self.with_conn(move |conn| {
            let sql = match mode {
                PutMode::Overwrite => {
                    r#"
                    INSERT INTO kv (key, value, metadata) VALUES (?1, ?2, ?3)
                    ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        metadata = excluded.metadata
                    "#
                }
                PutMode::IfAbsent => {
                    r#"
                    INSERT INTO kv (key, value, metadata) VALUES (?1, ?2, ?3)
                    ON CONFLICT(key) DO NOTHING
                    "#
                }
            };
            let changed = conn.execute(sql, params![key, &value[..], metadata])?;
            Ok(if changed == 0 {
                PutOutcome::Exists
            } else {
                PutOutcome::Written
            })
        })
        .await
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }

    async fn list(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> KvResult<ListPage> {
        if let Some(c) = cursor {
            if !c.starts_with(prefix) {
                return Err(KvError::InvalidCursor);
            }
        }
        let prefix = prefix.to_string();
        let after = cursor.unwrap_or("").to_string();
        let limit = limit.max(1);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT key, metadata FROM kv
                WHERE substr(key, 1, length(?1)) = ?1 AND key > ?2
                ORDER BY key
                LIMIT ?3
                "#,
            )?;
            // one extra row tells whether another page exists
            let fetch = i64::try_from(limit.saturating_add(1)).unwrap_or(i64::MAX);
            let rows = stmt.query_map(params![prefix, after, fetch], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?;
            let mut entries = Vec::new();
            for row in rows {
                let (key, metadata) = row?;
                let metadata = parse_metadata(&key, metadata)?;
                entries.push(ListEntry { key, metadata });
            }
            let cursor = if entries.len() > limit {
                entries.truncate(limit);
                entries.last().map(|e| e.key.clone())
            } else {
                None
            };
            Ok(ListPage { entries, cursor })
        })
        .await
    }

    fn atomic_conditional_put(&self) -> bool {
        true
    }
}
