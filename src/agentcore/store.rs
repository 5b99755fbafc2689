//! Durable snapshot persistence for conversation threads.
//!
//! A [`ConversationStore`] is a plain key-value upsert: `set` overwrites
//! whatever was there, `get` returns the exact last snapshot or nothing,
//! `delete` is a no-op if the id was never set, `all` enumerates with no
//! ordering guarantee. No backend retries on I/O or serialization failure.
//! Concurrent `set` calls on the same thread id are last-writer-wins —
//! callers that need anything stronger must serialize writes per thread
//! themselves.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use uuid::Uuid;

use crate::agentcore::error::AgentError;
use crate::agentcore::event::Thread;

/// A pluggable backend for thread snapshot persistence.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn set(&self, thread: &Thread) -> Result<(), AgentError>;
    async fn get(&self, thread_id: Uuid) -> Result<Option<Thread>, AgentError>;
    async fn delete(&self, thread_id: Uuid) -> Result<(), AgentError>;
    async fn all(&self) -> Result<Vec<Thread>, AgentError>;
}

/// One `{thread_id}.json` file per thread under `context_dir`.
pub struct FileConversationStore {
    context_dir: PathBuf,
}

impl FileConversationStore {
    pub fn new(context_dir: impl Into<PathBuf>) -> Result<Self, AgentError> {
        let context_dir = context_dir.into();
        std::fs::create_dir_all(&context_dir)
            .map_err(|e| AgentError::StoreIoError(e.to_string()))?;
        Ok(Self { context_dir })
    }

    fn path_for(&self, thread_id: Uuid) -> PathBuf {
        self.context_dir.join(format!("{}.json", thread_id))
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn set(&self, thread: &Thread) -> Result<(), AgentError> {
        let path = self.path_for(thread.thread_id());
        let snapshot = thread.to_serialized()?;
        std::fs::write(&path, snapshot).map_err(|e| AgentError::StoreIoError(e.to_string()))
    }

    async fn get(&self, thread_id: Uuid) -> Result<Option<Thread>, AgentError> {
        let path = self.path_for(thread_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| AgentError::StoreIoError(e.to_string()))?;
        Ok(Some(Thread::from_serialized(&raw)?))
    }

    async fn delete(&self, thread_id: Uuid) -> Result<(), AgentError> {
        let path = self.path_for(thread_id);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| AgentError::StoreIoError(e.to_string()))?;
        }
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Thread>, AgentError> {
        let mut threads = Vec::new();
        let entries =
            std::fs::read_dir(&self.context_dir).map_err(|e| AgentError::StoreIoError(e.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|e| AgentError::StoreIoError(e.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = std::fs::read_to_string(&path).map_err(|e| AgentError::StoreIoError(e.to_string()))?;
            threads.push(Thread::from_serialized(&raw)?);
        }
        Ok(threads)
    }
}

/// An embedded SQLite backend: `threads(id TEXT PRIMARY KEY, data TEXT)`,
/// `set` as `INSERT OR REPLACE`.
pub struct SqlConversationStore {
    conn: StdMutex<rusqlite::Connection>,
}

impl SqlConversationStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let conn = rusqlite::Connection::open(db_path)
            .map_err(|e| AgentError::StoreIoError(e.to_string()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS threads (id TEXT PRIMARY KEY, data TEXT)",
            [],
        )
        .map_err(|e| AgentError::StoreIoError(e.to_string()))?;
        Ok(Self {
            conn: StdMutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, AgentError> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| AgentError::StoreIoError(e.to_string()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS threads (id TEXT PRIMARY KEY, data TEXT)",
            [],
        )
        .map_err(|e| AgentError::StoreIoError(e.to_string()))?;
        Ok(Self {
            conn: StdMutex::new(conn),
        })
    }
}

#[async_trait]
impl ConversationStore for SqlConversationStore {
    async fn set(&self, thread: &Thread) -> Result<(), AgentError> {
        let snapshot = thread.to_serialized()?;
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO threads (id, data) VALUES (?1, ?2)",
            rusqlite::params![thread.thread_id().to_string(), snapshot],
        )
        .map_err(|e| AgentError::StoreIoError(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, thread_id: Uuid) -> Result<Option<Thread>, AgentError> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT data FROM threads WHERE id = ?1")
            .map_err(|e| AgentError::StoreIoError(e.to_string()))?;
        let mut rows = stmt
            .query(rusqlite::params![thread_id.to_string()])
            .map_err(|e| AgentError::StoreIoError(e.to_string()))?;
        match rows.next().map_err(|e| AgentError::StoreIoError(e.to_string()))? {
            Some(row) => {
                let data: String = row.get(0).map_err(|e| AgentError::StoreIoError(e.to_string()))?;
                Ok(Some(Thread::from_serialized(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, thread_id: Uuid) -> Result<(), AgentError> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        conn.execute(
            "DELETE FROM threads WHERE id = ?1",
            rusqlite::params![thread_id.to_string()],
        )
        .map_err(|e| AgentError::StoreIoError(e.to_string()))?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Thread>, AgentError> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT data FROM threads")
            .map_err(|e| AgentError::StoreIoError(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| AgentError::StoreIoError(e.to_string()))?;
        let mut threads = Vec::new();
        for row in rows {
            let data = row.map_err(|e| AgentError::StoreIoError(e.to_string()))?;
            threads.push(Thread::from_serialized(&data)?);
        }
        Ok(threads)
    }
}

/// An embedded SurrealDB-backed document store: one document per thread,
/// keyed by a top-level `thread_id` field, upserted with `UPDATE ...
/// CONTENT`.
pub struct DocumentConversationStore {
    db: surrealdb::Surreal<surrealdb::engine::local::Db>,
}

impl DocumentConversationStore {
    /// Open an embedded, in-memory SurrealDB instance under the given
    /// namespace/database pair. Callers that need on-disk persistence can
    /// construct their own `surrealdb::Surreal` with the `kv-rocksdb`
    /// engine and pass it to [`Self::with_connection`] instead.
    pub async fn in_memory(namespace: &str, database: &str) -> Result<Self, AgentError> {
        let db = surrealdb::Surreal::new::<surrealdb::engine::local::Mem>(())
            .await
            .map_err(|e| AgentError::StoreIoError(e.to_string()))?;
        db.use_ns(namespace)
            .use_db(database)
            .await
            .map_err(|e| AgentError::StoreIoError(e.to_string()))?;
        Ok(Self { db })
    }

    pub fn with_connection(db: surrealdb::Surreal<surrealdb::engine::local::Db>) -> Self {
        Self { db }
    }
}

// `Thread` already serializes with a top-level `thread_id` field (its own
// struct field, no rename), so it satisfies the document contract as-is —
// no wrapper type needed.

#[async_trait]
impl ConversationStore for DocumentConversationStore {
    async fn set(&self, thread: &Thread) -> Result<(), AgentError> {
        let _: Option<Thread> = self
            .db
            .update(("threads", thread.thread_id().to_string()))
            .content(thread.clone())
            .await
            .map_err(|e| AgentError::StoreIoError(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, thread_id: Uuid) -> Result<Option<Thread>, AgentError> {
        let doc: Option<Thread> = self
            .db
            .select(("threads", thread_id.to_string()))
            .await
            .map_err(|e| AgentError::StoreIoError(e.to_string()))?;
        Ok(doc)
    }

    async fn delete(&self, thread_id: Uuid) -> Result<(), AgentError> {
        let _: Option<Thread> = self
            .db
            .delete(("threads", thread_id.to_string()))
            .await
            .map_err(|e| AgentError::StoreIoError(e.to_string()))?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Thread>, AgentError> {
        let docs: Vec<Thread> = self
            .db
            .select("threads")
            .await
            .map_err(|e| AgentError::StoreIoError(e.to_string()))?;
        Ok(docs)
    }
}
