use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};

use super::hub::WatchHub;
use super::schema;
use super::{apply_field_updates, Document, DocumentPath, DocumentStore, Snapshot, Subscription};
use crate::error::{MoodboardError, Result};

/// Document store persisted in SQLite. Each document is one row of JSON;
/// live subscribers are served from an in-process hub, so only writers in
/// this process are observed.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    hub: WatchHub,
}

impl SqliteStore {
    /// Open or create the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        schema::initialize_schema(&conn)?;
        tracing::info!("Document store opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
            hub: WatchHub::new(),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            hub: WatchHub::new(),
        })
    }

    /// Execute a closure with access to the database connection.
    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| {
            MoodboardError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(format!("Lock poisoned: {}", e)),
            ))
        })?;
        f(&conn)
    }

    fn read(conn: &Connection, path: &DocumentPath) -> Result<Option<Document>> {
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE path = ?1",
                rusqlite::params![path.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => match serde_json::from_str::<serde_json::Value>(&body)? {
                serde_json::Value::Object(map) => Ok(Some(map)),
                _ => Err(MoodboardError::Store(format!(
                    "document {} is not a JSON object",
                    path
                ))),
            },
            None => Ok(None),
        }
    }

    fn write(conn: &Connection, path: &DocumentPath, document: &Document) -> Result<()> {
        let body = serde_json::to_string(document)?;
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO documents (path, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(path) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at",
            rusqlite::params![path.as_str(), body, now],
        )?;
        Ok(())
    }

    /// Last write time of a document (RFC 3339), if it exists.
    #[cfg(test)]
    pub fn updated_at(&self, path: &DocumentPath) -> Result<Option<String>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT updated_at FROM documents WHERE path = ?1",
                    rusqlite::params![path.as_str()],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>> {
        self.with_conn(|conn| Self::read(conn, path))
    }

    async fn subscribe(&self, path: &DocumentPath) -> Result<Subscription> {
        self.with_conn(|conn| {
            let current = Self::read(conn, path)?;
            let rx = self.hub.subscribe(path);
            Ok(Subscription::new(Snapshot::from_option(current), rx))
        })
    }

    async fn create(&self, path: &DocumentPath, document: Document) -> Result<()> {
        self.with_conn(|conn| {
            Self::write(conn, path, &document)?;
            tracing::debug!("Created document {}", path);
            self.hub.publish(path, Snapshot::Present(document));
            Ok(())
        })
    }

    async fn create_if_absent(&self, path: &DocumentPath, document: Document) -> Result<bool> {
        self.with_conn(|conn| {
            let body = serde_json::to_string(&document)?;
            let now = chrono::Utc::now().to_rfc3339();
            let inserted = conn.execute(
                "INSERT INTO documents (path, body, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(path) DO NOTHING",
                rusqlite::params![path.as_str(), body, now],
            )?;
            if inserted == 0 {
                tracing::debug!("Document {} already exists; create skipped", path);
                return Ok(false);
            }
            tracing::debug!("Created document {}", path);
            self.hub.publish(path, Snapshot::Present(document));
            Ok(true)
        })
    }

    async fn update_fields(&self, path: &DocumentPath, fields: Document) -> Result<()> {
        self.with_conn(|conn| {
            let mut document = Self::read(conn, path)?
                .ok_or_else(|| MoodboardError::DocumentMissing(path.to_string()))?;
            apply_field_updates(&mut document, &fields)?;
            Self::write(conn, path, &document)?;
            tracing::debug!("Updated {} field(s) on {}", fields.len(), path);
            self.hub.publish(path, Snapshot::Present(document));
            Ok(())
        })
    }
}
