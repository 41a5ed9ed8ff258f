//! Document store boundary.
//!
//! The content record lives in a JSON document addressed by a
//! collection/document path. Stores push live snapshots to subscribers;
//! dropping a [`Subscription`] is the unsubscribe.
//!
//! Two adapters ship with the crate:
//! 1. **SqliteStore**: documents persisted in a local SQLite file
//! 2. **MemoryStore**: process-local, used by tests and throwaway runs

pub mod hub;
pub mod memory;
pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::error::{MoodboardError, Result};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// A stored document: a JSON object.
pub type Document = Map<String, Value>;

/// Validated document path: an even number of non-empty segments
/// (`collection/doc[/collection/doc...]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath(String);

impl DocumentPath {
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim_matches('/');
        let segments: Vec<&str> = trimmed.split('/').collect();
        if trimmed.is_empty() || segments.iter().any(|s| s.trim().is_empty()) {
            return Err(MoodboardError::InvalidPath(format!(
                "'{}' has empty segments",
                path
            )));
        }
        if segments.len() % 2 != 0 {
            return Err(MoodboardError::InvalidPath(format!(
                "'{}' names a collection, not a document",
                path
            )));
        }
        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One event on a live subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// The document exists; this is its full current body.
    Present(Document),
    /// No document at the path.
    Missing,
    /// The listener failed; no further events follow.
    Failed(String),
}

impl Snapshot {
    pub fn from_option(doc: Option<Document>) -> Self {
        match doc {
            Some(doc) => Snapshot::Present(doc),
            None => Snapshot::Missing,
        }
    }
}

/// Live stream of snapshots for one document. The first event is the
/// document state at subscribe time.
pub struct Subscription {
    initial: Option<Snapshot>,
    rx: broadcast::Receiver<Snapshot>,
}

impl Subscription {
    pub fn new(initial: Snapshot, rx: broadcast::Receiver<Snapshot>) -> Self {
        Self {
            initial: Some(initial),
            rx,
        }
    }

    /// A subscription that reports `Failed(message)` once and then ends.
    pub fn failed(message: impl Into<String>) -> Self {
        let (_tx, rx) = broadcast::channel(1);
        Self::new(Snapshot::Failed(message.into()), rx)
    }

    /// Next snapshot, or `None` once the store closes the stream.
    pub async fn next(&mut self) -> Option<Snapshot> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Each snapshot is a full document; skipping is harmless.
                    tracing::debug!("Subscription lagged by {} snapshots", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// A store of JSON documents with live subscriptions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document once.
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>>;

    /// Open a live subscription on a document.
    async fn subscribe(&self, path: &DocumentPath) -> Result<Subscription>;

    /// Write a whole document, replacing any existing one.
    async fn create(&self, path: &DocumentPath, document: Document) -> Result<()>;

    /// Write a document only if none exists at `path`. Returns whether it
    /// was written; an existing document is left untouched.
    async fn create_if_absent(&self, path: &DocumentPath, document: Document) -> Result<bool>;

    /// Overwrite individual fields of an existing document. Keys may be
    /// dotted (`links.twitter`) to address nested fields. Fails with
    /// [`MoodboardError::DocumentMissing`] if the document doesn't exist.
    async fn update_fields(&self, path: &DocumentPath, fields: Document) -> Result<()>;
}

/// Apply dotted-key field updates to a document in place.
pub fn apply_field_updates(document: &mut Document, fields: &Document) -> Result<()> {
    for key in fields.keys() {
        if key.split('.').any(str::is_empty) {
            return Err(MoodboardError::Store(format!("invalid field path '{}'", key)));
        }
    }

    for (key, value) in fields {
        let segments: Vec<&str> = key.split('.').collect();
        let (last, parents) = match segments.split_last() {
            Some(split) => split,
            None => continue,
        };

        let mut target = &mut *document;
        for segment in parents {
            let slot = target
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            target = slot
                .as_object_mut()
                .ok_or_else(|| MoodboardError::Store(format!("'{}' is not an object", segment)))?;
        }
        target.insert(last.to_string(), value.clone());
    }
    Ok(())
}
