//! Store fakes and helpers shared by unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{MoodboardError, Result};
use crate::store::{Document, DocumentPath, DocumentStore, MemoryStore, Snapshot, Subscription};
use crate::sync::{ContentSyncStore, ViewSnapshot};

/// Memory-backed store that counts calls and can be told to fail.
#[derive(Default)]
pub struct FakeStore {
    inner: MemoryStore,
    pub creates: AtomicUsize,
    pub subscribes: AtomicUsize,
    pub fail_updates: AtomicBool,
    pub fail_subscribe: AtomicBool,
    /// Written by "another client" right after a subscription captures
    /// its initial snapshot.
    pub concurrent_write: Mutex<Option<Document>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>> {
        self.inner.get(path).await
    }

    async fn subscribe(&self, path: &DocumentPath) -> Result<Subscription> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(MoodboardError::Store("permission denied".into()));
        }
        let subscription = self.inner.subscribe(path).await?;
        let pending = self
            .concurrent_write
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(document) = pending {
            self.inner.create(path, document).await?;
        }
        Ok(subscription)
    }

    async fn create(&self, path: &DocumentPath, document: Document) -> Result<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create(path, document).await
    }

    async fn create_if_absent(&self, path: &DocumentPath, document: Document) -> Result<bool> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_if_absent(path, document).await
    }

    async fn update_fields(&self, path: &DocumentPath, fields: Document) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(MoodboardError::Store("write rejected".into()));
        }
        self.inner.update_fields(path, fields).await
    }
}

/// Store whose subscription events are pushed by the test. Every
/// subscription starts with `Missing`; writes are only counted.
pub struct ScriptedStore {
    tx: broadcast::Sender<Snapshot>,
    creates: AtomicUsize,
}

impl ScriptedStore {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            tx,
            creates: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, snapshot: Snapshot) {
        let _ = self.tx.send(snapshot);
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn get(&self, _path: &DocumentPath) -> Result<Option<Document>> {
        Ok(None)
    }

    async fn subscribe(&self, _path: &DocumentPath) -> Result<Subscription> {
        Ok(Subscription::new(Snapshot::Missing, self.tx.subscribe()))
    }

    async fn create(&self, _path: &DocumentPath, _document: Document) -> Result<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_if_absent(&self, _path: &DocumentPath, _document: Document) -> Result<bool> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn update_fields(&self, path: &DocumentPath, _fields: Document) -> Result<()> {
        Err(MoodboardError::DocumentMissing(path.to_string()))
    }
}

/// Wait (up to 2s) for a view state matching `pred`.
pub async fn wait_for<F>(view: &ContentSyncStore, pred: F) -> ViewSnapshot
where
    F: Fn(&ViewSnapshot) -> bool,
{
    let mut rx = view.watch();
    let wait = async {
        loop {
            {
                let snapshot = rx.borrow_and_update().clone();
                if pred(&snapshot) {
                    return snapshot;
                }
            }
            if rx.changed().await.is_err() {
                panic!("view dropped while waiting");
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(2), wait)
        .await
        .expect("timed out waiting for view state")
}
