//! Content sync: one mounted view of the shared content record.
//!
//! A view mirrors the remote document through a live subscription, seeds it
//! with default content the first time it's found missing, and writes likes
//! and edits back with per-field overwrites (last writer wins).
//!
//! Status flow:
//! - `loading` until the first snapshot (or a failure)
//! - `synced` once remote content has arrived
//! - `local` when sign-in or the subscription failed; writes are refused
//! - `syncing` while an edit is being saved, then `synced` or `error`
//!
//! State lives behind one mutex that is never held across an await. Every
//! change is published on a watch channel for the renderer and SSE clients.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::content::{ContentPatch, ContentRecord};
use crate::error::{MoodboardError, Result};
use crate::layout::DisplayOrder;
use crate::session::{Identity, SessionState};
use crate::store::{DocumentPath, DocumentStore, Snapshot};

/// Ambient sync indicator shown on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Loading,
    Synced,
    Local,
    Syncing,
    Error,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Loading => write!(f, "loading"),
            SyncStatus::Synced => write!(f, "synced"),
            SyncStatus::Local => write!(f, "local"),
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::Error => write!(f, "error"),
        }
    }
}

/// Serializable copy of a view's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSnapshot {
    pub status: SyncStatus,
    pub content: ContentRecord,
    /// Whether remote content has arrived at least once.
    pub loaded: bool,
    pub display_order: Option<DisplayOrder>,
    pub edit_open: bool,
    pub edit_form: ContentPatch,
    pub can_write: bool,
}

struct ViewState {
    status: SyncStatus,
    content: ContentRecord,
    loaded: bool,
    display_order: Option<DisplayOrder>,
    edit_open: bool,
    edit_form: ContentPatch,
    identity: Option<Identity>,
    /// Highest like count this view wrote that no snapshot has confirmed yet.
    likes_written: Option<u64>,
    seeded: bool,
    torn_down: bool,
}

impl ViewState {
    fn new() -> Self {
        Self {
            status: SyncStatus::Loading,
            content: ContentRecord::default(),
            loaded: false,
            display_order: None,
            edit_open: false,
            edit_form: ContentPatch::default(),
            identity: None,
            likes_written: None,
            seeded: false,
            torn_down: false,
        }
    }

    fn can_write(&self) -> bool {
        self.identity.is_some()
            && self.loaded
            && !self.torn_down
            && self.status != SyncStatus::Local
    }

    /// Shuffle once per view; later snapshots keep the order.
    fn ensure_display_order(&mut self) {
        if self.display_order.is_none() {
            let order = DisplayOrder::shuffled();
            tracing::debug!("Display order computed: {:?}", order.cards());
            self.display_order = Some(order);
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.torn_down {
            return Err(MoodboardError::TornDown);
        }
        if self.identity.is_none() || self.status == SyncStatus::Local {
            return Err(MoodboardError::ReadOnly);
        }
        if !self.loaded {
            return Err(MoodboardError::NotLoaded);
        }
        Ok(())
    }

    fn to_snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            status: self.status,
            content: self.content.clone(),
            loaded: self.loaded,
            display_order: self.display_order.clone(),
            edit_open: self.edit_open,
            edit_form: self.edit_form.clone(),
            can_write: self.can_write(),
        }
    }
}

/// One mounted view bound to the shared content document.
pub struct ContentSyncStore {
    store: Arc<dyn DocumentStore>,
    path: DocumentPath,
    state: Mutex<ViewState>,
    snapshot_tx: watch::Sender<ViewSnapshot>,
    listener: Mutex<Option<JoinHandle<()>>>,
    identity_watch: Mutex<Option<JoinHandle<()>>>,
}

impl ContentSyncStore {
    pub fn new(store: Arc<dyn DocumentStore>, path: DocumentPath) -> Arc<Self> {
        let state = ViewState::new();
        let (snapshot_tx, _) = watch::channel(state.to_snapshot());
        Arc::new(Self {
            store,
            path,
            state: Mutex::new(state),
            snapshot_tx,
            listener: Mutex::new(None),
            identity_watch: Mutex::new(None),
        })
    }

    /// Run `f` against the locked state and publish the result. Returns
    /// `None` without touching anything once the view is torn down.
    fn update<F, T>(&self, f: F) -> Option<T>
    where
        F: FnOnce(&mut ViewState) -> T,
    {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.torn_down {
            return None;
        }
        let out = f(&mut state);
        self.snapshot_tx.send_replace(state.to_snapshot());
        Some(out)
    }

    fn read<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&ViewState) -> T,
    {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&state)
    }

    /// Bind the view to a bootstrapped session. Without an identity the
    /// store is never contacted.
    pub async fn mount(self: &Arc<Self>, session: &SessionState) {
        match session {
            SessionState::Authenticated(identity) => self.subscribe(identity.clone()).await,
            SessionState::LocalOnly { reason } => self.enter_local(reason),
        }
    }

    /// Open the live subscription and start mirroring snapshots.
    pub async fn subscribe(self: &Arc<Self>, identity: Identity) {
        if self
            .update(|state| state.identity = Some(identity))
            .is_none()
        {
            return;
        }

        let mut subscription = match self.store.subscribe(&self.path).await {
            Ok(subscription) => subscription,
            Err(e) => {
                self.enter_local(&e.to_string());
                return;
            }
        };
        tracing::info!("Subscribed to {}", self.path);

        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while let Some(snapshot) = subscription.next().await {
                let Some(view) = weak.upgrade() else {
                    break;
                };
                if !view.handle_snapshot(snapshot).await {
                    break;
                }
            }
            tracing::debug!("Subscription listener finished");
        });

        let mut listener = self.listener.lock().unwrap_or_else(|e| e.into_inner());
        if self.read(|state| state.torn_down) {
            handle.abort();
        } else if let Some(previous) = listener.replace(handle) {
            previous.abort();
        }
    }

    /// Track identity changes after mount: a sign-out makes the view
    /// read-only, a new identity resubscribes.
    pub fn follow_identity(self: &Arc<Self>, mut identities: watch::Receiver<Option<Identity>>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while identities.changed().await.is_ok() {
                let identity = identities.borrow_and_update().clone();
                let Some(view) = weak.upgrade() else {
                    break;
                };
                if view.is_torn_down() {
                    break;
                }
                match identity {
                    Some(identity) => {
                        let current = view.read(|state| state.identity.clone());
                        if current.map(|c| c.uid) != Some(identity.uid.clone()) {
                            view.subscribe(identity).await;
                        }
                    }
                    None => view.lose_identity(),
                }
            }
        });

        let mut slot = self.identity_watch.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_torn_down() {
            handle.abort();
        } else if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Drop the identity and the subscription; writes are refused afterwards.
    fn lose_identity(&self) {
        if let Some(handle) = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
        tracing::warn!("Signed out; view on {} is now read-only", self.path);
        self.update(|state| {
            state.identity = None;
            state.status = SyncStatus::Local;
            state.ensure_display_order();
        });
    }

    /// Apply one remote event. Returns false when the listener should stop.
    async fn handle_snapshot(&self, snapshot: Snapshot) -> bool {
        match snapshot {
            Snapshot::Present(document) => {
                let content = match ContentRecord::from_document(&document) {
                    Ok(content) => content,
                    Err(e) => {
                        tracing::error!("Undecodable content at {}: {}", self.path, e);
                        return self
                            .update(|state| state.status = SyncStatus::Error)
                            .is_some();
                    }
                };
                self.update(|state| {
                    let mut content = content;
                    // A snapshot older than our own like must not roll it back.
                    if let Some(mark) = state.likes_written {
                        if content.likes < mark {
                            content.likes = mark;
                        } else {
                            state.likes_written = None;
                        }
                    }
                    state.content = content;
                    state.loaded = true;
                    state.status = SyncStatus::Synced;
                    state.ensure_display_order();
                })
                .is_some()
            }
            Snapshot::Missing => {
                let first = match self.update(|state| !std::mem::replace(&mut state.seeded, true)) {
                    Some(first) => first,
                    None => return false,
                };
                if first {
                    self.seed_defaults().await;
                } else {
                    tracing::debug!("Document still missing; seed already issued");
                }
                true
            }
            Snapshot::Failed(message) => {
                self.enter_local(&message);
                false
            }
        }
    }

    async fn seed_defaults(&self) {
        tracing::info!("No content at {}; creating defaults", self.path);
        let document = match ContentRecord::default().to_document() {
            Ok(document) => document,
            Err(e) => {
                tracing::error!("Failed to encode default content: {}", e);
                self.update(|state| state.status = SyncStatus::Error);
                return;
            }
        };
        match self.store.create_if_absent(&self.path, document).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!("Content at {} created elsewhere; keeping it", self.path),
            Err(e) => {
                tracing::error!("Failed to create default content: {}", e);
                self.update(|state| state.status = SyncStatus::Error);
            }
        }
    }

    fn enter_local(&self, reason: &str) {
        tracing::warn!("Content sync unavailable: {}; using local content", reason);
        self.update(|state| {
            state.status = SyncStatus::Local;
            state.ensure_display_order();
        });
    }

    /// Add one like and write the new count back.
    pub async fn like(&self) -> Result<u64> {
        let next = self.read(|state| {
            state.check_writable()?;
            Ok::<_, MoodboardError>(state.content.likes.saturating_add(1))
        })?;

        let mut fields = Map::new();
        fields.insert("likes".to_string(), Value::from(next));
        if let Err(e) = self.store.update_fields(&self.path, fields).await {
            tracing::error!("Failed to record like: {}", e);
            return Err(e);
        }

        self.update(|state| {
            if state.content.likes < next {
                state.content.likes = next;
                state.likes_written = Some(next);
            }
        });
        tracing::debug!("Likes now {}", next);
        Ok(next)
    }

    pub fn open_edit(&self) -> Result<()> {
        self.update(|state| state.edit_open = true)
            .ok_or(MoodboardError::TornDown)
    }

    /// Close the panel. Pending edits stay in the form.
    pub fn close_edit(&self) -> Result<()> {
        self.update(|state| state.edit_open = false)
            .ok_or(MoodboardError::TornDown)
    }

    /// Merge field edits into the pending form.
    pub fn update_form(&self, patch: ContentPatch) -> Result<()> {
        self.update(|state| state.edit_form.merge(patch))
            .ok_or(MoodboardError::TornDown)
    }

    /// Write the pending form to the remote record. Closes the panel on
    /// success; on failure the panel stays open with the form intact.
    pub async fn save_edits(&self) -> Result<()> {
        let sent = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = state.check_writable() {
                tracing::warn!("Save refused: {}", e);
                return Err(e);
            }
            if state.edit_form.is_empty() {
                state.edit_open = false;
                self.snapshot_tx.send_replace(state.to_snapshot());
                return Ok(());
            }
            state.status = SyncStatus::Syncing;
            self.snapshot_tx.send_replace(state.to_snapshot());
            state.edit_form.clone()
        };

        match self.store.update_fields(&self.path, sent.to_fields()).await {
            Ok(()) => {
                self.update(|state| {
                    state.content.apply(&sent);
                    state.status = SyncStatus::Synced;
                    // Edits typed while the save was in flight stay pending.
                    if state.edit_form == sent {
                        state.edit_form = ContentPatch::default();
                        state.edit_open = false;
                    }
                });
                tracing::info!("Saved edits to {}", self.path);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to save edits: {}", e);
                self.update(|state| state.status = SyncStatus::Error);
                Err(e)
            }
        }
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        self.read(ViewState::to_snapshot)
    }

    pub fn watch(&self) -> watch::Receiver<ViewSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Wait until the view leaves `loading`, or `timeout` elapses.
    pub async fn settled(&self, timeout: Duration) -> ViewSnapshot {
        let mut rx = self.watch();
        let wait = async {
            loop {
                if rx.borrow_and_update().status != SyncStatus::Loading {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        };
        if tokio::time::timeout(timeout, wait).await.is_err() {
            tracing::debug!("View still loading after {:?}", timeout);
        }
        self.snapshot()
    }

    pub fn is_torn_down(&self) -> bool {
        self.read(|state| state.torn_down)
    }

    /// Release the subscription. Later remote events no longer reach this view.
    pub fn teardown(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.torn_down {
                return;
            }
            state.torn_down = true;
        }
        for task in [&self.listener, &self.identity_watch] {
            if let Some(handle) = task.lock().unwrap_or_else(|e| e.into_inner()).take() {
                handle.abort();
            }
        }
        tracing::debug!("View on {} torn down", self.path);
    }
}

impl Drop for ContentSyncStore {
    fn drop(&mut self) {
        for task in [&mut self.listener, &mut self.identity_watch] {
            if let Some(handle) = task.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
                handle.abort();
            }
        }
    }
}
