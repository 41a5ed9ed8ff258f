//! HTTP surface: page rendering, JSON view API and SSE updates.
//!
//! Every `GET /` mounts a fresh view (its own subscription and display
//! order). Views are addressed by id afterwards and evicted oldest-first
//! once `server.max_views` is exceeded.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::Rng;
use serde_json::json;

use crate::config::AppConfig;
use crate::content::ContentPatch;
use crate::error::{MoodboardError, Result};
use crate::render;
use crate::session::{SessionBootstrapper, SessionState};
use crate::store::{DocumentPath, DocumentStore};
use crate::sync::{ContentSyncStore, ViewSnapshot};

#[derive(Default)]
struct ViewRegistry {
    views: HashMap<String, Arc<ContentSyncStore>>,
    order: VecDeque<String>,
}

/// Shared server state.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn DocumentStore>,
    pub path: DocumentPath,
    pub session: SessionBootstrapper,
    views: Mutex<ViewRegistry>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn DocumentStore>,
        session: SessionBootstrapper,
    ) -> Result<Self> {
        let path = config.content_path()?;
        Ok(Self {
            config,
            store,
            path,
            session,
            views: Mutex::new(ViewRegistry::default()),
        })
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, ViewRegistry> {
        self.views.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mount a new view and register it, evicting the oldest views over capacity.
    /// The view follows later sign-ins and sign-outs.
    pub async fn mount_view(&self) -> (String, Arc<ContentSyncStore>) {
        let id = hex::encode(rand::thread_rng().gen::<[u8; 8]>());
        let view = ContentSyncStore::new(self.store.clone(), self.path.clone());

        let identities = self.session.on_identity_change();
        let session = SessionState::from_identity(identities.borrow().clone());
        view.mount(&session).await;
        view.follow_identity(identities);

        let evicted = {
            let mut registry = self.registry();
            registry.views.insert(id.clone(), view.clone());
            registry.order.push_back(id.clone());

            let max = self.config.server.max_views.max(1);
            let mut evicted = Vec::new();
            while registry.order.len() > max {
                if let Some(old) = registry.order.pop_front() {
                    if let Some(old_view) = registry.views.remove(&old) {
                        evicted.push((old, old_view));
                    }
                }
            }
            evicted
        };

        for (old, old_view) in evicted {
            tracing::debug!("Evicting view {}", old);
            old_view.teardown();
        }
        tracing::debug!("Mounted view {}", id);
        (id, view)
    }

    pub fn view(&self, id: &str) -> Result<Arc<ContentSyncStore>> {
        self.registry()
            .views
            .get(id)
            .cloned()
            .ok_or_else(|| MoodboardError::ViewNotFound(id.to_string()))
    }

    /// Tear down and forget a view.
    pub fn remove_view(&self, id: &str) -> Result<()> {
        let view = {
            let mut registry = self.registry();
            registry.order.retain(|v| v != id);
            registry.views.remove(id)
        };
        match view {
            Some(view) => {
                view.teardown();
                Ok(())
            }
            None => Err(MoodboardError::ViewNotFound(id.to_string())),
        }
    }

    pub fn view_count(&self) -> usize {
        self.registry().views.len()
    }

    /// Tear down every mounted view.
    pub fn shutdown(&self) {
        let views: Vec<_> = {
            let mut registry = self.registry();
            registry.order.clear();
            registry.views.drain().map(|(_, v)| v).collect()
        };
        for view in views {
            view.teardown();
        }
    }
}

async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (id, view) = state.mount_view().await;
    let wait = Duration::from_millis(state.config.server.first_load_wait_ms);
    let snapshot = view.settled(wait).await;
    let page = render::render_page(&snapshot, &id, &state.config.display_name);
    ([("x-view-id", id)], Html(page))
}

fn session_json(state: &AppState) -> serde_json::Value {
    match state.session.current() {
        Some(identity) => json!({
            "session": "authenticated",
            "uid": identity.uid,
            "anonymous": identity.anonymous,
        }),
        None => json!({ "session": "local" }),
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let session = session_json(&state);
    Json(json!({
        "status": "ok",
        "session": session["session"].clone(),
        "views": state.view_count(),
    }))
}

/// Re-run sign-in with the configured token. Mounted views pick up the
/// new identity.
async fn sign_in(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state
        .session
        .bootstrap(state.config.initial_token())
        .await;
    Json(session_json(&state))
}

/// Clear the identity; mounted views become read-only.
async fn sign_out(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.session.sign_out();
    Json(session_json(&state))
}

async fn get_view(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ViewSnapshot>> {
    Ok(Json(state.view(&id)?.snapshot()))
}

async fn delete_view(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state.remove_view(&id)?;
    Ok(Json(json!({ "deleted": id })))
}

async fn like(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let likes = state.view(&id)?.like().await?;
    Ok(Json(json!({ "likes": likes })))
}

async fn open_edit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ViewSnapshot>> {
    let view = state.view(&id)?;
    view.open_edit()?;
    Ok(Json(view.snapshot()))
}

async fn close_edit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ViewSnapshot>> {
    let view = state.view(&id)?;
    view.close_edit()?;
    Ok(Json(view.snapshot()))
}

async fn update_form(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<ContentPatch>,
) -> Result<Json<ViewSnapshot>> {
    let view = state.view(&id)?;
    view.update_form(patch)?;
    Ok(Json(view.snapshot()))
}

async fn save(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ViewSnapshot>> {
    let view = state.view(&id)?;
    view.save_edits().await?;
    Ok(Json(view.snapshot()))
}

async fn events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let rx = state.view(&id)?.watch();
    let stream = async_stream::stream! {
        let mut rx = rx;
        loop {
            let snapshot = rx.borrow_and_update().clone();
            match serde_json::to_string(&snapshot) {
                Ok(json) => {
                    yield Ok::<_, std::convert::Infallible>(Event::default().data(json));
                }
                Err(e) => tracing::warn!("Failed to encode view snapshot: {}", e),
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    };
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/session", post(sign_in).delete(sign_out))
        .route("/api/views/{id}", get(get_view).delete(delete_view))
        .route("/api/views/{id}/like", post(like))
        .route(
            "/api/views/{id}/edit",
            post(open_edit).delete(close_edit).patch(update_form),
        )
        .route("/api/views/{id}/save", post(save))
        .route("/api/views/{id}/events", get(events))
        .with_state(state)
}

/// Bind and serve in the background. Returns the bound address.
pub async fn start_server(state: Arc<AppState>, addr: &str) -> anyhow::Result<String> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let addr_str = listener.local_addr()?.to_string();

    tracing::info!("Moodboard listening on http://{}/", addr_str);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    Ok(addr_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentRecord;
    use crate::session::{IdentityProvider, LocalIdentityProvider, UnavailableProvider};
    use crate::store::MemoryStore;
    use crate::sync::SyncStatus;
    use crate::testing::wait_for;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn state_with(provider: Arc<dyn IdentityProvider>, max_views: usize) -> Arc<AppState> {
        let mut config = AppConfig::default();
        config.server.max_views = max_views;
        config.server.first_load_wait_ms = 1000;

        let session = SessionBootstrapper::new(provider);
        session.bootstrap(None).await;
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        Arc::new(AppState::new(config, store, session).unwrap())
    }

    async fn test_state(max_views: usize) -> Arc<AppState> {
        state_with(Arc::new(LocalIdentityProvider::new()), max_views).await
    }

    fn request(method: &str, uri: &str, body: Option<&str>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn mount(state: &Arc<AppState>) -> String {
        let response = router(state.clone())
            .oneshot(request("GET", "/", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response.headers()["x-view-id"].to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let state = test_state(4).await;
        let response = router(state)
            .oneshot(request("GET", "/health", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["session"], "authenticated");
    }

    #[tokio::test]
    async fn test_index_renders_synced_page() {
        let state = test_state(4).await;
        let response = router(state.clone())
            .oneshot(request("GET", "/", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let id = response.headers()["x-view-id"].to_str().unwrap().to_string();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();

        assert!(html.contains(&format!(r#"data-view="{}""#, id)));
        assert!(html.contains(r#"data-status="synced""#));
        assert!(html.contains("@Grignute"));
        assert_eq!(state.view_count(), 1);
    }

    #[tokio::test]
    async fn test_like_through_api() {
        let state = test_state(4).await;
        let id = mount(&state).await;

        for expected in 1..=3 {
            let response = router(state.clone())
                .oneshot(request("POST", &format!("/api/views/{}/like", id), None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_json(response).await["likes"], expected);
        }

        let stored = state.store.get(&state.path).await.unwrap().unwrap();
        assert_eq!(stored["likes"], 3);
    }

    #[tokio::test]
    async fn test_edit_and_save_flow() {
        let state = test_state(4).await;
        let id = mount(&state).await;
        let app = router(state.clone());

        let response = app
            .clone()
            .oneshot(request("POST", &format!("/api/views/{}/edit", id), None))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["editOpen"], true);

        let response = app
            .clone()
            .oneshot(request(
                "PATCH",
                &format!("/api/views/{}/edit", id),
                Some(r#"{"bio":"new bio","linkedinLink":"https://linkedin.com/in/me"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["editForm"]["bio"], "new bio");

        let response = app
            .oneshot(request("POST", &format!("/api/views/{}/save", id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let snap = body_json(response).await;
        assert_eq!(snap["editOpen"], false);
        assert_eq!(snap["status"], "synced");

        let stored = ContentRecord::from_document(
            &state.store.get(&state.path).await.unwrap().unwrap(),
        )
        .unwrap();
        assert_eq!(stored.bio, "new bio");
        assert_eq!(stored.links.linkedin, "https://linkedin.com/in/me");
        assert_eq!(stored.status, ContentRecord::default().status);
    }

    #[tokio::test]
    async fn test_unknown_view_is_404() {
        let state = test_state(4).await;
        let response = router(state)
            .oneshot(request("POST", "/api/views/nope/like", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_local_only_refuses_writes() {
        let state = state_with(Arc::new(UnavailableProvider::new("offline")), 4).await;
        let id = mount(&state).await;

        let snapshot = state.view(&id).unwrap().snapshot();
        assert_eq!(snapshot.status, SyncStatus::Local);

        let response = router(state)
            .oneshot(request("POST", &format!("/api/views/{}/like", id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_sign_out_reaches_mounted_views() {
        let state = test_state(4).await;
        let id = mount(&state).await;
        let view = state.view(&id).unwrap();
        let app = router(state.clone());

        let response = app
            .clone()
            .oneshot(request("DELETE", "/api/session", None))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["session"], "local");
        wait_for(&view, |s| s.status == SyncStatus::Local).await;

        let response = app
            .clone()
            .oneshot(request("POST", &format!("/api/views/{}/like", id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(request("POST", "/api/session", None))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["session"], "authenticated");
        wait_for(&view, |s| s.can_write).await;

        let response = app
            .oneshot(request("POST", &format!("/api/views/{}/like", id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_oldest_view_is_evicted() {
        let state = test_state(2).await;
        let first = mount(&state).await;
        let first_view = state.view(&first).unwrap();
        mount(&state).await;
        mount(&state).await;

        assert_eq!(state.view_count(), 2);
        assert!(state.view(&first).is_err());
        assert!(first_view.is_torn_down());
    }

    #[tokio::test]
    async fn test_delete_view() {
        let state = test_state(4).await;
        let id = mount(&state).await;
        let view = state.view(&id).unwrap();

        let response = router(state.clone())
            .oneshot(request("DELETE", &format!("/api/views/{}", id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(view.is_torn_down());

        let response = router(state)
            .oneshot(request("GET", &format!("/api/views/{}", id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_shutdown_tears_down_views() {
        let state = test_state(4).await;
        let id = mount(&state).await;
        let view = state.view(&id).unwrap();
        state.shutdown();
        assert!(view.is_torn_down());
        assert_eq!(state.view_count(), 0);
    }
}
