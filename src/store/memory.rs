use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::hub::WatchHub;
use super::{apply_field_updates, Document, DocumentPath, DocumentStore, Snapshot, Subscription};
use crate::error::{MoodboardError, Result};

/// Process-local document store. Contents vanish with the process.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, Document>>,
    hub: WatchHub,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_documents<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut HashMap<String, Document>) -> T,
    {
        let mut documents = self.documents.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut documents)
    }

    #[cfg(test)]
    pub fn subscriber_count(&self, path: &DocumentPath) -> usize {
        self.hub.subscriber_count(path)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>> {
        Ok(self.with_documents(|docs| docs.get(path.as_str()).cloned()))
    }

    async fn subscribe(&self, path: &DocumentPath) -> Result<Subscription> {
        // Read and register under the same lock so no write slips between.
        Ok(self.with_documents(|docs| {
            let current = docs.get(path.as_str()).cloned();
            let rx = self.hub.subscribe(path);
            Subscription::new(Snapshot::from_option(current), rx)
        }))
    }

    async fn create(&self, path: &DocumentPath, document: Document) -> Result<()> {
        self.with_documents(|docs| {
            docs.insert(path.as_str().to_string(), document.clone());
            self.hub.publish(path, Snapshot::Present(document));
        });
        Ok(())
    }

    async fn create_if_absent(&self, path: &DocumentPath, document: Document) -> Result<bool> {
        Ok(self.with_documents(|docs| {
            if docs.contains_key(path.as_str()) {
                return false;
            }
            docs.insert(path.as_str().to_string(), document.clone());
            self.hub.publish(path, Snapshot::Present(document));
            true
        }))
    }

    async fn update_fields(&self, path: &DocumentPath, fields: Document) -> Result<()> {
        self.with_documents(|docs| {
            let document = docs
                .get_mut(path.as_str())
                .ok_or_else(|| MoodboardError::DocumentMissing(path.to_string()))?;
            apply_field_updates(document, &fields)?;
            self.hub.publish(path, Snapshot::Present(document.clone()));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path() -> DocumentPath {
        DocumentPath::parse("content/main").unwrap()
    }

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryStore::new();
        assert!(store.get(&path()).await.unwrap().is_none());

        store.create(&path(), doc(json!({"bio": "hi"}))).await.unwrap();
        let stored = store.get(&path()).await.unwrap().unwrap();
        assert_eq!(stored["bio"], "hi");
    }

    #[tokio::test]
    async fn test_update_missing_document_fails() {
        let store = MemoryStore::new();
        let err = store
            .update_fields(&path(), doc(json!({"bio": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, MoodboardError::DocumentMissing(_)));
    }

    #[tokio::test]
    async fn test_subscriber_sees_initial_then_updates() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe(&path()).await.unwrap();
        assert_eq!(sub.next().await, Some(Snapshot::Missing));

        store.create(&path(), doc(json!({"likes": 1}))).await.unwrap();
        store
            .update_fields(&path(), doc(json!({"likes": 2})))
            .await
            .unwrap();

        assert_eq!(
            sub.next().await,
            Some(Snapshot::Present(doc(json!({"likes": 1}))))
        );
        assert_eq!(
            sub.next().await,
            Some(Snapshot::Present(doc(json!({"likes": 2}))))
        );
    }

    #[tokio::test]
    async fn test_create_if_absent_keeps_existing() {
        let store = MemoryStore::new();
        store.create(&path(), doc(json!({"likes": 3}))).await.unwrap();
        let mut sub = store.subscribe(&path()).await.unwrap();
        sub.next().await;

        let written = store
            .create_if_absent(&path(), doc(json!({"likes": 0})))
            .await
            .unwrap();
        assert!(!written);
        assert_eq!(store.get(&path()).await.unwrap().unwrap()["likes"], 3);
        assert!(sub.rx.try_recv().is_err());

        let other = DocumentPath::parse("content/other").unwrap();
        assert!(store.create_if_absent(&other, doc(json!({}))).await.unwrap());
    }

    #[tokio::test]
    async fn test_dropping_subscription_unsubscribes() {
        let store = MemoryStore::new();
        let sub = store.subscribe(&path()).await.unwrap();
        assert_eq!(store.subscriber_count(&path()), 1);
        drop(sub);
        assert_eq!(store.subscriber_count(&path()), 0);
    }
}
