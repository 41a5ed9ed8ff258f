use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;

use super::{DocumentPath, Snapshot};

const CHANNEL_CAPACITY: usize = 16;

/// Per-path fan-out of document snapshots to live subscribers.
#[derive(Default)]
pub struct WatchHub {
    channels: Mutex<HashMap<String, broadcast::Sender<Snapshot>>>,
}

impl WatchHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a receiver for a path.
    pub fn subscribe(&self, path: &DocumentPath) -> broadcast::Receiver<Snapshot> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(path.as_str().to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Push a snapshot to everyone watching `path`. Channels with no
    /// remaining receivers are dropped.
    pub fn publish(&self, path: &DocumentPath, snapshot: Snapshot) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sender) = channels.get(path.as_str()) {
            match sender.send(snapshot) {
                Ok(n) => tracing::trace!("Snapshot for {} sent to {} receivers", path, n),
                Err(_) => {
                    tracing::trace!("No receivers left for {}", path);
                    channels.remove(path.as_str());
                }
            }
        }
    }

    #[cfg(test)]
    pub fn subscriber_count(&self, path: &DocumentPath) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path.as_str())
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let hub = WatchHub::new();
        let path = DocumentPath::parse("content/main").unwrap();
        hub.publish(&path, Snapshot::Missing);
        assert_eq!(hub.subscriber_count(&path), 0);
    }

    #[test]
    fn test_publish_reaches_subscriber() {
        let hub = WatchHub::new();
        let path = DocumentPath::parse("content/main").unwrap();
        let mut rx = hub.subscribe(&path);
        assert_eq!(hub.subscriber_count(&path), 1);

        hub.publish(&path, Snapshot::Missing);
        assert_eq!(rx.try_recv().unwrap(), Snapshot::Missing);
    }

    #[test]
    fn test_dropped_receivers_free_the_channel() {
        let hub = WatchHub::new();
        let path = DocumentPath::parse("content/main").unwrap();
        drop(hub.subscribe(&path));
        hub.publish(&path, Snapshot::Missing);
        assert_eq!(hub.subscriber_count(&path), 0);
    }
}
