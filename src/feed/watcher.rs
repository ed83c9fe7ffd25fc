//! Polling source of change events.
//!
//! For stores without native change notifications: every tick the watcher
//! snapshots all log collections and emits the diff against the previous
//! snapshot.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::models::FeedConfig;
use crate::storage::{CollectionPath, DocumentStore, LogPath};

use super::diff::{LogSnapshot, calculate_diff};
use super::ChangeEvent;

pub struct PollingWatcher {
    store: Arc<dyn DocumentStore>,
    interval: Duration,
    emit_initial: bool,
    previous: Option<LogSnapshot>,
}

impl PollingWatcher {
    pub fn new(store: Arc<dyn DocumentStore>, config: &FeedConfig) -> Self {
        Self {
            store,
            interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            emit_initial: false,
            previous: None,
        }
    }

    /// Emit a create for every log found by the first poll.
    pub fn emit_initial(mut self, emit: bool) -> Self {
        self.emit_initial = emit;
        self
    }

    /// Read every log of every climb, including climbs whose document is
    /// gone but whose logs remain.
    pub async fn snapshot(&self) -> Result<LogSnapshot> {
        let mut snapshot = LogSnapshot::new();

        for climb_id in self.store.list_ids(&CollectionPath::climbs()).await? {
            let logs = self
                .store
                .list(&CollectionPath::climb_logs(&climb_id)?)
                .await?;

            for log in logs {
                match LogPath::new(&climb_id, &log.id) {
                    Ok(path) => {
                        snapshot.insert(path, log.data);
                    }
                    Err(e) => warn!("Skipping log {} of climb {}: {}", log.id, climb_id, e),
                }
            }
        }

        Ok(snapshot)
    }

    /// Take a snapshot and return the events since the previous one.
    pub async fn poll_once(&mut self) -> Result<Vec<ChangeEvent>> {
        let current = self.snapshot().await?;

        let events = match self.previous.take() {
            Some(previous) => calculate_diff(&previous, &current).into_events(),
            None if self.emit_initial => calculate_diff(&LogSnapshot::new(), &current).into_events(),
            None => {
                info!("Watcher seeded with {} logs", current.len());
                Vec::new()
            }
        };

        self.previous = Some(current);
        Ok(events)
    }

    /// Poll until `shutdown` resolves or the receiving side is closed.
    pub async fn run<F>(mut self, sender: mpsc::Sender<ChangeEvent>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!("Watching climb logs every {:?}", self.interval);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Watcher stopping");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            let events = match self.poll_once().await {
                Ok(events) => events,
                Err(e) => {
                    warn!("Poll failed, retrying next tick: {}", e);
                    continue;
                }
            };

            if !events.is_empty() {
                debug!("Poll found {} changes", events.len());
            }
            for event in events {
                if sender.send(event).await.is_err() {
                    info!("Event receiver closed; watcher stopping");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::ChangeKind;
    use crate::storage::{DocPath, Fields, MemoryStore};
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    async fn put_log(store: &MemoryStore, climb: &str, log: &str, rating: i64) {
        let path = LogPath::new(climb, log).unwrap();
        store
            .set(&path.doc_path(), fields(json!({"rating": rating})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_first_poll_seeds_silently() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(&DocPath::climb("c1").unwrap(), fields(json!({"name": "A"})))
            .await
            .unwrap();
        put_log(&store, "c1", "u1", 4).await;

        let mut watcher = PollingWatcher::new(store.clone(), &FeedConfig::default());
        assert!(watcher.poll_once().await.unwrap().is_empty());
        assert!(watcher.poll_once().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_emit_initial() {
        let store = Arc::new(MemoryStore::new());
        put_log(&store, "c1", "u1", 4).await;

        let mut watcher =
            PollingWatcher::new(store.clone(), &FeedConfig::default()).emit_initial(true);
        let events = watcher.poll_once().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), ChangeKind::Create);
    }

    #[tokio::test]
    async fn test_detects_create_update_delete() {
        let store = Arc::new(MemoryStore::new());
        put_log(&store, "c1", "u1", 4).await;
        put_log(&store, "c1", "u2", 2).await;

        let mut watcher = PollingWatcher::new(store.clone(), &FeedConfig::default());
        watcher.poll_once().await.unwrap();

        put_log(&store, "c1", "u1", 5).await;
        store
            .delete(&LogPath::new("c1", "u2").unwrap().doc_path())
            .await
            .unwrap();
        put_log(&store, "c2", "u1", 3).await;

        let events = watcher.poll_once().await.unwrap();
        let seen: Vec<(String, ChangeKind)> = events
            .iter()
            .map(|e| (e.path().to_string(), e.kind()))
            .collect();
        assert_eq!(
            seen,
            vec![
                ("climbs/c1/logs/u1".to_string(), ChangeKind::Update),
                ("climbs/c1/logs/u2".to_string(), ChangeKind::Delete),
                ("climbs/c2/logs/u1".to_string(), ChangeKind::Create),
            ]
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        put_log(&store, "c1", "u1", 4).await;

        let config = FeedConfig {
            poll_interval_ms: 5,
            ..FeedConfig::default()
        };
        let watcher = PollingWatcher::new(store, &config).emit_initial(true);
        let (tx, mut rx) = mpsc::channel(8);

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(watcher.run(tx, async move {
            let _ = stop_rx.await;
        }));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.climb_id(), "c1");

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
