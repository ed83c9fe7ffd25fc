//! Change feed for log documents.
//!
//! Writes to `climbs/{climbId}/logs/{logId}` are delivered as [`ChangeEvent`]s
//! to registered [`LogObserver`]s. Events come from the serverless trigger,
//! from an event file, or from the [`PollingWatcher`] diffing the store.

mod diff;
mod watcher;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{AppError, Result};
use crate::models::FeedConfig;
use crate::storage::{Fields, LogPath};

pub use diff::{LogDiff, LogSnapshot, calculate_diff};
pub use watcher::PollingWatcher;

/// Kind of write a change event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// Wire form of a change event, before validation.
#[derive(Deserialize)]
struct RawChangeEvent {
    path: LogPath,
    #[serde(default)]
    before: Option<Fields>,
    #[serde(default)]
    after: Option<Fields>,
}

/// A single write to a log document.
///
/// At least one of `before` and `after` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawChangeEvent")]
pub struct ChangeEvent {
    path: LogPath,
    before: Option<Fields>,
    after: Option<Fields>,
}

impl TryFrom<RawChangeEvent> for ChangeEvent {
    type Error = AppError;

    fn try_from(raw: RawChangeEvent) -> Result<Self> {
        Self::new(raw.path, raw.before, raw.after)
    }
}

impl ChangeEvent {
    pub fn new(path: LogPath, before: Option<Fields>, after: Option<Fields>) -> Result<Self> {
        if before.is_none() && after.is_none() {
            return Err(AppError::validation(format!(
                "change event for {path} has neither before nor after state"
            )));
        }
        Ok(Self {
            path,
            before,
            after,
        })
    }

    pub fn created(path: LogPath, after: Fields) -> Self {
        Self {
            path,
            before: None,
            after: Some(after),
        }
    }

    pub fn updated(path: LogPath, before: Fields, after: Fields) -> Self {
        Self {
            path,
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn deleted(path: LogPath, before: Fields) -> Self {
        Self {
            path,
            before: Some(before),
            after: None,
        }
    }

    /// Parse an event from its JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn path(&self) -> &LogPath {
        &self.path
    }

    pub fn before(&self) -> Option<&Fields> {
        self.before.as_ref()
    }

    pub fn after(&self) -> Option<&Fields> {
        self.after.as_ref()
    }

    pub fn climb_id(&self) -> &str {
        self.path.climb_id()
    }

    pub fn kind(&self) -> ChangeKind {
        match (&self.before, &self.after) {
            (None, _) => ChangeKind::Create,
            (_, None) => ChangeKind::Delete,
            _ => ChangeKind::Update,
        }
    }
}

/// Reacts to writes of log documents.
#[async_trait]
pub trait LogObserver: Send + Sync {
    /// Called once per write to a log of `climb_id`.
    async fn on_log_write(&self, climb_id: &str, event: &ChangeEvent) -> Result<()>;
}

/// Result of delivering one event to every observer.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Observers that handled the event
    pub delivered: usize,

    /// Final error of each observer that gave up
    pub failures: Vec<AppError>,

    /// Redeliveries performed across all observers
    pub retries: u32,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Totals from draining an event channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedSummary {
    pub events: usize,
    pub failures: usize,
    pub retries: u32,
}

/// Fan-out of change events to observers, with redelivery on failure.
pub struct ChangeFeed {
    observers: Vec<Arc<dyn LogObserver>>,
    config: FeedConfig,
}

impl ChangeFeed {
    pub fn new(config: FeedConfig) -> Self {
        Self {
            observers: Vec::new(),
            config,
        }
    }

    /// Register an observer for all subsequent events.
    pub fn subscribe(&mut self, observer: Arc<dyn LogObserver>) {
        self.observers.push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Bounded channel sized from the feed configuration.
    pub fn channel(&self) -> (mpsc::Sender<ChangeEvent>, mpsc::Receiver<ChangeEvent>) {
        mpsc::channel(self.config.channel_capacity.max(1))
    }

    /// Deliver one event to every observer.
    pub async fn publish(&self, event: &ChangeEvent) -> DispatchReport {
        let mut report = DispatchReport::default();

        for observer in &self.observers {
            let (result, retries) = self.deliver(observer.as_ref(), event).await;
            report.retries += retries;
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => report.failures.push(e),
            }
        }

        report
    }

    async fn deliver(&self, observer: &dyn LogObserver, event: &ChangeEvent) -> (Result<()>, u32) {
        let delay = Duration::from_millis(self.config.retry_delay_ms);
        let mut retries = 0;

        loop {
            match observer.on_log_write(event.climb_id(), event).await {
                Ok(()) => return (Ok(()), retries),
                Err(e) if e.is_retryable() && retries < self.config.retry_attempts => {
                    retries += 1;
                    warn!(
                        "Dispatch of {} {} failed (attempt {}/{}): {}",
                        event.kind(),
                        event.path(),
                        retries,
                        self.config.retry_attempts + 1,
                        e
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => return (Err(e), retries),
            }
        }
    }

    /// Drain `receiver` until every sender is dropped.
    ///
    /// Up to `max_in_flight` events are dispatched at once.
    pub async fn run(&self, receiver: mpsc::Receiver<ChangeEvent>) -> FeedSummary {
        let events = stream::unfold(receiver, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        let reports = events
            .map(|event| async move {
                let report = self.publish(&event).await;
                (event, report)
            })
            .buffer_unordered(self.config.max_in_flight.max(1));
        futures::pin_mut!(reports);

        let mut summary = FeedSummary::default();
        while let Some((event, report)) = reports.next().await {
            summary.events += 1;
            summary.retries += report.retries;

            if report.is_success() {
                debug!("Dispatched {} {}", event.kind(), event.path());
                continue;
            }

            summary.failures += 1;
            for failure in &report.failures {
                error!(
                    "Dropping {} {} for climb {}: {}",
                    event.kind(),
                    event.path(),
                    event.climb_id(),
                    failure
                );
            }
        }

        info!(
            "Change feed closed: {} events, {} failed, {} retries",
            summary.events, summary.failures, summary.retries
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn path(climb: &str, log: &str) -> LogPath {
        LogPath::new(climb, log).unwrap()
    }

    fn quick_config() -> FeedConfig {
        FeedConfig {
            retry_attempts: 2,
            retry_delay_ms: 0,
            ..FeedConfig::default()
        }
    }

    /// Fails the first `fail_times` calls with the given error kind.
    struct FlakyObserver {
        calls: AtomicU32,
        fail_times: u32,
        retryable: bool,
    }

    impl FlakyObserver {
        fn new(fail_times: u32, retryable: bool) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_times,
                retryable,
            }
        }
    }

    #[async_trait]
    impl LogObserver for FlakyObserver {
        async fn on_log_write(&self, _climb_id: &str, _event: &ChangeEvent) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                if self.retryable {
                    return Err(AppError::s3("service unavailable"));
                }
                return Err(AppError::validation("bad event"));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LogObserver for Recorder {
        async fn on_log_write(&self, climb_id: &str, event: &ChangeEvent) -> Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{climb_id}:{}", event.kind()));
            Ok(())
        }
    }

    #[test]
    fn test_kind_classification() {
        let p = path("c1", "u1");
        let a = fields(json!({"rating": 4}));
        let b = fields(json!({"rating": 5}));

        assert_eq!(ChangeEvent::created(p.clone(), a.clone()).kind(), ChangeKind::Create);
        assert_eq!(
            ChangeEvent::updated(p.clone(), a.clone(), b).kind(),
            ChangeKind::Update
        );
        assert_eq!(ChangeEvent::deleted(p, a).kind(), ChangeKind::Delete);
    }

    #[test]
    fn test_event_without_state_rejected() {
        let err = ChangeEvent::new(path("c1", "u1"), None, None).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let json = r#"{"path": "climbs/c1/logs/u1", "before": null, "after": null}"#;
        assert!(ChangeEvent::from_json(json).is_err());
    }

    #[test]
    fn test_event_from_json() {
        let json = r#"{"path": "climbs/c1/logs/u1", "after": {"rating": 5}}"#;
        let event = ChangeEvent::from_json(json).unwrap();
        assert_eq!(event.climb_id(), "c1");
        assert_eq!(event.kind(), ChangeKind::Create);
        assert_eq!(event.after().unwrap()["rating"], 5);

        let bad_path = r#"{"path": "climbs/c1/videos/v1", "after": {}}"#;
        assert!(ChangeEvent::from_json(bad_path).is_err());
    }

    #[tokio::test]
    async fn test_publish_retries_transient_failures() {
        let observer = Arc::new(FlakyObserver::new(2, true));
        let mut feed = ChangeFeed::new(quick_config());
        feed.subscribe(observer.clone());

        let event = ChangeEvent::created(path("c1", "u1"), Fields::new());
        let report = feed.publish(&event).await;

        assert!(report.is_success());
        assert_eq!(report.retries, 2);
        assert_eq!(observer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_publish_gives_up_after_retry_budget() {
        let observer = Arc::new(FlakyObserver::new(10, true));
        let mut feed = ChangeFeed::new(quick_config());
        feed.subscribe(observer.clone());

        let event = ChangeEvent::created(path("c1", "u1"), Fields::new());
        let report = feed.publish(&event).await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(observer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_validation_errors_not_retried() {
        let observer = Arc::new(FlakyObserver::new(1, false));
        let mut feed = ChangeFeed::new(quick_config());
        feed.subscribe(observer.clone());

        let event = ChangeEvent::created(path("c1", "u1"), Fields::new());
        let report = feed.publish(&event).await;

        assert!(!report.is_success());
        assert_eq!(report.retries, 0);
        assert_eq!(observer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_drains_channel() {
        let recorder = Arc::new(Recorder::default());
        let mut feed = ChangeFeed::new(quick_config());
        feed.subscribe(recorder.clone());

        let (tx, rx) = feed.channel();
        tx.send(ChangeEvent::created(path("c1", "u1"), Fields::new()))
            .await
            .unwrap();
        tx.send(ChangeEvent::deleted(path("c2", "u1"), Fields::new()))
            .await
            .unwrap();
        drop(tx);

        let summary = feed.run(rx).await;
        assert_eq!(
            summary,
            FeedSummary {
                events: 2,
                failures: 0,
                retries: 0
            }
        );

        let mut seen = recorder.seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["c1:create", "c2:delete"]);
    }

    #[tokio::test]
    async fn test_run_counts_dropped_events_while_sender_is_live() {
        let observer = Arc::new(FlakyObserver::new(2, false));
        let mut feed = ChangeFeed::new(FeedConfig {
            max_in_flight: 1,
            ..quick_config()
        });
        feed.subscribe(observer.clone());

        let (tx, rx) = feed.channel();
        let producer = tokio::spawn(async move {
            for log in ["u1", "u2", "u3"] {
                tx.send(ChangeEvent::created(path("c1", log), Fields::new()))
                    .await
                    .unwrap();
                tokio::task::yield_now().await;
            }
        });

        let summary = feed.run(rx).await;
        producer.await.unwrap();

        assert_eq!(summary.events, 3);
        assert_eq!(summary.failures, 2);
        assert_eq!(summary.retries, 0);
        assert_eq!(observer.calls.load(Ordering::SeqCst), 3);
    }
}
