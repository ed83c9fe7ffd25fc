//! Climb stat aggregation.
//!
//! Keeps `ascentCount` and `avgRating` on `climbs/{climbId}` in line with the
//! documents under `climbs/{climbId}/logs`. Every pass recomputes from the
//! full log set, so running it again on an unchanged set is a no-op.
//!
//! A log counts only when its `rating` field is a JSON number. Missing or
//! non-numeric ratings are excluded from both the sum and the count; a
//! rating of `0` is counted.

mod locks;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::feed::{ChangeEvent, LogObserver};
use crate::models::{AggregatorConfig, ClimbStats, OrphanPolicy};
use crate::storage::{CollectionPath, DocPath, Document, DocumentStore};

pub use locks::{ClimbGuard, ClimbLocks};

/// Numeric rating of a log document, if any.
pub fn rating_of(log: &Document) -> Option<f64> {
    log.get("rating").and_then(Value::as_f64)
}

/// Aggregate a set of log documents.
pub fn compute_stats<'a>(logs: impl IntoIterator<Item = &'a Document>) -> ClimbStats {
    let (sum, count) = logs
        .into_iter()
        .filter_map(rating_of)
        .fold((0.0_f64, 0_u64), |(sum, count), rating| (sum + rating, count + 1));

    ClimbStats {
        ascent_count: count,
        avg_rating: if count > 0 { sum / count as f64 } else { 0.0 },
    }
}

/// What a handled log write resulted in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum AggregateOutcome {
    /// Stats were recomputed and written
    #[serde(rename_all = "camelCase")]
    Updated { climb_id: String, stats: ClimbStats },

    /// The climb no longer exists; nothing was written
    #[serde(rename_all = "camelCase")]
    Orphaned { climb_id: String },

    /// The climb no longer exists and the triggering log was deleted
    #[serde(rename_all = "camelCase")]
    Purged { climb_id: String, log_id: String },
}

impl AggregateOutcome {
    pub fn climb_id(&self) -> &str {
        match self {
            Self::Updated { climb_id, .. }
            | Self::Orphaned { climb_id }
            | Self::Purged { climb_id, .. } => climb_id,
        }
    }

    pub fn stats(&self) -> Option<ClimbStats> {
        match self {
            Self::Updated { stats, .. } => Some(*stats),
            _ => None,
        }
    }

    /// Short label for logs and responses.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Updated { .. } => "updated",
            Self::Orphaned { .. } => "orphaned",
            Self::Purged { .. } => "purged",
        }
    }
}

/// Summary of a full recomputation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillSummary {
    pub climbs: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Recomputes climb stats from their logs.
pub struct StatAggregator {
    store: Arc<dyn DocumentStore>,
    config: AggregatorConfig,
    locks: ClimbLocks,
}

impl StatAggregator {
    pub fn new(store: Arc<dyn DocumentStore>, config: AggregatorConfig) -> Self {
        Self {
            store,
            config,
            locks: ClimbLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Read the logs of `climb_id`, aggregate them and persist the stats.
    ///
    /// Fails with `ClimbNotFound` if the climb document is gone.
    pub async fn recompute(&self, climb_id: &str) -> Result<ClimbStats> {
        let _guard = if self.config.serialize_per_climb {
            Some(self.locks.lock(climb_id).await)
        } else {
            None
        };

        let logs_path = CollectionPath::climb_logs(climb_id)?;
        let logs = self.store.list(&logs_path).await.inspect_err(|e| {
            error!("Failed to fetch logs for climb {}: {}", climb_id, e);
        })?;

        let stats = compute_stats(&logs);
        debug!(
            "Climb {}: {} logs, {} rated",
            climb_id,
            logs.len(),
            stats.ascent_count
        );

        let climb_path = DocPath::climb(climb_id)?;
        match self.store.update(&climb_path, stats.to_fields()).await {
            Ok(()) => {}
            Err(AppError::NotFound(_)) => {
                return Err(AppError::ClimbNotFound {
                    climb_id: climb_id.to_string(),
                });
            }
            Err(e) => {
                error!("Failed to update climb stats for {}: {}", climb_id, e);
                return Err(e);
            }
        }

        info!(
            "Updated climb {}: ascents={}, avg={:.2}",
            climb_id, stats.ascent_count, stats.avg_rating
        );
        Ok(stats)
    }

    /// React to a single log write.
    pub async fn handle(&self, event: &ChangeEvent) -> Result<AggregateOutcome> {
        let climb_id = event.climb_id();
        debug!("Handling {} of {}", event.kind(), event.path());

        match self.recompute(climb_id).await {
            Ok(stats) => Ok(AggregateOutcome::Updated {
                climb_id: climb_id.to_string(),
                stats,
            }),
            Err(AppError::ClimbNotFound { .. }) => self.handle_orphan(event).await,
            Err(e) => Err(e),
        }
    }

    async fn handle_orphan(&self, event: &ChangeEvent) -> Result<AggregateOutcome> {
        let climb_id = event.climb_id().to_string();

        match self.config.orphan_policy {
            OrphanPolicy::Ignore => {
                warn!(
                    "Failed to update climb stats: climb {} not found (write to {} ignored)",
                    climb_id,
                    event.path()
                );
                Ok(AggregateOutcome::Orphaned { climb_id })
            }
            OrphanPolicy::Fail => {
                error!(
                    "Failed to update climb stats: climb {} not found (write to {})",
                    climb_id,
                    event.path()
                );
                Err(AppError::ClimbNotFound { climb_id })
            }
            OrphanPolicy::Purge => {
                let existed = self.store.delete(&event.path().doc_path()).await?;
                warn!(
                    "Climb {} not found; purged orphaned log {} (existed: {})",
                    climb_id,
                    event.path(),
                    existed
                );
                Ok(AggregateOutcome::Purged {
                    climb_id,
                    log_id: event.path().log_id().to_string(),
                })
            }
        }
    }

    /// Recompute every existing climb, `concurrency` climbs at a time.
    pub async fn backfill(&self, concurrency: usize) -> Result<BackfillSummary> {
        let climbs = self.store.list(&CollectionPath::climbs()).await?;
        let mut summary = BackfillSummary {
            climbs: climbs.len(),
            ..BackfillSummary::default()
        };

        let mut results = stream::iter(climbs)
            .map(|climb| async move {
                let result = self.recompute(&climb.id).await;
                (climb.id, result)
            })
            .buffer_unordered(concurrency.max(1));

        while let Some((climb_id, result)) = results.next().await {
            match result {
                Ok(_) => summary.updated += 1,
                Err(e) => {
                    warn!("Backfill failed for climb {}: {}", climb_id, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Backfill complete: {} climbs, {} updated, {} failed",
            summary.climbs, summary.updated, summary.failed
        );
        Ok(summary)
    }
}

#[async_trait]
impl LogObserver for StatAggregator {
    async fn on_log_write(&self, climb_id: &str, event: &ChangeEvent) -> Result<()> {
        if climb_id != event.climb_id() {
            return Err(AppError::validation(format!(
                "event {} does not belong to climb {}",
                event.path(),
                climb_id
            )));
        }
        self.handle(event).await.map(|_| ())
    }
}
