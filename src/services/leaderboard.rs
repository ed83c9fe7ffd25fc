//! Ascent leaderboard.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::storage::{CollectionPath, DocumentStore};

/// Climbs whose logs are read at once.
const CONCURRENCY_LIMIT: usize = 8;

/// One ranked user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: String,
    pub total_climbs: usize,
}

/// Ranks users by the number of climbs they have logged.
pub struct LeaderboardService {
    store: Arc<dyn DocumentStore>,
}

impl LeaderboardService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Count logs per user across every climb.
    ///
    /// Sorted by count (highest first), then user id. Logs without a
    /// `userID` are not ranked.
    pub async fn build(&self, limit: Option<usize>) -> Result<Vec<LeaderboardEntry>> {
        let climb_ids = self.store.list_ids(&CollectionPath::climbs()).await?;

        let per_climb: Vec<Vec<String>> = stream::iter(climb_ids)
            .map(|climb_id| async move {
                let logs = self
                    .store
                    .list(&CollectionPath::climb_logs(&climb_id)?)
                    .await?;
                Ok::<_, AppError>(
                    logs.iter()
                        .map(|log| {
                            log.get("userID")
                                .and_then(|v| v.as_str())
                                .unwrap_or_default()
                                .to_string()
                        })
                        .collect(),
                )
            })
            .buffer_unordered(CONCURRENCY_LIMIT)
            .try_collect()
            .await?;

        let mut counts: HashMap<String, usize> = HashMap::new();
        for user_id in per_climb.into_iter().flatten() {
            *counts.entry(user_id).or_default() += 1;
        }
        counts.remove("");

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|(a_id, a_count), (b_id, b_count)| {
            b_count.cmp(a_count).then_with(|| a_id.cmp(b_id))
        });

        Ok(ranked
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .enumerate()
            .map(|(i, (user_id, total_climbs))| LeaderboardEntry {
                rank: i + 1,
                user_id,
                total_climbs,
            })
            .collect())
    }
}
