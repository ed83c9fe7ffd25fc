//! Ascent logging.
//!
//! A user has at most one log per climb, stored at
//! `climbs/{climbId}/logs/{userId}`. Logging again merges into it.

use std::ops::RangeInclusive;
use std::sync::Arc;

use chrono::Utc;
use log::info;

use crate::error::{AppError, Result};
use crate::feed::ChangeEvent;
use crate::models::ClimbLog;
use crate::services::climbs::load_climb;
use crate::storage::{DocumentStore, LogPath, merge_fields, to_fields};

/// Ratings accepted from users.
pub const RATING_RANGE: RangeInclusive<i64> = 1..=5;

/// Records ascents.
pub struct LogService {
    store: Arc<dyn DocumentStore>,
}

impl LogService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Write `user_id`'s log of a climb.
    ///
    /// The climb must exist. The log is stamped with the current time and
    /// the climb's grade. Returns the change event for the write so it can
    /// be handed to the aggregator or a feed.
    pub async fn log_ascent(
        &self,
        climb_id: &str,
        user_id: &str,
        email: &str,
        rating: i64,
        comment: &str,
    ) -> Result<ChangeEvent> {
        if !RATING_RANGE.contains(&rating) {
            return Err(AppError::validation(format!(
                "rating {} is outside {}..={}",
                rating,
                RATING_RANGE.start(),
                RATING_RANGE.end()
            )));
        }

        let path = LogPath::new(climb_id, user_id)?;
        let climb = load_climb(self.store.as_ref(), climb_id).await?;

        let log = ClimbLog {
            user_id: user_id.to_string(),
            email: email.to_string(),
            comment: comment.to_string(),
            rating,
            timestamp: Utc::now(),
            grade: Some(climb.grade),
        };
        let fields = to_fields(&log)?;

        let doc_path = path.doc_path();
        let event = match self.store.get(&doc_path).await? {
            Some(existing) => {
                let before = existing.data;
                let mut after = before.clone();
                merge_fields(&mut after, fields);
                self.store.set(&doc_path, after.clone()).await?;
                ChangeEvent::updated(path, before, after)
            }
            None => {
                self.store.set(&doc_path, fields.clone()).await?;
                ChangeEvent::created(path, fields)
            }
        };

        info!(
            "Logged ascent of {} by {} (rating {})",
            climb_id, user_id, rating
        );
        Ok(event)
    }
}
