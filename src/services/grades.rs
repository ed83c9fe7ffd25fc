//! Grade vote service.
//!
//! Votes are stored one per user at `climbs/{climbId}/gradeVotes/{userId}`,
//! so voting again replaces the earlier vote.

use std::sync::Arc;

use log::{info, warn};

use crate::error::Result;
use crate::models::{Climb, GradeTally, GradeVote, validate_vote};
use crate::services::climbs::load_climb;
use crate::storage::{CollectionPath, DocumentStore, to_fields};

/// Service for reading and casting grade votes.
pub struct GradeService {
    store: Arc<dyn DocumentStore>,
}

impl GradeService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Load a climb, failing if it does not exist.
    pub async fn climb(&self, climb_id: &str) -> Result<Climb> {
        load_climb(self.store.as_ref(), climb_id).await
    }

    /// Tally all votes on a climb against its grade tag.
    pub async fn tally(&self, climb_id: &str) -> Result<GradeTally> {
        let climb = self.climb(climb_id).await?;
        let docs = self
            .store
            .list(&CollectionPath::climb_votes(climb_id)?)
            .await?;

        let votes: Vec<GradeVote> = docs
            .iter()
            .filter_map(|doc| match doc.decode::<GradeVote>() {
                Ok(vote) => Some(vote),
                Err(e) => {
                    warn!(
                        "Skipping malformed grade vote {} on climb {}: {}",
                        doc.id, climb_id, e
                    );
                    None
                }
            })
            .collect();

        Ok(GradeTally::new(&climb.grade, &votes))
    }

    /// Record `user_id`'s vote, replacing any earlier one.
    pub async fn submit(&self, climb_id: &str, user_id: &str, vote: &str) -> Result<GradeVote> {
        let climb = self.climb(climb_id).await?;
        validate_vote(&climb.grade, vote)?;

        let grade_vote = GradeVote {
            user_id: user_id.to_string(),
            grade_vote: vote.to_string(),
        };
        let data = to_fields(&grade_vote)?;

        let path = CollectionPath::climb_votes(climb_id)?.doc(user_id)?;
        self.store.set(&path, data).await?;

        info!("Recorded grade vote {} by {} on climb {}", vote, user_id, climb_id);
        Ok(grade_vote)
    }
}
