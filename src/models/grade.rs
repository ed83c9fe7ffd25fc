//! Grade tags, grade votes and vote tallies.
//!
//! Climbs carry a colored grade tag covering a small V-grade range. Users
//! vote for the exact grade within that range and the most voted option is
//! shown as the consensus.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A user's opinion on a climb's grade. The document id is the user id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GradeVote {
    #[serde(rename = "userID")]
    pub user_id: String,

    #[serde(rename = "gradeVote")]
    pub grade_vote: String,
}

/// Tag labels (with ASCII and en-dash spellings) and their vote options.
/// Checked in order; the first tag contained in the climb's grade wins.
const TAG_OPTIONS: &[(&[&str], &[&str])] = &[
    (&["Pink Tag (V8+)"], &["V8", "V9", "V10+"]),
    (&["Purple Tag (V6–8)", "Purple Tag (V6-8)"], &["V6", "V7", "V8"]),
    (&["Green Tag (V4–6)", "Green Tag (V4-6)"], &["V4", "V5", "V6"]),
    (&["Yellow Tag (V2–4)", "Yellow Tag (V2-4)"], &["V2", "V3", "V4"]),
    (&["Red Tag (V0–V2)", "Red Tag (V0-2)"], &["V0", "V1", "V2"]),
    (&["Blue Tag (VB–V0)", "Blue Tag (VB-V0)"], &["VB", "V0"]),
    (
        &["White Tag (Ungraded)"],
        &["VB-0", "V0-V2", "V2-4", "V4-6", "V6-8", "V8+"],
    ),
];

const UNGRADED: &[&str] = &["Ungraded"];

/// Vote options allowed for a climb carrying `tag`.
pub fn grade_options_for_tag(tag: &str) -> &'static [&'static str] {
    TAG_OPTIONS
        .iter()
        .find(|(labels, _)| labels.iter().any(|label| tag.contains(label)))
        .map(|(_, options)| *options)
        .unwrap_or(UNGRADED)
}

/// Reject a vote that is not an option of the climb's tag.
pub fn validate_vote(tag: &str, vote: &str) -> Result<()> {
    if grade_options_for_tag(tag).iter().any(|option| *option == vote) {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "vote {vote} is invalid for grade tag {tag}"
        )))
    }
}

/// Vote counts per grade option.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GradeTally {
    /// Options in display order with their counts
    pub counts: Vec<(String, usize)>,

    /// Total number of votes counted
    pub total: usize,
}

impl GradeTally {
    /// Tally votes for a climb with the given tag.
    ///
    /// All allowed options are listed first (with zero counts); votes for
    /// unknown options are appended in order of first appearance.
    pub fn new(tag: &str, votes: &[GradeVote]) -> Self {
        let mut counts: Vec<(String, usize)> = grade_options_for_tag(tag)
            .iter()
            .map(|option| (option.to_string(), 0))
            .collect();

        for vote in votes {
            match counts.iter_mut().find(|(option, _)| *option == vote.grade_vote) {
                Some((_, count)) => *count += 1,
                None => counts.push((vote.grade_vote.clone(), 1)),
            }
        }

        Self {
            counts,
            total: votes.len(),
        }
    }

    /// Count for a single option.
    pub fn count(&self, option: &str) -> usize {
        self.counts
            .iter()
            .find(|(o, _)| o == option)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    /// The most voted option; ties go to the option listed first.
    pub fn consensus(&self) -> Option<(&str, usize)> {
        self.counts
            .iter()
            .filter(|(_, count)| *count > 0)
            .fold(None, |best: Option<(&str, usize)>, (option, count)| match best {
                Some((_, best_count)) if best_count >= *count => best,
                _ => Some((option.as_str(), *count)),
            })
    }
}
