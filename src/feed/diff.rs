//! Snapshot diffs of log collections.
//!
//! Compares two snapshots of log documents and turns the difference into
//! change events: new paths are creates, vanished paths are deletes and
//! paths whose fields changed are updates.

use std::collections::HashMap;

use crate::storage::{Fields, LogPath};

use super::ChangeEvent;

/// All known log documents, keyed by path.
pub type LogSnapshot = HashMap<LogPath, Fields>;

/// Difference between two snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogDiff {
    /// Present now, absent before
    pub created: Vec<(LogPath, Fields)>,
    /// Present in both with different fields: (path, before, after)
    pub updated: Vec<(LogPath, Fields, Fields)>,
    /// Present before, absent now
    pub deleted: Vec<(LogPath, Fields)>,
}

impl LogDiff {
    /// Check if there are any changes.
    pub fn has_changes(&self) -> bool {
        !self.created.is_empty() || !self.updated.is_empty() || !self.deleted.is_empty()
    }

    /// Get the total number of changes.
    pub fn change_count(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    /// Convert into change events, ordered by path.
    pub fn into_events(self) -> Vec<ChangeEvent> {
        let mut events: Vec<ChangeEvent> = self
            .created
            .into_iter()
            .map(|(path, after)| ChangeEvent::created(path, after))
            .chain(
                self.updated
                    .into_iter()
                    .map(|(path, before, after)| ChangeEvent::updated(path, before, after)),
            )
            .chain(
                self.deleted
                    .into_iter()
                    .map(|(path, before)| ChangeEvent::deleted(path, before)),
            )
            .collect();

        events.sort_by(|a, b| a.path().to_string().cmp(&b.path().to_string()));
        events
    }
}

/// Calculate the diff between previous and current snapshots.
pub fn calculate_diff(previous: &LogSnapshot, current: &LogSnapshot) -> LogDiff {
    let mut diff = LogDiff::default();

    for (path, after) in current {
        match previous.get(path) {
            None => diff.created.push((path.clone(), after.clone())),
            Some(before) if before != after => {
                diff.updated
                    .push((path.clone(), before.clone(), after.clone()));
            }
            Some(_) => {}
        }
    }

    for (path, before) in previous {
        if !current.contains_key(path) {
            diff.deleted.push((path.clone(), before.clone()));
        }
    }

    diff
}
