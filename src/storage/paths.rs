//! Hierarchical document paths.
//!
//! A path is a `/`-separated list of segments. An even number of segments
//! names a document (`climbs/c1`), an odd number names a collection
//! (`climbs/c1/logs`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root collection holding climb documents.
pub const CLIMBS: &str = "climbs";
/// Per-climb collection of ascent logs.
pub const LOGS: &str = "logs";
/// Per-climb collection of grade votes.
pub const GRADE_VOTES: &str = "gradeVotes";
/// Per-climb collection of beta videos.
pub const VIDEOS: &str = "videos";
/// Per-video collection of comments.
pub const COMMENTS: &str = "comments";

fn check_segment(path: &str, segment: &str) -> Result<()> {
    if segment.trim().is_empty() {
        return Err(AppError::invalid_path(path, "empty segment"));
    }
    if segment == "." || segment == ".." {
        return Err(AppError::invalid_path(path, "relative segment"));
    }
    if segment.contains('/') || segment.contains('\\') {
        return Err(AppError::invalid_path(path, "separator in segment"));
    }
    Ok(())
}

fn split(path: &str) -> Result<Vec<String>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(AppError::invalid_path(path, "path is empty"));
    }
    trimmed
        .split('/')
        .map(|segment| check_segment(path, segment).map(|_| segment.to_string()))
        .collect()
}

/// Path to a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    segments: Vec<String>,
}

/// Path to a collection of documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath {
    segments: Vec<String>,
}

impl DocPath {
    pub fn parse(path: &str) -> Result<Self> {
        let segments = split(path)?;
        if segments.len() % 2 != 0 {
            return Err(AppError::invalid_path(
                path,
                "document paths need an even number of segments",
            ));
        }
        Ok(Self { segments })
    }

    /// `climbs/{climb_id}`
    pub fn climb(climb_id: &str) -> Result<Self> {
        CollectionPath::climbs().doc(climb_id)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Document id (last segment).
    pub fn id(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    /// Collection containing this document.
    pub fn parent(&self) -> CollectionPath {
        CollectionPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        }
    }

    /// Sub-collection nested under this document.
    pub fn collection(&self, name: &str) -> Result<CollectionPath> {
        check_segment(name, name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(CollectionPath { segments })
    }
}

impl CollectionPath {
    pub fn parse(path: &str) -> Result<Self> {
        let segments = split(path)?;
        if segments.len() % 2 != 1 {
            return Err(AppError::invalid_path(
                path,
                "collection paths need an odd number of segments",
            ));
        }
        Ok(Self { segments })
    }

    /// The root `climbs` collection.
    pub fn climbs() -> Self {
        Self {
            segments: vec![CLIMBS.to_string()],
        }
    }

    /// `climbs/{climb_id}/logs`
    pub fn climb_logs(climb_id: &str) -> Result<Self> {
        DocPath::climb(climb_id)?.collection(LOGS)
    }

    /// `climbs/{climb_id}/gradeVotes`
    pub fn climb_votes(climb_id: &str) -> Result<Self> {
        DocPath::climb(climb_id)?.collection(GRADE_VOTES)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Collection name (last segment).
    pub fn name(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    /// Document owning this collection, `None` for root collections.
    pub fn parent(&self) -> Option<DocPath> {
        if self.segments.len() == 1 {
            return None;
        }
        Some(DocPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Document with the given id inside this collection.
    pub fn doc(&self, id: &str) -> Result<DocPath> {
        check_segment(id, id)?;
        let mut segments = self.segments.clone();
        segments.push(id.to_string());
        Ok(DocPath { segments })
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl FromStr for DocPath {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl FromStr for CollectionPath {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Path of a log document: `climbs/{climb_id}/logs/{log_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogPath {
    climb_id: String,
    log_id: String,
}

impl LogPath {
    pub fn new(climb_id: &str, log_id: &str) -> Result<Self> {
        // Validates both ids as path segments.
        CollectionPath::climb_logs(climb_id)?.doc(log_id)?;
        Ok(Self {
            climb_id: climb_id.to_string(),
            log_id: log_id.to_string(),
        })
    }

    pub fn parse(path: &str) -> Result<Self> {
        let doc = DocPath::parse(path)?;
        match doc.segments() {
            [root, climb_id, logs, log_id] if root == CLIMBS && logs == LOGS => Ok(Self {
                climb_id: climb_id.clone(),
                log_id: log_id.clone(),
            }),
            _ => Err(AppError::invalid_path(
                path,
                "expected climbs/{climbId}/logs/{logId}",
            )),
        }
    }

    pub fn climb_id(&self) -> &str {
        &self.climb_id
    }

    pub fn log_id(&self) -> &str {
        &self.log_id
    }

    /// Path of the log document itself.
    pub fn doc_path(&self) -> DocPath {
        DocPath {
            segments: vec![
                CLIMBS.to_string(),
                self.climb_id.clone(),
                LOGS.to_string(),
                self.log_id.clone(),
            ],
        }
    }

    /// Path of the owning climb document.
    pub fn climb_path(&self) -> DocPath {
        DocPath {
            segments: vec![CLIMBS.to_string(), self.climb_id.clone()],
        }
    }
}

impl fmt::Display for LogPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", CLIMBS, self.climb_id, LOGS, self.log_id)
    }
}

impl TryFrom<String> for LogPath {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<LogPath> for String {
    fn from(path: LogPath) -> Self {
        path.to_string()
    }
}
