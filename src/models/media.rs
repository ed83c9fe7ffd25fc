//! Beta video and comment documents.
//!
//! Videos live at `climbs/{climbId}/videos/{videoId}` and their comments at
//! `.../videos/{videoId}/comments/{commentId}`. Blobs themselves are in
//! object storage; only the URL is kept here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for an uploaded beta video.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoData {
    pub url: String,

    #[serde(rename = "uploaderID")]
    pub uploader_id: String,

    #[serde(rename = "uploaderEmail", default)]
    pub uploader_email: String,

    /// User ids that liked the video
    #[serde(default)]
    pub likes: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,

    #[serde(rename = "gymID", default, skip_serializing_if = "Option::is_none")]
    pub gym_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl VideoData {
    /// Add or remove `user_id` from the likes. Returns whether it is now liked.
    pub fn toggle_like(&mut self, user_id: &str) -> bool {
        if let Some(pos) = self.likes.iter().position(|id| id == user_id) {
            self.likes.remove(pos);
            false
        } else {
            self.likes.push(user_id.to_string());
            true
        }
    }
}

/// A comment on a video.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    #[serde(rename = "userID")]
    pub user_id: String,

    pub text: String,

    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_toggle_like() {
        let mut video: VideoData = serde_json::from_value(json!({
            "url": "https://cdn.example.com/v/1.mp4",
            "uploaderID": "u1"
        }))
        .unwrap();

        assert!(video.toggle_like("u2"));
        assert_eq!(video.likes, vec!["u2".to_string()]);
        assert!(!video.toggle_like("u2"));
        assert!(video.likes.is_empty());
    }
}
