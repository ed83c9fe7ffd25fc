//! Climb and ascent log documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::storage::{Document, Fields};

/// A route or boulder problem on the gym map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Climb {
    /// Document id, filled from the storage path
    #[serde(skip)]
    pub id: String,

    pub name: String,

    /// Grade tag label (e.g. "Green Tag (V4-6)")
    pub grade: String,

    /// Display color name
    #[serde(default)]
    pub color: String,

    /// Map coordinates
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,

    #[serde(rename = "gymID", default)]
    pub gym_id: String,

    /// Last editor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,

    #[serde(default)]
    pub ascent_count: u64,

    #[serde(default)]
    pub avg_rating: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

impl Climb {
    pub fn from_document(doc: &Document) -> Result<Self> {
        let mut climb: Climb = doc.decode()?;
        climb.id = doc.id.clone();
        Ok(climb)
    }

    /// Current stat projection stored on the climb.
    pub fn stats(&self) -> ClimbStats {
        ClimbStats {
            ascent_count: self.ascent_count,
            avg_rating: self.avg_rating,
        }
    }
}

/// One user's recorded ascent of a climb. The document id is the user id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClimbLog {
    #[serde(rename = "userID")]
    pub user_id: String,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub comment: String,

    /// 1 to 5 by client convention
    pub rating: i64,

    pub timestamp: DateTime<Utc>,

    /// Grade tag of the climb at logging time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
}

/// Derived aggregate of a climb's logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClimbStats {
    pub ascent_count: u64,
    pub avg_rating: f64,
}

impl ClimbStats {
    /// The partial update written onto the climb document.
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("ascentCount".into(), Value::from(self.ascent_count));
        fields.insert("avgRating".into(), Value::from(self.avg_rating));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_climb_from_document() {
        let doc = Document::new(
            "c1",
            json!({
                "name": "The Prow",
                "grade": "Purple Tag (V6-8)",
                "color": "purple",
                "x": 120.5,
                "y": 80.0,
                "gymID": "boneyard",
                "ascentCount": 3,
                "avgRating": 4.25
            })
            .as_object()
            .cloned()
            .unwrap(),
        );

        let climb = Climb::from_document(&doc).unwrap();
        assert_eq!(climb.id, "c1");
        assert_eq!(climb.gym_id, "boneyard");
        assert_eq!(climb.updated_by, None);
        assert_eq!(
            climb.stats(),
            ClimbStats {
                ascent_count: 3,
                avg_rating: 4.25
            }
        );
    }

    #[test]
    fn test_climb_stats_default_to_zero() {
        let doc = Document::new(
            "c2",
            json!({"name": "New", "grade": "White Tag (Ungraded)"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let climb = Climb::from_document(&doc).unwrap();
        assert_eq!(climb.stats(), ClimbStats::default());
    }

    #[test]
    fn test_stats_fields_are_exactly_two() {
        let fields = ClimbStats {
            ascent_count: 2,
            avg_rating: 4.0,
        }
        .to_fields();

        assert_eq!(fields.len(), 2);
        assert_eq!(fields["ascentCount"], 2);
        assert_eq!(fields["avgRating"], 4.0);
    }

    #[test]
    fn test_climb_log_roundtrip_names() {
        let log: ClimbLog = serde_json::from_value(json!({
            "userID": "u1",
            "email": "a@b.c",
            "comment": "sandbagged",
            "rating": 4,
            "timestamp": "2025-06-01T18:30:00Z"
        }))
        .unwrap();

        assert_eq!(log.user_id, "u1");
        let value = serde_json::to_value(&log).unwrap();
        assert_eq!(value["userID"], "u1");
        assert!(value.get("grade").is_none());
    }
}
