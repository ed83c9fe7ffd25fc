//! Climb document management.
//!
//! Stats on a climb belong to the aggregator: creating a climb starts them
//! at zero and saving a climb never writes them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use log::{info, warn};

use crate::error::{AppError, Result};
use crate::models::Climb;
use crate::storage::{DocPath, DocumentStore, to_fields};

/// Editor recorded when none is given.
const UNKNOWN_EDITOR: &str = "Unknown";

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Load a climb, failing with `ClimbNotFound` if it does not exist.
pub(crate) async fn load_climb(store: &dyn DocumentStore, climb_id: &str) -> Result<Climb> {
    let doc = store
        .get(&DocPath::climb(climb_id)?)
        .await?
        .ok_or_else(|| AppError::ClimbNotFound {
            climb_id: climb_id.to_string(),
        })?;
    Climb::from_document(&doc)
}

/// Time-ordered id for a new climb.
fn new_climb_id() -> String {
    let n = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xffff;
    format!("{:012x}{:04x}", Utc::now().timestamp_millis(), n)
}

fn editor_name(editor: &str) -> String {
    match editor.trim() {
        "" => UNKNOWN_EDITOR.to_string(),
        name => name.to_string(),
    }
}

/// Creates, edits and removes climbs.
pub struct ClimbService {
    store: Arc<dyn DocumentStore>,
}

impl ClimbService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, climb_id: &str) -> Result<Climb> {
        load_climb(self.store.as_ref(), climb_id).await
    }

    /// Add a new climb edited by `editor`.
    ///
    /// An empty `climb.id` gets a generated one. An id that is already taken
    /// is rejected.
    pub async fn create(&self, mut climb: Climb, editor: &str) -> Result<Climb> {
        if climb.id.is_empty() {
            climb.id = new_climb_id();
        }
        let path = DocPath::climb(&climb.id)?;
        if self.store.get(&path).await?.is_some() {
            return Err(AppError::validation(format!(
                "climb {} already exists",
                climb.id
            )));
        }

        climb.updated_by = Some(editor_name(editor));
        climb.ascent_count = 0;
        climb.avg_rating = 0.0;
        self.store.set(&path, to_fields(&climb)?).await?;

        info!("Created climb {} ({}) by {}", climb.id, climb.name, editor_name(editor));
        Ok(climb)
    }

    /// Merge `climb`'s editable fields into its document.
    ///
    /// `ascentCount` and `avgRating` are left as stored. A missing document
    /// is created.
    pub async fn save(&self, climb: &Climb, editor: &str) -> Result<()> {
        if climb.id.is_empty() {
            return Err(AppError::validation("cannot save a climb without an id"));
        }
        let path = DocPath::climb(&climb.id)?;

        let mut fields = to_fields(&Climb {
            updated_by: Some(editor_name(editor)),
            ..climb.clone()
        })?;
        fields.remove("ascentCount");
        fields.remove("avgRating");

        match self.store.update(&path, fields.clone()).await {
            Err(AppError::NotFound(_)) => self.store.set(&path, fields).await?,
            other => other?,
        }

        info!("Saved climb {} by {}", climb.id, editor_name(editor));
        Ok(())
    }

    /// Delete a climb document. Its logs, votes and videos are kept.
    pub async fn delete(&self, climb_id: &str) -> Result<bool> {
        let deleted = self.store.delete(&DocPath::climb(climb_id)?).await?;
        if deleted {
            info!("Deleted climb {}", climb_id);
        } else {
            warn!("Climb {} was already gone", climb_id);
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LogPath, MemoryStore};
    use serde_json::json;

    fn climb(name: &str) -> Climb {
        serde_json::from_value(json!({"name": name, "grade": "Blue Tag (V0-2)"})).unwrap()
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_zero_stats() {
        let store = Arc::new(MemoryStore::new());
        let service = ClimbService::new(store.clone());

        let mut input = climb("Jug Haul");
        input.ascent_count = 12;
        input.avg_rating = 4.5;
        let created = service.create(input, "  ").await.unwrap();

        assert!(!created.id.is_empty());
        assert_eq!(created.updated_by.as_deref(), Some("Unknown"));

        let stored = service.get(&created.id).await.unwrap();
        assert_eq!(stored.name, "Jug Haul");
        assert_eq!(stored.ascent_count, 0);
        assert_eq!(stored.avg_rating, 0.0);

        let second = service.create(climb("Crimp Line"), "setter").await.unwrap();
        assert_ne!(second.id, created.id);
    }

    #[tokio::test]
    async fn test_create_rejects_taken_id() {
        let store = Arc::new(MemoryStore::new());
        let service = ClimbService::new(store);

        let mut input = climb("Roof");
        input.id = "c1".into();
        service.create(input.clone(), "setter").await.unwrap();

        let err = service.create(input, "setter").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_save_keeps_stored_stats() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                &DocPath::climb("c1").unwrap(),
                json!({"name": "Old", "grade": "Blue Tag (V0-2)", "ascentCount": 4, "avgRating": 3.5})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .await
            .unwrap();
        let service = ClimbService::new(store);

        let mut edited = service.get("c1").await.unwrap();
        edited.name = "Renamed".into();
        edited.ascent_count = 0;
        edited.avg_rating = 0.0;
        service.save(&edited, "alex@gym.test").await.unwrap();

        let stored = service.get("c1").await.unwrap();
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.updated_by.as_deref(), Some("alex@gym.test"));
        assert_eq!(stored.ascent_count, 4);
        assert_eq!(stored.avg_rating, 3.5);
    }

    #[tokio::test]
    async fn test_save_requires_id_and_creates_missing() {
        let store = Arc::new(MemoryStore::new());
        let service = ClimbService::new(store);

        let err = service.save(&climb("No Id"), "setter").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let mut fresh = climb("Fresh");
        fresh.id = "c9".into();
        service.save(&fresh, "setter").await.unwrap();
        assert_eq!(service.get("c9").await.unwrap().name, "Fresh");
    }

    #[tokio::test]
    async fn test_delete_keeps_logs() {
        let store = Arc::new(MemoryStore::new());
        let service = ClimbService::new(store.clone());
        let mut input = climb("Gone Soon");
        input.id = "c1".into();
        service.create(input, "setter").await.unwrap();

        let log = LogPath::new("c1", "u1").unwrap().doc_path();
        store
            .set(&log, json!({"rating": 4}).as_object().cloned().unwrap())
            .await
            .unwrap();

        assert!(service.delete("c1").await.unwrap());
        assert!(!service.delete("c1").await.unwrap());
        assert!(matches!(
            service.get("c1").await.unwrap_err(),
            AppError::ClimbNotFound { .. }
        ));
        assert!(store.get(&log).await.unwrap().is_some());
    }
}
