//! Beta video likes.

use std::sync::Arc;

use log::info;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::VideoData;
use crate::storage::{DocPath, DocumentStore, Fields, paths};

pub struct VideoService {
    store: Arc<dyn DocumentStore>,
}

impl VideoService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn video_path(climb_id: &str, video_id: &str) -> Result<DocPath> {
        DocPath::climb(climb_id)?
            .collection(paths::VIDEOS)?
            .doc(video_id)
    }

    /// Like or unlike a video for `user_id`. Returns whether it is now liked.
    ///
    /// Only the `likes` field is written.
    pub async fn toggle_like(&self, climb_id: &str, video_id: &str, user_id: &str) -> Result<bool> {
        if user_id.trim().is_empty() {
            return Err(AppError::validation("user id is empty"));
        }

        let path = Self::video_path(climb_id, video_id)?;
        let doc = self
            .store
            .get(&path)
            .await?
            .ok_or_else(|| AppError::NotFound(path.to_string()))?;
        let mut video: VideoData = doc.decode()?;

        let liked = video.toggle_like(user_id);
        let mut fields = Fields::new();
        fields.insert("likes".into(), Value::from(video.likes));
        self.store.update(&path, fields).await?;

        info!(
            "{} {} video {} on climb {}",
            user_id,
            if liked { "liked" } else { "unliked" },
            video_id,
            climb_id
        );
        Ok(liked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    async fn setup() -> (Arc<MemoryStore>, VideoService, DocPath) {
        let store = Arc::new(MemoryStore::new());
        let path = VideoService::video_path("c1", "v1").unwrap();
        store
            .set(
                &path,
                json!({
                    "url": "https://cdn.example.com/v/1.mp4",
                    "uploaderID": "u1",
                    "likes": ["u3"],
                    "section": "cave"
                })
                .as_object()
                .cloned()
                .unwrap(),
            )
            .await
            .unwrap();
        let service = VideoService::new(store.clone());
        (store, service, path)
    }

    #[tokio::test]
    async fn test_toggle_like_persists() {
        let (store, service, path) = setup().await;

        assert!(service.toggle_like("c1", "v1", "u2").await.unwrap());
        let doc = store.get(&path).await.unwrap().unwrap();
        assert_eq!(doc.data["likes"], json!(["u3", "u2"]));
        assert_eq!(doc.data["section"], "cave");

        assert!(!service.toggle_like("c1", "v1", "u2").await.unwrap());
        let doc = store.get(&path).await.unwrap().unwrap();
        assert_eq!(doc.data["likes"], json!(["u3"]));
    }

    #[tokio::test]
    async fn test_missing_video() {
        let (_store, service, _path) = setup().await;
        let err = service.toggle_like("c1", "v404", "u2").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = service.toggle_like("c1", "v1", " ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
