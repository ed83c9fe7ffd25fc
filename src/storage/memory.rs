//! In-memory document store.
//!
//! Keeps every document in a single ordered map. Useful for embedding the
//! aggregator in tests or short-lived processes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::storage::{CollectionPath, DocPath, Document, DocumentStore, Fields, merge_fields};

/// In-memory storage backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<BTreeMap<DocPath, Fields>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents across all collections.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<DocPath, Fields>> {
        self.docs.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<DocPath, Fields>> {
        self.docs.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>> {
        Ok(self
            .read()
            .get(path)
            .map(|data| Document::new(path.id(), data.clone())))
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>> {
        Ok(self
            .read()
            .iter()
            .filter(|(path, _)| &path.parent() == collection)
            .map(|(path, data)| Document::new(path.id(), data.clone()))
            .collect())
    }

    async fn list_ids(&self, collection: &CollectionPath) -> Result<Vec<String>> {
        let prefix = collection.segments();
        let ids: BTreeSet<String> = self
            .read()
            .keys()
            .filter(|path| path.segments().len() > prefix.len())
            .filter(|path| path.segments().starts_with(prefix))
            .map(|path| path.segments()[prefix.len()].clone())
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn set(&self, path: &DocPath, data: Fields) -> Result<()> {
        self.write().insert(path.clone(), data);
        Ok(())
    }

    async fn update(&self, path: &DocPath, fields: Fields) -> Result<()> {
        let mut docs = self.write();
        let existing = docs
            .get_mut(path)
            .ok_or_else(|| AppError::NotFound(path.to_string()))?;
        merge_fields(existing, fields);
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> Result<bool> {
        Ok(self.write().remove(path).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_list_only_direct_children() {
        let store = MemoryStore::new();
        let climb = DocPath::climb("c1").unwrap();
        let log = CollectionPath::climb_logs("c1").unwrap().doc("u1").unwrap();

        store.set(&climb, fields(json!({"name": "A"}))).await.unwrap();
        store.set(&log, fields(json!({"rating": 4}))).await.unwrap();

        let climbs = store.list(&CollectionPath::climbs()).await.unwrap();
        assert_eq!(climbs.len(), 1);
        assert_eq!(climbs[0].id, "c1");

        let logs = store
            .list(&CollectionPath::climb_logs("c1").unwrap())
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].data["rating"], 4);
    }

    #[tokio::test]
    async fn test_list_ids_includes_orphans() {
        let store = MemoryStore::new();
        store
            .set(&DocPath::climb("c1").unwrap(), Fields::new())
            .await
            .unwrap();
        store
            .set(
                &CollectionPath::climb_logs("gone").unwrap().doc("u1").unwrap(),
                Fields::new(),
            )
            .await
            .unwrap();

        let ids = store.list_ids(&CollectionPath::climbs()).await.unwrap();
        assert_eq!(ids, vec!["c1".to_string(), "gone".to_string()]);
    }

    #[tokio::test]
    async fn test_update_missing_document() {
        let store = MemoryStore::new();
        let err = store
            .update(&DocPath::climb("nope").unwrap(), Fields::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(path) if path == "climbs/nope"));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        let path = DocPath::climb("c1").unwrap();
        store.set(&path, Fields::new()).await.unwrap();

        assert!(store.delete(&path).await.unwrap());
        assert!(!store.delete(&path).await.unwrap());
        assert!(store.is_empty());
    }
}
