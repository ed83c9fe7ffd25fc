//! Local filesystem storage implementation.
//!
//! Every document is a JSON file and every collection is a directory, so a
//! storage root can be inspected and edited by hand during development.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── config.toml           # Aggregator configuration
//! └── climbs/
//!     ├── {climbId}.json    # Climb document
//!     └── {climbId}/
//!         ├── logs/
//!         │   └── {userId}.json
//!         └── gradeVotes/
//!             └── {userId}.json
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::{CollectionPath, DocPath, Document, DocumentStore, Fields, merge_fields};

const EXTENSION: &str = "json";

/// Suffix counter for temp files, unique within the process.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root_dir: PathBuf,
}

impl LocalStore {
    /// Create a new LocalStore rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Directory backing a collection.
    fn collection_dir(&self, collection: &CollectionPath) -> PathBuf {
        let mut dir = self.root_dir.clone();
        dir.extend(collection.segments());
        dir
    }

    /// File backing a document.
    fn doc_file(&self, path: &DocPath) -> PathBuf {
        self.collection_dir(&path.parent())
            .join(format!("{}.{}", path.id(), EXTENSION))
    }

    /// Temp file next to `path`. Each writer gets its own file.
    fn tmp_file(path: &Path) -> PathBuf {
        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{}.{}.tmp", std::process::id(), n));
        path.with_file_name(name)
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = Self::tmp_file(path);
        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            drop(file);
            tokio::fs::rename(&tmp, path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AppError::Io(e));
        }
        Ok(())
    }

    /// Read a document file, returning None if it doesn't exist.
    async fn read_fields(&self, path: &Path) -> Result<Option<Fields>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn write_fields(&self, path: &Path, data: &Fields) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(data)?;
        self.write_bytes(path, &bytes).await
    }

    /// Directory entries of a collection, empty if the directory is missing.
    async fn entries(&self, collection: &CollectionPath) -> Result<Vec<(String, bool)>> {
        let dir = self.collection_dir(collection);
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let is_dir = entry.file_type().await?.is_dir();
            if let Some(name) = entry.file_name().to_str() {
                entries.push((name.to_string(), is_dir));
            }
        }
        Ok(entries)
    }

    fn document_id(file_name: &str) -> Option<&str> {
        file_name
            .strip_suffix(EXTENSION)
            .and_then(|stem| stem.strip_suffix('.'))
            .filter(|id| !id.is_empty())
    }
}

#[async_trait]
impl DocumentStore for LocalStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>> {
        Ok(self
            .read_fields(&self.doc_file(path))
            .await?
            .map(|data| Document::new(path.id(), data)))
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>> {
        let mut ids: Vec<String> = self
            .entries(collection)
            .await?
            .into_iter()
            .filter(|(_, is_dir)| !is_dir)
            .filter_map(|(name, _)| Self::document_id(&name).map(str::to_string))
            .collect();
        ids.sort();

        let mut documents = Vec::with_capacity(ids.len());
        for id in ids {
            let path = collection.doc(&id)?;
            // A concurrent delete between listing and reading is not an error.
            if let Some(data) = self.read_fields(&self.doc_file(&path)).await? {
                documents.push(Document::new(id, data));
            }
        }
        Ok(documents)
    }

    async fn list_ids(&self, collection: &CollectionPath) -> Result<Vec<String>> {
        let ids: BTreeSet<String> = self
            .entries(collection)
            .await?
            .into_iter()
            .filter_map(|(name, is_dir)| {
                if is_dir {
                    Some(name)
                } else {
                    Self::document_id(&name).map(str::to_string)
                }
            })
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn set(&self, path: &DocPath, data: Fields) -> Result<()> {
        self.write_fields(&self.doc_file(path), &data).await
    }

    async fn update(&self, path: &DocPath, fields: Fields) -> Result<()> {
        let file = self.doc_file(path);
        let mut existing = self
            .read_fields(&file)
            .await?
            .ok_or_else(|| AppError::NotFound(path.to_string()))?;

        merge_fields(&mut existing, fields);
        self.write_fields(&file, &existing).await
    }

    async fn delete(&self, path: &DocPath) -> Result<bool> {
        match tokio::fs::remove_file(self.doc_file(path)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}
