//! Storage abstractions for the hierarchical document store.
//!
//! Climbs and everything nested under them live in collections of JSON
//! documents:
//!
//! ```text
//! climbs/
//! ├── {climbId}                 # Climb: name, grade, ascentCount, avgRating, ...
//! │   ├── logs/{userId}         # ClimbLog: rating, comment, timestamp
//! │   ├── gradeVotes/{userId}   # GradeVote
//! │   └── videos/{videoId}
//! │       └── comments/{id}
//! ```
//!
//! Backends only need to provide document reads, listings and writes. The
//! stat aggregator never assumes transactions.

pub mod local;
pub mod memory;
pub mod paths;
#[cfg(feature = "s3")]
pub mod s3;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use paths::{CollectionPath, DocPath, LogPath};

/// Field map of a single document.
pub type Fields = serde_json::Map<String, Value>;

/// A document read from a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document id (last path segment)
    pub id: String,

    /// Raw document fields
    pub data: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Fields) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Raw value of a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Decode the document into a typed model.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.data.clone()))?)
    }
}

/// Trait for document store backends.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document, `None` if it does not exist.
    async fn get(&self, path: &DocPath) -> Result<Option<Document>>;

    /// List every document of a collection, ordered by id.
    async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>>;

    /// Ids under a collection, including ids that have no document of their
    /// own but still own sub-collections (e.g. logs of a deleted climb).
    async fn list_ids(&self, collection: &CollectionPath) -> Result<Vec<String>>;

    /// Create or overwrite a document.
    async fn set(&self, path: &DocPath, data: Fields) -> Result<()>;

    /// Merge `fields` into an existing document.
    ///
    /// Fails with `AppError::NotFound` if the document does not exist.
    async fn update(&self, path: &DocPath, fields: Fields) -> Result<()>;

    /// Delete a document. Returns whether it existed. Sub-collections are kept.
    async fn delete(&self, path: &DocPath) -> Result<bool>;
}

/// Encode a typed model as document fields.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(fields) => Ok(fields),
        other => Err(AppError::validation(format!(
            "expected a JSON object for a document, got {other}"
        ))),
    }
}

/// Overwrite the fields of `target` present in `fields`, keeping the rest.
pub fn merge_fields(target: &mut Fields, fields: Fields) {
    for (key, value) in fields {
        target.insert(key, value);
    }
}
