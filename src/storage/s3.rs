//! AWS S3 storage implementation.
//!
//! Mirrors the local layout inside a bucket: document `climbs/c1` is the
//! object `{prefix}/climbs/c1.json`, collection `climbs/c1/logs` is the key
//! prefix `{prefix}/climbs/c1/logs/`.

use std::collections::BTreeSet;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use log::{debug, info};

use crate::error::{AppError, Result};
use crate::models::StoreConfig;
use crate::storage::{CollectionPath, DocPath, Document, DocumentStore, Fields, merge_fields};

const EXTENSION: &str = ".json";

/// S3-backed document store.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Store {
    /// Create a new S3 store instance.
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    /// Create an S3 store from the ambient AWS configuration.
    pub async fn from_config(config: &StoreConfig) -> Result<Self> {
        if config.bucket.trim().is_empty() {
            return Err(AppError::config("store.bucket is empty"));
        }
        let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Ok(Self::new(Client::new(&aws), &config.bucket, &config.prefix))
    }

    /// Full object key for a relative key.
    fn key(&self, relative: &str) -> String {
        if self.prefix.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", self.prefix, relative)
        }
    }

    fn doc_key(&self, path: &DocPath) -> String {
        self.key(&format!("{}{}", path, EXTENSION))
    }

    fn collection_prefix(&self, collection: &CollectionPath) -> String {
        self.key(&format!("{}/", collection))
    }

    /// Read raw bytes from S3, returning None if the key doesn't exist.
    pub async fn read_bytes_optional(&self, relative: &str) -> Result<Option<Vec<u8>>> {
        self.read_object(&self.key(relative)).await
    }

    async fn read_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let bytes = output.body.collect().await.map_err(AppError::s3)?;
                Ok(Some(bytes.into_bytes().to_vec()))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    debug!("No object at s3://{}/{}", self.bucket, key);
                    Ok(None)
                } else {
                    Err(AppError::s3(service_err))
                }
            }
        }
    }

    async fn read_fields(&self, key: &str) -> Result<Option<Fields>> {
        match self.read_object(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn write_fields(&self, key: &str, data: &Fields) -> Result<()> {
        let json = serde_json::to_vec_pretty(data)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(json))
            .content_type("application/json")
            .send()
            .await
            .map_err(AppError::s3)?;

        debug!("Wrote s3://{}/{}", self.bucket, key);
        Ok(())
    }

    /// List direct children of a prefix: (object keys, sub-prefixes).
    async fn list_children(&self, prefix: &str) -> Result<(Vec<String>, Vec<String>)> {
        let mut keys = Vec::new();
        let mut prefixes = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .delimiter("/")
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(AppError::s3)?;

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .map(str::to_string),
            );
            prefixes.extend(
                output
                    .common_prefixes()
                    .iter()
                    .filter_map(|common| common.prefix())
                    .map(str::to_string),
            );

            match output.next_continuation_token() {
                Some(next) if output.is_truncated().unwrap_or(false) => {
                    token = Some(next.to_string())
                }
                _ => break,
            }
        }

        Ok((keys, prefixes))
    }

    /// Document ids for the object keys directly under `prefix`.
    fn ids_from_keys<'a>(prefix: &str, keys: &'a [String]) -> Vec<&'a str> {
        keys.iter()
            .filter_map(|key| key.strip_prefix(prefix))
            .filter_map(|name| name.strip_suffix(EXTENSION))
            .filter(|id| !id.is_empty() && !id.contains('/'))
            .collect()
    }

    /// Whether an object exists. Only a 404 counts as missing.
    async fn exists(&self, key: &str) -> Result<bool> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) => Self::missing_or_error(err.into_service_error()),
        }
    }

    fn missing_or_error(err: HeadObjectError) -> Result<bool> {
        if err.is_not_found() {
            Ok(false)
        } else {
            Err(AppError::s3(err))
        }
    }
}

#[async_trait]
impl DocumentStore for S3Store {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>> {
        Ok(self
            .read_fields(&self.doc_key(path))
            .await?
            .map(|data| Document::new(path.id(), data)))
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>> {
        let prefix = self.collection_prefix(collection);
        let (keys, _) = self.list_children(&prefix).await?;

        let mut ids: Vec<&str> = Self::ids_from_keys(&prefix, &keys);
        ids.sort_unstable();

        let mut documents = Vec::with_capacity(ids.len());
        for id in ids {
            let key = format!("{}{}{}", prefix, id, EXTENSION);
            if let Some(data) = self.read_fields(&key).await? {
                documents.push(Document::new(id, data));
            }
        }
        debug!(
            "Listed {} documents under s3://{}/{}",
            documents.len(),
            self.bucket,
            prefix
        );
        Ok(documents)
    }

    async fn list_ids(&self, collection: &CollectionPath) -> Result<Vec<String>> {
        let prefix = self.collection_prefix(collection);
        let (keys, prefixes) = self.list_children(&prefix).await?;

        let mut ids: BTreeSet<String> = Self::ids_from_keys(&prefix, &keys)
            .into_iter()
            .map(str::to_string)
            .collect();
        ids.extend(
            prefixes
                .iter()
                .filter_map(|sub| sub.strip_prefix(&prefix))
                .map(|sub| sub.trim_end_matches('/'))
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        );
        Ok(ids.into_iter().collect())
    }

    async fn set(&self, path: &DocPath, data: Fields) -> Result<()> {
        self.write_fields(&self.doc_key(path), &data).await
    }

    async fn update(&self, path: &DocPath, fields: Fields) -> Result<()> {
        let key = self.doc_key(path);
        let mut existing = self
            .read_fields(&key)
            .await?
            .ok_or_else(|| AppError::NotFound(path.to_string()))?;

        merge_fields(&mut existing, fields);
        self.write_fields(&key, &existing).await
    }

    async fn delete(&self, path: &DocPath) -> Result<bool> {
        let key = self.doc_key(path);
        if !self.exists(&key).await? {
            return Ok(false);
        }

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(AppError::s3)?;

        info!("Deleted s3://{}/{}", self.bucket, key);
        Ok(true)
    }
}
