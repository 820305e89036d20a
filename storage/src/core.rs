// core.rs
//
// Core types for the storage module.
// Contains the client trait, the request/response payloads and the error type
// shared by every backend.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ConnectionConfig;

// ============================================================================
// Errors
// ============================================================================

/// Result alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Error type for storage operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Object too large: {actual} bytes exceeds limit of {limit} bytes")]
    TooLarge { actual: u64, limit: u64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Client closed: {0}")]
    Closed(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsParams {
    pub bucket: String,
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub max_keys: Option<i32>,
    pub continuation_token: Option<String>,
}

impl ListObjectsParams {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListObjectsOutput {
    pub objects: Vec<ObjectSummary>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_continuation_token: Option<String>,
}

/// Object head information, shared by `get_object_metadata` and `get_object`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectData {
    pub metadata: ObjectMetadata,
    pub body: Bytes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutObjectParams {
    pub bucket: String,
    pub key: String,
    pub body: Bytes,
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutObjectOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyObjectParams {
    pub source_bucket: String,
    pub source_key: String,
    pub dest_bucket: String,
    pub dest_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyObjectOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

// ============================================================================
// Client trait
// ============================================================================

/// Capability set of one named storage connection.
///
/// Implementations must be cheap to share behind an `Arc`; the connection
/// manager hands the same instance to every concurrent caller.
#[async_trait]
pub trait StorageClient: Send + Sync + 'static {
    /// Name of the connection this client was built for.
    fn connection_name(&self) -> &str;

    /// Configuration the client was built from.
    fn config(&self) -> &ConnectionConfig;

    async fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>>;

    async fn list_objects(&self, params: ListObjectsParams) -> StorageResult<ListObjectsOutput>;

    /// Fetch an object body. Objects larger than `max_bytes` fail with
    /// [`StorageError::TooLarge`] before the body is read.
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        max_bytes: Option<u64>,
    ) -> StorageResult<ObjectData>;

    async fn get_object_metadata(&self, bucket: &str, key: &str) -> StorageResult<ObjectMetadata>;

    async fn put_object(&self, params: PutObjectParams) -> StorageResult<PutObjectOutput>;

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()>;

    async fn copy_object(&self, params: CopyObjectParams) -> StorageResult<CopyObjectOutput>;

    async fn presign_get_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> StorageResult<String>;

    async fn presign_put_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
        content_type: Option<&str>,
    ) -> StorageResult<String>;

    /// Release the client. Calls made after a successful close fail with
    /// [`StorageError::Closed`].
    fn close(&self) -> StorageResult<()>;
}
