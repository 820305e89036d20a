//! In-memory storage backend.
//!
//! Keeps buckets and objects in process memory. Used by tests and for local
//! development without an S3 endpoint.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::{
    config::ConnectionConfig,
    core::{
        BucketInfo, CopyObjectOutput, CopyObjectParams, ListObjectsOutput, ListObjectsParams,
        ObjectData, ObjectMetadata, ObjectSummary, PutObjectOutput, PutObjectParams,
        StorageClient, StorageError, StorageResult,
    },
};

const DEFAULT_MAX_KEYS: usize = 1000;

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    content_type: Option<String>,
    etag: String,
    last_modified: DateTime<Utc>,
    metadata: HashMap<String, String>,
}

#[derive(Debug)]
struct Bucket {
    created: DateTime<Utc>,
    objects: BTreeMap<String, StoredObject>,
}

pub struct MemoryStorageClient {
    name: String,
    config: ConnectionConfig,
    buckets: RwLock<BTreeMap<String, Bucket>>,
    next_etag: AtomicU64,
    closed: AtomicBool,
}

impl MemoryStorageClient {
    pub fn new(name: impl Into<String>, config: ConnectionConfig) -> Self {
        Self {
            name: name.into(),
            config,
            buckets: RwLock::new(BTreeMap::new()),
            next_etag: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_bucket(self, bucket: impl Into<String>) -> Self {
        self.create_bucket(bucket);
        self
    }

    /// Create a bucket if it does not already exist.
    pub fn create_bucket(&self, bucket: impl Into<String>) {
        self.buckets.write().entry(bucket.into()).or_insert_with(|| Bucket {
            created: Utc::now(),
            objects: BTreeMap::new(),
        });
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        self.buckets
            .read()
            .get(bucket)
            .map(|b| b.objects.len())
            .unwrap_or(0)
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.is_closed() {
            return Err(StorageError::Closed(self.name.clone()));
        }
        Ok(())
    }

    fn head(bucket: &str, key: &str, object: &StoredObject) -> ObjectMetadata {
        ObjectMetadata {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: object.body.len() as u64,
            content_type: object.content_type.clone(),
            etag: Some(object.etag.clone()),
            last_modified: Some(object.last_modified),
            metadata: object.metadata.clone(),
        }
    }

    fn lookup(&self, bucket: &str, key: &str) -> StorageResult<StoredObject> {
        let buckets = self.buckets.read();
        let b = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::NotFound(format!("bucket '{bucket}'")))?;
        b.objects
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("object '{bucket}/{key}'")))
    }

    fn etag(&self) -> String {
        format!("\"{:032x}\"", self.next_etag.fetch_add(1, Ordering::Relaxed))
    }

    fn presign(&self, method: &str, bucket: &str, key: &str, expires_in: Duration) -> String {
        format!(
            "memory://{bucket}/{key}?method={method}&expires={}",
            expires_in.as_secs()
        )
    }
}

#[async_trait]
impl StorageClient for MemoryStorageClient {
    fn connection_name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    async fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>> {
        self.ensure_open()?;
        Ok(self
            .buckets
            .read()
            .iter()
            .map(|(name, bucket)| BucketInfo {
                name: name.clone(),
                creation_date: Some(bucket.created),
            })
            .collect())
    }

    async fn list_objects(&self, params: ListObjectsParams) -> StorageResult<ListObjectsOutput> {
        self.ensure_open()?;
        let buckets = self.buckets.read();
        let bucket = buckets
            .get(&params.bucket)
            .ok_or_else(|| StorageError::NotFound(format!("bucket '{}'", params.bucket)))?;

        let prefix = params.prefix.as_deref().unwrap_or("");
        let max_keys = params
            .max_keys
            .and_then(|n| usize::try_from(n).ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_KEYS);

        let mut output = ListObjectsOutput::default();
        let mut prefixes = BTreeSet::new();
        let mut emitted = 0usize;
        let mut last_key = None;

        let candidates = bucket
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| match &params.continuation_token {
                Some(token) => key.as_str() > token.as_str(),
                None => true,
            });

        for (key, object) in candidates {
            if emitted >= max_keys {
                output.is_truncated = true;
                output.next_continuation_token = last_key;
                break;
            }

            let rest = &key[prefix.len()..];
            if let Some(delimiter) = params.delimiter.as_deref().filter(|d| !d.is_empty()) {
                if let Some(idx) = rest.find(delimiter) {
                    let common = format!("{prefix}{}", &rest[..idx + delimiter.len()]);
                    if prefixes.insert(common) {
                        emitted += 1;
                    }
                    last_key = Some(key.clone());
                    continue;
                }
            }

            output.objects.push(ObjectSummary {
                key: key.clone(),
                size: object.body.len() as u64,
                last_modified: Some(object.last_modified),
                etag: Some(object.etag.clone()),
                storage_class: Some("STANDARD".to_string()),
            });
            emitted += 1;
            last_key = Some(key.clone());
        }

        output.common_prefixes = prefixes.into_iter().collect();
        Ok(output)
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        max_bytes: Option<u64>,
    ) -> StorageResult<ObjectData> {
        self.ensure_open()?;
        let object = self.lookup(bucket, key)?;
        let size = object.body.len() as u64;
        if let Some(limit) = max_bytes {
            if size > limit {
                return Err(StorageError::TooLarge {
                    actual: size,
                    limit,
                });
            }
        }
        Ok(ObjectData {
            metadata: Self::head(bucket, key, &object),
            body: object.body,
        })
    }

    async fn get_object_metadata(&self, bucket: &str, key: &str) -> StorageResult<ObjectMetadata> {
        self.ensure_open()?;
        let object = self.lookup(bucket, key)?;
        Ok(Self::head(bucket, key, &object))
    }

    async fn put_object(&self, params: PutObjectParams) -> StorageResult<PutObjectOutput> {
        self.ensure_open()?;
        let etag = self.etag();
        let mut buckets = self.buckets.write();
        let bucket = buckets
            .get_mut(&params.bucket)
            .ok_or_else(|| StorageError::NotFound(format!("bucket '{}'", params.bucket)))?;
        bucket.objects.insert(
            params.key,
            StoredObject {
                body: params.body,
                content_type: params.content_type,
                etag: etag.clone(),
                last_modified: Utc::now(),
                metadata: params.metadata,
            },
        );
        Ok(PutObjectOutput {
            etag: Some(etag),
            version_id: None,
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.ensure_open()?;
        let mut buckets = self.buckets.write();
        let b = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::NotFound(format!("bucket '{bucket}'")))?;
        // S3 semantics: deleting a missing key succeeds
        b.objects.remove(key);
        Ok(())
    }

    async fn copy_object(&self, params: CopyObjectParams) -> StorageResult<CopyObjectOutput> {
        self.ensure_open()?;
        let source = self.lookup(&params.source_bucket, &params.source_key)?;
        let etag = self.etag();
        let mut buckets = self.buckets.write();
        let dest = buckets
            .get_mut(&params.dest_bucket)
            .ok_or_else(|| StorageError::NotFound(format!("bucket '{}'", params.dest_bucket)))?;
        dest.objects.insert(
            params.dest_key,
            StoredObject {
                etag: etag.clone(),
                last_modified: Utc::now(),
                ..source
            },
        );
        Ok(CopyObjectOutput { etag: Some(etag) })
    }

    async fn presign_get_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        self.ensure_open()?;
        Ok(self.presign("GET", bucket, key, expires_in))
    }

    async fn presign_put_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
        _content_type: Option<&str>,
    ) -> StorageResult<String> {
        self.ensure_open()?;
        Ok(self.presign("PUT", bucket, key, expires_in))
    }

    fn close(&self) -> StorageResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> MemoryStorageClient {
        MemoryStorageClient::new("mem", ConnectionConfig::memory()).with_bucket("docs")
    }

    async fn put(client: &MemoryStorageClient, key: &str, body: &str) {
        client
            .put_object(PutObjectParams {
                bucket: "docs".to_string(),
                key: key.to_string(),
                body: Bytes::from(body.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let client = client();
        put(&client, "a.txt", "hello").await;

        let data = client.get_object("docs", "a.txt", None).await.unwrap();
        assert_eq!(data.body, Bytes::from("hello"));
        assert_eq!(data.metadata.size, 5);
        assert!(data.metadata.etag.is_some());
    }

    #[tokio::test]
    async fn test_get_respects_max_bytes() {
        let client = client();
        put(&client, "big.txt", "0123456789").await;

        let err = client.get_object("docs", "big.txt", Some(4)).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::TooLarge {
                actual: 10,
                limit: 4
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_bucket_and_key() {
        let client = client();
        assert!(matches!(
            client.get_object("nope", "k", None).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            client.get_object_metadata("docs", "missing").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_with_delimiter_and_pagination() {
        let client = client();
        for key in ["logs/1", "logs/2", "readme", "src/a", "src/b"] {
            put(&client, key, "x").await;
        }

        let mut params = ListObjectsParams::new("docs");
        params.delimiter = Some("/".to_string());
        let out = client.list_objects(params).await.unwrap();
        assert_eq!(out.common_prefixes, vec!["logs/", "src/"]);
        assert_eq!(out.objects.len(), 1);
        assert_eq!(out.objects[0].key, "readme");

        let mut params = ListObjectsParams::new("docs");
        params.max_keys = Some(2);
        let page = client.list_objects(params.clone()).await.unwrap();
        assert!(page.is_truncated);
        assert_eq!(page.objects.len(), 2);

        params.continuation_token = page.next_continuation_token;
        let next = client.list_objects(params).await.unwrap();
        assert_eq!(next.objects[0].key, "readme");
    }

    #[tokio::test]
    async fn test_copy_and_delete() {
        let client = client();
        put(&client, "src.txt", "payload").await;

        client
            .copy_object(CopyObjectParams {
                source_bucket: "docs".to_string(),
                source_key: "src.txt".to_string(),
                dest_bucket: "docs".to_string(),
                dest_key: "dst.txt".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(client.object_count("docs"), 2);

        client.delete_object("docs", "src.txt").await.unwrap();
        assert_eq!(client.object_count("docs"), 1);
        let copied = client.get_object("docs", "dst.txt", None).await.unwrap();
        assert_eq!(copied.body, Bytes::from("payload"));
    }

    #[tokio::test]
    async fn test_closed_client_rejects_calls() {
        let client = client();
        client.close().unwrap();
        assert!(client.is_closed());
        assert!(matches!(
            client.list_buckets().await,
            Err(StorageError::Closed(_))
        ));
    }

    #[tokio::test]
    async fn test_presign_urls() {
        let client = client();
        let url = client
            .presign_get_url("docs", "a.txt", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(url, "memory://docs/a.txt?method=GET&expires=60");
    }
}
