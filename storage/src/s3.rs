//! S3 storage backend.
//!
//! Talks to AWS S3 or any S3-compatible endpoint through `aws-sdk-s3`.
//! Client construction is synchronous: credentials come from the connection
//! config when present, otherwise from the standard AWS environment variables.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{http::HttpResponse, BehaviorVersion, Credentials, Region},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    presigning::PresigningConfig,
    primitives::{ByteStream, DateTime as AwsDateTime},
    Client,
};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
    config::ConnectionConfig,
    core::{
        BucketInfo, CopyObjectOutput, CopyObjectParams, ListObjectsOutput, ListObjectsParams,
        ObjectData, ObjectMetadata, ObjectSummary, PutObjectOutput, PutObjectParams,
        StorageClient, StorageError, StorageResult,
    },
};

const CREDENTIALS_PROVIDER_NAME: &str = "objstore-mcp";

pub struct S3StorageClient {
    name: String,
    config: ConnectionConfig,
    client: Client,
    closed: AtomicBool,
}

impl S3StorageClient {
    pub fn new(name: impl Into<String>, config: ConnectionConfig) -> StorageResult<Self> {
        let name = name.into();
        if config.region.trim().is_empty() {
            return Err(StorageError::InvalidInput(format!(
                "connection '{name}' has an empty region"
            )));
        }

        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .force_path_style(config.force_path_style);
        builder.set_endpoint_url(config.endpoint.clone());

        builder = match (&config.access_key_id, &config.secret_access_key) {
            (Some(access_key), Some(secret_key)) => builder.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                config.session_token.clone(),
                None,
                CREDENTIALS_PROVIDER_NAME,
            )),
            _ => builder.credentials_provider(
                aws_config::environment::EnvironmentVariableCredentialsProvider::new(),
            ),
        };

        debug!(
            connection = %name,
            endpoint = ?config.endpoint,
            region = %config.region,
            "Built S3 client"
        );

        Ok(Self {
            name,
            client: Client::from_conf(builder.build()),
            config,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed(self.name.clone()));
        }
        Ok(())
    }

    fn presigning_config(expires_in: Duration) -> StorageResult<PresigningConfig> {
        PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::InvalidInput(format!("presign expiry: {e}")))
    }
}

/// Map an SDK error, folding the various "missing" codes into `NotFound`.
fn map_sdk_error<E>(what: &str, err: SdkError<E, HttpResponse>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let code = err.as_service_error().and_then(|e| e.code());
    let status = err.raw_response().map(|r| r.status().as_u16());
    match (code, status) {
        (Some("NoSuchKey" | "NoSuchBucket" | "NotFound"), _) | (_, Some(404)) => {
            StorageError::NotFound(what.to_string())
        }
        _ => StorageError::Backend(format!("{what}: {}", DisplayErrorContext(&err))),
    }
}

fn to_chrono(value: Option<&AwsDateTime>) -> Option<DateTime<Utc>> {
    value.and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()))
}

fn to_size(value: Option<i64>) -> u64 {
    value.and_then(|v| u64::try_from(v).ok()).unwrap_or(0)
}

#[async_trait]
impl StorageClient for S3StorageClient {
    fn connection_name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    async fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>> {
        self.ensure_open()?;
        let out = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| map_sdk_error("list buckets", e))?;

        Ok(out
            .buckets()
            .iter()
            .filter_map(|b| {
                Some(BucketInfo {
                    name: b.name()?.to_string(),
                    creation_date: to_chrono(b.creation_date()),
                })
            })
            .collect())
    }

    async fn list_objects(&self, params: ListObjectsParams) -> StorageResult<ListObjectsOutput> {
        self.ensure_open()?;
        let what = format!("bucket '{}'", params.bucket);
        let out = self
            .client
            .list_objects_v2()
            .bucket(params.bucket)
            .set_prefix(params.prefix)
            .set_delimiter(params.delimiter)
            .set_max_keys(params.max_keys)
            .set_continuation_token(params.continuation_token)
            .send()
            .await
            .map_err(|e| map_sdk_error(&what, e))?;

        Ok(ListObjectsOutput {
            objects: out
                .contents()
                .iter()
                .filter_map(|o| {
                    Some(ObjectSummary {
                        key: o.key()?.to_string(),
                        size: to_size(o.size()),
                        last_modified: to_chrono(o.last_modified()),
                        etag: o.e_tag().map(str::to_string),
                        storage_class: o.storage_class().map(|c| c.as_str().to_string()),
                    })
                })
                .collect(),
            common_prefixes: out
                .common_prefixes()
                .iter()
                .filter_map(|p| p.prefix().map(str::to_string))
                .collect(),
            is_truncated: out.is_truncated().unwrap_or(false),
            next_continuation_token: out.next_continuation_token().map(str::to_string),
        })
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        max_bytes: Option<u64>,
    ) -> StorageResult<ObjectData> {
        self.ensure_open()?;
        let what = format!("object '{bucket}/{key}'");
        let out = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(&what, e))?;

        let size = to_size(out.content_length());
        if let Some(limit) = max_bytes {
            if size > limit {
                return Err(StorageError::TooLarge {
                    actual: size,
                    limit,
                });
            }
        }

        let metadata = ObjectMetadata {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size,
            content_type: out.content_type().map(str::to_string),
            etag: out.e_tag().map(str::to_string),
            last_modified: to_chrono(out.last_modified()),
            metadata: out.metadata().cloned().unwrap_or_default(),
        };
        let body = out
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(format!("{what}: read body: {e}")))?
            .into_bytes();

        Ok(ObjectData { metadata, body })
    }

    async fn get_object_metadata(&self, bucket: &str, key: &str) -> StorageResult<ObjectMetadata> {
        self.ensure_open()?;
        let what = format!("object '{bucket}/{key}'");
        let out = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(&what, e))?;

        Ok(ObjectMetadata {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: to_size(out.content_length()),
            content_type: out.content_type().map(str::to_string),
            etag: out.e_tag().map(str::to_string),
            last_modified: to_chrono(out.last_modified()),
            metadata: out.metadata().cloned().unwrap_or_default(),
        })
    }

    async fn put_object(&self, params: PutObjectParams) -> StorageResult<PutObjectOutput> {
        self.ensure_open()?;
        let what = format!("object '{}/{}'", params.bucket, params.key);
        let metadata: Option<HashMap<String, String>> =
            (!params.metadata.is_empty()).then_some(params.metadata);
        let out = self
            .client
            .put_object()
            .bucket(params.bucket)
            .key(params.key)
            .body(ByteStream::from(params.body))
            .set_content_type(params.content_type)
            .set_metadata(metadata)
            .send()
            .await
            .map_err(|e| map_sdk_error(&what, e))?;

        Ok(PutObjectOutput {
            etag: out.e_tag().map(str::to_string),
            version_id: out.version_id().map(str::to_string),
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.ensure_open()?;
        let what = format!("object '{bucket}/{key}'");
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(&what, e))?;
        Ok(())
    }

    async fn copy_object(&self, params: CopyObjectParams) -> StorageResult<CopyObjectOutput> {
        self.ensure_open()?;
        let what = format!("object '{}/{}'", params.source_bucket, params.source_key);
        let out = self
            .client
            .copy_object()
            .copy_source(format!("{}/{}", params.source_bucket, params.source_key))
            .bucket(params.dest_bucket)
            .key(params.dest_key)
            .send()
            .await
            .map_err(|e| map_sdk_error(&what, e))?;

        Ok(CopyObjectOutput {
            etag: out
                .copy_object_result()
                .and_then(|r| r.e_tag())
                .map(str::to_string),
        })
    }

    async fn presign_get_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        self.ensure_open()?;
        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(Self::presigning_config(expires_in)?)
            .await
            .map_err(|e| map_sdk_error(&format!("presign GET '{bucket}/{key}'"), e))?;
        Ok(presigned.uri().to_string())
    }

    async fn presign_put_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
        content_type: Option<&str>,
    ) -> StorageResult<String> {
        self.ensure_open()?;
        let presigned = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .set_content_type(content_type.map(str::to_string))
            .presigned(Self::presigning_config(expires_in)?)
            .await
            .map_err(|e| map_sdk_error(&format!("presign PUT '{bucket}/{key}'"), e))?;
        Ok(presigned.uri().to_string())
    }

    fn close(&self) -> StorageResult<()> {
        // The SDK client owns no sockets we can release; stop accepting calls.
        self.closed.store(true, Ordering::Release);
        debug!(connection = %self.name, "Closed S3 client");
        Ok(())
    }
}
