//! Tool handlers over the storage-client interface.
//!
//! Each handler resolves its client from the [`ConnectionManager`] using the
//! connection recorded in the [`ToolContext`], and races the storage call
//! against the invocation's cancellation token.

pub mod params;

use std::{future::Future, sync::Arc, time::Duration};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use futures::future::BoxFuture;
use objstore_storage::{
    CopyObjectParams, ListObjectsParams, PutObjectParams, StorageClient, StorageResult,
};
use rmcp::model::CallToolResult;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use self::params::{
    expiry_secs, parse, require, CopyObjectInput, ListObjectsInput, ObjectInput, PresignInput,
    PutObjectInput, MAX_LIST_KEYS,
};
use crate::{
    context::{keys, ToolContext},
    core::ConnectionManager,
    error::{McpError, McpResult},
    metadata::{SizeLimits, ToolName},
    pipeline::{ToolHandlerFn, ToolRequest},
};

/// Shared state every handler needs.
#[derive(Clone)]
struct HandlerEnv {
    manager: Arc<ConnectionManager>,
    size_limits: Option<SizeLimits>,
}

impl HandlerEnv {
    fn client(&self, ctx: &ToolContext) -> McpResult<Arc<dyn StorageClient>> {
        match ctx.connection_name() {
            "" => self.manager.get_default_client(),
            name => self.manager.get_client(name),
        }
    }
}

/// Build the unwrapped handler for `tool`.
pub fn handler(
    tool: ToolName,
    manager: Arc<ConnectionManager>,
    size_limits: Option<SizeLimits>,
) -> ToolHandlerFn {
    let env = HandlerEnv {
        manager,
        size_limits,
    };
    Arc::new(
        move |ct: CancellationToken,
              ctx: Arc<ToolContext>,
              request: ToolRequest|
              -> BoxFuture<'static, McpResult<CallToolResult>> {
            let env = env.clone();
            Box::pin(async move {
                debug!(tool = %tool, request_id = %ctx.request_id(), "Dispatching tool handler");
                match tool {
                    ToolName::ListBuckets => list_buckets(&env, &ct, &ctx).await,
                    ToolName::ListObjects => list_objects(&env, &ct, &ctx, &request).await,
                    ToolName::GetObject => get_object(&env, &ct, &ctx, &request).await,
                    ToolName::GetObjectMetadata => {
                        get_object_metadata(&env, &ct, &ctx, &request).await
                    }
                    ToolName::PutObject => put_object(&env, &ct, &ctx, &request).await,
                    ToolName::DeleteObject => delete_object(&env, &ct, &ctx, &request).await,
                    ToolName::CopyObject => copy_object(&env, &ct, &ctx, &request).await,
                    ToolName::PresignGetUrl => presign(&env, &ct, &ctx, &request, false).await,
                    ToolName::PresignPutUrl => presign(&env, &ct, &ctx, &request, true).await,
                }
            })
        },
    )
}

/// Await a storage call unless the invocation is cancelled first.
async fn cancellable<T, F>(ct: &CancellationToken, call: F) -> McpResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    tokio::select! {
        biased;
        _ = ct.cancelled() => Err(McpError::handler("request cancelled")),
        result = call => result.map_err(McpError::from),
    }
}

fn object_input(request: &ToolRequest) -> McpResult<ObjectInput> {
    let input: ObjectInput = parse(request)?;
    require("bucket", &input.bucket)?;
    require("key", &input.key)?;
    Ok(input)
}

async fn list_buckets(
    env: &HandlerEnv,
    ct: &CancellationToken,
    ctx: &ToolContext,
) -> McpResult<CallToolResult> {
    let client = env.client(ctx)?;
    let buckets = cancellable(ct, client.list_buckets()).await?;
    Ok(CallToolResult::structured(json!({ "buckets": buckets })))
}

async fn list_objects(
    env: &HandlerEnv,
    ct: &CancellationToken,
    ctx: &ToolContext,
    request: &ToolRequest,
) -> McpResult<CallToolResult> {
    let input: ListObjectsInput = parse(request)?;
    require("bucket", &input.bucket)?;
    if let Some(max_keys) = input.max_keys {
        if !(1..=MAX_LIST_KEYS).contains(&max_keys) {
            return Err(McpError::InvalidParameter(format!(
                "max_keys must be between 1 and {MAX_LIST_KEYS}, got {max_keys}"
            )));
        }
    }

    let client = env.client(ctx)?;
    let params = ListObjectsParams {
        bucket: input.bucket,
        prefix: input.prefix.filter(|p| !p.is_empty()),
        delimiter: input.delimiter.filter(|d| !d.is_empty()),
        max_keys: input.max_keys,
        continuation_token: input.continuation_token.filter(|t| !t.is_empty()),
    };
    let output = cancellable(ct, client.list_objects(params)).await?;
    Ok(CallToolResult::structured(json!(output)))
}

async fn get_object(
    env: &HandlerEnv,
    ct: &CancellationToken,
    ctx: &ToolContext,
    request: &ToolRequest,
) -> McpResult<CallToolResult> {
    let input = object_input(request)?;
    let max_bytes = ctx
        .get::<u64>(keys::MAX_GET_SIZE)
        .or(env.size_limits.map(|l| l.max_bytes));

    let client = env.client(ctx)?;
    let object = cancellable(ct, client.get_object(&input.bucket, &input.key, max_bytes)).await?;
    let meta = object.metadata;

    let (content, encoding) = match std::str::from_utf8(&object.body) {
        Ok(text) => (text.to_string(), "text"),
        Err(_) => (STANDARD.encode(&object.body), "base64"),
    };

    Ok(CallToolResult::structured(json!({
        "bucket": meta.bucket,
        "key": meta.key,
        "content": content,
        "encoding": encoding,
        "content_type": meta.content_type,
        "size": meta.size,
        "etag": meta.etag,
        "last_modified": meta.last_modified,
    })))
}

async fn get_object_metadata(
    env: &HandlerEnv,
    ct: &CancellationToken,
    ctx: &ToolContext,
    request: &ToolRequest,
) -> McpResult<CallToolResult> {
    let input = object_input(request)?;
    let client = env.client(ctx)?;
    let meta = cancellable(ct, client.get_object_metadata(&input.bucket, &input.key)).await?;
    Ok(CallToolResult::structured(json!(meta)))
}

async fn put_object(
    env: &HandlerEnv,
    ct: &CancellationToken,
    ctx: &ToolContext,
    request: &ToolRequest,
) -> McpResult<CallToolResult> {
    let input: PutObjectInput = parse(request)?;
    require("bucket", &input.bucket)?;
    require("key", &input.key)?;

    let body = if input.is_base64 {
        Bytes::from(
            STANDARD
                .decode(input.content.as_bytes())
                .map_err(|e| McpError::InvalidParameter(format!("content is not valid base64: {e}")))?,
        )
    } else {
        Bytes::from(input.content)
    };
    let size = body.len() as u64;
    let limit = ctx
        .get::<u64>(keys::MAX_PUT_SIZE)
        .or(env.size_limits.map(|l| l.max_bytes));
    if let Some(limit) = limit.filter(|&limit| size > limit) {
        return Err(McpError::SizeLimitExceeded {
            actual: size,
            limit,
        });
    }

    let client = env.client(ctx)?;
    let params = PutObjectParams {
        bucket: input.bucket.clone(),
        key: input.key.clone(),
        body,
        content_type: input.content_type,
        metadata: input.metadata.unwrap_or_default(),
    };
    let output = cancellable(ct, client.put_object(params)).await?;

    Ok(CallToolResult::structured(json!({
        "bucket": input.bucket,
        "key": input.key,
        "size": size,
        "etag": output.etag,
        "version_id": output.version_id,
    })))
}

async fn delete_object(
    env: &HandlerEnv,
    ct: &CancellationToken,
    ctx: &ToolContext,
    request: &ToolRequest,
) -> McpResult<CallToolResult> {
    let input = object_input(request)?;
    let client = env.client(ctx)?;
    cancellable(ct, client.delete_object(&input.bucket, &input.key)).await?;
    Ok(CallToolResult::structured(json!({
        "bucket": input.bucket,
        "key": input.key,
        "deleted": true,
    })))
}

async fn copy_object(
    env: &HandlerEnv,
    ct: &CancellationToken,
    ctx: &ToolContext,
    request: &ToolRequest,
) -> McpResult<CallToolResult> {
    let input: CopyObjectInput = parse(request)?;
    require("source_bucket", &input.source_bucket)?;
    require("source_key", &input.source_key)?;
    require("dest_bucket", &input.dest_bucket)?;
    require("dest_key", &input.dest_key)?;

    let client = env.client(ctx)?;
    let params = CopyObjectParams {
        source_bucket: input.source_bucket.clone(),
        source_key: input.source_key.clone(),
        dest_bucket: input.dest_bucket.clone(),
        dest_key: input.dest_key.clone(),
    };
    let output = cancellable(ct, client.copy_object(params)).await?;

    Ok(CallToolResult::structured(json!({
        "source_bucket": input.source_bucket,
        "source_key": input.source_key,
        "dest_bucket": input.dest_bucket,
        "dest_key": input.dest_key,
        "etag": output.etag,
    })))
}

async fn presign(
    env: &HandlerEnv,
    ct: &CancellationToken,
    ctx: &ToolContext,
    request: &ToolRequest,
    upload: bool,
) -> McpResult<CallToolResult> {
    let input: PresignInput = parse(request)?;
    require("bucket", &input.bucket)?;
    require("key", &input.key)?;

    let client = env.client(ctx)?;
    let secs = expiry_secs(input.expires_in_secs, client.config().presign_expiry_secs)?;
    let expires_in = Duration::from_secs(secs);

    let url = if upload {
        cancellable(
            ct,
            client.presign_put_url(
                &input.bucket,
                &input.key,
                expires_in,
                input.content_type.as_deref(),
            ),
        )
        .await?
    } else {
        cancellable(ct, client.presign_get_url(&input.bucket, &input.key, expires_in)).await?
    };

    Ok(CallToolResult::structured(json!({
        "url": url,
        "expires_in_secs": secs,
    })))
}
