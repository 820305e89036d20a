//! Built-in access checks.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    context::{keys, ToolContext},
    error::McpError,
    metadata::{default_annotations, ToolName},
    pipeline::{InterceptResult, Interceptor, ToolRequest},
};

/// Blocks every tool whose built-in annotations are not read-only.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadOnlyInterceptor;

impl ReadOnlyInterceptor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Interceptor for ReadOnlyInterceptor {
    fn name(&self) -> &str {
        "read_only"
    }

    async fn intercept(
        &self,
        _ct: &CancellationToken,
        _ctx: &ToolContext,
        request: &ToolRequest,
    ) -> InterceptResult {
        let read_only = ToolName::parse(&request.name)
            .map(|tool| default_annotations(tool).read_only)
            .unwrap_or(false);

        if read_only {
            InterceptResult::allow()
        } else {
            InterceptResult::deny(McpError::ReadOnlyViolation(request.name.clone()).to_string())
        }
    }
}

/// Enforces the upload cap and records the download cap for the handler.
#[derive(Debug, Clone, Copy)]
pub struct SizeLimitInterceptor {
    max_get_size: u64,
    max_put_size: u64,
}

impl SizeLimitInterceptor {
    pub fn new(max_get_size: u64, max_put_size: u64) -> Self {
        Self {
            max_get_size,
            max_put_size,
        }
    }

    pub fn max_get_size(&self) -> u64 {
        self.max_get_size
    }

    pub fn max_put_size(&self) -> u64 {
        self.max_put_size
    }
}

/// Byte length of the payload once decoded. `None` when base64 is malformed.
fn payload_len(content: &str, is_base64: bool) -> Option<u64> {
    if is_base64 {
        STANDARD.decode(content).ok().map(|b| b.len() as u64)
    } else {
        Some(content.len() as u64)
    }
}

#[async_trait]
impl Interceptor for SizeLimitInterceptor {
    fn name(&self) -> &str {
        "size_limit"
    }

    async fn intercept(
        &self,
        _ct: &CancellationToken,
        ctx: &ToolContext,
        request: &ToolRequest,
    ) -> InterceptResult {
        match ToolName::parse(&request.name) {
            Some(ToolName::GetObject) => {
                ctx.set(keys::MAX_GET_SIZE, self.max_get_size);
                InterceptResult::allow()
            }
            Some(ToolName::PutObject) => {
                ctx.set(keys::MAX_PUT_SIZE, self.max_put_size);
                let content = request.str_arg("content").unwrap_or_default();
                let is_base64 = request.bool_arg("is_base64").unwrap_or(false);

                // Malformed base64 is the handler's to report.
                match payload_len(content, is_base64) {
                    Some(actual) if actual > self.max_put_size => InterceptResult::deny(
                        McpError::SizeLimitExceeded {
                            actual,
                            limit: self.max_put_size,
                        }
                        .to_string(),
                    ),
                    _ => InterceptResult::allow(),
                }
            }
            _ => InterceptResult::allow(),
        }
    }
}

/// Restricts keys to configured prefixes per bucket. `*` matches any bucket.
#[derive(Debug, Clone, Default)]
pub struct PrefixAclInterceptor {
    rules: HashMap<String, Vec<String>>,
}

const ANY_BUCKET: &str = "*";

/// `(bucket argument, key-like argument)` pairs subject to the ACL.
const GUARDED_ARGUMENTS: [(&str, &str); 4] = [
    ("bucket", "key"),
    ("bucket", "prefix"),
    ("source_bucket", "source_key"),
    ("dest_bucket", "dest_key"),
];

impl PrefixAclInterceptor {
    pub fn new(rules: HashMap<String, Vec<String>>) -> Self {
        Self { rules }
    }

    fn allowed_prefixes(&self, bucket: &str) -> Option<&[String]> {
        self.rules
            .get(bucket)
            .or_else(|| self.rules.get(ANY_BUCKET))
            .map(Vec::as_slice)
    }

    fn check(&self, bucket: &str, path: &str) -> Result<(), String> {
        let prefixes = self
            .allowed_prefixes(bucket)
            .ok_or_else(|| format!("bucket '{bucket}' is not permitted"))?;
        if prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            Ok(())
        } else {
            Err(format!(
                "'{path}' is outside the allowed prefixes for bucket '{bucket}'"
            ))
        }
    }
}

#[async_trait]
impl Interceptor for PrefixAclInterceptor {
    fn name(&self) -> &str {
        "prefix_acl"
    }

    async fn intercept(
        &self,
        _ct: &CancellationToken,
        _ctx: &ToolContext,
        request: &ToolRequest,
    ) -> InterceptResult {
        // An unscoped listing narrows to the bucket's only prefix.
        if request.name == ToolName::ListObjects.as_ref()
            && request.str_arg("prefix").unwrap_or_default().is_empty()
        {
            if let Some(bucket) = request.str_arg("bucket") {
                if let Some([only]) = self.allowed_prefixes(bucket) {
                    let mut scoped = request.clone();
                    scoped
                        .arguments
                        .insert("prefix".to_string(), Value::String(only.clone()));
                    return InterceptResult::modify(scoped);
                }
            }
        }

        for (bucket_arg, path_arg) in GUARDED_ARGUMENTS {
            let Some(bucket) = request.str_arg(bucket_arg) else {
                continue;
            };
            let path = if path_arg == "prefix" {
                // list_objects without a prefix lists the whole bucket
                if request.name != ToolName::ListObjects.as_ref() {
                    continue;
                }
                request.str_arg(path_arg).unwrap_or_default()
            } else {
                match request.str_arg(path_arg) {
                    Some(path) => path,
                    None => continue,
                }
            };

            if let Err(reason) = self.check(bucket, path) {
                return InterceptResult::deny(reason);
            }
        }

        InterceptResult::allow()
    }
}
