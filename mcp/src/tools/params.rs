//! Typed tool inputs and their JSON input schemas.

use std::collections::HashMap;

use rmcp::model::JsonObject;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

use crate::{
    error::{McpError, McpResult},
    metadata::ToolName,
    pipeline::ToolRequest,
};

/// Longest lifetime S3 accepts for a presigned URL (7 days).
pub const MAX_PRESIGN_EXPIRY_SECS: u64 = 604_800;
pub const MAX_LIST_KEYS: i32 = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct ListObjectsInput {
    pub bucket: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub delimiter: Option<String>,
    #[serde(default)]
    pub max_keys: Option<i32>,
    #[serde(default)]
    pub continuation_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectInput {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PutObjectInput {
    pub bucket: String,
    pub key: String,
    pub content: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub is_base64: bool,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CopyObjectInput {
    pub source_bucket: String,
    pub source_key: String,
    pub dest_bucket: String,
    pub dest_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresignInput {
    pub bucket: String,
    pub key: String,
    #[serde(default)]
    pub expires_in_secs: Option<u64>,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Deserialize the request arguments into `T`.
///
/// A missing field maps to `MissingParameter`; any other shape error to
/// `InvalidParameter`.
pub fn parse<T: DeserializeOwned>(request: &ToolRequest) -> McpResult<T> {
    serde_json::from_value(Value::Object(request.arguments.clone())).map_err(|e| {
        let message = e.to_string();
        match message
            .strip_prefix("missing field `")
            .and_then(|rest| rest.split('`').next())
        {
            Some(field) => McpError::MissingParameter(field.to_string()),
            None => McpError::InvalidParameter(message),
        }
    })
}

/// Reject blank required strings.
pub fn require(name: &str, value: &str) -> McpResult<()> {
    if value.trim().is_empty() {
        Err(McpError::MissingParameter(name.to_string()))
    } else {
        Ok(())
    }
}

/// Validate an optional expiry, falling back to `default_secs`.
pub fn expiry_secs(requested: Option<u64>, default_secs: u64) -> McpResult<u64> {
    let secs = requested.unwrap_or(default_secs);
    if (1..=MAX_PRESIGN_EXPIRY_SECS).contains(&secs) {
        Ok(secs)
    } else {
        Err(McpError::InvalidParameter(format!(
            "expires_in_secs must be between 1 and {MAX_PRESIGN_EXPIRY_SECS}, got {secs}"
        )))
    }
}

fn object_schema(properties: Value, required: &[&str]) -> JsonObject {
    let mut properties = match properties {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    };
    properties.insert(
        "connection".to_string(),
        json!({
            "type": "string",
            "description": "Named storage connection; the default connection when omitted"
        }),
    );

    let mut schema = JsonObject::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    schema.insert("required".to_string(), json!(required));
    schema
}

pub fn input_schema(tool: ToolName) -> JsonObject {
    let bucket = json!({"type": "string", "description": "Bucket name"});
    let key = json!({"type": "string", "description": "Object key"});
    let expires = json!({
        "type": "integer",
        "minimum": 1,
        "maximum": MAX_PRESIGN_EXPIRY_SECS,
        "description": "URL lifetime in seconds; the connection default when omitted"
    });

    match tool {
        ToolName::ListBuckets => object_schema(json!({}), &[]),
        ToolName::ListObjects => object_schema(
            json!({
                "bucket": bucket,
                "prefix": {"type": "string", "description": "Only keys starting with this prefix"},
                "delimiter": {"type": "string", "description": "Group keys sharing a prefix up to this delimiter"},
                "max_keys": {"type": "integer", "minimum": 1, "maximum": MAX_LIST_KEYS},
                "continuation_token": {"type": "string", "description": "Token from a previous truncated listing"},
            }),
            &["bucket"],
        ),
        ToolName::GetObject | ToolName::GetObjectMetadata | ToolName::DeleteObject => {
            object_schema(json!({"bucket": bucket, "key": key}), &["bucket", "key"])
        }
        ToolName::PutObject => object_schema(
            json!({
                "bucket": bucket,
                "key": key,
                "content": {"type": "string", "description": "Object body, text or base64"},
                "content_type": {"type": "string"},
                "is_base64": {"type": "boolean", "default": false},
                "metadata": {"type": "object", "additionalProperties": {"type": "string"}},
            }),
            &["bucket", "key", "content"],
        ),
        ToolName::CopyObject => object_schema(
            json!({
                "source_bucket": bucket,
                "source_key": key,
                "dest_bucket": bucket,
                "dest_key": key,
            }),
            &["source_bucket", "source_key", "dest_bucket", "dest_key"],
        ),
        ToolName::PresignGetUrl => object_schema(
            json!({"bucket": bucket, "key": key, "expires_in_secs": expires}),
            &["bucket", "key"],
        ),
        ToolName::PresignPutUrl => object_schema(
            json!({
                "bucket": bucket,
                "key": key,
                "expires_in_secs": expires,
                "content_type": {"type": "string", "description": "Content type the upload must use"},
            }),
            &["bucket", "key"],
        ),
    }
}
