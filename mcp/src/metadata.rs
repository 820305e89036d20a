//! Per-tool presentation and behavior metadata.
//!
//! Six metadata kinds (description, annotations, title, icons, output schema,
//! size limits) resolve through three levels:
//! 1. per-call override given at registration time
//! 2. registry-wide override set when the toolkit is built
//! 3. the built-in default for the tool
//!
//! Resolution is a pure lookup. Unknown tool names resolve to `None` at every
//! level rather than failing.

use std::{collections::HashMap, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::{annotations::ToolAnnotations, pipeline::Middleware};

const MB: u64 = 1024 * 1024;

const BUCKET_ICON: &str = "data:image/svg+xml;utf8,<svg xmlns='http://www.w3.org/2000/svg' viewBox='0 0 24 24'><path d='M4 6h16l-2 14H6z' fill='none' stroke='currentColor' stroke-width='2'/></svg>";
const OBJECT_ICON: &str = "data:image/svg+xml;utf8,<svg xmlns='http://www.w3.org/2000/svg' viewBox='0 0 24 24'><path d='M6 2h9l5 5v15H6z' fill='none' stroke='currentColor' stroke-width='2'/></svg>";
const LINK_ICON: &str = "data:image/svg+xml;utf8,<svg xmlns='http://www.w3.org/2000/svg' viewBox='0 0 24 24'><path d='M10 14l4-4M8 12l-3 3a3 3 0 0 0 4 4l3-3M16 12l3-3a3 3 0 0 0-4-4l-3 3' fill='none' stroke='currentColor' stroke-width='2'/></svg>";
const SVG_MIME: &str = "image/svg+xml";

/// The fixed tool set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, EnumIter, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ToolName {
    ListBuckets,
    ListObjects,
    GetObject,
    GetObjectMetadata,
    PutObject,
    DeleteObject,
    CopyObject,
    PresignGetUrl,
    PresignPutUrl,
}

impl ToolName {
    pub fn all() -> Vec<ToolName> {
        Self::iter().collect()
    }

    pub fn parse(name: &str) -> Option<ToolName> {
        name.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolIcon {
    pub src: String,
    pub mime_type: Option<String>,
}

impl ToolIcon {
    pub fn new(src: impl Into<String>, mime_type: Option<&str>) -> Self {
        Self {
            src: src.into(),
            mime_type: mime_type.map(str::to_string),
        }
    }
}

/// Payload cap for tools that move object bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeLimits {
    pub max_bytes: u64,
}

impl SizeLimits {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

pub fn default_description(tool: ToolName) -> &'static str {
    match tool {
        ToolName::ListBuckets => "List all buckets available on the storage connection.",
        ToolName::ListObjects => {
            "List objects in a bucket, optionally filtered by prefix and grouped by delimiter. \
             Results are paginated with a continuation token."
        }
        ToolName::GetObject => {
            "Read an object's content. UTF-8 content is returned as text, anything else as base64."
        }
        ToolName::GetObjectMetadata => {
            "Read an object's size, content type, ETag and user metadata without downloading it."
        }
        ToolName::PutObject => {
            "Write an object. Content is taken as text unless is_base64 is set."
        }
        ToolName::DeleteObject => "Delete an object from a bucket.",
        ToolName::CopyObject => "Copy an object to a new bucket and/or key.",
        ToolName::PresignGetUrl => "Create a time-limited URL for downloading an object.",
        ToolName::PresignPutUrl => "Create a time-limited URL for uploading an object.",
    }
}

pub fn default_title(tool: ToolName) -> &'static str {
    match tool {
        ToolName::ListBuckets => "List Buckets",
        ToolName::ListObjects => "List Objects",
        ToolName::GetObject => "Get Object",
        ToolName::GetObjectMetadata => "Get Object Metadata",
        ToolName::PutObject => "Put Object",
        ToolName::DeleteObject => "Delete Object",
        ToolName::CopyObject => "Copy Object",
        ToolName::PresignGetUrl => "Presign Download URL",
        ToolName::PresignPutUrl => "Presign Upload URL",
    }
}

pub fn default_annotations(tool: ToolName) -> ToolAnnotations {
    match tool {
        ToolName::ListBuckets
        | ToolName::ListObjects
        | ToolName::GetObject
        | ToolName::GetObjectMetadata
        | ToolName::PresignGetUrl => ToolAnnotations::read(),
        ToolName::PutObject | ToolName::CopyObject => ToolAnnotations::write(),
        ToolName::DeleteObject => ToolAnnotations::write().with_destructive(true),
        // Not idempotent: every call mints a new URL.
        ToolName::PresignPutUrl => ToolAnnotations::write().with_idempotent(false),
    }
}

pub fn default_icons(tool: ToolName) -> Vec<ToolIcon> {
    let src = match tool {
        ToolName::ListBuckets | ToolName::ListObjects => BUCKET_ICON,
        ToolName::PresignGetUrl | ToolName::PresignPutUrl => LINK_ICON,
        _ => OBJECT_ICON,
    };
    vec![ToolIcon::new(src, Some(SVG_MIME))]
}

pub fn default_output_schema(tool: ToolName) -> Value {
    let nullable_string = json!({"type": ["string", "null"]});
    match tool {
        ToolName::ListBuckets => json!({
            "type": "object",
            "properties": {
                "buckets": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "creation_date": nullable_string,
                        },
                        "required": ["name"]
                    }
                }
            },
            "required": ["buckets"]
        }),
        ToolName::ListObjects => json!({
            "type": "object",
            "properties": {
                "objects": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "key": {"type": "string"},
                            "size": {"type": "integer"},
                            "etag": nullable_string,
                            "last_modified": nullable_string,
                        },
                        "required": ["key", "size"]
                    }
                },
                "common_prefixes": {"type": "array", "items": {"type": "string"}},
                "is_truncated": {"type": "boolean"},
                "next_continuation_token": nullable_string,
            },
            "required": ["objects", "common_prefixes", "is_truncated"]
        }),
        ToolName::GetObject => json!({
            "type": "object",
            "properties": {
                "bucket": {"type": "string"},
                "key": {"type": "string"},
                "content": {"type": "string"},
                "encoding": {"type": "string", "enum": ["text", "base64"]},
                "content_type": nullable_string,
                "size": {"type": "integer"},
                "etag": nullable_string,
                "last_modified": nullable_string,
            },
            "required": ["bucket", "key", "content", "encoding", "size"]
        }),
        ToolName::GetObjectMetadata => json!({
            "type": "object",
            "properties": {
                "bucket": {"type": "string"},
                "key": {"type": "string"},
                "size": {"type": "integer"},
                "content_type": nullable_string,
                "etag": nullable_string,
                "last_modified": nullable_string,
                "metadata": {"type": "object", "additionalProperties": {"type": "string"}},
            },
            "required": ["bucket", "key", "size", "metadata"]
        }),
        ToolName::PutObject => json!({
            "type": "object",
            "properties": {
                "bucket": {"type": "string"},
                "key": {"type": "string"},
                "size": {"type": "integer"},
                "etag": nullable_string,
                "version_id": nullable_string,
            },
            "required": ["bucket", "key", "size"]
        }),
        ToolName::DeleteObject => json!({
            "type": "object",
            "properties": {
                "bucket": {"type": "string"},
                "key": {"type": "string"},
                "deleted": {"type": "boolean"},
            },
            "required": ["bucket", "key", "deleted"]
        }),
        ToolName::CopyObject => json!({
            "type": "object",
            "properties": {
                "source_bucket": {"type": "string"},
                "source_key": {"type": "string"},
                "dest_bucket": {"type": "string"},
                "dest_key": {"type": "string"},
                "etag": nullable_string,
            },
            "required": ["source_bucket", "source_key", "dest_bucket", "dest_key"]
        }),
        ToolName::PresignGetUrl | ToolName::PresignPutUrl => json!({
            "type": "object",
            "properties": {
                "url": {"type": "string"},
                "expires_in_secs": {"type": "integer"},
            },
            "required": ["url", "expires_in_secs"]
        }),
    }
}

/// Only tools that move object bodies carry a default cap.
pub fn default_size_limits(tool: ToolName) -> Option<SizeLimits> {
    match tool {
        ToolName::GetObject => Some(SizeLimits::new(10 * MB)),
        ToolName::PutObject => Some(SizeLimits::new(100 * MB)),
        _ => None,
    }
}

/// Per-call overrides supplied with a single registration.
#[derive(Clone, Default)]
pub struct ToolOverrides {
    pub description: Option<String>,
    pub annotations: Option<ToolAnnotations>,
    pub title: Option<String>,
    pub icons: Option<Vec<ToolIcon>>,
    pub output_schema: Option<Value>,
    pub size_limits: Option<SizeLimits>,
    /// Appended after registry-wide and per-tool middleware.
    pub middleware: Vec<Arc<dyn Middleware>>,
}

impl ToolOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_annotations(mut self, annotations: ToolAnnotations) -> Self {
        self.annotations = Some(annotations);
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_icons(mut self, icons: Vec<ToolIcon>) -> Self {
        self.icons = Some(icons);
        self
    }

    #[must_use]
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    #[must_use]
    pub fn with_size_limits(mut self, limits: SizeLimits) -> Self {
        self.size_limits = Some(limits);
        self
    }

    #[must_use]
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }
}

impl fmt::Debug for ToolOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolOverrides")
            .field("description", &self.description)
            .field("annotations", &self.annotations)
            .field("title", &self.title)
            .field("icons", &self.icons)
            .field("output_schema", &self.output_schema.is_some())
            .field("size_limits", &self.size_limits)
            .field(
                "middleware",
                &self.middleware.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Registry-wide override tables, keyed by tool name.
#[derive(Debug, Clone, Default)]
pub struct MetadataOverrides {
    pub descriptions: HashMap<String, String>,
    pub annotations: HashMap<String, ToolAnnotations>,
    pub titles: HashMap<String, String>,
    pub icons: HashMap<String, Vec<ToolIcon>>,
    pub output_schemas: HashMap<String, Value>,
    pub size_limits: HashMap<String, SizeLimits>,
}

/// Fully resolved metadata for one tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolMetadata {
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub annotations: Option<ToolAnnotations>,
    pub icons: Option<Vec<ToolIcon>>,
    pub output_schema: Option<Value>,
    pub size_limits: Option<SizeLimits>,
}

fn resolve<T: Clone>(
    per_call: Option<&T>,
    registry: &HashMap<String, T>,
    tool: &str,
    default: impl FnOnce(ToolName) -> Option<T>,
) -> Option<T> {
    per_call
        .cloned()
        .or_else(|| registry.get(tool).cloned())
        .or_else(|| ToolName::parse(tool).and_then(default))
}

impl MetadataOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_description(mut self, tool: impl Into<String>, v: impl Into<String>) -> Self {
        self.descriptions.insert(tool.into(), v.into());
        self
    }

    #[must_use]
    pub fn with_annotations(mut self, tool: impl Into<String>, v: ToolAnnotations) -> Self {
        self.annotations.insert(tool.into(), v);
        self
    }

    #[must_use]
    pub fn with_title(mut self, tool: impl Into<String>, v: impl Into<String>) -> Self {
        self.titles.insert(tool.into(), v.into());
        self
    }

    #[must_use]
    pub fn with_icons(mut self, tool: impl Into<String>, v: Vec<ToolIcon>) -> Self {
        self.icons.insert(tool.into(), v);
        self
    }

    #[must_use]
    pub fn with_output_schema(mut self, tool: impl Into<String>, v: Value) -> Self {
        self.output_schemas.insert(tool.into(), v);
        self
    }

    #[must_use]
    pub fn with_size_limits(mut self, tool: impl Into<String>, v: SizeLimits) -> Self {
        self.size_limits.insert(tool.into(), v);
        self
    }

    pub fn description(&self, tool: &str, per_call: Option<&ToolOverrides>) -> Option<String> {
        resolve(
            per_call.and_then(|o| o.description.as_ref()),
            &self.descriptions,
            tool,
            |t| Some(default_description(t).to_string()),
        )
    }

    pub fn annotations(
        &self,
        tool: &str,
        per_call: Option<&ToolOverrides>,
    ) -> Option<ToolAnnotations> {
        resolve(
            per_call.and_then(|o| o.annotations.as_ref()),
            &self.annotations,
            tool,
            |t| Some(default_annotations(t)),
        )
    }

    pub fn title(&self, tool: &str, per_call: Option<&ToolOverrides>) -> Option<String> {
        resolve(
            per_call.and_then(|o| o.title.as_ref()),
            &self.titles,
            tool,
            |t| Some(default_title(t).to_string()),
        )
    }

    pub fn icons(&self, tool: &str, per_call: Option<&ToolOverrides>) -> Option<Vec<ToolIcon>> {
        resolve(
            per_call.and_then(|o| o.icons.as_ref()),
            &self.icons,
            tool,
            |t| Some(default_icons(t)),
        )
    }

    pub fn output_schema(&self, tool: &str, per_call: Option<&ToolOverrides>) -> Option<Value> {
        resolve(
            per_call.and_then(|o| o.output_schema.as_ref()),
            &self.output_schemas,
            tool,
            |t| Some(default_output_schema(t)),
        )
    }

    pub fn size_limits(
        &self,
        tool: &str,
        per_call: Option<&ToolOverrides>,
    ) -> Option<SizeLimits> {
        resolve(
            per_call.and_then(|o| o.size_limits.as_ref()),
            &self.size_limits,
            tool,
            default_size_limits,
        )
    }

    pub fn resolve(&self, tool: &str, per_call: Option<&ToolOverrides>) -> ToolMetadata {
        ToolMetadata {
            name: tool.to_string(),
            title: self.title(tool, per_call),
            description: self.description(tool, per_call),
            annotations: self.annotations(tool, per_call),
            icons: self.icons(tool, per_call),
            output_schema: self.output_schema(tool, per_call),
            size_limits: self.size_limits(tool, per_call),
        }
    }
}
