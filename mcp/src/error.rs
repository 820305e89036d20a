//! Tool dispatch error types.
//!
//! One variant per failure kind a tool invocation can surface. Every variant
//! renders into the same error-result envelope at the runtime boundary.

use objstore_storage::StorageError;
use rmcp::model::{CallToolResult, Content};
use thiserror::Error;

pub type McpResult<T> = Result<T, McpError>;

#[derive(Debug, Clone, Error)]
pub enum McpError {
    #[error("read-only mode: tool '{0}' is not permitted")]
    ReadOnlyViolation(String),

    #[error("size limit exceeded: {actual} bytes exceeds maximum of {limit} bytes")]
    SizeLimitExceeded { actual: u64, limit: u64 },

    #[error("missing required parameter: {0}")]
    MissingParameter(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("connection already exists: {0}")]
    ConnectionExists(String),

    #[error("connection '{name}' failed: {source}")]
    ConnectionFailed {
        name: String,
        #[source]
        source: StorageError,
    },

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("transform failed: {0}")]
    TransformFailure(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("{0}")]
    HandlerFailure(String),
}

impl McpError {
    pub fn handler(message: impl Into<String>) -> Self {
        Self::HandlerFailure(message.into())
    }

    /// Render as the error-result envelope returned to the runtime.
    pub fn to_call_result(&self) -> CallToolResult {
        error_result(self.to_string())
    }
}

impl From<StorageError> for McpError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => McpError::ResourceNotFound(what),
            StorageError::TooLarge { actual, limit } => {
                McpError::SizeLimitExceeded { actual, limit }
            }
            other => McpError::HandlerFailure(other.to_string()),
        }
    }
}

/// Structured error result: `is_error = true` plus an `Error: ...` message.
pub fn error_result(message: impl AsRef<str>) -> CallToolResult {
    CallToolResult::error(vec![Content::text(format!("Error: {}", message.as_ref()))])
}
