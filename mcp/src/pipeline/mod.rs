//! Per-invocation processing pipeline.
//!
//! Every tool call flows through, in order:
//! 1. [`InterceptorChain`]: access checks, first rejection wins
//! 2. [`MiddlewareChain`] before-hooks, registration order
//! 3. the tool handler
//! 4. [`MiddlewareChain`] after-hooks, reverse registration order
//! 5. [`ResultTransformerChain`], registration order
//!
//! The invocation's [`CancellationToken`] is handed to every stage untouched.

mod interceptor;
mod middleware;
mod transformer;

use std::sync::Arc;

use futures::future::BoxFuture;
pub use interceptor::{FnInterceptor, InterceptResult, Interceptor, InterceptorChain};
pub use middleware::{AfterOutcome, Middleware, MiddlewareChain};
use rmcp::model::CallToolResult;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
pub use transformer::{FnTransformer, ResultTransformer, ResultTransformerChain};

use crate::{context::ToolContext, error::McpResult};

/// Raw tool call as received from the runtime.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolRequest {
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolRequest {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Build from a JSON value; anything other than an object yields no arguments.
    pub fn from_value(name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(name, arguments)
    }

    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }

    pub fn bool_arg(&self, key: &str) -> Option<bool> {
        self.arguments.get(key).and_then(Value::as_bool)
    }
}

/// Tool implementation before pipeline wrapping.
pub type ToolHandlerFn = Arc<
    dyn Fn(CancellationToken, Arc<ToolContext>, ToolRequest) -> BoxFuture<'static, McpResult<CallToolResult>>
        + Send
        + Sync,
>;

/// Pipeline-wrapped handler as handed to the tool runtime.
pub type ToolHandler = Arc<
    dyn Fn(CancellationToken, ToolRequest) -> BoxFuture<'static, McpResult<CallToolResult>>
        + Send
        + Sync,
>;
