//! Result transformer chain: post-processing of the final result.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use rmcp::model::CallToolResult;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{context::ToolContext, error::McpResult};

#[async_trait]
pub trait ResultTransformer: Send + Sync {
    fn name(&self) -> &str;

    async fn transform(
        &self,
        ct: &CancellationToken,
        ctx: &ToolContext,
        result: CallToolResult,
    ) -> McpResult<CallToolResult>;
}

type TransformFn = dyn Fn(&ToolContext, CallToolResult) -> McpResult<CallToolResult> + Send + Sync;

/// Transformer backed by a synchronous closure.
pub struct FnTransformer {
    name: String,
    func: Box<TransformFn>,
}

impl FnTransformer {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&ToolContext, CallToolResult) -> McpResult<CallToolResult> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

#[async_trait]
impl ResultTransformer for FnTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn transform(
        &self,
        _ct: &CancellationToken,
        ctx: &ToolContext,
        result: CallToolResult,
    ) -> McpResult<CallToolResult> {
        (self.func)(ctx, result)
    }
}

#[derive(Clone, Default)]
pub struct ResultTransformerChain {
    transformers: Vec<Arc<dyn ResultTransformer>>,
}

impl ResultTransformerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transformer: Arc<dyn ResultTransformer>) {
        self.transformers.push(transformer);
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.transformers
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    /// Apply every transformer in order. The first error discards the result.
    pub async fn transform(
        &self,
        ct: &CancellationToken,
        ctx: &ToolContext,
        mut result: CallToolResult,
    ) -> McpResult<CallToolResult> {
        for transformer in &self.transformers {
            result = transformer.transform(ct, ctx, result).await.map_err(|err| {
                debug!(
                    transformer = %transformer.name(),
                    tool = %ctx.tool_name(),
                    request_id = %ctx.request_id(),
                    error = %err,
                    "Result transform failed"
                );
                err
            })?;
        }
        Ok(result)
    }
}

impl fmt::Debug for ResultTransformerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
