//! Middleware chain: before/after hooks around the handler.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use rmcp::model::CallToolResult;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    context::ToolContext,
    error::{McpError, McpResult},
};

#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    /// Runs before the handler. An error aborts the invocation.
    async fn before(&self, _ct: &CancellationToken, _ctx: &ToolContext) -> McpResult<()> {
        Ok(())
    }

    /// Runs after the handler with the current result and the error seen so far.
    ///
    /// May rewrite `result` in place. Returning an error replaces the error
    /// handed to the remaining (outer) after-hooks.
    async fn after(
        &self,
        _ct: &CancellationToken,
        _ctx: &ToolContext,
        _result: &mut CallToolResult,
        _error: Option<&McpError>,
    ) -> McpResult<()> {
        Ok(())
    }
}

/// State after every after-hook ran.
#[derive(Debug, Clone, Default)]
pub struct AfterOutcome {
    /// Final propagated error: the handler's, or the last one an after-hook raised.
    pub error: Option<McpError>,
    /// Whether any after-hook returned an error.
    pub after_failed: bool,
}

#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middleware: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.middleware.push(middleware);
    }

    /// Concatenate several middleware sets, preserving order.
    pub fn union<'a, I>(parts: I) -> Self
    where
        I: IntoIterator<Item = &'a [Arc<dyn Middleware>]>,
    {
        Self {
            middleware: parts.into_iter().flatten().cloned().collect(),
        }
    }

    pub fn as_slice(&self) -> &[Arc<dyn Middleware>] {
        &self.middleware
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.middleware.iter().map(|m| m.name().to_string()).collect()
    }

    /// Before-hooks in registration order; the first error is returned as-is.
    pub async fn before(&self, ct: &CancellationToken, ctx: &ToolContext) -> McpResult<()> {
        for middleware in &self.middleware {
            if let Err(err) = middleware.before(ct, ctx).await {
                debug!(
                    middleware = %middleware.name(),
                    tool = %ctx.tool_name(),
                    request_id = %ctx.request_id(),
                    error = %err,
                    "Before hook failed"
                );
                return Err(err);
            }
        }
        Ok(())
    }

    /// After-hooks in reverse registration order. Every hook runs.
    pub async fn after(
        &self,
        ct: &CancellationToken,
        ctx: &ToolContext,
        result: &mut CallToolResult,
        error: Option<McpError>,
    ) -> AfterOutcome {
        let mut outcome = AfterOutcome {
            error,
            after_failed: false,
        };

        for middleware in self.middleware.iter().rev() {
            if let Err(err) = middleware
                .after(ct, ctx, result, outcome.error.as_ref())
                .await
            {
                debug!(
                    middleware = %middleware.name(),
                    tool = %ctx.tool_name(),
                    request_id = %ctx.request_id(),
                    error = %err,
                    "After hook failed"
                );
                outcome.error = Some(err);
                outcome.after_failed = true;
            }
        }

        outcome
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
