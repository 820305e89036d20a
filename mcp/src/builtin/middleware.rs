//! Built-in observers: logging, audit, metrics.

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::CallToolResult;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::audit::{AuditEntry, AuditLog, AuditOutcome};
use crate::{
    context::ToolContext,
    core::ToolMetrics,
    error::{McpError, McpResult},
    pipeline::Middleware,
};

fn is_failure(result: &CallToolResult, error: Option<&McpError>) -> bool {
    error.is_some() || result.is_error == Some(true)
}

/// One start and one finish event per tool call.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    async fn before(&self, _ct: &CancellationToken, ctx: &ToolContext) -> McpResult<()> {
        info!(
            tool = %ctx.tool_name(),
            connection = %ctx.connection_name(),
            request_id = %ctx.request_id(),
            "Tool call started"
        );
        Ok(())
    }

    async fn after(
        &self,
        _ct: &CancellationToken,
        ctx: &ToolContext,
        result: &mut CallToolResult,
        error: Option<&McpError>,
    ) -> McpResult<()> {
        let duration_ms = ctx.elapsed().as_millis() as u64;
        if is_failure(result, error) {
            warn!(
                tool = %ctx.tool_name(),
                connection = %ctx.connection_name(),
                request_id = %ctx.request_id(),
                duration_ms,
                error = %error.map(ToString::to_string).unwrap_or_default(),
                "Tool call failed"
            );
        } else {
            info!(
                tool = %ctx.tool_name(),
                connection = %ctx.connection_name(),
                request_id = %ctx.request_id(),
                duration_ms,
                "Tool call finished"
            );
        }
        Ok(())
    }
}

/// Appends one [`AuditEntry`] per tool call.
#[derive(Debug, Clone)]
pub struct AuditMiddleware {
    log: Arc<AuditLog>,
}

impl AuditMiddleware {
    pub fn new(log: Arc<AuditLog>) -> Self {
        Self { log }
    }

    pub fn log(&self) -> &Arc<AuditLog> {
        &self.log
    }
}

#[async_trait]
impl Middleware for AuditMiddleware {
    fn name(&self) -> &str {
        "audit"
    }

    async fn after(
        &self,
        _ct: &CancellationToken,
        ctx: &ToolContext,
        result: &mut CallToolResult,
        error: Option<&McpError>,
    ) -> McpResult<()> {
        let outcome = match error {
            Some(err) => AuditOutcome::Failure {
                error: err.to_string(),
            },
            None if result.is_error == Some(true) => AuditOutcome::Failure {
                error: "tool returned an error result".to_string(),
            },
            None => AuditOutcome::Success,
        };

        let bucket = ctx
            .argument_str("bucket")
            .or_else(|| ctx.argument_str("source_bucket"));
        let key = ctx
            .argument_str("key")
            .or_else(|| ctx.argument_str("source_key"));

        let entry = AuditEntry::new(
            ctx.request_id(),
            ctx.tool_name(),
            ctx.connection_name(),
            outcome,
        )
        .with_target(bucket, key)
        .with_duration_ms(ctx.elapsed().as_millis() as u64);

        info!(
            target: "objstore_mcp::audit",
            request_id = %entry.request_id,
            tool = %entry.tool_name,
            connection = %entry.connection,
            bucket = entry.bucket.as_deref().unwrap_or(""),
            key = entry.key.as_deref().unwrap_or(""),
            success = entry.outcome.is_success(),
            "audit"
        );
        self.log.record(entry);
        Ok(())
    }
}

/// Records completed calls in [`ToolMetrics`].
///
/// Calls aborted by an earlier `before` hook never reach `after` and are not
/// counted. The in-flight gauge is owned by the [`Toolkit`](crate::Toolkit).
#[derive(Clone)]
pub struct MetricsMiddleware {
    metrics: Arc<ToolMetrics>,
}

impl MetricsMiddleware {
    pub fn new(metrics: Arc<ToolMetrics>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &Arc<ToolMetrics> {
        &self.metrics
    }
}

#[async_trait]
impl Middleware for MetricsMiddleware {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn after(
        &self,
        _ct: &CancellationToken,
        ctx: &ToolContext,
        result: &mut CallToolResult,
        error: Option<&McpError>,
    ) -> McpResult<()> {
        self.metrics.record_call(
            ctx.tool_name(),
            !is_failure(result, error),
            ctx.elapsed().as_millis() as u64,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rmcp::model::Content;
    use serde_json::json;

    use super::*;
    use crate::context::keys;

    fn ctx_with_args(tool: &str, args: serde_json::Value) -> ToolContext {
        let ctx = ToolContext::for_tool(tool, "primary");
        ctx.set(
            keys::REQUEST_ARGUMENTS,
            args.as_object().cloned().unwrap_or_default(),
        );
        ctx
    }

    #[tokio::test]
    async fn test_audit_records_target_and_outcome() {
        let log = Arc::new(AuditLog::new());
        let middleware = AuditMiddleware::new(log.clone());
        let ct = CancellationToken::new();

        let ctx = ctx_with_args("get_object", json!({"bucket": "docs", "key": "a.txt"}));
        let mut ok = CallToolResult::success(vec![Content::text("hi")]);
        middleware.after(&ct, &ctx, &mut ok, None).await.unwrap();

        let ctx = ctx_with_args(
            "copy_object",
            json!({"source_bucket": "docs", "source_key": "b.txt"}),
        );
        let err = McpError::ResourceNotFound("b.txt".to_string());
        let mut failed = err.to_call_result();
        middleware
            .after(&ct, &ctx, &mut failed, Some(&err))
            .await
            .unwrap();

        let entries = log.recent(10);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].tool_name, "get_object");
        assert_eq!(entries[1].bucket.as_deref(), Some("docs"));
        assert_eq!(entries[1].key.as_deref(), Some("a.txt"));
        assert!(entries[1].outcome.is_success());
        assert_eq!(entries[0].bucket.as_deref(), Some("docs"));
        assert_eq!(
            entries[0].outcome,
            AuditOutcome::Failure {
                error: "resource not found: b.txt".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_metrics_counts_error_results() {
        let metrics = Arc::new(ToolMetrics::new());
        let middleware = MetricsMiddleware::new(metrics.clone());
        let ct = CancellationToken::new();
        let ctx = ToolContext::for_tool("put_object", "primary");

        middleware.before(&ct, &ctx).await.unwrap();
        assert_eq!(metrics.snapshot().active_calls, 0);
        let mut result = McpError::handler("boom").to_call_result();
        middleware.after(&ct, &ctx, &mut result, None).await.unwrap();

        let stats = metrics.tool_stats("put_object").unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(metrics.snapshot().total_calls, 1);
        assert_eq!(metrics.snapshot().active_calls, 0);
    }

    #[tokio::test]
    async fn test_logging_never_fails() {
        let middleware = LoggingMiddleware::new();
        let ct = CancellationToken::new();
        let ctx = ToolContext::for_tool("list_buckets", "primary");
        middleware.before(&ct, &ctx).await.unwrap();
        let mut result = CallToolResult::success(vec![]);
        middleware
            .after(&ct, &ctx, &mut result, Some(&McpError::handler("x")))
            .await
            .unwrap();
    }
}
