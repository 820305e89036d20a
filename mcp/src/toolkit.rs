//! Tool registry and dispatcher.
//!
//! The [`Toolkit`] owns the interceptor, middleware and transformer chains,
//! resolves per-tool metadata, and hands pipeline-wrapped handlers to a
//! [`ToolRuntime`].

use std::{
    borrow::Cow,
    collections::{HashMap, HashSet},
    sync::Arc,
};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use rmcp::model::{CallToolResult, Icon, Tool};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, info, warn, Instrument};

use crate::{
    builtin::{
        AuditLog, AuditMiddleware, LoggingMiddleware, MetricsMiddleware, PrefixAclInterceptor,
        ReadOnlyInterceptor, SizeLimitInterceptor, TextLimitTransformer,
    },
    context::{keys, ToolContext},
    core::{ConnectionManager, ServerConfig, ToolMetrics},
    error::{McpError, McpResult},
    metadata::{MetadataOverrides, ToolIcon, ToolMetadata, ToolName, ToolOverrides},
    pipeline::{
        Interceptor, InterceptorChain, Middleware, MiddlewareChain, ResultTransformer,
        ResultTransformerChain, ToolHandler, ToolHandlerFn, ToolRequest,
    },
    tools,
};

/// Destination for registered tools.
pub trait ToolRuntime: Send + Sync {
    fn add_tool(&self, tool: Tool, handler: ToolHandler);
}

/// Chains plus the connection manager, shared by every wrapped handler of one tool.
struct Pipeline {
    manager: Arc<ConnectionManager>,
    interceptors: InterceptorChain,
    middleware: MiddlewareChain,
    transformers: ResultTransformerChain,
    metrics: Option<Arc<ToolMetrics>>,
}

impl Pipeline {
    fn is_passthrough(&self) -> bool {
        self.interceptors.is_empty() && self.middleware.is_empty() && self.transformers.is_empty()
    }

    fn connection_for(&self, request: &ToolRequest) -> String {
        request
            .str_arg("connection")
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.manager.default_connection_name())
    }

    async fn run(
        &self,
        ct: CancellationToken,
        handler: &ToolHandlerFn,
        request: ToolRequest,
    ) -> McpResult<CallToolResult> {
        let _active = self.metrics.as_deref().map(ToolMetrics::track_active);
        let ctx = Arc::new(ToolContext::for_tool(
            request.name.clone(),
            self.connection_for(&request),
        ));

        if self.is_passthrough() {
            return handler(ct, ctx, request).await;
        }

        let span = debug_span!(
            "tool_call",
            tool = %ctx.tool_name(),
            connection = %ctx.connection_name(),
            request_id = %ctx.request_id(),
        );
        self.run_chains(ct, ctx, handler, request)
            .instrument(span)
            .await
    }

    async fn run_chains(
        &self,
        ct: CancellationToken,
        ctx: Arc<ToolContext>,
        handler: &ToolHandlerFn,
        request: ToolRequest,
    ) -> McpResult<CallToolResult> {
        let verdict = self.interceptors.intercept(&ct, &ctx, &request).await;
        if !verdict.allow {
            return Err(McpError::AccessDenied(verdict.reason));
        }
        let request = verdict.modified_request.unwrap_or(request);
        ctx.set(keys::REQUEST_ARGUMENTS, request.arguments.clone());

        self.middleware.before(&ct, &ctx).await?;

        let (mut result, error) = match handler(ct.clone(), Arc::clone(&ctx), request).await {
            Ok(result) => (result, None),
            Err(err) => (err.to_call_result(), Some(err)),
        };

        let outcome = self.middleware.after(&ct, &ctx, &mut result, error).await;
        if outcome.after_failed {
            if let Some(err) = outcome.error {
                return Err(err);
            }
        }

        self.transformers.transform(&ct, &ctx, result).await
    }
}

pub struct Toolkit {
    manager: Arc<ConnectionManager>,
    interceptors: InterceptorChain,
    middleware: Vec<Arc<dyn Middleware>>,
    tool_middleware: HashMap<String, Vec<Arc<dyn Middleware>>>,
    transformers: ResultTransformerChain,
    overrides: MetadataOverrides,
    disabled: HashSet<String>,
    enabled_only: Option<HashSet<String>>,
    registered: Mutex<HashSet<String>>,
    audit_log: Option<Arc<AuditLog>>,
    metrics: Option<Arc<ToolMetrics>>,
}

impl Toolkit {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self {
            manager,
            interceptors: InterceptorChain::new(),
            middleware: Vec::new(),
            tool_middleware: HashMap::new(),
            transformers: ResultTransformerChain::new(),
            overrides: MetadataOverrides::new(),
            disabled: HashSet::new(),
            enabled_only: None,
            registered: Mutex::new(HashSet::new()),
            audit_log: None,
            metrics: None,
        }
    }

    /// Toolkit with the built-in extensions the configuration enables.
    ///
    /// Interceptor order: read-only, size limits, prefix ACL. Middleware
    /// order: logging, metrics, audit.
    pub fn from_config(config: &ServerConfig, manager: Arc<ConnectionManager>) -> Self {
        let mut toolkit = Self::new(manager);

        if config.read_only {
            toolkit = toolkit.with_interceptor(Arc::new(ReadOnlyInterceptor::new()));
        }
        if config.enable_size_limits {
            toolkit = toolkit.with_interceptor(Arc::new(SizeLimitInterceptor::new(
                config.max_get_size,
                config.max_put_size,
            )));
        }
        if config.enable_prefix_acl {
            if config.prefix_acl.is_empty() {
                warn!("Prefix ACL enabled without rules; every bucket is denied");
            }
            toolkit = toolkit.with_interceptor(Arc::new(PrefixAclInterceptor::new(
                config.prefix_acl.clone(),
            )));
        }

        if config.enable_logging {
            toolkit = toolkit.with_middleware(Arc::new(LoggingMiddleware::new()));
        }
        if config.enable_metrics {
            toolkit = toolkit.with_metrics(Arc::new(ToolMetrics::new()));
        }
        if config.enable_audit {
            let log = Arc::new(AuditLog::new());
            toolkit = toolkit.with_middleware(Arc::new(AuditMiddleware::new(log.clone())));
            toolkit.audit_log = Some(log);
        }

        if config.max_text_length > 0 {
            toolkit =
                toolkit.with_transformer(Arc::new(TextLimitTransformer::new(config.max_text_length)));
        }

        if !config.enabled_tools.is_empty() {
            toolkit = toolkit.enable_only(config.enabled_tools.iter().cloned());
        }
        toolkit.disable_tools(config.disabled_tools.iter().cloned())
    }

    #[must_use]
    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Registry-wide middleware, applied to every tool.
    #[must_use]
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Registry-wide [`MetricsMiddleware`] plus the in-flight gauge, which is
    /// held for the whole wrapped call so it is released on every exit path.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<ToolMetrics>) -> Self {
        self.middleware
            .push(Arc::new(MetricsMiddleware::new(Arc::clone(&metrics))));
        self.metrics = Some(metrics);
        self
    }

    /// Middleware applied to one tool, after the registry-wide set.
    #[must_use]
    pub fn with_tool_middleware(
        mut self,
        tool: impl Into<String>,
        middleware: Arc<dyn Middleware>,
    ) -> Self {
        self.tool_middleware
            .entry(tool.into())
            .or_default()
            .push(middleware);
        self
    }

    #[must_use]
    pub fn with_transformer(mut self, transformer: Arc<dyn ResultTransformer>) -> Self {
        self.transformers.push(transformer);
        self
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: MetadataOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    #[must_use]
    pub fn disable_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled.extend(tools.into_iter().map(Into::into));
        self
    }

    /// Disable every tool not listed.
    #[must_use]
    pub fn enable_only<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_only = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn overrides(&self) -> &MetadataOverrides {
        &self.overrides
    }

    pub fn audit_log(&self) -> Option<&Arc<AuditLog>> {
        self.audit_log.as_ref()
    }

    pub fn metrics(&self) -> Option<&Arc<ToolMetrics>> {
        self.metrics.as_ref()
    }

    pub fn is_disabled(&self, tool: &str) -> bool {
        self.disabled.contains(tool)
            || self
                .enabled_only
                .as_ref()
                .is_some_and(|allowed| !allowed.contains(tool))
    }

    pub fn is_registered(&self, tool: &str) -> bool {
        self.registered.lock().contains(tool)
    }

    /// Metadata as it would be advertised for `tool`.
    pub fn resolve_metadata(&self, tool: &str, per_call: Option<&ToolOverrides>) -> ToolMetadata {
        self.overrides.resolve(tool, per_call)
    }

    /// Register tools by name. Returns how many were newly registered.
    pub fn register(&self, runtime: &dyn ToolRuntime, tools: &[&str]) -> McpResult<usize> {
        let mut added = 0;
        for name in tools {
            if self.register_one(runtime, name, None)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Register one tool with per-call overrides.
    pub fn register_with(
        &self,
        runtime: &dyn ToolRuntime,
        tool: &str,
        overrides: ToolOverrides,
    ) -> McpResult<bool> {
        self.register_one(runtime, tool, Some(&overrides))
    }

    pub fn register_all(&self, runtime: &dyn ToolRuntime) -> McpResult<usize> {
        let names: Vec<String> = ToolName::all().iter().map(ToString::to_string).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        self.register(runtime, &names)
    }

    fn register_one(
        &self,
        runtime: &dyn ToolRuntime,
        name: &str,
        per_call: Option<&ToolOverrides>,
    ) -> McpResult<bool> {
        let tool = ToolName::parse(name).ok_or_else(|| McpError::ToolNotFound(name.to_string()))?;

        if self.is_disabled(name) {
            debug!(tool = %name, "Tool disabled, skipping registration");
            return Ok(false);
        }

        let mut registered = self.registered.lock();
        if !registered.insert(name.to_string()) {
            return Ok(false);
        }

        let metadata = self.resolve_metadata(name, per_call);
        let handler = tools::handler(tool, Arc::clone(&self.manager), metadata.size_limits);
        let wrapped = self.wrap(name, handler, per_call.map(|o| o.middleware.as_slice()));
        runtime.add_tool(build_tool(tool, metadata), wrapped);

        info!(tool = %name, "Tool registered");
        Ok(true)
    }

    fn wrap(
        &self,
        name: &str,
        handler: ToolHandlerFn,
        per_call: Option<&[Arc<dyn Middleware>]>,
    ) -> ToolHandler {
        let middleware = MiddlewareChain::union([
            self.middleware.as_slice(),
            self.tool_middleware
                .get(name)
                .map(Vec::as_slice)
                .unwrap_or_default(),
            per_call.unwrap_or_default(),
        ]);
        let pipeline = Arc::new(Pipeline {
            manager: Arc::clone(&self.manager),
            interceptors: self.interceptors.clone(),
            middleware,
            transformers: self.transformers.clone(),
            metrics: self.metrics.clone(),
        });

        Arc::new(
            move |ct: CancellationToken,
                  request: ToolRequest|
                  -> BoxFuture<'static, McpResult<CallToolResult>> {
                let pipeline = Arc::clone(&pipeline);
                let handler = Arc::clone(&handler);
                Box::pin(async move { pipeline.run(ct, &handler, request).await })
            },
        )
    }
}

fn to_rmcp_icon(icon: &ToolIcon) -> Option<Icon> {
    serde_json::from_value(json!({
        "src": icon.src,
        "mimeType": icon.mime_type,
    }))
    .ok()
}

fn build_tool(tool: ToolName, metadata: ToolMetadata) -> Tool {
    let output_schema = match metadata.output_schema {
        Some(Value::Object(schema)) => Some(Arc::new(schema)),
        _ => None,
    };

    Tool {
        name: Cow::Owned(metadata.name),
        title: metadata.title.clone(),
        description: metadata.description.map(Cow::Owned),
        input_schema: Arc::new(tools::params::input_schema(tool)),
        output_schema,
        annotations: metadata.annotations.map(|a| a.to_rmcp(metadata.title)),
        icons: metadata
            .icons
            .map(|icons| icons.iter().filter_map(to_rmcp_icon).collect()),
    }
}

#[cfg(test)]
mod tests {
    use objstore_storage::{ConnectionConfig, MemoryStorageClient, StorageClient};
    use parking_lot::RwLock;
    use rmcp::model::Content;
    use serde_json::json;

    use super::*;
    use async_trait::async_trait;

    use crate::{
        annotations::ToolAnnotations,
        core::{ClientFactory, ConnectionRecord},
        pipeline::{FnInterceptor, FnTransformer, InterceptResult},
    };

    /// Fails `before` after noting how many calls are in flight.
    struct RejectBefore {
        metrics: Arc<ToolMetrics>,
        active_seen: Arc<Mutex<Vec<u64>>>,
    }

    #[async_trait]
    impl Middleware for RejectBefore {
        fn name(&self) -> &str {
            "reject"
        }

        async fn before(&self, _ct: &CancellationToken, _ctx: &ToolContext) -> McpResult<()> {
            self.active_seen
                .lock()
                .push(self.metrics.snapshot().active_calls);
            Err(McpError::handler("quota exhausted"))
        }
    }

    /// Notes the token state at every pipeline stage.
    #[derive(Clone, Default)]
    struct CancelWitness {
        stages: Arc<Mutex<Vec<(&'static str, bool)>>>,
    }

    #[async_trait]
    impl Interceptor for CancelWitness {
        fn name(&self) -> &str {
            "witness"
        }

        async fn intercept(
            &self,
            ct: &CancellationToken,
            _ctx: &ToolContext,
            _request: &ToolRequest,
        ) -> InterceptResult {
            self.stages.lock().push(("intercept", ct.is_cancelled()));
            InterceptResult::allow()
        }
    }

    #[async_trait]
    impl Middleware for CancelWitness {
        fn name(&self) -> &str {
            "witness"
        }

        async fn before(&self, ct: &CancellationToken, _ctx: &ToolContext) -> McpResult<()> {
            self.stages.lock().push(("before", ct.is_cancelled()));
            Ok(())
        }

        async fn after(
            &self,
            ct: &CancellationToken,
            _ctx: &ToolContext,
            _result: &mut CallToolResult,
            _error: Option<&McpError>,
        ) -> McpResult<()> {
            self.stages.lock().push(("after", ct.is_cancelled()));
            Ok(())
        }
    }

    #[async_trait]
    impl ResultTransformer for CancelWitness {
        fn name(&self) -> &str {
            "witness"
        }

        async fn transform(
            &self,
            ct: &CancellationToken,
            _ctx: &ToolContext,
            result: CallToolResult,
        ) -> McpResult<CallToolResult> {
            self.stages.lock().push(("transform", ct.is_cancelled()));
            Ok(result)
        }
    }

    #[derive(Default)]
    struct Recorder {
        tools: RwLock<Vec<(Tool, ToolHandler)>>,
    }

    impl ToolRuntime for Recorder {
        fn add_tool(&self, tool: Tool, handler: ToolHandler) {
            self.tools.write().push((tool, handler));
        }
    }

    impl Recorder {
        fn names(&self) -> Vec<String> {
            self.tools
                .read()
                .iter()
                .map(|(t, _)| t.name.to_string())
                .collect()
        }

        fn handler(&self, name: &str) -> ToolHandler {
            self.tools
                .read()
                .iter()
                .find(|(t, _)| t.name == name)
                .map(|(_, h)| Arc::clone(h))
                .unwrap()
        }

        fn tool(&self, name: &str) -> Tool {
            self.tools
                .read()
                .iter()
                .find(|(t, _)| t.name == name)
                .map(|(t, _)| t.clone())
                .unwrap()
        }
    }

    fn manager() -> Arc<ConnectionManager> {
        let factory: ClientFactory = Arc::new(|record: &ConnectionRecord| {
            let client: Arc<dyn StorageClient> = Arc::new(
                MemoryStorageClient::new(record.name.clone(), record.config.clone())
                    .with_bucket("docs"),
            );
            Ok(client)
        });
        Arc::new(ConnectionManager::new(
            vec![
                ConnectionRecord::new("first", ConnectionConfig::memory()),
                ConnectionRecord::new("second", ConnectionConfig::memory()),
            ],
            None,
            factory,
        ))
    }

    #[test]
    fn test_register_is_idempotent() {
        let toolkit = Toolkit::new(manager());
        let runtime = Recorder::default();

        assert_eq!(toolkit.register(&runtime, &["list_buckets", "get_object"]).unwrap(), 2);
        assert_eq!(toolkit.register(&runtime, &["list_buckets"]).unwrap(), 0);
        assert_eq!(runtime.names(), vec!["list_buckets", "get_object"]);
    }

    #[test]
    fn test_unknown_tool_rejected() {
        let toolkit = Toolkit::new(manager());
        let err = toolkit
            .register(&Recorder::default(), &["drop_bucket"])
            .unwrap_err();
        assert!(matches!(err, McpError::ToolNotFound(_)));
    }

    #[test]
    fn test_disable_and_enable_only() {
        let runtime = Recorder::default();
        let toolkit = Toolkit::new(manager()).disable_tools(["delete_object"]);
        toolkit.register_all(&runtime).unwrap();
        assert_eq!(runtime.names().len(), 8);
        assert!(!runtime.names().contains(&"delete_object".to_string()));

        let runtime = Recorder::default();
        let toolkit = Toolkit::new(manager())
            .enable_only(["get_object", "put_object"])
            .disable_tools(["put_object"]);
        toolkit.register_all(&runtime).unwrap();
        assert_eq!(runtime.names(), vec!["get_object"]);
    }

    #[test]
    fn test_advertised_metadata() {
        let runtime = Recorder::default();
        let toolkit = Toolkit::new(manager()).with_overrides(
            MetadataOverrides::new().with_description("get_object", "Fetch a document"),
        );
        toolkit.register(&runtime, &["get_object"]).unwrap();
        toolkit
            .register_with(
                &runtime,
                "delete_object",
                ToolOverrides::new()
                    .with_title("Remove")
                    .with_annotations(ToolAnnotations::write().with_destructive(false)),
            )
            .unwrap();

        let get = runtime.tool("get_object");
        assert_eq!(get.description.as_deref(), Some("Fetch a document"));
        assert_eq!(get.title.as_deref(), Some("Get Object"));
        assert!(get.output_schema.is_some());
        assert_eq!(get.icons.as_ref().map(Vec::len), Some(1));
        assert_eq!(get.annotations.unwrap().read_only_hint, Some(true));

        let delete = runtime.tool("delete_object");
        assert_eq!(delete.title.as_deref(), Some("Remove"));
        assert_eq!(delete.annotations.unwrap().destructive_hint, Some(false));
    }

    #[tokio::test]
    async fn test_interceptor_block_skips_everything() {
        let handled = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let seen = handled.clone();
        let runtime = Recorder::default();
        let toolkit = Toolkit::new(manager())
            .with_interceptor(Arc::new(FnInterceptor::new("deny", |_, _| {
                InterceptResult::deny("maintenance window")
            })))
            .with_transformer(Arc::new(FnTransformer::new("flag", move |_, r| {
                seen.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(r)
            })));
        toolkit.register(&runtime, &["list_buckets"]).unwrap();

        let err = runtime.handler("list_buckets")(
            CancellationToken::new(),
            ToolRequest::from_value("list_buckets", json!({})),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "access denied: maintenance window");
        assert!(!handled.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_handler_error_reaches_transformers_as_envelope() {
        let runtime = Recorder::default();
        let toolkit = Toolkit::new(manager()).with_transformer(Arc::new(FnTransformer::new(
            "tag",
            |_, mut r: CallToolResult| {
                r.content.push(Content::text("transformed"));
                Ok(r)
            },
        )));
        toolkit.register(&runtime, &["get_object"]).unwrap();

        let result = runtime.handler("get_object")(
            CancellationToken::new(),
            ToolRequest::from_value("get_object", json!({"bucket": "docs", "key": "missing"})),
        )
        .await
        .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(result.content.len(), 2);
        assert!(result.content[0]
            .as_text()
            .unwrap()
            .text
            .starts_with("Error: resource not found"));
    }

    #[tokio::test]
    async fn test_connection_argument_selects_client() {
        let runtime = Recorder::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let toolkit = Toolkit::new(manager()).with_interceptor(Arc::new(FnInterceptor::new(
            "record",
            move |ctx, _| {
                log.lock().push(ctx.connection_name().to_string());
                InterceptResult::allow()
            },
        )));
        toolkit.register(&runtime, &["list_buckets"]).unwrap();
        let handler = runtime.handler("list_buckets");

        handler(
            CancellationToken::new(),
            ToolRequest::from_value("list_buckets", json!({})),
        )
        .await
        .unwrap();
        handler(
            CancellationToken::new(),
            ToolRequest::from_value("list_buckets", json!({"connection": "second"})),
        )
        .await
        .unwrap();

        assert_eq!(*seen.lock(), vec!["first", "second"]);
        assert!(toolkit.manager().is_initialized("second"));
    }

    #[tokio::test]
    async fn test_from_config_wires_builtins() {
        let config = ServerConfig {
            read_only: true,
            enable_audit: true,
            max_text_length: 100,
            ..ServerConfig::default()
        };
        let runtime = Recorder::default();
        let toolkit = Toolkit::from_config(&config, manager());
        toolkit.register_all(&runtime).unwrap();

        let err = runtime.handler("put_object")(
            CancellationToken::new(),
            ToolRequest::from_value(
                "put_object",
                json!({"bucket": "docs", "key": "a", "content": "x"}),
            ),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, McpError::AccessDenied(_)));

        runtime.handler("list_buckets")(
            CancellationToken::new(),
            ToolRequest::from_value("list_buckets", json!({})),
        )
        .await
        .unwrap();

        assert_eq!(toolkit.audit_log().unwrap().len(), 1);
        let metrics = toolkit.metrics().unwrap();
        assert_eq!(metrics.snapshot().successful_calls, 1);
    }

    #[tokio::test]
    async fn test_active_gauge_released_when_before_fails() {
        let metrics = Arc::new(ToolMetrics::new());
        let active_seen = Arc::new(Mutex::new(Vec::new()));
        let runtime = Recorder::default();
        let toolkit = Toolkit::new(manager())
            .with_metrics(Arc::clone(&metrics))
            .with_tool_middleware(
                "list_buckets",
                Arc::new(RejectBefore {
                    metrics: Arc::clone(&metrics),
                    active_seen: Arc::clone(&active_seen),
                }),
            );
        toolkit.register(&runtime, &["list_buckets"]).unwrap();
        let handler = runtime.handler("list_buckets");

        for _ in 0..3 {
            let err = handler(
                CancellationToken::new(),
                ToolRequest::from_value("list_buckets", json!({})),
            )
            .await
            .unwrap_err();
            assert_eq!(err.to_string(), "quota exhausted");
        }

        assert_eq!(*active_seen.lock(), vec![1, 1, 1]);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.active_calls, 0);
        // Aborted before the handler, so never recorded as completed.
        assert_eq!(snapshot.total_calls, 0);
    }

    #[tokio::test]
    async fn test_cancellation_visible_to_every_stage() {
        let witness = CancelWitness::default();
        let runtime = Recorder::default();
        let toolkit = Toolkit::new(manager())
            .with_interceptor(Arc::new(witness.clone()))
            .with_middleware(Arc::new(witness.clone()))
            .with_transformer(Arc::new(witness.clone()));
        toolkit.register(&runtime, &["list_buckets"]).unwrap();

        let ct = CancellationToken::new();
        ct.cancel();
        let result = runtime.handler("list_buckets")(
            ct,
            ToolRequest::from_value("list_buckets", json!({})),
        )
        .await
        .unwrap();

        assert_eq!(result.is_error, Some(true));
        assert_eq!(
            result.content[0].as_text().unwrap().text,
            "Error: request cancelled"
        );
        assert_eq!(
            *witness.stages.lock(),
            vec![
                ("intercept", true),
                ("before", true),
                ("after", true),
                ("transform", true),
            ]
        );
    }
}
