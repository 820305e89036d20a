//! Interceptor chain: pre-execution access checks.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::ToolRequest;
use crate::context::ToolContext;

/// Outcome of one interceptor (or of the whole chain).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InterceptResult {
    pub allow: bool,
    pub reason: String,
    /// Replacement request for downstream interceptors and the handler.
    pub modified_request: Option<ToolRequest>,
}

impl InterceptResult {
    pub fn allow() -> Self {
        Self {
            allow: true,
            reason: String::new(),
            modified_request: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allow: false,
            reason: reason.into(),
            modified_request: None,
        }
    }

    pub fn modify(request: ToolRequest) -> Self {
        Self {
            allow: true,
            reason: String::new(),
            modified_request: Some(request),
        }
    }
}

#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &str;

    async fn intercept(
        &self,
        ct: &CancellationToken,
        ctx: &ToolContext,
        request: &ToolRequest,
    ) -> InterceptResult;
}

type InterceptFn = dyn Fn(&ToolContext, &ToolRequest) -> InterceptResult + Send + Sync;

/// Interceptor backed by a synchronous closure.
pub struct FnInterceptor {
    name: String,
    func: Box<InterceptFn>,
}

impl FnInterceptor {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&ToolContext, &ToolRequest) -> InterceptResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

#[async_trait]
impl Interceptor for FnInterceptor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn intercept(
        &self,
        _ct: &CancellationToken,
        ctx: &ToolContext,
        request: &ToolRequest,
    ) -> InterceptResult {
        (self.func)(ctx, request)
    }
}

/// Ordered interceptors; fixed after construction.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.interceptors.iter().map(|i| i.name().to_string()).collect()
    }

    /// Run every interceptor against the current request.
    ///
    /// Stops at the first denial and returns its reason verbatim. When all
    /// allow, `modified_request` carries the final request if any interceptor
    /// replaced it with something different from `request`.
    pub async fn intercept(
        &self,
        ct: &CancellationToken,
        ctx: &ToolContext,
        request: &ToolRequest,
    ) -> InterceptResult {
        let mut current: Option<ToolRequest> = None;

        for interceptor in &self.interceptors {
            let req = current.as_ref().unwrap_or(request);
            let result = interceptor.intercept(ct, ctx, req).await;

            if !result.allow {
                debug!(
                    interceptor = %interceptor.name(),
                    tool = %ctx.tool_name(),
                    request_id = %ctx.request_id(),
                    reason = %result.reason,
                    "Tool call blocked"
                );
                return InterceptResult::deny(result.reason);
            }

            if let Some(modified) = result.modified_request {
                current = Some(modified);
            }
        }

        InterceptResult {
            allow: true,
            reason: String::new(),
            modified_request: current.filter(|m| m != request),
        }
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::{json, Value};

    use super::*;

    fn request() -> ToolRequest {
        ToolRequest::from_value("put_object", json!({"bucket": "b", "key": "k"}))
    }

    fn counting(name: &str, calls: Arc<AtomicUsize>, result: InterceptResult) -> Arc<dyn Interceptor> {
        Arc::new(FnInterceptor::new(name, move |_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            result.clone()
        }))
    }

    #[tokio::test]
    async fn test_empty_chain_allows() {
        let chain = InterceptorChain::new();
        let ctx = ToolContext::for_tool("put_object", "c");
        let result = chain
            .intercept(&CancellationToken::new(), &ctx, &request())
            .await;
        assert!(result.allow);
        assert!(result.modified_request.is_none());
    }

    #[tokio::test]
    async fn test_first_denial_short_circuits() {
        let calls: Vec<_> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let mut chain = InterceptorChain::new();
        chain.push(counting("first", calls[0].clone(), InterceptResult::allow()));
        chain.push(counting(
            "second",
            calls[1].clone(),
            InterceptResult::deny("bucket is frozen"),
        ));
        chain.push(counting("third", calls[2].clone(), InterceptResult::allow()));

        let ctx = ToolContext::for_tool("put_object", "c");
        let result = chain
            .intercept(&CancellationToken::new(), &ctx, &request())
            .await;

        assert!(!result.allow);
        assert_eq!(result.reason, "bucket is frozen");
        assert_eq!(calls[0].load(Ordering::SeqCst), 1);
        assert_eq!(calls[1].load(Ordering::SeqCst), 1);
        assert_eq!(calls[2].load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_modified_request_flows_downstream() {
        let mut chain = InterceptorChain::new();
        chain.push(Arc::new(FnInterceptor::new("rewrite", |_, req| {
            let mut req = req.clone();
            req.arguments
                .insert("key".to_string(), Value::String("scoped/k".to_string()));
            InterceptResult::modify(req)
        })));
        chain.push(Arc::new(FnInterceptor::new("check", |_, req| {
            if req.str_arg("key") == Some("scoped/k") {
                InterceptResult::allow()
            } else {
                InterceptResult::deny("saw the original request")
            }
        })));

        let ctx = ToolContext::for_tool("put_object", "c");
        let result = chain
            .intercept(&CancellationToken::new(), &ctx, &request())
            .await;

        assert!(result.allow);
        let modified = result.modified_request.unwrap();
        assert_eq!(modified.str_arg("key"), Some("scoped/k"));
    }

    #[tokio::test]
    async fn test_identical_modification_is_not_reported() {
        let mut chain = InterceptorChain::new();
        chain.push(Arc::new(FnInterceptor::new("noop", |_, req| {
            InterceptResult::modify(req.clone())
        })));

        let ctx = ToolContext::for_tool("put_object", "c");
        let result = chain
            .intercept(&CancellationToken::new(), &ctx, &request())
            .await;
        assert!(result.allow);
        assert!(result.modified_request.is_none());
    }
}
