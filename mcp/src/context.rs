//! Per-invocation tool context.
//!
//! A [`ToolContext`] is created by the toolkit for every tool call, threaded by
//! reference through interceptors, middleware, the handler and transformers,
//! and dropped when the call returns.

use std::{
    any::Any,
    collections::HashMap,
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Value};

/// Well-known scratch keys shared between built-in extensions and handlers.
pub mod keys {
    /// `u64`: read cap recorded by the size-limit interceptor for `get_object`.
    pub const MAX_GET_SIZE: &str = "size_limit.max_get_bytes";
    /// `u64`: write cap recorded by the size-limit interceptor for `put_object`.
    pub const MAX_PUT_SIZE: &str = "size_limit.max_put_bytes";
    /// `Map<String, Value>`: final request arguments after interception.
    pub const REQUEST_ARGUMENTS: &str = "request.arguments";
}

type ScratchValue = Arc<dyn Any + Send + Sync>;

pub struct ToolContext {
    tool_name: String,
    connection_name: String,
    request_id: String,
    start_time: Instant,
    started_at: DateTime<Utc>,
    values: RwLock<HashMap<String, ScratchValue>>,
}

impl ToolContext {
    pub fn new(
        tool_name: impl Into<String>,
        connection_name: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            connection_name: connection_name.into(),
            request_id: request_id.into(),
            start_time: Instant::now(),
            started_at: Utc::now(),
            values: RwLock::new(HashMap::new()),
        }
    }

    /// Context with a freshly generated request id.
    pub fn for_tool(tool_name: impl Into<String>, connection_name: impl Into<String>) -> Self {
        Self::new(
            tool_name,
            connection_name,
            uuid::Uuid::new_v4().to_string(),
        )
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn connection_name(&self) -> &str {
        &self.connection_name
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.values.write().insert(key.into(), Arc::new(value));
    }

    /// Typed lookup. Returns `None` when the key is absent or holds another type.
    pub fn get<T: Any + Send + Sync + Clone>(&self, key: &str) -> Option<T> {
        self.values
            .read()
            .get(key)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.values.write().remove(key).is_some()
    }

    /// Final request arguments, when the toolkit recorded them.
    pub fn arguments(&self) -> Option<Map<String, Value>> {
        self.get(keys::REQUEST_ARGUMENTS)
    }

    /// String argument from the recorded request, if present.
    pub fn argument_str(&self, name: &str) -> Option<String> {
        let values = self.values.read();
        values
            .get(keys::REQUEST_ARGUMENTS)?
            .downcast_ref::<Map<String, Value>>()?
            .get(name)?
            .as_str()
            .map(str::to_string)
    }
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("tool_name", &self.tool_name)
            .field("connection_name", &self.connection_name)
            .field("request_id", &self.request_id)
            .field("started_at", &self.started_at)
            .field("values", &self.values.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_identity() {
        let ctx = ToolContext::new("get_object", "primary", "req-1");
        assert_eq!(ctx.tool_name(), "get_object");
        assert_eq!(ctx.connection_name(), "primary");
        assert_eq!(ctx.request_id(), "req-1");
    }

    #[test]
    fn test_generated_request_ids_are_unique() {
        let a = ToolContext::for_tool("list_buckets", "");
        let b = ToolContext::for_tool("list_buckets", "");
        assert_ne!(a.request_id(), b.request_id());
    }

    #[test]
    fn test_typed_values() {
        let ctx = ToolContext::for_tool("get_object", "primary");
        ctx.set(keys::MAX_GET_SIZE, 1024u64);
        ctx.set("label", "hello".to_string());

        assert_eq!(ctx.get::<u64>(keys::MAX_GET_SIZE), Some(1024));
        assert_eq!(ctx.get::<String>("label").as_deref(), Some("hello"));
        // wrong type
        assert_eq!(ctx.get::<u32>(keys::MAX_GET_SIZE), None);
        assert!(ctx.remove("label"));
        assert!(!ctx.contains("label"));
    }

    #[test]
    fn test_argument_lookup() {
        let ctx = ToolContext::for_tool("put_object", "primary");
        let args = json!({"bucket": "docs", "key": "a.txt", "size": 3});
        ctx.set(keys::REQUEST_ARGUMENTS, args.as_object().cloned().unwrap());

        assert_eq!(ctx.argument_str("bucket").as_deref(), Some("docs"));
        assert_eq!(ctx.argument_str("size"), None);
        assert_eq!(ctx.arguments().unwrap().len(), 3);
    }

    #[test]
    fn test_concurrent_access() {
        let ctx = Arc::new(ToolContext::for_tool("list_objects", "primary"));
        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                let ctx = Arc::clone(&ctx);
                std::thread::spawn(move || ctx.set(format!("k{i}"), i))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ctx.get::<u64>("k7"), Some(7));
    }
}
