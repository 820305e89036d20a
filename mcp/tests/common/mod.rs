//! Shared fixtures for the integration tests: an in-memory storage backend
//! whose factory counts invocations and keeps a handle on every client it
//! builds.

#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use objstore_mcp::{
    context::ToolContext,
    error::{McpError, McpResult},
    ClientFactory, ConnectionManager, ConnectionRecord, Middleware,
};
use objstore_storage::{ConnectionConfig, MemoryStorageClient, StorageClient};
use parking_lot::Mutex;
use rmcp::model::CallToolResult;
use tokio_util::sync::CancellationToken;

pub struct TestBackend {
    pub factory_calls: Arc<AtomicUsize>,
    pub clients: Arc<Mutex<Vec<Arc<MemoryStorageClient>>>>,
    factory: ClientFactory,
}

impl TestBackend {
    pub fn new() -> Self {
        let factory_calls = Arc::new(AtomicUsize::new(0));
        let clients: Arc<Mutex<Vec<Arc<MemoryStorageClient>>>> = Arc::new(Mutex::new(Vec::new()));

        let calls = Arc::clone(&factory_calls);
        let built = Arc::clone(&clients);
        let factory: ClientFactory = Arc::new(move |record: &ConnectionRecord| {
            calls.fetch_add(1, Ordering::SeqCst);
            let client = Arc::new(
                MemoryStorageClient::new(record.name.clone(), record.config.clone())
                    .with_bucket("docs"),
            );
            built.lock().push(Arc::clone(&client));
            let client: Arc<dyn StorageClient> = client;
            Ok(client)
        });

        Self {
            factory_calls,
            clients,
            factory,
        }
    }

    pub fn manager(&self, names: &[&str], default: Option<&str>) -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager::new(
            names.iter().map(|n| record(n)).collect(),
            default.map(str::to_string),
            Arc::clone(&self.factory),
        ))
    }

    pub fn calls(&self) -> usize {
        self.factory_calls.load(Ordering::SeqCst)
    }

    pub fn client(&self, name: &str) -> Option<Arc<MemoryStorageClient>> {
        self.clients
            .lock()
            .iter()
            .find(|c| c.connection_name() == name)
            .cloned()
    }
}

pub fn record(name: &str) -> ConnectionRecord {
    ConnectionRecord::new(name, ConnectionConfig::memory())
}

/// Appends `before:<label>` and `after:<label>` to a shared event log.
pub struct Recording {
    pub label: &'static str,
    pub events: Arc<Mutex<Vec<String>>>,
}

impl Recording {
    pub fn new(label: &'static str, events: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            label,
            events: Arc::clone(events),
        })
    }
}

#[async_trait]
impl Middleware for Recording {
    fn name(&self) -> &str {
        self.label
    }

    async fn before(&self, _ct: &CancellationToken, _ctx: &ToolContext) -> McpResult<()> {
        self.events.lock().push(format!("before:{}", self.label));
        Ok(())
    }

    async fn after(
        &self,
        _ct: &CancellationToken,
        _ctx: &ToolContext,
        result: &mut CallToolResult,
        error: Option<&McpError>,
    ) -> McpResult<()> {
        let status = if error.is_some() || result.is_error == Some(true) {
            "err"
        } else {
            "ok"
        };
        self.events
            .lock()
            .push(format!("after:{}:{status}", self.label));
        Ok(())
    }
}

pub fn first_text(result: &CallToolResult) -> String {
    result
        .content
        .first()
        .and_then(|c| c.as_text())
        .map(|t| t.text.clone())
        .unwrap_or_default()
}
