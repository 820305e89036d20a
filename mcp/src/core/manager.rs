//! Named storage connections with lazily created, cached clients.
//!
//! ## Lifecycle per name
//! - unconfigured: no record
//! - configured: record present, no cached client
//! - initialized: client cached
//! - removed/closed: client closed and evicted
//!
//! The factory runs at most once per name for the lifetime of the manager,
//! unless the name is removed or the manager is closed.

use std::{collections::HashMap, fmt, sync::Arc};

use objstore_storage::{create_client, ConnectionConfig, StorageClient, StorageResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{McpError, McpResult};

/// How to construct one named client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub name: String,
    pub config: ConnectionConfig,
}

impl ConnectionRecord {
    pub fn new(name: impl Into<String>, config: ConnectionConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

/// Builds a client from a record.
pub type ClientFactory =
    Arc<dyn Fn(&ConnectionRecord) -> StorageResult<Arc<dyn StorageClient>> + Send + Sync>;

#[derive(Default)]
struct ManagerState {
    records: Vec<ConnectionRecord>,
    clients: HashMap<String, Arc<dyn StorageClient>>,
}

impl ManagerState {
    fn record(&self, name: &str) -> Option<&ConnectionRecord> {
        self.records.iter().find(|r| r.name == name)
    }
}

pub struct ConnectionManager {
    state: RwLock<ManagerState>,
    default_connection: Option<String>,
    factory: ClientFactory,
}

impl ConnectionManager {
    /// Manager with a custom factory. An empty `default_connection` means
    /// "use the first record".
    pub fn new(
        records: Vec<ConnectionRecord>,
        default_connection: Option<String>,
        factory: ClientFactory,
    ) -> Self {
        Self {
            state: RwLock::new(ManagerState {
                records,
                clients: HashMap::new(),
            }),
            default_connection: default_connection.filter(|d| !d.is_empty()),
            factory,
        }
    }

    /// Manager that builds clients with the backend selected by each record.
    pub fn with_default_factory(
        records: Vec<ConnectionRecord>,
        default_connection: Option<String>,
    ) -> Self {
        Self::new(
            records,
            default_connection,
            Arc::new(|record: &ConnectionRecord| create_client(&record.name, &record.config)),
        )
    }

    /// Explicit default if set, else the first record, else empty.
    pub fn default_connection_name(&self) -> String {
        if let Some(name) = &self.default_connection {
            return name.clone();
        }
        self.state
            .read()
            .records
            .first()
            .map(|r| r.name.clone())
            .unwrap_or_default()
    }

    /// Cached client for `name`, creating it on first use. Empty means default.
    pub fn get_client(&self, name: &str) -> McpResult<Arc<dyn StorageClient>> {
        let name = if name.is_empty() {
            self.default_connection_name()
        } else {
            name.to_string()
        };

        if let Some(client) = self.state.read().clients.get(&name) {
            return Ok(Arc::clone(client));
        }

        let mut state = self.state.write();
        // Another caller may have created it while we waited for the lock.
        if let Some(client) = state.clients.get(&name) {
            return Ok(Arc::clone(client));
        }

        let record = state
            .record(&name)
            .cloned()
            .ok_or_else(|| McpError::ConnectionNotFound(name.clone()))?;

        let client = (self.factory)(&record).map_err(|source| {
            warn!(connection = %name, error = %source, "Failed to create storage client");
            McpError::ConnectionFailed {
                name: name.clone(),
                source,
            }
        })?;

        info!(connection = %name, "Storage client initialized");
        state.clients.insert(name, Arc::clone(&client));
        Ok(client)
    }

    pub fn get_default_client(&self) -> McpResult<Arc<dyn StorageClient>> {
        let name = self.default_connection_name();
        if name.is_empty() {
            return Err(McpError::ConnectionNotFound(
                "no default connection configured".to_string(),
            ));
        }
        self.get_client(&name)
    }

    /// Register a new connection, optionally creating its client right away.
    pub fn add_connection(&self, record: ConnectionRecord, create_now: bool) -> McpResult<()> {
        let name = record.name.clone();
        {
            let mut state = self.state.write();
            if state.record(&name).is_some() {
                return Err(McpError::ConnectionExists(name));
            }
            state.records.push(record);
        }
        debug!(connection = %name, create_now, "Connection added");

        if create_now {
            self.get_client(&name)?;
        }
        Ok(())
    }

    /// Close and evict the cached client (if any), then drop the record.
    ///
    /// A close failure leaves the record in place.
    pub fn remove_connection(&self, name: &str) -> McpResult<()> {
        let mut state = self.state.write();

        if let Some(client) = state.clients.get(name) {
            client.close().map_err(|source| McpError::ConnectionFailed {
                name: name.to_string(),
                source,
            })?;
            state.clients.remove(name);
        }

        state.records.retain(|r| r.name != name);
        info!(connection = %name, "Connection removed");
        Ok(())
    }

    /// Close every cached client and clear the cache. Records are kept.
    ///
    /// Returns the last close error seen, if any.
    pub fn close(&self) -> McpResult<()> {
        let mut state = self.state.write();
        let mut last_err = None;

        for (name, client) in state.clients.drain() {
            if let Err(source) = client.close() {
                warn!(connection = %name, error = %source, "Failed to close storage client");
                last_err = Some(McpError::ConnectionFailed { name, source });
            }
        }

        match last_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn has_connection(&self, name: &str) -> bool {
        self.state.read().record(name).is_some()
    }

    pub fn is_initialized(&self, name: &str) -> bool {
        self.state.read().clients.contains_key(name)
    }

    /// Configured connection names, in registration order.
    pub fn list_connections(&self) -> Vec<String> {
        self.state
            .read()
            .records
            .iter()
            .map(|r| r.name.clone())
            .collect()
    }

    pub fn connection_config(&self, name: &str) -> Option<ConnectionConfig> {
        self.state.read().record(name).map(|r| r.config.clone())
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("ConnectionManager")
            .field(
                "records",
                &state.records.iter().map(|r| &r.name).collect::<Vec<_>>(),
            )
            .field("initialized", &state.clients.len())
            .field("default_connection", &self.default_connection)
            .finish()
    }
}
