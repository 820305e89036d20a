//! Factory for creating storage clients from connection configuration.

use std::sync::Arc;

use tracing::info;

use crate::{
    config::{ConnectionConfig, StorageBackend},
    core::{StorageClient, StorageResult},
    memory::MemoryStorageClient,
    s3::S3StorageClient,
};

/// Create a storage client for the named connection.
pub fn create_client(
    name: &str,
    config: &ConnectionConfig,
) -> StorageResult<Arc<dyn StorageClient>> {
    match config.backend {
        StorageBackend::S3 => {
            info!(connection = %name, "Initializing S3 storage client");
            Ok(Arc::new(S3StorageClient::new(name, config.clone())?))
        }
        StorageBackend::Memory => {
            info!(connection = %name, "Initializing in-memory storage client");
            Ok(Arc::new(MemoryStorageClient::new(name, config.clone())))
        }
    }
}
