//! Storage clients for the object-store MCP server.
//!
//! Provides the [`StorageClient`] capability trait consumed by the tool
//! handlers, plus two backends:
//! - S3 and S3-compatible services (`aws-sdk-s3`)
//! - Memory (in-process, used for tests and local development)

pub mod config;
mod core;
mod factory;
mod memory;
mod s3;

pub use config::{ConnectionConfig, StorageBackend};
pub use core::{
    BucketInfo, CopyObjectParams, CopyObjectOutput, ListObjectsOutput, ListObjectsParams,
    ObjectData, ObjectMetadata, ObjectSummary, PutObjectOutput, PutObjectParams, StorageClient,
    StorageError, StorageResult,
};
pub use factory::create_client;
pub use memory::MemoryStorageClient;
pub use s3::S3StorageClient;
