//! Model Context Protocol (MCP) tools for object storage.
//!
//! ## Modules
//!
//! - [`core`]: connection manager, server configuration, call metrics
//! - [`pipeline`]: interceptor, middleware and result-transformer extension points
//! - [`builtin`]: stock extensions (read-only, size limits, prefix ACL, logging, audit)
//! - [`tools`]: the storage tool handlers
//! - [`toolkit`]: tool registration and pipeline wrapping
//! - [`server`]: rmcp server runtime
//!
//! ## Shared Types
//!
//! - [`ToolAnnotations`]: Tool behavior hints (read_only, destructive, etc.)
//! - [`ToolContext`]: Per-call state threaded through the pipeline

// Shared types (used across modules)
pub mod annotations;
pub mod context;
pub mod error;
pub mod metadata;

// Subsystems
pub mod builtin;
pub mod core;
pub mod pipeline;
pub mod server;
pub mod toolkit;
pub mod tools;

pub use annotations::ToolAnnotations;
pub use context::ToolContext;
pub use core::{
    ClientFactory, ConfigError, ConnectionManager, ConnectionRecord, MetricsSnapshot,
    ServerConfig, ToolMetrics, ToolStatsSnapshot,
};
pub use error::{McpError, McpResult};
pub use metadata::{MetadataOverrides, SizeLimits, ToolIcon, ToolMetadata, ToolName, ToolOverrides};
pub use pipeline::{
    InterceptResult, Interceptor, Middleware, ResultTransformer, ToolHandler, ToolHandlerFn,
    ToolRequest,
};
pub use server::ToolServer;
pub use toolkit::{ToolRuntime, Toolkit};
