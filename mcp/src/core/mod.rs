//! Core infrastructure: configuration, connections, metrics.

pub mod config;
pub mod manager;
pub mod metrics;

pub use config::{parse_bool, parse_list, parse_size, ConfigError, ServerConfig};
pub use manager::{ClientFactory, ConnectionManager, ConnectionRecord};
pub use metrics::{ActiveCall, MetricsSnapshot, ToolMetrics, ToolStatsSnapshot};
