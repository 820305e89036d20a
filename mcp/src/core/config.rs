//! Server configuration from environment variables or a YAML file.

use std::collections::HashMap;

use objstore_storage::{ConnectionConfig, StorageBackend};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::manager::ConnectionRecord;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;
const TB: u64 = GB * 1024;

/// Name given to the connection synthesized from the shorthand variables.
pub const SHORTHAND_CONNECTION: &str = "default";

pub mod env {
    pub const READ_ONLY: &str = "OBJSTORE_READ_ONLY";
    pub const ENABLE_SIZE_LIMITS: &str = "OBJSTORE_ENABLE_SIZE_LIMITS";
    pub const MAX_GET_SIZE: &str = "OBJSTORE_MAX_GET_SIZE";
    pub const MAX_PUT_SIZE: &str = "OBJSTORE_MAX_PUT_SIZE";
    pub const ENABLE_LOGGING: &str = "OBJSTORE_ENABLE_LOGGING";
    pub const ENABLE_AUDIT: &str = "OBJSTORE_ENABLE_AUDIT";
    pub const ENABLE_METRICS: &str = "OBJSTORE_ENABLE_METRICS";
    pub const ENABLE_PREFIX_ACL: &str = "OBJSTORE_ENABLE_PREFIX_ACL";
    pub const PREFIX_ACL: &str = "OBJSTORE_PREFIX_ACL";
    pub const MAX_TEXT_LENGTH: &str = "OBJSTORE_MAX_TEXT_LENGTH";
    pub const CONNECTIONS: &str = "OBJSTORE_CONNECTIONS";
    pub const DEFAULT_CONNECTION: &str = "OBJSTORE_DEFAULT_CONNECTION";
    pub const ENABLED_TOOLS: &str = "OBJSTORE_ENABLED_TOOLS";
    pub const DISABLED_TOOLS: &str = "OBJSTORE_DISABLED_TOOLS";

    pub const BACKEND: &str = "OBJSTORE_BACKEND";
    pub const ENDPOINT: &str = "OBJSTORE_ENDPOINT";
    pub const REGION: &str = "OBJSTORE_REGION";
    pub const ACCESS_KEY_ID: &str = "OBJSTORE_ACCESS_KEY_ID";
    pub const SECRET_ACCESS_KEY: &str = "OBJSTORE_SECRET_ACCESS_KEY";
    pub const FORCE_PATH_STYLE: &str = "OBJSTORE_FORCE_PATH_STYLE";
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub read_only: bool,
    pub enable_size_limits: bool,
    pub max_get_size: u64,
    pub max_put_size: u64,
    pub enable_logging: bool,
    pub enable_audit: bool,
    pub enable_metrics: bool,
    pub enable_prefix_acl: bool,
    /// Bucket name (or `*`) to allowed key prefixes.
    pub prefix_acl: HashMap<String, Vec<String>>,
    /// Max characters per text content block; 0 disables truncation.
    pub max_text_length: usize,
    pub connections: Vec<ConnectionRecord>,
    pub default_connection: Option<String>,
    pub enabled_tools: Vec<String>,
    pub disabled_tools: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            enable_size_limits: true,
            max_get_size: 10 * MB,
            max_put_size: 100 * MB,
            enable_logging: true,
            enable_audit: false,
            enable_metrics: true,
            enable_prefix_acl: false,
            prefix_acl: HashMap::new(),
            max_text_length: 0,
            connections: Vec::new(),
            default_connection: None,
            enabled_tools: Vec::new(),
            disabled_tools: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Bad values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bool_var = |key: &str, default: bool| match get(key) {
            None => default,
            Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
                warn!(variable = key, value = %raw, default, "Invalid boolean, using default");
                default
            }),
        };
        let size_var = |key: &str, default: u64| match get(key) {
            None => default,
            Some(raw) => parse_size(&raw).unwrap_or_else(|| {
                warn!(variable = key, value = %raw, default, "Invalid size, using default");
                default
            }),
        };

        let max_text_length = match get(env::MAX_TEXT_LENGTH) {
            None => defaults.max_text_length,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(variable = env::MAX_TEXT_LENGTH, value = %raw, "Invalid length, using default");
                defaults.max_text_length
            }),
        };

        let prefix_acl = get(env::PREFIX_ACL)
            .and_then(|raw| {
                serde_json::from_str::<HashMap<String, Vec<String>>>(&raw)
                    .map_err(|e| {
                        warn!(variable = env::PREFIX_ACL, error = %e, "Invalid prefix ACL, ignoring");
                    })
                    .ok()
            })
            .unwrap_or_default();

        let mut connections = get(env::CONNECTIONS)
            .map(|raw| parse_connections(&raw))
            .unwrap_or_default();
        if connections.is_empty() {
            connections.extend(shorthand_connection(&get));
        }

        Self {
            read_only: bool_var(env::READ_ONLY, defaults.read_only),
            enable_size_limits: bool_var(env::ENABLE_SIZE_LIMITS, defaults.enable_size_limits),
            max_get_size: size_var(env::MAX_GET_SIZE, defaults.max_get_size),
            max_put_size: size_var(env::MAX_PUT_SIZE, defaults.max_put_size),
            enable_logging: bool_var(env::ENABLE_LOGGING, defaults.enable_logging),
            enable_audit: bool_var(env::ENABLE_AUDIT, defaults.enable_audit),
            enable_metrics: bool_var(env::ENABLE_METRICS, defaults.enable_metrics),
            enable_prefix_acl: bool_var(env::ENABLE_PREFIX_ACL, defaults.enable_prefix_acl),
            prefix_acl,
            max_text_length,
            connections,
            default_connection: get(env::DEFAULT_CONNECTION).map(|v| v.trim().to_string()),
            enabled_tools: get(env::ENABLED_TOOLS)
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
            disabled_tools: get(env::DISABLED_TOOLS)
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
        }
    }

    /// Load configuration from a YAML file. Missing fields take their defaults.
    pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

/// `true/false/1/0/yes/no/on/off`, case-insensitive.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Byte size with optional `B/KB/MB/GB/TB` suffix (1024-based).
pub fn parse_size(raw: &str) -> Option<u64> {
    let upper = raw.trim().to_ascii_uppercase();
    let (number, multiplier) = [("TB", TB), ("GB", GB), ("MB", MB), ("KB", KB), ("B", 1)]
        .iter()
        .find_map(|(suffix, mult)| upper.strip_suffix(suffix).map(|n| (n, *mult)))
        .unwrap_or((upper.as_str(), 1));

    number.trim().parse::<u64>().ok()?.checked_mul(multiplier)
}

/// Comma-separated list, blanks dropped.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// JSON object of `name -> ConnectionConfig`, keeping document order.
/// Entries that fail to parse are skipped with a warning.
fn parse_connections(raw: &str) -> Vec<ConnectionRecord> {
    let map: Map<String, Value> = match serde_json::from_str(raw) {
        Ok(map) => map,
        Err(e) => {
            warn!(variable = env::CONNECTIONS, error = %e, "Invalid connections JSON, ignoring");
            return Vec::new();
        }
    };

    map.into_iter()
        .filter_map(|(name, value)| match serde_json::from_value(value) {
            Ok(config) => Some(ConnectionRecord::new(name, config)),
            Err(e) => {
                warn!(connection = %name, error = %e, "Invalid connection config, skipping");
                None
            }
        })
        .collect()
}

fn shorthand_connection(get: &dyn Fn(&str) -> Option<String>) -> Option<ConnectionRecord> {
    let backend = get(env::BACKEND);
    let endpoint = get(env::ENDPOINT);
    let region = get(env::REGION);
    if backend.is_none() && endpoint.is_none() && region.is_none() {
        return None;
    }

    let mut config = ConnectionConfig::default();
    if let Some(raw) = backend {
        match raw.trim().to_ascii_lowercase().as_str() {
            "s3" => config.backend = StorageBackend::S3,
            "memory" => config.backend = StorageBackend::Memory,
            _ => warn!(variable = env::BACKEND, value = %raw, "Unknown backend, using s3"),
        }
    }
    config.endpoint = endpoint;
    if let Some(region) = region {
        config.region = region;
    }
    config.access_key_id = get(env::ACCESS_KEY_ID);
    config.secret_access_key = get(env::SECRET_ACCESS_KEY);
    config.force_path_style = get(env::FORCE_PATH_STYLE)
        .and_then(|v| parse_bool(&v))
        .unwrap_or(false);

    Some(ConnectionRecord::new(SHORTHAND_CONNECTION, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[]));
        assert_eq!(config, ServerConfig::default());
        assert!(!config.read_only);
        assert!(config.enable_size_limits);
        assert_eq!(config.max_get_size, 10 * MB);
        assert_eq!(config.max_put_size, 100 * MB);
        assert!(config.connections.is_empty());
    }

    #[test]
    fn test_parse_bool() {
        for v in ["true", "TRUE", "1", "yes", "On"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "no", "OFF"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("123"), Some(123));
        assert_eq!(parse_size("512KB"), Some(512 * KB));
        assert_eq!(parse_size("10MB"), Some(10 * MB));
        assert_eq!(parse_size("10 mb"), Some(10 * MB));
        assert_eq!(parse_size("1GB"), Some(GB));
        assert_eq!(parse_size("2TB"), Some(2 * TB));
        assert_eq!(parse_size("64B"), Some(64));
        assert_eq!(parse_size("ten"), None);
        assert_eq!(parse_size("-1MB"), None);
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let config = ServerConfig::from_lookup(lookup(&[
            (env::READ_ONLY, "sure"),
            (env::MAX_GET_SIZE, "lots"),
            (env::MAX_TEXT_LENGTH, "-5"),
            (env::PREFIX_ACL, "{not json"),
            (env::CONNECTIONS, "[]"),
        ]));
        assert!(!config.read_only);
        assert_eq!(config.max_get_size, 10 * MB);
        assert_eq!(config.max_text_length, 0);
        assert!(config.prefix_acl.is_empty());
        assert!(config.connections.is_empty());
    }

    #[test]
    fn test_toggles_and_lists() {
        let config = ServerConfig::from_lookup(lookup(&[
            (env::READ_ONLY, "yes"),
            (env::MAX_PUT_SIZE, "1MB"),
            (env::ENABLE_AUDIT, "1"),
            (env::DISABLED_TOOLS, "delete_object, copy_object,,"),
            (env::PREFIX_ACL, r#"{"docs": ["public/"], "*": ["shared/"]}"#),
        ]));
        assert!(config.read_only);
        assert_eq!(config.max_put_size, MB);
        assert!(config.enable_audit);
        assert_eq!(config.disabled_tools, vec!["delete_object", "copy_object"]);
        assert_eq!(config.prefix_acl["docs"], vec!["public/"]);
    }

    #[test]
    fn test_connections_keep_document_order() {
        let config = ServerConfig::from_lookup(lookup(&[
            (
                env::CONNECTIONS,
                r#"{"zeta": {"backend": "memory"}, "alpha": {"endpoint": "http://localhost:9000", "force_path_style": true}, "broken": {"region": 5}}"#,
            ),
            (env::DEFAULT_CONNECTION, "alpha"),
        ]));
        let names: Vec<_> = config.connections.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert_eq!(config.connections[0].config.backend, StorageBackend::Memory);
        assert!(config.connections[1].config.force_path_style);
        assert_eq!(config.default_connection.as_deref(), Some("alpha"));
    }

    #[test]
    fn test_shorthand_connection() {
        let config = ServerConfig::from_lookup(lookup(&[
            (env::ENDPOINT, "http://localhost:9000"),
            (env::ACCESS_KEY_ID, "minio"),
            (env::SECRET_ACCESS_KEY, "minio123"),
            (env::FORCE_PATH_STYLE, "true"),
        ]));
        assert_eq!(config.connections.len(), 1);
        let record = &config.connections[0];
        assert_eq!(record.name, SHORTHAND_CONNECTION);
        assert_eq!(record.config.region, "us-east-1");
        assert!(record.config.has_static_credentials());
        assert!(record.config.force_path_style);
    }

    #[tokio::test]
    async fn test_yaml_file() {
        let path = std::env::temp_dir().join(format!("objstore-{}.yaml", uuid::Uuid::new_v4()));
        tokio::fs::write(
            &path,
            "read_only: true\nconnections:\n  - name: local\n    config:\n      backend: memory\n",
        )
        .await
        .unwrap();

        let config = ServerConfig::from_file(path.to_str().unwrap()).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert!(config.read_only);
        assert_eq!(config.max_put_size, 100 * MB);
        assert_eq!(config.connections[0].name, "local");
        assert_eq!(config.connections[0].config.backend, StorageBackend::Memory);
    }
}
