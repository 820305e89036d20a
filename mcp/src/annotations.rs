//! Tool access annotations.
//!
//! We maintain [`ToolAnnotations`] separate from [`rmcp::model::ToolAnnotations`] because:
//! - rmcp uses `Option<bool>` requiring unwrapping everywhere
//! - the read-only interceptor and the metadata tables want plain `bool`s

use rmcp::model::ToolAnnotations as RmcpToolAnnotations;
use serde::{Deserialize, Serialize};

/// Tool behavior hints advertised to clients and consulted by interceptors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolAnnotations {
    pub read_only: bool,
    pub destructive: bool,
    pub idempotent: bool,
    pub open_world: bool,
}

impl ToolAnnotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only, idempotent, talks to an external service.
    pub fn read() -> Self {
        Self {
            read_only: true,
            destructive: false,
            idempotent: true,
            open_world: true,
        }
    }

    /// Mutating, non-destructive write.
    pub fn write() -> Self {
        Self {
            read_only: false,
            destructive: false,
            idempotent: true,
            open_world: true,
        }
    }

    #[must_use]
    pub fn with_read_only(mut self, v: bool) -> Self {
        self.read_only = v;
        self
    }

    #[must_use]
    pub fn with_destructive(mut self, v: bool) -> Self {
        self.destructive = v;
        self
    }

    #[must_use]
    pub fn with_idempotent(mut self, v: bool) -> Self {
        self.idempotent = v;
        self
    }

    #[must_use]
    pub fn with_open_world(mut self, v: bool) -> Self {
        self.open_world = v;
        self
    }

    /// Convert to the wire representation, attaching the human title.
    pub fn to_rmcp(&self, title: Option<String>) -> RmcpToolAnnotations {
        RmcpToolAnnotations {
            title,
            read_only_hint: Some(self.read_only),
            destructive_hint: Some(self.destructive),
            idempotent_hint: Some(self.idempotent),
            open_world_hint: Some(self.open_world),
        }
    }
}
