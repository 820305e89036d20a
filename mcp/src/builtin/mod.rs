//! Built-in interceptors, middleware and transformers.

mod audit;
mod interceptors;
mod middleware;
mod transformers;

pub use audit::{AuditEntry, AuditLog, AuditOutcome};
pub use interceptors::{PrefixAclInterceptor, ReadOnlyInterceptor, SizeLimitInterceptor};
pub use middleware::{AuditMiddleware, LoggingMiddleware, MetricsMiddleware};
pub use transformers::TextLimitTransformer;
