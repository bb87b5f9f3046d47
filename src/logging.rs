//! Logging and tracing utilities.
//!
//! The engine logs through `tracing`. Providers install a subscriber once at
//! startup with one of the `init_*` functions; all output goes to **stderr**
//! so stdout stays free for whatever protocol the provider speaks.
//!
//! Every reconciliation operation runs inside a span created by
//! [`operation_span`], carrying the resource type, the operation and a fresh
//! log id. The same log id is passed to the service facade in its
//! [`CallContext`](crate::facade::CallContext), so remote request logs can be
//! matched to engine logs.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls log levels (e.g., `info`, `hemmer_provider_engine=debug`)
//!
//! # Examples
//!
//! ```bash
//! # Show retries and polls
//! RUST_LOG=hemmer_provider_engine=debug ./my-provider
//!
//! # Show rate limiter waits too
//! RUST_LOG=hemmer_provider_engine=trace ./my-provider
//! ```

use tracing::Span;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use crate::retry::OperationKind;

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn registry(default_level: &str) -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::registry().with(filter(default_level)).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    )
}

/// Initialize the default logging subscriber.
///
/// Writes to stderr, respects `RUST_LOG`, and defaults to `info`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    registry("info").init();
}

/// Initialize logging with a custom default level, used when `RUST_LOG` is
/// not set.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    registry(default_level).init();
}

/// Try to initialize logging, returning `false` if a subscriber was already
/// set.
pub fn try_init_logging() -> bool {
    registry("info").try_init().is_ok()
}

/// Generate a log id for one reconciliation flow.
pub fn new_log_id() -> String {
    Uuid::new_v4().to_string()
}

/// The span wrapping one reconciliation operation.
pub fn operation_span(resource_type: &str, operation: OperationKind, log_id: &str) -> Span {
    tracing::info_span!(
        "reconcile",
        resource_type = %resource_type,
        operation = %operation,
        log_id = %log_id,
    )
}

#[cfg(test)]
mod tests {
    // The global subscriber can only be set once per process, so the
    // init functions are not exercised here.

    use super::*;

    #[test]
    fn test_env_filter_parsing() {
        assert!(EnvFilter::try_new("info").is_ok());
        assert!(EnvFilter::try_new("hemmer_provider_engine=debug").is_ok());
        assert!(EnvFilter::try_new("warn,hemmer_provider_engine=trace").is_ok());
    }

    #[test]
    fn test_log_ids_are_unique_uuids() {
        let a = new_log_id();
        let b = new_log_id();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_operation_span_does_not_panic_without_subscriber() {
        let span = operation_span("tencentcloud_subnet", OperationKind::Create, "log-1");
        let _guard = span.enter();
        tracing::info!("inside span");
    }
}
