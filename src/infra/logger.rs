// src/infra/logger.rs — Tracing setup for the pipeline CLI

use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber. Stage progress lines go to stdout, so
/// diagnostics are routed to stderr and stay quiet at the default level
/// unless `RUST_LOG` raises it.
pub fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
