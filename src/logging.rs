//! Tracing subscriber setup for host processes.
//!
//! Stdout carries the protocol, so log output goes to stderr.

use tracing_subscriber::EnvFilter;

use crate::error::{HostError, Result};

/// Install a global fmt subscriber writing to stderr.
///
/// The filter comes from `RUST_LOG`; `default_filter` (for example
/// `"jsonrpc_host=info"`) applies when it is unset or invalid.
///
/// # Errors
///
/// Returns [`HostError::Config`] if a global subscriber is already set.
pub fn init_logging(default_filter: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| HostError::Config(format!("failed to install logger: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let first = init_logging("warn");
        let second = init_logging("warn");
        // Another test in this binary may have installed one first.
        assert!(first.is_err() || second.is_err());
        assert!(matches!(second, Err(HostError::Config(_))));
    }
}
