/*!
 * FolliCore - client tooling for the FolliCore inference service
 *
 * Settings loading (TOML file plus FOLLICORE_* environment overrides),
 * logging initialisation and the reports printed by the `follicore` CLI.
 * The client itself lives in `follicore-connect`; retry logic in
 * `follicore-core-resilience`.
 */

pub mod config;
pub mod error;
pub mod logging;
pub mod report;

// Re-export commonly used types
pub use config::{LogLevel, LoggingConfig, Settings};
pub use error::{FolliError, Result, EXIT_FATAL, EXIT_NOT_READY, EXIT_SUCCESS};
pub use follicore_connect::{ClientConfig, ConnectionState, InferenceClient};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
