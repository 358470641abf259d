/*!
 * Settings for the FolliCore client tooling
 *
 * A settings file has a `[client]` table (see `follicore_connect::ClientConfig`)
 * and a `[logging]` table. Environment variables with the `FOLLICORE_` prefix
 * override the file; they use the same names as the inference server.
 */

use crate::error::{FolliError, Result};
use follicore_connect::ClientConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ENV_HOST: &str = "FOLLICORE_GRPC_HOST";
pub const ENV_PORT: &str = "FOLLICORE_GRPC_PORT";
pub const ENV_ENABLE_TLS: &str = "FOLLICORE_ENABLE_TLS";
pub const ENV_TLS_CERT: &str = "FOLLICORE_TLS_CERT";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "FOLLICORE_REQUEST_TIMEOUT_MS";
pub const ENV_LOG_LEVEL: &str = "FOLLICORE_LOG_LEVEL";

const ENV_VARS: [&str; 6] = [
    ENV_HOST,
    ENV_PORT,
    ENV_ENABLE_TLS,
    ENV_TLS_CERT,
    ENV_REQUEST_TIMEOUT_MS,
    ENV_LOG_LEVEL,
];

/// Complete settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Diagnostic output settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    /// Log file path (None = stderr)
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Shorthand for level = debug
    #[serde(default)]
    pub verbose: bool,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }

    /// Parse a level name, case-insensitively; `warning` is accepted for `warn`
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| FolliError::io(path, e))?;
        let settings: Settings = toml::from_str(&contents)?;
        Ok(settings)
    }

    /// Save settings to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| FolliError::io(path, e))
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Resolve settings the way the CLI does: the file if given, then the
    /// process environment, then validation
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let env: HashMap<String, String> = ENV_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v)))
            .collect();
        settings.apply_env(&env)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Overlay `FOLLICORE_*` variables from `env`
    ///
    /// Empty values are ignored. Values that fail to parse are rejected
    /// rather than silently falling back to the file.
    pub fn apply_env(&mut self, env: &HashMap<String, String>) -> Result<()> {
        let get = |name: &str| env.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());

        if let Some(host) = get(ENV_HOST) {
            self.client.host = host.to_string();
        }
        if let Some(port) = get(ENV_PORT) {
            self.client.port = port
                .parse()
                .map_err(|_| FolliError::Config(format!("{} is not a port: {}", ENV_PORT, port)))?;
        }
        if let Some(tls) = get(ENV_ENABLE_TLS) {
            self.client.use_tls = parse_bool(tls).ok_or_else(|| {
                FolliError::Config(format!("{} is not a boolean: {}", ENV_ENABLE_TLS, tls))
            })?;
        }
        if let Some(cert) = get(ENV_TLS_CERT) {
            self.client.tls_cert_path = Some(PathBuf::from(cert));
        }
        if let Some(timeout) = get(ENV_REQUEST_TIMEOUT_MS) {
            self.client.request_timeout_ms = timeout.parse().map_err(|_| {
                FolliError::Config(format!(
                    "{} is not a number of milliseconds: {}",
                    ENV_REQUEST_TIMEOUT_MS, timeout
                ))
            })?;
        }
        if let Some(level) = get(ENV_LOG_LEVEL) {
            self.logging.level = LogLevel::parse(level).ok_or_else(|| {
                FolliError::Config(format!("{} is not a log level: {}", ENV_LOG_LEVEL, level))
            })?;
        }

        debug!(
            endpoint = %self.client.endpoint(),
            overrides = ENV_VARS.iter().filter(|name| get(name).is_some()).count(),
            "applied environment overrides"
        );
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.client
            .validate()
            .map_err(|e| FolliError::Config(e.to_string()))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.client.host, "localhost");
        assert_eq!(settings.client.port, 50051);
        assert_eq!(settings.logging.level, LogLevel::Info);
        assert!(settings.logging.file.is_none());
    }

    #[test]
    fn test_file_round_trip() {
        let mut settings = Settings::default();
        settings.client.host = "inference.internal".to_string();
        settings.client.retry.max_retries = 5;
        settings.logging.level = LogLevel::Debug;

        let file = NamedTempFile::new().unwrap();
        settings.to_file(file.path()).unwrap();
        let loaded = Settings::from_file(file.path()).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "[client]\nhost = \"10.0.0.5\"\n\n[logging]\nlevel = \"warn\"\n",
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.client.host, "10.0.0.5");
        assert_eq!(settings.client.port, 50051);
        assert_eq!(settings.client.retry.max_retries, 3);
        assert_eq!(settings.logging.level, LogLevel::Warn);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = Settings::from_file(Path::new("/nonexistent/follicore.toml"));
        assert!(matches!(result, Err(FolliError::Io { .. })));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "[client\nhost = ").unwrap();
        assert!(matches!(
            Settings::from_file(file.path()),
            Err(FolliError::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut settings = Settings::default();
        settings
            .apply_env(&env(&[
                (ENV_HOST, "ml.follicore.local"),
                (ENV_PORT, "6000"),
                (ENV_ENABLE_TLS, "true"),
                (ENV_TLS_CERT, "/etc/follicore/ca.pem"),
                (ENV_REQUEST_TIMEOUT_MS, "1500"),
                (ENV_LOG_LEVEL, "WARNING"),
            ]))
            .unwrap();

        assert_eq!(settings.client.host, "ml.follicore.local");
        assert_eq!(settings.client.port, 6000);
        assert!(settings.client.use_tls);
        assert_eq!(
            settings.client.tls_cert_path,
            Some(PathBuf::from("/etc/follicore/ca.pem"))
        );
        assert_eq!(settings.client.request_timeout_ms, 1500);
        assert_eq!(settings.logging.level, LogLevel::Warn);
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut settings = Settings::default();
        settings
            .apply_env(&env(&[(ENV_HOST, ""), (ENV_PORT, "  ")]))
            .unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_invalid_env_values_are_rejected() {
        for (name, value) in [
            (ENV_PORT, "seventy"),
            (ENV_PORT, "70000"),
            (ENV_ENABLE_TLS, "maybe"),
            (ENV_REQUEST_TIMEOUT_MS, "-1"),
            (ENV_LOG_LEVEL, "loud"),
        ] {
            let mut settings = Settings::default();
            let result = settings.apply_env(&env(&[(name, value)]));
            assert!(
                matches!(result, Err(FolliError::Config(_))),
                "{}={} should be rejected",
                name,
                value
            );
        }
    }

    #[test]
    fn test_validate_surfaces_client_problems() {
        let mut settings = Settings::default();
        settings.client.port = 0;
        assert!(matches!(settings.validate(), Err(FolliError::Config(_))));
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Error.to_tracing_level(), tracing::Level::ERROR);
        assert_eq!(LogLevel::Warn.to_tracing_level(), tracing::Level::WARN);
        assert_eq!(LogLevel::Info.to_tracing_level(), tracing::Level::INFO);
        assert_eq!(LogLevel::Debug.to_tracing_level(), tracing::Level::DEBUG);
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
    }
}
