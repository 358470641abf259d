//! Client configuration and endpoint description
//!
//! [`ClientConfig`] is supplied once when a client is constructed. Changing
//! any option means building a new client.
//!
//! ```toml
//! host = "inference.internal"
//! port = 50051
//! use_tls = true
//! tls_cert_path = "/etc/follicore/ca.pem"
//! request_timeout_ms = 30000
//!
//! [retry]
//! max_retries = 3
//! initial_backoff_ms = 100
//!
//! [keepalive]
//! time_ms = 10000
//! ```

use crate::error::{ClientError, Result};
use follicore_core_resilience::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Network location of the inference service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    /// PEM file holding the CA certificate used to verify the server
    pub tls_cert_path: Option<PathBuf>,
    /// Server name expected in the certificate, when it differs from `host`
    pub tls_domain: Option<String>,
}

impl Endpoint {
    /// `host:port`, with IPv6 literals bracketed
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// URI handed to the transport
    pub fn uri(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{}://{}", scheme, self.authority())
    }

    /// Name checked against the server certificate
    pub fn server_name(&self) -> &str {
        self.tls_domain.as_deref().unwrap_or(&self.host)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

/// Retry and reconnection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.backoff_multiplier,
        }
    }
}

/// HTTP/2 keepalive pings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeepaliveConfig {
    /// Interval between pings
    #[serde(default = "default_keepalive_time_ms")]
    pub time_ms: u64,

    /// How long to wait for a ping acknowledgement
    #[serde(default = "default_keepalive_timeout_ms")]
    pub timeout_ms: u64,

    /// Keep pinging while no call is active
    #[serde(default = "default_true")]
    pub permit_without_calls: bool,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            time_ms: default_keepalive_time_ms(),
            timeout_ms: default_keepalive_timeout_ms(),
            permit_without_calls: true,
        }
    }
}

/// Background health watch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthWatchConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_health_interval_ms")]
    pub interval_ms: u64,

    /// Consecutive transport failures before the channel is declared lost
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

impl Default for HealthWatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: default_health_interval_ms(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

/// Complete client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub use_tls: bool,

    #[serde(default)]
    pub tls_cert_path: Option<PathBuf>,

    /// Override for the TLS server name (SNI)
    #[serde(default)]
    pub tls_domain: Option<String>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Deadline applied to every call, measured from when the call is issued
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub keepalive: KeepaliveConfig,

    /// Gzip request and response bodies
    #[serde(default)]
    pub compression: bool,

    /// Largest message accepted or sent, in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Health service name probed for readiness; empty means the whole server
    #[serde(default)]
    pub readiness_service: String,

    #[serde(default)]
    pub health: HealthWatchConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            use_tls: false,
            tls_cert_path: None,
            tls_domain: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            retry: RetryConfig::default(),
            keepalive: KeepaliveConfig::default(),
            compression: false,
            max_message_size: default_max_message_size(),
            readiness_service: String::new(),
            health: HealthWatchConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Configuration for `host:port` with every other option at its default
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
            use_tls: self.use_tls,
            tls_cert_path: self.tls_cert_path.clone(),
            tls_domain: self.tls_domain.clone(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.policy()
    }

    /// Reconnection failures tolerated before the client gives up
    pub fn max_reconnect_attempts(&self) -> u32 {
        self.retry.max_retries.saturating_mul(2).max(1)
    }

    /// Reject configurations the client cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ClientError::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ClientError::Config("port must be non-zero".to_string()));
        }
        if self.connect_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(ClientError::Config(
                "connect_timeout_ms and request_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.retry.backoff_multiplier.is_nan() || self.retry.backoff_multiplier < 1.0 {
            return Err(ClientError::Config(format!(
                "backoff_multiplier must be at least 1.0, got {}",
                self.retry.backoff_multiplier
            )));
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(ClientError::Config(format!(
                "max_backoff_ms ({}) is below initial_backoff_ms ({})",
                self.retry.max_backoff_ms, self.retry.initial_backoff_ms
            )));
        }
        if self.max_message_size == 0 {
            return Err(ClientError::Config(
                "max_message_size must be non-zero".to_string(),
            ));
        }
        if self.health.enabled
            && (self.health.interval_ms == 0 || self.health.failure_threshold == 0)
        {
            return Err(ClientError::Config(
                "health watch needs a non-zero interval_ms and failure_threshold".to_string(),
            ));
        }
        if self.use_tls {
            if let Some(path) = &self.tls_cert_path {
                if !path.is_file() {
                    return Err(ClientError::Config(format!(
                        "TLS certificate not found: {}",
                        path.display()
                    )));
                }
            }
        }
        Ok(())
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    50051
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_request_timeout_ms() -> u64 {
    30000
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    5000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_keepalive_time_ms() -> u64 {
    10000
}

fn default_keepalive_timeout_ms() -> u64 {
    5000
}

fn default_max_message_size() -> usize {
    100 * 1024 * 1024
}

fn default_health_interval_ms() -> u64 {
    10000
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_true() -> bool {
    true
}
