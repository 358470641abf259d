//! Transport seam between the connection state machine and the network
//!
//! The state machine only needs two things from a transport: a way to open a
//! channel (including the handshake) and a way to ask a channel for the
//! standard health status. [`GrpcTransport`] provides both over tonic; tests
//! drive the state machine with [`crate::testing::ScriptedTransport`].

use crate::config::{ClientConfig, Endpoint, KeepaliveConfig};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint as TonicEndpoint};
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;
use tracing::debug;

/// Serving status reported by the standard health service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServingStatus {
    Unknown,
    Serving,
    NotServing,
    /// The server does not know the requested service name
    ServiceUnknown,
}

impl ServingStatus {
    /// Map the health protocol's wire value
    pub fn from_wire(value: i32) -> Self {
        match value {
            1 => ServingStatus::Serving,
            2 => ServingStatus::NotServing,
            3 => ServingStatus::ServiceUnknown,
            _ => ServingStatus::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServingStatus::Unknown => "UNKNOWN",
            ServingStatus::Serving => "SERVING",
            ServingStatus::NotServing => "NOT_SERVING",
            ServingStatus::ServiceUnknown => "SERVICE_UNKNOWN",
        }
    }
}

impl fmt::Display for ServingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opens channels and queries their health
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Live transport handle; cloning must be cheap and share the connection
    type Channel: Clone + Send + Sync + 'static;

    /// Open a channel and complete the handshake
    async fn connect(&self) -> Result<Self::Channel>;

    /// Ask the remote health service for the status of `service`
    /// (the empty name means the server as a whole)
    async fn check_health(&self, channel: &Self::Channel, service: &str) -> Result<ServingStatus>;
}

/// tonic-backed transport
#[derive(Debug, Clone)]
pub struct GrpcTransport {
    endpoint: Endpoint,
    connect_timeout: Duration,
    request_timeout: Duration,
    keepalive: KeepaliveConfig,
}

impl GrpcTransport {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            endpoint: config.endpoint(),
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
            keepalive: config.keepalive.clone(),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Build the tonic endpoint, loading TLS material if needed
    ///
    /// No per-request timeout is set here: deadlines are attached to each
    /// request by the caller.
    pub async fn build_endpoint(&self) -> Result<TonicEndpoint> {
        let uri = self.endpoint.uri();
        let mut endpoint = TonicEndpoint::from_shared(uri.clone())
            .map_err(|e| ClientError::InvalidEndpoint(format!("{}: {}", uri, e)))?
            .connect_timeout(self.connect_timeout)
            .http2_keep_alive_interval(Duration::from_millis(self.keepalive.time_ms))
            .keep_alive_timeout(Duration::from_millis(self.keepalive.timeout_ms))
            .keep_alive_while_idle(self.keepalive.permit_without_calls);

        if self.endpoint.use_tls {
            let mut tls = ClientTlsConfig::new().domain_name(self.endpoint.server_name());
            tls = match &self.endpoint.tls_cert_path {
                Some(path) => {
                    let pem = tokio::fs::read(path).await.map_err(|e| {
                        ClientError::Config(format!(
                            "Failed to read TLS certificate {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
                    tls.ca_certificate(Certificate::from_pem(pem))
                }
                None => tls.with_webpki_roots(),
            };
            endpoint = endpoint
                .tls_config(tls)
                .map_err(|e| ClientError::Config(format!("Invalid TLS configuration: {}", e)))?;
        }

        Ok(endpoint)
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    type Channel = Channel;

    async fn connect(&self) -> Result<Channel> {
        let endpoint = self.build_endpoint().await?;
        debug!(endpoint = %self.endpoint, "opening channel");
        let channel = endpoint.connect().await?;
        Ok(channel)
    }

    async fn check_health(&self, channel: &Channel, service: &str) -> Result<ServingStatus> {
        let mut client = HealthClient::new(channel.clone());
        let mut request = tonic::Request::new(HealthCheckRequest {
            service: service.to_string(),
        });
        request.set_timeout(self.request_timeout);

        match client.check(request).await {
            Ok(response) => Ok(ServingStatus::from_wire(response.into_inner().status)),
            // The health service answers NOT_FOUND for names it has never heard of
            Err(status) if status.code() == tonic::Code::NotFound => {
                Ok(ServingStatus::ServiceUnknown)
            }
            Err(status) => Err(status.into()),
        }
    }
}
