//! FolliCore Connect: resilient gRPC client for the inference service
//!
//! This crate manages the single connection between FolliCore and its remote
//! inference service (vision and acoustic models), verifies the service is
//! ready, and runs individual calls with bounded retry and backoff.
//!
//! # Architecture
//!
//! - **ConnectionManager**: owns the channel, drives the connection state machine, schedules reconnection and publishes lifecycle events
//! - **HealthProber**: liveness and readiness checks over the standard health protocol
//! - **StubResolver**: binds typed stubs to the live channel and caches them until the channel is replaced
//! - **InferenceClient**: facade that routes every call through the retry executor from `follicore-core-resilience`
//!
//! The network sits behind the [`Transport`] trait. [`GrpcTransport`] is the
//! tonic implementation; [`testing::ScriptedTransport`] replaces it in tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use follicore_connect::{ClientConfig, ConnectionState, InferenceClient};
//!
//! async fn example() -> follicore_connect::Result<()> {
//!     let mut config = ClientConfig::new("10.0.0.5", 50051);
//!     config.readiness_service = "follicore.vision.VisionService".to_string();
//!
//!     let client = InferenceClient::new(config)?;
//!     client.connect().await?;
//!
//!     if client.state() == ConnectionState::Ready {
//!         println!("models are serving");
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod manager;
pub mod schema;
pub mod stub;
pub mod testing;
pub mod transport;

pub use client::InferenceClient;
pub use config::{ClientConfig, Endpoint, HealthWatchConfig, KeepaliveConfig, RetryConfig};
pub use error::{ClientError, Result};
pub use events::{ConnectionEvent, EventSubscription};
pub use health::HealthProber;
pub use manager::{ConnectionManager, ConnectionState, ConnectionStats};
pub use schema::{MethodDescriptor, Schema, SchemaRegistry, ServiceDescriptor};
pub use stub::{GenericStub, ServiceStub, StubContext, StubResolver};
pub use transport::{GrpcTransport, ServingStatus, Transport};
