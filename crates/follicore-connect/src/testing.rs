//! Testing utilities
//!
//! [`ScriptedTransport`] stands in for the network so the connection state
//! machine can be driven deterministically: each `connect()` and health check
//! consumes the next scripted outcome, falling back to a configurable default.
//!
//! ## Example
//!
//! ```
//! use follicore_connect::testing::{ConnectStep, ScriptedTransport};
//! use follicore_connect::{ClientConfig, ClientError, ConnectionManager, ConnectionState};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let transport = ScriptedTransport::new();
//! transport.push_connect(ConnectStep::Fail(ClientError::Connection("refused".into())));
//!
//! let manager = ConnectionManager::new(ClientConfig::default(), transport);
//! assert!(manager.connect().await.is_err());
//! assert_eq!(manager.state(), ConnectionState::Failed);
//! # }
//! ```

use crate::error::{ClientError, Result};
use crate::stub::{ServiceStub, StubContext};
use crate::transport::{ServingStatus, Transport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Channel handed out by [`ScriptedTransport`]; `id` increases with every successful connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FakeChannel {
    pub id: u64,
}

/// Outcome of one scripted `connect()`
#[derive(Debug, Clone)]
pub enum ConnectStep {
    Succeed,
    Fail(ClientError),
    /// Never completes; only a timeout or cancellation ends it
    Hang,
}

struct Script {
    connects: VecDeque<ConnectStep>,
    default_connect: ConnectStep,
    health: VecDeque<Result<ServingStatus>>,
    default_health: Result<ServingStatus>,
    next_channel: u64,
    connect_calls: u32,
    probed: Vec<String>,
}

/// In-memory [`Transport`] with scripted outcomes
#[derive(Clone)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    /// Connects succeed and health checks report `SERVING` unless scripted otherwise
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                connects: VecDeque::new(),
                default_connect: ConnectStep::Succeed,
                health: VecDeque::new(),
                default_health: Ok(ServingStatus::Serving),
                next_channel: 1,
                connect_calls: 0,
                probed: Vec::new(),
            })),
        }
    }

    pub fn push_connect(&self, step: ConnectStep) {
        self.lock().connects.push_back(step);
    }

    pub fn set_default_connect(&self, step: ConnectStep) {
        self.lock().default_connect = step;
    }

    pub fn push_health(&self, result: Result<ServingStatus>) {
        self.lock().health.push_back(result);
    }

    pub fn set_default_health(&self, result: Result<ServingStatus>) {
        self.lock().default_health = result;
    }

    pub fn connect_calls(&self) -> u32 {
        self.lock().connect_calls
    }

    /// Service names passed to health checks, oldest first
    pub fn probed_services(&self) -> Vec<String> {
        self.lock().probed.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    type Channel = FakeChannel;

    async fn connect(&self) -> Result<FakeChannel> {
        let step = {
            let mut script = self.lock();
            script.connect_calls += 1;
            match script.connects.pop_front() {
                Some(step) => step,
                None => script.default_connect.clone(),
            }
        };

        match step {
            ConnectStep::Succeed => {
                let mut script = self.lock();
                let id = script.next_channel;
                script.next_channel += 1;
                Ok(FakeChannel { id })
            }
            ConnectStep::Fail(err) => Err(err),
            ConnectStep::Hang => std::future::pending().await,
        }
    }

    async fn check_health(&self, _channel: &FakeChannel, service: &str) -> Result<ServingStatus> {
        let mut script = self.lock();
        script.probed.push(service.to_string());
        match script.health.pop_front() {
            Some(result) => result,
            None => script.default_health.clone(),
        }
    }
}

static NEXT_BIND: AtomicU64 = AtomicU64::new(1);

/// Stub that records what it was bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingStub {
    pub channel: FakeChannel,
    /// Fully-qualified service name
    pub service: String,
    /// Unique per `bind` call, so cache hits can be told apart from rebinds
    pub bind_id: u64,
}

impl ServiceStub<FakeChannel> for RecordingStub {
    fn bind(channel: FakeChannel, ctx: &StubContext) -> Self {
        Self {
            channel,
            service: ctx.service.full_name.clone(),
            bind_id: NEXT_BIND.fetch_add(1, Ordering::Relaxed),
        }
    }
}
