//! ConnectionManager: lifecycle of the single channel to the inference service
//!
//! ```text
//!                connect()                 handshake ok             probe SERVING
//! Disconnected ───────────► Connecting ──────────────► Connected ──────────────► Ready
//!      ▲                        │                        │   ▲                     │
//!      │ disconnect()           │ handshake failed       │   │ reconnected         │
//!      │ (from any state)       │ or timed out           ▼   │                     │
//!      │                        ▼                      Reconnecting ◄──────────────┘
//!      └──────────────────── Failed ◄───────────────────────┘     transport failure
//!                                   2 × max_retries reconnects failed
//! ```
//!
//! All state lives behind one mutex that is never held across an await.
//! Lifecycle events are emitted while the lock is held, so subscribers see
//! them in transition order. Background work (reconnection, health watch)
//! captures the session epoch and checks it again before touching state,
//! which is how `disconnect()` fences off anything still in flight.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::events::{ConnectionEvent, EventBus, EventSubscription};
use crate::health::HealthProber;
use crate::schema::SchemaRegistry;
use crate::stub::{StubCache, StubResolver};
use crate::transport::{GrpcTransport, ServingStatus, Transport};
use follicore_core_resilience::RetryPolicy;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle state of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Ready,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    /// Whether calls may be issued in this state
    ///
    /// While reconnecting, calls still go out on the previous channel.
    pub fn allows_rpc(self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::Ready | ConnectionState::Reconnecting
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Ready => "ready",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the manager's bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub state: ConnectionState,
    /// Number of channels installed so far
    pub generation: u64,
    /// Failed reconnection attempts since the channel was lost
    pub reconnect_attempt: u32,
    /// Times the stub cache was cleared
    pub stub_invalidations: u64,
}

struct Core<C> {
    state: ConnectionState,
    channel: Option<C>,
    generation: u64,
    /// Bumped by connect() and disconnect(); background tasks carry the epoch they were started in
    epoch: u64,
    reconnect_attempt: u32,
    reconnect_scheduled: bool,
    cancel: CancellationToken,
}

pub(crate) struct Shared<T: Transport> {
    transport: T,
    config: ClientConfig,
    policy: RetryPolicy,
    core: Mutex<Core<T::Channel>>,
    events: Arc<EventBus>,
    stubs: StubCache,
    schemas: SchemaRegistry,
}

/// Owns the channel and drives the connection state machine
///
/// Cheap to clone; clones share the same connection.
///
/// # Example
///
/// ```rust,no_run
/// use follicore_connect::{ClientConfig, ConnectionManager, ConnectionEvent};
///
/// # async fn example() -> follicore_connect::Result<()> {
/// let manager = ConnectionManager::from_config(ClientConfig::new("10.0.0.5", 50051))?;
/// let mut events = manager.subscribe();
///
/// manager.connect().await?;
/// assert_eq!(events.recv().await, Some(ConnectionEvent::Connected));
///
/// manager.disconnect();
/// # Ok(())
/// # }
/// ```
pub struct ConnectionManager<T: Transport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> Clone for ConnectionManager<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl ConnectionManager<GrpcTransport> {
    /// Validate `config` and build a manager over the tonic transport
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = GrpcTransport::new(&config);
        Ok(Self::new(config, transport))
    }
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        let policy = config.retry_policy();
        Self {
            shared: Arc::new(Shared {
                transport,
                config,
                policy,
                core: Mutex::new(Core {
                    state: ConnectionState::Disconnected,
                    channel: None,
                    generation: 0,
                    epoch: 0,
                    reconnect_attempt: 0,
                    reconnect_scheduled: false,
                    cancel: CancellationToken::new(),
                }),
                events: Arc::new(EventBus::default()),
                stubs: StubCache::default(),
                schemas: SchemaRegistry::new(),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn transport(&self) -> &T {
        &self.shared.transport
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    pub fn stats(&self) -> ConnectionStats {
        let core = self.shared.lock();
        ConnectionStats {
            state: core.state,
            generation: core.generation,
            reconnect_attempt: core.reconnect_attempt,
            stub_invalidations: self.shared.stubs.invalidations(),
        }
    }

    /// Receive lifecycle events from now on
    pub fn subscribe(&self) -> EventSubscription {
        self.shared.events.subscribe()
    }

    pub fn health(&self) -> HealthProber<T> {
        HealthProber::new(self.clone())
    }

    pub fn stubs(&self) -> StubResolver<T> {
        StubResolver::new(self.clone())
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.shared.schemas
    }

    /// Open the channel
    ///
    /// Resolves once the handshake has completed; a readiness probe follows
    /// before returning, so on success the state is `Connected` or `Ready`.
    /// Calling it while already connected is a no-op. Calling it while a
    /// connection attempt or reconnection is running is a precondition error.
    pub async fn connect(&self) -> Result<()> {
        let (epoch, cancel) = {
            let mut core = self.shared.lock();
            match core.state {
                ConnectionState::Connected | ConnectionState::Ready => return Ok(()),
                ConnectionState::Connecting | ConnectionState::Reconnecting => {
                    return Err(ClientError::Precondition(format!(
                        "connect() called while {}",
                        core.state
                    )));
                }
                ConnectionState::Disconnected | ConnectionState::Failed => {}
            }
            core.epoch += 1;
            core.cancel = CancellationToken::new();
            self.shared.transition(&mut core, ConnectionState::Connecting);
            (core.epoch, core.cancel.clone())
        };

        let endpoint = self.shared.config.endpoint();
        info!(endpoint = %endpoint, "connecting to inference service");

        let result = tokio::select! {
            result = self.shared.open_channel() => result,
            _ = cancel.cancelled() => Err(ClientError::Connection(
                "connect cancelled by disconnect".to_string(),
            )),
        };

        {
            let mut core = self.shared.lock();
            if core.epoch != epoch || core.state != ConnectionState::Connecting {
                debug!(endpoint = %endpoint, "connect superseded by disconnect");
                return Err(ClientError::Connection(
                    "connect cancelled by disconnect".to_string(),
                ));
            }
            match result {
                Ok(channel) => {
                    self.shared.install_channel(&mut core, Some(channel));
                    core.reconnect_attempt = 0;
                    self.shared.transition(&mut core, ConnectionState::Connected);
                }
                Err(err) => {
                    warn!(endpoint = %endpoint, error = %err, "connect failed");
                    self.shared.transition(&mut core, ConnectionState::Failed);
                    self.shared.events.emit(ConnectionEvent::Error(err.clone()));
                    return Err(err);
                }
            }
        }

        if self.shared.config.health.enabled {
            self.spawn_health_watch(epoch);
        }

        self.health().check_model_readiness().await;
        Ok(())
    }

    /// Close the channel and stop all background work
    ///
    /// Safe in every state; always ends in `Disconnected`.
    pub fn disconnect(&self) {
        let mut core = self.shared.lock();
        core.cancel.cancel();
        core.epoch += 1;
        core.reconnect_scheduled = false;
        core.reconnect_attempt = 0;
        self.shared.install_channel(&mut core, None);
        if core.state != ConnectionState::Disconnected {
            info!(from = %core.state, "disconnecting");
            self.shared.transition(&mut core, ConnectionState::Disconnected);
        }
    }

    /// Tell the manager the channel of `generation` is broken
    ///
    /// From `Connected` or `Ready` this moves to `Reconnecting` and schedules
    /// a reconnection. Reports in any other state, and reports about a
    /// channel that has since been replaced, are ignored. Must be called
    /// from within a Tokio runtime.
    pub fn report_transport_failure(&self, generation: u64, cause: &ClientError) {
        let mut core = self.shared.lock();
        if core.generation != generation {
            debug!(
                reported = generation,
                live = core.generation,
                error = %cause,
                "failure on a replaced channel ignored"
            );
            return;
        }
        match core.state {
            ConnectionState::Connected | ConnectionState::Ready => {}
            state => {
                debug!(state = %state, error = %cause, "transport failure ignored");
                return;
            }
        }
        warn!(
            state = %core.state,
            generation,
            error = %cause,
            "transport failure, reconnecting"
        );
        self.shared.transition(&mut core, ConnectionState::Reconnecting);
        self.schedule_reconnect(&mut core);
    }

    /// Channel for an outgoing call, with its generation
    pub(crate) fn rpc_channel(&self) -> Result<(T::Channel, u64)> {
        let core = self.shared.lock();
        if !core.state.allows_rpc() {
            return Err(ClientError::Precondition(format!(
                "cannot issue calls while {}",
                core.state
            )));
        }
        match &core.channel {
            Some(channel) => Ok((channel.clone(), core.generation)),
            None => Err(ClientError::Precondition(format!(
                "no channel while {}",
                core.state
            ))),
        }
    }

    /// Move `Connected → Ready` if `generation` is still the live channel
    pub(crate) fn promote_ready(&self, generation: u64) -> bool {
        let mut core = self.shared.lock();
        if core.state == ConnectionState::Connected && core.generation == generation {
            self.shared.transition(&mut core, ConnectionState::Ready);
            true
        } else {
            core.state == ConnectionState::Ready && core.generation == generation
        }
    }

    pub(crate) fn stub_cache(&self) -> &StubCache {
        &self.shared.stubs
    }

    /// Run one health check against the current channel, bounded by the request timeout
    pub(crate) async fn probe(&self, service: &str) -> Result<(ServingStatus, u64)> {
        let (channel, generation) = self.rpc_channel()?;
        let request_timeout = self.shared.config.request_timeout();
        match timeout(
            request_timeout,
            self.shared.transport.check_health(&channel, service),
        )
        .await
        {
            Ok(result) => result.map(|status| (status, generation)),
            Err(_) => Err(ClientError::Timeout(format!(
                "health check exceeded {} ms",
                request_timeout.as_millis()
            ))),
        }
    }

    fn schedule_reconnect(&self, core: &mut Core<T::Channel>) {
        if core.reconnect_scheduled {
            return;
        }
        core.reconnect_scheduled = true;

        let manager = self.clone();
        let epoch = core.epoch;
        let cancel = core.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = manager.run_reconnect(epoch) => {}
            }
        });
    }

    async fn run_reconnect(&self, epoch: u64) {
        loop {
            let (attempt, delay) = {
                let core = self.shared.lock();
                if core.epoch != epoch || core.state != ConnectionState::Reconnecting {
                    return;
                }
                (
                    core.reconnect_attempt,
                    self.shared.policy.backoff_for(core.reconnect_attempt),
                )
            };

            debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnection scheduled");
            sleep(delay).await;

            let result = self.shared.open_channel().await;

            let generation = {
                let mut core = self.shared.lock();
                if core.epoch != epoch || core.state != ConnectionState::Reconnecting {
                    return;
                }
                match result {
                    Ok(channel) => {
                        self.shared.install_channel(&mut core, Some(channel));
                        core.reconnect_attempt = 0;
                        core.reconnect_scheduled = false;
                        info!(attempt, generation = core.generation, "reconnected");
                        self.shared.transition(&mut core, ConnectionState::Connected);
                        core.generation
                    }
                    Err(err) => {
                        core.reconnect_attempt += 1;
                        let limit = self.shared.config.max_reconnect_attempts();
                        if core.reconnect_attempt >= limit {
                            warn!(
                                attempts = core.reconnect_attempt,
                                error = %err,
                                "reconnection attempts exhausted"
                            );
                            core.reconnect_scheduled = false;
                            self.shared.install_channel(&mut core, None);
                            self.shared.transition(&mut core, ConnectionState::Failed);
                            self.shared.events.emit(ConnectionEvent::Error(err));
                            core.cancel.cancel();
                            return;
                        }
                        warn!(
                            attempt = core.reconnect_attempt,
                            max_attempts = limit,
                            error = %err,
                            "reconnection failed"
                        );
                        continue;
                    }
                }
            };

            if let Ok((ServingStatus::Serving, probed)) =
                self.probe(&self.shared.config.readiness_service).await
            {
                if probed == generation {
                    self.promote_ready(generation);
                }
            }
            return;
        }
    }

    fn spawn_health_watch(&self, epoch: u64) {
        let manager = self.clone();
        let cancel = self.shared.lock().cancel.clone();
        let interval = Duration::from_millis(self.shared.config.health.interval_ms);
        let threshold = self.shared.config.health.failure_threshold;

        tokio::spawn(async move {
            let mut failures = 0u32;
            let mut watched = 0u64;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = sleep(interval) => {}
                }

                let (state, generation) = {
                    let core = manager.shared.lock();
                    if core.epoch != epoch {
                        return;
                    }
                    (core.state, core.generation)
                };
                if !matches!(state, ConnectionState::Connected | ConnectionState::Ready) {
                    failures = 0;
                    continue;
                }
                if generation != watched {
                    watched = generation;
                    failures = 0;
                }

                let service = manager.shared.config.readiness_service.as_str();
                match manager.probe(service).await {
                    Ok((status, probed)) => {
                        failures = 0;
                        if status == ServingStatus::Serving {
                            manager.promote_ready(probed);
                        } else {
                            debug!(status = %status, "health watch: not serving");
                        }
                    }
                    Err(err @ (ClientError::Connection(_) | ClientError::Timeout(_))) => {
                        failures += 1;
                        warn!(failures, threshold, error = %err, "health watch probe failed");
                        if failures >= threshold {
                            failures = 0;
                            manager.report_transport_failure(watched, &err);
                        }
                    }
                    Err(err) => {
                        debug!(error = %err, "health watch probe rejected");
                    }
                }
            }
        });
    }
}

impl<T: Transport> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Core<T::Channel>> {
        // A panic while holding the lock cannot leave Core half-updated in a
        // way later transitions cannot handle, so poisoning is ignored.
        self.core.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Handshake bounded by the connect timeout; every failure is connection-category
    async fn open_channel(&self) -> Result<T::Channel> {
        let connect_timeout = self.config.connect_timeout();
        match timeout(connect_timeout, self.transport.connect()).await {
            Ok(Ok(channel)) => Ok(channel),
            Ok(Err(err @ ClientError::Connection(_))) => Err(err),
            Ok(Err(err)) => Err(ClientError::Connection(err.to_string())),
            Err(_) => Err(ClientError::Connection(format!(
                "handshake timed out after {} ms",
                connect_timeout.as_millis()
            ))),
        }
    }

    /// Swap the channel; replacing or dropping a live channel clears the stub cache
    fn install_channel(&self, core: &mut Core<T::Channel>, channel: Option<T::Channel>) {
        if core.channel.is_some() {
            self.stubs.invalidate();
        }
        if channel.is_some() {
            core.generation += 1;
        }
        core.channel = channel;
    }

    fn transition(&self, core: &mut Core<T::Channel>, next: ConnectionState) {
        let previous = core.state;
        if previous == next {
            return;
        }
        core.state = next;
        info!(from = %previous, to = %next, "connection state changed");

        let event = match next {
            ConnectionState::Connected => Some(ConnectionEvent::Connected),
            ConnectionState::Ready => Some(ConnectionEvent::Ready),
            ConnectionState::Reconnecting => Some(ConnectionEvent::Reconnecting),
            ConnectionState::Disconnected => Some(ConnectionEvent::Disconnected),
            // Failed is announced with its cause by the caller
            ConnectionState::Connecting | ConnectionState::Failed => None,
        };
        if let Some(event) = event {
            self.events.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ConnectStep, ScriptedTransport};

    fn config() -> ClientConfig {
        let mut config = ClientConfig::new("127.0.0.1", 50051);
        config.connect_timeout_ms = 50;
        config.retry.max_retries = 2;
        config
    }

    #[tokio::test]
    async fn test_connect_reaches_ready_when_serving() {
        let manager = ConnectionManager::new(config(), ScriptedTransport::new());
        let mut events = manager.subscribe();

        manager.connect().await.unwrap();

        assert_eq!(manager.state(), ConnectionState::Ready);
        assert_eq!(
            events.drain(),
            vec![ConnectionEvent::Connected, ConnectionEvent::Ready]
        );
        assert_eq!(manager.stats().generation, 1);
    }

    #[tokio::test]
    async fn test_connect_stays_connected_when_not_serving() {
        let transport = ScriptedTransport::new();
        transport.set_default_health(Ok(ServingStatus::NotServing));
        let manager = ConnectionManager::new(config(), transport);

        manager.connect().await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_connect_when_connected_is_noop() {
        let transport = ScriptedTransport::new();
        let manager = ConnectionManager::new(config(), transport.clone());
        manager.connect().await.unwrap();
        manager.connect().await.unwrap();
        assert_eq!(transport.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_handshake_failure_moves_to_failed() {
        let transport = ScriptedTransport::new();
        transport.push_connect(ConnectStep::Fail(ClientError::Connection("refused".into())));
        let manager = ConnectionManager::new(config(), transport);
        let mut events = manager.subscribe();

        let err = manager.connect().await.unwrap_err();
        assert!(err.is_connection());
        assert_eq!(manager.state(), ConnectionState::Failed);
        assert_eq!(
            events.drain(),
            vec![ConnectionEvent::Error(ClientError::Connection("refused".into()))]
        );
    }

    #[tokio::test]
    async fn test_non_connection_handshake_error_is_wrapped() {
        let transport = ScriptedTransport::new();
        transport.push_connect(ConnectStep::Fail(ClientError::Config("bad cert".into())));
        let manager = ConnectionManager::new(config(), transport);

        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, ClientError::Connection(ref m) if m.contains("bad cert")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_handshake_times_out() {
        let transport = ScriptedTransport::new();
        transport.push_connect(ConnectStep::Hang);
        let manager = ConnectionManager::new(config(), transport);
        let mut events = manager.subscribe();

        let err = manager.connect().await.unwrap_err();
        assert!(err.is_connection());
        assert_eq!(manager.state(), ConnectionState::Failed);

        let emitted = events.drain();
        assert_eq!(emitted.len(), 1);
        assert!(matches!(emitted[0], ConnectionEvent::Error(_)));
    }

    #[tokio::test]
    async fn test_connect_recovers_from_failed() {
        let transport = ScriptedTransport::new();
        transport.push_connect(ConnectStep::Fail(ClientError::Connection("refused".into())));
        let manager = ConnectionManager::new(config(), transport);

        assert!(manager.connect().await.is_err());
        manager.connect().await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Ready);
    }

    /// Disconnect from `manager`'s current state, expecting exactly one `Disconnected` event
    fn assert_disconnects(manager: &ConnectionManager<ScriptedTransport>, from: ConnectionState) {
        assert_eq!(manager.state(), from);
        let mut events = manager.subscribe();
        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(events.drain(), vec![ConnectionEvent::Disconnected]);
        assert!(manager.rpc_channel().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_from_ready() {
        let manager = ConnectionManager::new(config(), ScriptedTransport::new());
        manager.connect().await.unwrap();
        assert_disconnects(&manager, ConnectionState::Ready);
    }

    #[tokio::test]
    async fn test_disconnect_from_connected() {
        let transport = ScriptedTransport::new();
        transport.set_default_health(Ok(ServingStatus::NotServing));
        let manager = ConnectionManager::new(config(), transport);
        manager.connect().await.unwrap();
        assert_disconnects(&manager, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_disconnect_after_handshake_failure() {
        let transport = ScriptedTransport::new();
        transport.push_connect(ConnectStep::Fail(ClientError::Connection("refused".into())));
        let manager = ConnectionManager::new(config(), transport);
        assert!(manager.connect().await.is_err());
        assert_disconnects(&manager, ConnectionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_after_reconnect_exhaustion() {
        let transport = ScriptedTransport::new();
        let manager = ConnectionManager::new(config(), transport.clone());
        manager.connect().await.unwrap();

        transport.set_default_connect(ConnectStep::Fail(ClientError::Connection("refused".into())));
        manager.report_transport_failure(1, &ClientError::Connection("reset".into()));
        // 100 + 200 + 400 + 800 ms of backoff before giving up
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_disconnects(&manager, ConnectionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_while_reconnecting() {
        let transport = ScriptedTransport::new();
        let manager = ConnectionManager::new(config(), transport.clone());
        manager.connect().await.unwrap();

        transport.set_default_connect(ConnectStep::Hang);
        manager.report_transport_failure(1, &ClientError::Connection("reset".into()));
        assert_disconnects(&manager, ConnectionState::Reconnecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_on_replaced_channel_is_ignored() {
        let transport = ScriptedTransport::new();
        let manager = ConnectionManager::new(config(), transport.clone());
        manager.connect().await.unwrap();

        manager.report_transport_failure(1, &ClientError::Connection("reset".into()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(manager.state(), ConnectionState::Ready);
        assert_eq!(manager.stats().generation, 2);

        // A late failure from a call that was still running on channel 1
        manager.report_transport_failure(1, &ClientError::Connection("reset".into()));
        assert_eq!(manager.state(), ConnectionState::Ready);
        let stats = manager.stats();
        assert_eq!(stats.generation, 2);
        assert_eq!(stats.stub_invalidations, 1);
        assert_eq!(transport.connect_calls(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_when_disconnected_emits_nothing() {
        let manager = ConnectionManager::new(config(), ScriptedTransport::new());
        let mut events = manager.subscribe();
        manager.disconnect();
        assert!(events.drain().is_empty());
    }

    #[tokio::test]
    async fn test_report_failure_ignored_unless_connected() {
        let manager = ConnectionManager::new(config(), ScriptedTransport::new());
        manager.report_transport_failure(0, &ClientError::Connection("reset".into()));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_while_reconnecting_is_precondition_error() {
        let transport = ScriptedTransport::new();
        let manager = ConnectionManager::new(config(), transport.clone());
        manager.connect().await.unwrap();

        transport.set_default_connect(ConnectStep::Hang);
        manager.report_transport_failure(1, &ClientError::Connection("reset".into()));

        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, ClientError::Precondition(_)));
        manager.disconnect();
    }

    #[tokio::test]
    async fn test_rpc_allowed_while_reconnecting_on_old_channel() {
        let transport = ScriptedTransport::new();
        let manager = ConnectionManager::new(config(), transport.clone());
        manager.connect().await.unwrap();
        let (before, _) = manager.rpc_channel().unwrap();

        transport.set_default_connect(ConnectStep::Hang);
        manager.report_transport_failure(1, &ClientError::Connection("reset".into()));

        let (during, _) = manager.rpc_channel().unwrap();
        assert_eq!(before, during);
        manager.disconnect();
    }

    #[test]
    fn test_allows_rpc() {
        assert!(!ConnectionState::Disconnected.allows_rpc());
        assert!(!ConnectionState::Connecting.allows_rpc());
        assert!(!ConnectionState::Failed.allows_rpc());
        assert!(ConnectionState::Connected.allows_rpc());
        assert!(ConnectionState::Ready.allows_rpc());
        assert!(ConnectionState::Reconnecting.allows_rpc());
    }
}
