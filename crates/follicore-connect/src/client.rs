//! InferenceClient: the facade callers hold
//!
//! Bundles the connection manager, the stub resolver and a retry executor.
//! Every call goes through the executor; each attempt re-resolves its stub,
//! so an attempt made after a reconnection runs on the fresh channel.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::events::EventSubscription;
use crate::health::HealthProber;
use crate::manager::{ConnectionManager, ConnectionState, ConnectionStats};
use crate::schema::{Schema, SchemaRegistry};
use crate::stub::{GenericStub, ServiceStub, StubResolver};
use crate::transport::{GrpcTransport, Transport};
use follicore_core_resilience::RetryExecutor;
use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

/// Resilient client for the inference service
///
/// # Example
///
/// ```rust,no_run
/// use follicore_connect::{ClientConfig, InferenceClient};
///
/// # async fn example() -> follicore_connect::Result<()> {
/// let client = InferenceClient::new(ClientConfig::new("10.0.0.5", 50051))?;
/// client.connect().await?;
///
/// let schema = client.schemas().load("/etc/follicore/inference.bin")?;
/// let request = prost_types::Duration { seconds: 1, nanos: 0 };
/// let reply: prost_types::Duration = client
///     .unary(&schema, "VisionService", "Echo", request)
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct InferenceClient<T: Transport = GrpcTransport> {
    manager: ConnectionManager<T>,
    executor: RetryExecutor,
}

impl InferenceClient<GrpcTransport> {
    /// Validate `config` and build a client over the tonic transport
    pub fn new(config: ClientConfig) -> Result<Self> {
        Ok(Self::from_manager(ConnectionManager::from_config(config)?))
    }

    /// Unary call through a [`GenericStub`], with retries
    pub async fn unary<Req, Resp>(
        &self,
        schema: &Schema,
        service: &str,
        method: &str,
        request: Req,
    ) -> Result<Resp>
    where
        Req: prost::Message + Clone + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        self.call(schema, service, method, |stub: GenericStub| {
            let request = request.clone();
            async move { stub.unary(method, request).await }
        })
        .await
    }
}

impl<T: Transport> InferenceClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self::from_manager(ConnectionManager::new(config, transport))
    }

    pub fn from_manager(manager: ConnectionManager<T>) -> Self {
        let executor = RetryExecutor::new(manager.config().retry_policy());
        Self { manager, executor }
    }

    pub async fn connect(&self) -> Result<()> {
        self.manager.connect().await
    }

    pub fn disconnect(&self) {
        self.manager.disconnect()
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.manager.stats()
    }

    pub fn subscribe(&self) -> EventSubscription {
        self.manager.subscribe()
    }

    pub fn health(&self) -> HealthProber<T> {
        self.manager.health()
    }

    pub fn stubs(&self) -> StubResolver<T> {
        self.manager.stubs()
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        self.manager.schemas()
    }

    pub fn manager(&self) -> &ConnectionManager<T> {
        &self.manager
    }

    /// Run `f` against a stub for `service`, retrying per the configured policy
    ///
    /// Each attempt gets a deadline of `request_timeout_ms` from when it
    /// starts. A connection-category failure is reported to the manager so
    /// reconnection starts while the executor backs off.
    pub async fn call<S, F, Fut, R>(
        &self,
        schema: &Schema,
        service: &str,
        operation: &str,
        f: F,
    ) -> Result<R>
    where
        S: ServiceStub<T::Channel>,
        F: Fn(S) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let label = format!("{}/{}", service, operation);
        let label = label.as_str();
        let resolver = self.stubs();
        let request_timeout = self.manager.config().request_timeout();
        let f = &f;

        self.executor
            .execute(label, |_attempt| {
                let stub = resolver.resolve_with_generation::<S>(schema, service);
                let deadline = deadline_after(request_timeout);
                async move {
                    let (stub, generation) = stub?;
                    let outcome = match timeout_at(deadline, f(stub)).await {
                        Ok(result) => result,
                        Err(_) => Err(ClientError::Timeout(format!(
                            "{} exceeded {} ms",
                            label,
                            request_timeout.as_millis()
                        ))),
                    };
                    if let Err(err) = &outcome {
                        if err.is_connection() {
                            // Only the channel this attempt ran on is reported
                            self.manager.report_transport_failure(generation, err);
                        }
                    }
                    outcome
                }
            })
            .await
    }
}

/// `now + timeout`, saturating at a far-future instant
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(FAR_FUTURE_SECS))
}

/// About thirty years
const FAR_FUTURE_SECS: u64 = 86_400 * 365 * 30;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tests::inference_descriptor_set;
    use crate::testing::{ConnectStep, RecordingStub, ScriptedTransport};
    use follicore_core_resilience::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn schema() -> Schema {
        Schema::from_descriptor_set("inference", &inference_descriptor_set())
    }

    fn client(transport: ScriptedTransport) -> InferenceClient<ScriptedTransport> {
        let mut config = ClientConfig::default();
        config.retry.max_retries = 2;
        config.request_timeout_ms = 1000;
        InferenceClient::with_transport(config, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_retries_then_succeeds() {
        let client = client(ScriptedTransport::new());
        client.connect().await.unwrap();
        let calls = AtomicU32::new(0);

        let result = client
            .call(&schema(), "VisionService", "AnalyzeImage", |_stub: RecordingStub| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ClientError::Rpc {
                            code: StatusCode::ResourceExhausted,
                            message: "busy".into(),
                            cause: None,
                        })
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_fails_fast_on_precondition() {
        let client = client(ScriptedTransport::new());
        let calls = AtomicU32::new(0);

        let result: Result<()> = client
            .call(&schema(), "VisionService", "AnalyzeImage", |_stub: RecordingStub| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(ClientError::Precondition(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_applies_deadline() {
        let client = client(ScriptedTransport::new());
        client.connect().await.unwrap();
        let calls = AtomicU32::new(0);

        let result: Result<()> = client
            .call(&schema(), "VisionService", "AnalyzeImage", |_stub: RecordingStub| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                }
            })
            .await;

        assert!(matches!(result, Err(ClientError::Timeout(_))));
        // Deadline exceeded is retryable
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_error_triggers_reconnect_and_fresh_stub() {
        let transport = ScriptedTransport::new();
        let client = client(transport.clone());
        client.connect().await.unwrap();
        let seen = std::sync::Mutex::new(Vec::new());

        let result = client
            .call(&schema(), "VisionService", "AnalyzeImage", |stub: RecordingStub| {
                seen.lock().unwrap().push(stub.channel.id);
                async move {
                    if stub.channel.id == 1 {
                        Err(ClientError::Connection("connection reset".into()))
                    } else {
                        Ok(stub.channel.id)
                    }
                }
            })
            .await;

        // First attempt fails on channel 1 and starts reconnection; the
        // reconnect delay equals the first retry backoff, so a later attempt
        // lands on channel 2.
        assert_eq!(result, Ok(2));
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.first(), Some(&1));
        assert_eq!(seen.last(), Some(&2));
        assert_eq!(transport.connect_calls(), 2);
        assert_eq!(client.stats().stub_invalidations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_failure_on_old_channel_does_not_reconnect_again() {
        let transport = ScriptedTransport::new();
        let mut config = ClientConfig::default();
        config.retry.max_retries = 0;
        let client = InferenceClient::with_transport(config, transport.clone());
        client.connect().await.unwrap();
        let schema = schema();

        let fast = client.call(&schema, "VisionService", "AnalyzeImage", |stub: RecordingStub| {
            async move {
                Err::<(), _>(ClientError::Connection(format!(
                    "reset on channel {}",
                    stub.channel.id
                )))
            }
        });
        let slow = client.call(&schema, "VisionService", "AnalyzeImage", |stub: RecordingStub| {
            async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Err::<(), _>(ClientError::Connection(format!(
                    "reset on channel {}",
                    stub.channel.id
                )))
            }
        });
        let (fast, slow) = tokio::join!(fast, slow);
        assert_eq!(fast, Err(ClientError::Connection("reset on channel 1".into())));
        // The slow call started on channel 1 and failed after channel 2 was installed
        assert_eq!(slow, Err(ClientError::Connection("reset on channel 1".into())));

        tokio::time::sleep(Duration::from_secs(5)).await;
        let stats = client.stats();
        assert_eq!(stats.state, ConnectionState::Ready);
        assert_eq!(stats.generation, 2);
        assert_eq!(stats.stub_invalidations, 1);
        assert_eq!(transport.connect_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_saturates_for_huge_timeouts() {
        let deadline = deadline_after(Duration::MAX);
        assert!(deadline > Instant::now() + Duration::from_secs(86_400 * 365));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_request_timeout_does_not_panic() {
        let mut config = ClientConfig::default();
        config.request_timeout_ms = u64::MAX;
        let client = InferenceClient::with_transport(config, ScriptedTransport::new());
        client.connect().await.unwrap();

        let result = client
            .call(&schema(), "VisionService", "AnalyzeImage", |_stub: RecordingStub| async {
                Ok(7)
            })
            .await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_service_is_not_retried() {
        let transport = ScriptedTransport::new();
        transport.set_default_connect(ConnectStep::Succeed);
        let client = client(transport);
        client.connect().await.unwrap();

        let result: Result<()> = client
            .call(&schema(), "BillingService", "Charge", |_stub: RecordingStub| async {
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ClientError::Config(_))));
    }
}
