//! Service stub resolution
//!
//! A stub is a typed call surface for one service, bound to the live channel.
//! Stubs are cached per (schema, service, stub type) and tagged with the
//! channel generation they were bound to:
//!
//! ```text
//!   resolve(schema, "VisionService")
//!          │
//!          ├── service missing from schema ──► ClientError::Config
//!          ├── state forbids RPCs ───────────► ClientError::Precondition
//!          │
//!          ▼
//!   cache entry for current generation? ──yes──► clone of cached stub
//!          │ no
//!          ▼
//!   S::bind(channel, ctx) ──► cache ──► stub
//! ```
//!
//! Replacing the channel clears the whole cache, so the next resolution
//! binds a fresh stub to the new channel.

use crate::error::{ClientError, Result};
use crate::manager::ConnectionManager;
use crate::schema::{Schema, ServiceDescriptor};
use crate::transport::Transport;
use http::uri::PathAndQuery;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tonic::client::Grpc;
use tonic::codec::CompressionEncoding;
use tonic::transport::Channel;
use tracing::debug;

/// Everything a stub needs besides the channel
#[derive(Debug, Clone)]
pub struct StubContext {
    pub service: ServiceDescriptor,
    pub compression: bool,
    pub max_message_size: usize,
    pub request_timeout: Duration,
}

/// A typed call surface that can be bound to a channel
///
/// Generated tonic clients fit this shape directly:
///
/// ```ignore
/// impl ServiceStub<Channel> for VisionServiceClient<Channel> {
///     fn bind(channel: Channel, ctx: &StubContext) -> Self {
///         VisionServiceClient::new(channel)
///             .max_decoding_message_size(ctx.max_message_size)
///     }
/// }
/// ```
pub trait ServiceStub<C>: Clone + Send + Sync + 'static {
    fn bind(channel: C, ctx: &StubContext) -> Self;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StubKey {
    schema: String,
    service: String,
    stub_type: TypeId,
}

struct CachedStub {
    generation: u64,
    stub: Box<dyn Any + Send + Sync>,
}

/// Cache of bound stubs, owned by the connection manager
#[derive(Default)]
pub(crate) struct StubCache {
    entries: Mutex<HashMap<StubKey, CachedStub>>,
    invalidations: AtomicU64,
}

impl StubCache {
    fn get<S: Clone + 'static>(&self, key: &StubKey, generation: u64) -> Option<S> {
        let entries = self.entries.lock().ok()?;
        let cached = entries.get(key)?;
        if cached.generation != generation {
            return None;
        }
        cached.stub.downcast_ref::<S>().cloned()
    }

    fn insert<S: Send + Sync + 'static>(&self, key: StubKey, generation: u64, stub: S) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key,
                CachedStub {
                    generation,
                    stub: Box::new(stub),
                },
            );
        }
    }

    /// Drop every cached stub
    pub(crate) fn invalidate(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

/// Resolves typed stubs against the manager's current channel
pub struct StubResolver<T: Transport> {
    manager: ConnectionManager<T>,
}

impl<T: Transport> StubResolver<T> {
    pub(crate) fn new(manager: ConnectionManager<T>) -> Self {
        Self { manager }
    }

    /// Stub of type `S` for `service` in `schema`
    ///
    /// Fails with [`ClientError::Config`] when the schema does not declare
    /// the service and with [`ClientError::Precondition`] when the connection
    /// state does not allow calls.
    pub fn resolve<S: ServiceStub<T::Channel>>(&self, schema: &Schema, service: &str) -> Result<S> {
        self.resolve_with_generation(schema, service).map(|(stub, _)| stub)
    }

    /// Stub together with the generation of the channel it is bound to
    pub(crate) fn resolve_with_generation<S: ServiceStub<T::Channel>>(
        &self,
        schema: &Schema,
        service: &str,
    ) -> Result<(S, u64)> {
        let descriptor = schema.service(service)?;
        let (channel, generation) = self.manager.rpc_channel()?;
        let cache = self.manager.stub_cache();

        let key = StubKey {
            schema: schema.id().to_string(),
            service: descriptor.full_name.clone(),
            stub_type: TypeId::of::<S>(),
        };

        if let Some(stub) = cache.get::<S>(&key, generation) {
            debug!(service = %descriptor.full_name, generation, "stub cache hit");
            return Ok((stub, generation));
        }

        let config = self.manager.config();
        let ctx = StubContext {
            service: descriptor.clone(),
            compression: config.compression,
            max_message_size: config.max_message_size,
            request_timeout: config.request_timeout(),
        };
        let stub = S::bind(channel, &ctx);
        debug!(service = %descriptor.full_name, generation, "stub bound to channel");
        cache.insert(key, generation, stub.clone());
        Ok((stub, generation))
    }

    /// Like [`StubResolver::resolve`], loading the schema from `schema_path` through the registry
    pub fn resolve_path<S: ServiceStub<T::Channel>>(
        &self,
        schema_path: impl AsRef<Path>,
        service: &str,
    ) -> Result<S> {
        let schema = self.manager.schemas().load(schema_path)?;
        self.resolve(&schema, service)
    }

    /// Number of stubs currently cached
    pub fn cached(&self) -> usize {
        self.manager.stub_cache().len()
    }
}

/// Schema-checked unary call surface over a tonic channel
///
/// Works with any prost request/response pair, so services can be called
/// without generating a dedicated client.
#[derive(Clone)]
pub struct GenericStub {
    grpc: Grpc<Channel>,
    service: ServiceDescriptor,
    request_timeout: Duration,
}

impl ServiceStub<Channel> for GenericStub {
    fn bind(channel: Channel, ctx: &StubContext) -> Self {
        let mut grpc = Grpc::new(channel)
            .max_decoding_message_size(ctx.max_message_size)
            .max_encoding_message_size(ctx.max_message_size);
        if ctx.compression {
            grpc = grpc
                .send_compressed(CompressionEncoding::Gzip)
                .accept_compressed(CompressionEncoding::Gzip);
        }
        Self {
            grpc,
            service: ctx.service.clone(),
            request_timeout: ctx.request_timeout,
        }
    }
}

impl std::fmt::Debug for GenericStub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericStub")
            .field("service", &self.service.full_name)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl GenericStub {
    pub fn service(&self) -> &ServiceDescriptor {
        &self.service
    }

    /// Issue a unary call to `method`
    pub async fn unary<Req, Resp>(&self, method: &str, request: Req) -> Result<Resp>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let descriptor = self.service.method(method).ok_or_else(|| {
            ClientError::Config(format!(
                "Method '{}' not declared by {}",
                method, self.service.full_name
            ))
        })?;
        if !descriptor.is_unary() {
            return Err(ClientError::Config(format!(
                "{}/{} is a streaming method",
                self.service.full_name, method
            )));
        }

        let path = PathAndQuery::try_from(self.service.method_path(method))
            .map_err(|e| ClientError::Config(format!("Invalid method path: {}", e)))?;

        let mut grpc = self.grpc.clone();
        grpc.ready()
            .await
            .map_err(|e| ClientError::Connection(format!("Service was not ready: {}", e)))?;

        let mut request = tonic::Request::new(request);
        request.set_timeout(self.request_timeout);

        let codec = tonic_prost::ProstCodec::<Req, Resp>::default();
        let response = grpc.unary(request, path, codec).await?;
        Ok(response.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::manager::ConnectionState;
    use crate::schema::tests::inference_descriptor_set;
    use crate::testing::{RecordingStub, ScriptedTransport};

    fn schema() -> Schema {
        Schema::from_descriptor_set("inference", &inference_descriptor_set())
    }

    async fn connected_manager() -> ConnectionManager<ScriptedTransport> {
        let manager = ConnectionManager::new(ClientConfig::default(), ScriptedTransport::new());
        manager.connect().await.unwrap();
        manager
    }

    #[tokio::test]
    async fn test_resolve_caches_per_service() {
        let manager = connected_manager().await;
        let resolver = manager.stubs();
        let schema = schema();

        let a: RecordingStub = resolver.resolve(&schema, "VisionService").unwrap();
        let b: RecordingStub = resolver
            .resolve(&schema, "follicore.vision.VisionService")
            .unwrap();
        let c: RecordingStub = resolver.resolve(&schema, "AcousticService").unwrap();

        assert_eq!(a.bind_id, b.bind_id);
        assert_ne!(a.bind_id, c.bind_id);
        assert_eq!(resolver.cached(), 2);
        assert_eq!(c.service, "follicore.acoustic.AcousticService");
    }

    #[tokio::test]
    async fn test_unknown_service_is_config_error() {
        let manager = connected_manager().await;
        let result: Result<RecordingStub> = manager.stubs().resolve(&schema(), "Nope");
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[tokio::test]
    async fn test_resolve_requires_usable_state() {
        let manager = ConnectionManager::new(ClientConfig::default(), ScriptedTransport::new());
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        let result: Result<RecordingStub> = manager.stubs().resolve(&schema(), "VisionService");
        assert!(matches!(result, Err(ClientError::Precondition(_))));
    }

    #[tokio::test]
    async fn test_disconnect_clears_cache() {
        let manager = connected_manager().await;
        let resolver = manager.stubs();
        let _: RecordingStub = resolver.resolve(&schema(), "VisionService").unwrap();
        assert_eq!(resolver.cached(), 1);

        manager.disconnect();
        assert_eq!(resolver.cached(), 0);
    }

    #[test]
    fn test_generation_mismatch_misses() {
        let cache = StubCache::default();
        let key = StubKey {
            schema: "s".into(),
            service: "svc".into(),
            stub_type: TypeId::of::<u32>(),
        };
        cache.insert(key.clone(), 1, 7u32);

        assert_eq!(cache.get::<u32>(&key, 1), Some(7));
        assert_eq!(cache.get::<u32>(&key, 2), None);

        cache.invalidate();
        assert_eq!(cache.get::<u32>(&key, 1), None);
        assert_eq!(cache.invalidations(), 1);
    }
}
