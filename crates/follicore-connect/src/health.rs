//! Health and readiness probing over the standard gRPC health protocol

use crate::error::Result;
use crate::manager::ConnectionManager;
use crate::transport::{ServingStatus, Transport};
use tracing::debug;

/// Liveness and readiness checks against the connected endpoint
pub struct HealthProber<T: Transport> {
    manager: ConnectionManager<T>,
}

impl<T: Transport> HealthProber<T> {
    pub(crate) fn new(manager: ConnectionManager<T>) -> Self {
        Self { manager }
    }

    /// Serving status of `service` (empty for the server as a whole)
    ///
    /// Errors with a precondition failure when the connection state does not
    /// allow calls, and with the transport's error when the probe fails.
    pub async fn check_health(&self, service: &str) -> Result<ServingStatus> {
        let (status, _) = self.manager.probe(service).await?;
        debug!(service, status = %status, "health check");
        Ok(status)
    }

    /// Whether the configured readiness service reports `SERVING`
    ///
    /// Never fails: any other status, and any error, counts as not ready.
    /// A ready result while `Connected` moves the manager to `Ready`.
    pub async fn check_model_readiness(&self) -> bool {
        let service = self.manager.config().readiness_service.as_str();
        match self.manager.probe(service).await {
            Ok((ServingStatus::Serving, generation)) => {
                self.manager.promote_ready(generation);
                true
            }
            Ok((status, _)) => {
                debug!(service, status = %status, "models not ready");
                false
            }
            Err(err) => {
                debug!(service, error = %err, "readiness probe failed");
                false
            }
        }
    }
}
