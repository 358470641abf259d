/*!
 * Human and JSON renderings of CLI results
 */

use follicore_connect::{ConnectionEvent, ConnectionStats, ServingStatus};
use follicore_core_resilience::StatusCode;
use serde::Serialize;

/// Outcome of `follicore probe`
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub endpoint: String,
    pub ready: bool,
    #[serde(flatten)]
    pub stats: ConnectionStats,
}

/// Outcome of `follicore health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub endpoint: String,
    pub service: String,
    pub status: ServingStatus,
}

/// One line of `follicore watch` output
#[derive(Debug, Clone, Serialize)]
pub struct EventReport {
    pub event: &'static str,
    /// Status code of the failure, for `error` events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<StatusCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl From<&ConnectionEvent> for EventReport {
    fn from(event: &ConnectionEvent) -> Self {
        let (code, cause) = match event {
            ConnectionEvent::Error(err) => (Some(err.code()), Some(err.to_string())),
            _ => (None, None),
        };
        Self {
            event: event.name(),
            code,
            cause,
        }
    }
}

impl ProbeReport {
    pub fn render(&self) -> String {
        let verdict = if self.ready { "ready" } else { "not ready" };
        format!(
            "{}: {} (state {}, channel generation {})",
            self.endpoint, verdict, self.stats.state, self.stats.generation
        )
    }
}

impl HealthReport {
    pub fn render(&self) -> String {
        let service = if self.service.is_empty() {
            "<server>"
        } else {
            self.service.as_str()
        };
        format!("{} {}: {}", self.endpoint, service, self.status)
    }
}

impl EventReport {
    pub fn render(&self) -> String {
        match (&self.code, &self.cause) {
            (Some(code), Some(cause)) => format!("{} [{}]: {}", self.event, code, cause),
            (None, Some(cause)) => format!("{}: {}", self.event, cause),
            _ => self.event.to_string(),
        }
    }
}

/// Serialize `value` as one JSON line
pub fn to_json_line<T: Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string(value)
}
