/*!
 * Error types for the FolliCore client tooling
 */

use follicore_connect::ClientError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FolliError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_NOT_READY: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug, Error)]
pub enum FolliError {
    /// Invalid or unreadable settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Settings file could not be read or written
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failure reported by the inference client
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The service answered but is not serving
    #[error("Service not ready: {0}")]
    NotReady(String),
}

impl FolliError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            FolliError::Config(_) | FolliError::Io { .. } => EXIT_FATAL,
            FolliError::Client(err) => match err {
                ClientError::Config(_)
                | ClientError::Schema(_)
                | ClientError::InvalidEndpoint(_) => EXIT_FATAL,
                _ => EXIT_NOT_READY,
            },
            FolliError::NotReady(_) => EXIT_NOT_READY,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        FolliError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<toml::de::Error> for FolliError {
    fn from(err: toml::de::Error) -> Self {
        FolliError::Config(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for FolliError {
    fn from(err: toml::ser::Error) -> Self {
        FolliError::Config(format!("TOML serialize error: {}", err))
    }
}
