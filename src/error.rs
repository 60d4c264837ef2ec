//! Error types for the rvsimd gateway.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the gateway.
///
/// Every failure a client can observe maps to exactly one variant; the
/// [`Error::kind`] string is the stable identifier reported on the wire.
#[derive(Error, Debug)]
pub enum Error {
    /// A step/run/toggle referenced a session id that was never assembled
    /// (or has since been destroyed or evicted).
    #[error("session not found: {id}")]
    SessionNotFound { id: String },

    /// The worker process is not running; a command could not be sent.
    #[error("worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// The worker process exited while a command was in flight (or was
    /// found dead when a suspect session was revalidated).
    #[error("worker crashed: {0}")]
    WorkerCrashed(String),

    /// The worker wrote to its diagnostic stream during a command,
    /// typically an assembler syntax error. The session survives.
    #[error("{0}")]
    WorkerReported(String),

    /// The worker's primary-stream output did not parse as the expected
    /// JSON shape. Carries the raw captured text for diagnosis.
    #[error("protocol error: unparseable worker output")]
    Protocol { raw: String },

    /// No response arrived within the configured timeout. The session
    /// is treated as suspect and revalidated on next use.
    #[error("worker timed out after {0:?}")]
    WorkerTimeout(Duration),

    /// A toggle request violated the feature dependency lattice
    /// (branch prediction ⇒ data forwarding ⇒ pipelining).
    #[error("invalid toggle transition: {0}")]
    InvalidToggle(String),

    /// The registry refused a new session because the cap is reached.
    #[error("session limit reached ({0} active)")]
    RegistryFull(usize),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] Box<std::io::Error>),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] Box<serde_json::Error>),
}

impl Error {
    /// Create a session-not-found error.
    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::SessionNotFound { id: id.into() }
    }

    /// Create a worker-unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::WorkerUnavailable(message.into())
    }

    /// Create a worker-crashed error.
    pub fn crashed(message: impl Into<String>) -> Self {
        Self::WorkerCrashed(message.into())
    }

    /// Create a worker-reported (diagnostic stream) error.
    pub fn worker_reported(message: impl Into<String>) -> Self {
        Self::WorkerReported(message.into())
    }

    /// Create a protocol error carrying the raw captured text.
    pub fn protocol(raw: impl Into<String>) -> Self {
        Self::Protocol { raw: raw.into() }
    }

    /// Create an invalid-toggle error.
    pub fn invalid_toggle(message: impl Into<String>) -> Self {
        Self::InvalidToggle(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Stable machine-readable kind, reported in error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionNotFound { .. } => "session_not_found",
            Self::WorkerUnavailable(_) => "worker_unavailable",
            Self::WorkerCrashed(_) => "worker_crashed",
            Self::WorkerReported(_) => "worker_error",
            Self::Protocol { .. } => "protocol_error",
            Self::WorkerTimeout(_) => "timeout",
            Self::InvalidToggle(_) => "invalid_toggle",
            Self::RegistryFull(_) => "registry_full",
            Self::Config(_) => "config",
            Self::Io(_) | Self::Json(_) => "internal",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Box::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(Box::new(value))
    }
}
