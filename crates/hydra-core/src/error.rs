//! Error types for the Hydra head coordinator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for coordinator operations.
#[derive(Error, Debug, Clone)]
pub enum HydraError {
    /// Malformed request: bad UTXO reference, unknown action, missing field.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A party's verification key is absent from the key store.
    #[error("Verification key not found for party {party} at {path}")]
    KeyNotFound { party: String, path: String },

    /// A party's signing key is absent from the key store.
    #[error("Signing key not found for party {party} at {path}")]
    SigningKeyNotFound { party: String, path: String },

    /// The control channel gave up waiting.
    #[error("Channel timed out after {duration_ms}ms: {message}")]
    ChannelTimeout {
        port: u16,
        duration_ms: u64,
        message: String,
    },

    /// Socket-level failure on the control channel.
    #[error("Channel transport error on port {port}: {message}")]
    ChannelTransport { port: u16, message: String },

    /// A party's node refused the connection or could not be reached.
    #[error("Hydra node on port {port} is unavailable: {message}. {hint}")]
    UpstreamUnavailable {
        port: u16,
        message: String,
        hint: String,
    },

    /// A party's node did not answer in time.
    #[error("Hydra node on port {port} did not answer within {duration_ms}ms")]
    UpstreamTimeout { port: u16, duration_ms: u64 },

    /// A party's node answered with a rejection.
    #[error("Hydra node on port {port} rejected the request ({status}): {body}")]
    UpstreamRejected { port: u16, status: u16, body: String },

    /// The head refused a submitted transaction.
    #[error("Transaction rejected by the head of party {party}: {reason}")]
    TransactionRejected { party: String, reason: String },

    /// The ledger CLI exited unsuccessfully.
    #[error("Ledger CLI failed (exit {exit_code:?}): {command}\nstderr: {stderr}")]
    CliFailure {
        command: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// The ledger CLI produced output of an unexpected shape.
    #[error("Malformed ledger CLI output: {0}")]
    MalformedCliOutput(String),

    /// A message from a head node did not follow the protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The head is not in a state that accepts transactions.
    #[error("Head for party {party} is {status}, transactions require Open or SnapshotConfirmed")]
    HeadNotOpen { party: String, status: String },

    /// Resource not found.
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Internal error (should not happen).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Machine-readable error category surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    KeyNotFound,
    SigningKeyNotFound,
    ChannelTimeout,
    ChannelTransport,
    UpstreamUnavailable,
    UpstreamTimeout,
    UpstreamRejected,
    TransactionRejected,
    CliFailure,
    MalformedCliOutput,
    Protocol,
    HeadNotOpen,
    NotFound,
    Io,
    Serialization,
    Internal,
}

impl HydraError {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HydraError::InvalidInput(_) => ErrorKind::InvalidInput,
            HydraError::KeyNotFound { .. } => ErrorKind::KeyNotFound,
            HydraError::SigningKeyNotFound { .. } => ErrorKind::SigningKeyNotFound,
            HydraError::ChannelTimeout { .. } => ErrorKind::ChannelTimeout,
            HydraError::ChannelTransport { .. } => ErrorKind::ChannelTransport,
            HydraError::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            HydraError::UpstreamTimeout { .. } => ErrorKind::UpstreamTimeout,
            HydraError::UpstreamRejected { .. } => ErrorKind::UpstreamRejected,
            HydraError::TransactionRejected { .. } => ErrorKind::TransactionRejected,
            HydraError::CliFailure { .. } => ErrorKind::CliFailure,
            HydraError::MalformedCliOutput(_) => ErrorKind::MalformedCliOutput,
            HydraError::Protocol(_) => ErrorKind::Protocol,
            HydraError::HeadNotOpen { .. } => ErrorKind::HeadNotOpen,
            HydraError::NotFound { .. } => ErrorKind::NotFound,
            HydraError::Io(_) => ErrorKind::Io,
            HydraError::SerializationError(_) => ErrorKind::Serialization,
            HydraError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if the caller caused this error and resending it unchanged is pointless.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            HydraError::InvalidInput(_) | HydraError::NotFound { .. } | HydraError::HeadNotOpen { .. }
        )
    }

    /// Build an `UpstreamUnavailable` with the standard remediation hint.
    pub fn upstream_unavailable(port: u16, message: impl Into<String>) -> Self {
        HydraError::UpstreamUnavailable {
            port,
            message: message.into(),
            hint: format!(
                "Make sure the Hydra node for this party is running and listening on port {}",
                port
            ),
        }
    }
}

/// Convenience Result type for coordinator operations.
pub type Result<T> = std::result::Result<T, HydraError>;

impl From<serde_json::Error> for HydraError {
    fn from(err: serde_json::Error) -> Self {
        HydraError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for HydraError {
    fn from(err: std::io::Error) -> Self {
        HydraError::Io(err.to_string())
    }
}
