//! Error types for the STS environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Send or receive on a socket failed
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The peer closed the connection (EOF) or the socket was closed locally
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Establishing a connection failed
    #[error("Connect to {address} failed: {reason}")]
    ConnectFailed { address: String, reason: String },

    /// Clock or scheduling context operation failed
    #[error("Context error: {0}")]
    ContextError(String),
}

impl EnvError {
    /// Creates a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkError(msg.into())
    }

    /// Creates a connection-closed error for the given peer.
    pub fn closed(peer: impl std::fmt::Display) -> Self {
        Self::ConnectionClosed(peer.to_string())
    }

    /// Creates a connect failure.
    pub fn connect_failed(address: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ConnectFailed {
            address: address.into(),
            reason: reason.to_string(),
        }
    }
}
