//! Error types shared by the listener and session handlers.

use std::io;

use thiserror::Error;

/// Errors that end a single client session.
///
/// None of these reach beyond the connection they occurred on.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Connection error occurred.
    #[error("Connection error: {0}")]
    Connection(#[from] io::Error),

    /// Shutdown signal received.
    #[error("Shutdown requested")]
    Shutdown,

    /// The client stayed silent for too long.
    #[error("Session timed out after {0} seconds")]
    Timeout(u64),
}

impl SessionError {
    /// Returns `true` if the error indicates a graceful shutdown.
    #[must_use]
    pub const fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }

    /// Returns `true` if the error is a client-side issue.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Errors that can occur in the listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to socket address.
    #[error("Failed to bind to {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("Failed to accept connection: {0}")]
    AcceptFailed(#[from] io::Error),

    /// The bound socket could not report its address.
    #[error("Failed to read local address: {0}")]
    LocalAddress(#[source] io::Error),

    /// A session task panicked or was aborted.
    #[error("Session task failed: {0}")]
    SessionFailed(#[from] tokio::task::JoinError),
}
