//! Error types for the overlay layer.

use thiserror::Error;

/// Errors that can occur while talking to the overlay.
#[derive(Debug, Error)]
pub enum P2pError {
    /// The networking host could not be built or bound. Fatal at startup.
    #[error("host initialization failed: {0}")]
    Init(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer is not known to the network.
    #[error("peer not found: {0}")]
    PeerNotFound(String),

    /// The peer has been blocked locally.
    #[error("peer blocked: {0}")]
    PeerBlocked(String),

    /// Subscribing to a topic failed.
    #[error("subscription failed: {0}")]
    Subscription(String),

    /// A message or address could not be encoded or parsed.
    #[error("encoding error: {0}")]
    Encoding(#[from] sprawl_core::CoreError),

    /// The overlay has been shut down.
    #[error("overlay closed")]
    Closed,
}

/// Result type for overlay operations.
pub type Result<T> = std::result::Result<T, P2pError>;
