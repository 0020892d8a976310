//! Error types for the services.

use sprawl_core::{CoreError, ValidationError};
use sprawl_p2p::P2pError;
use sprawl_store::StoreError;
use thiserror::Error;

/// Status reported to an API caller, one per failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    NotFound,
    AlreadyExists,
    PermissionDenied,
    InvalidArgument,
    Internal,
}

/// Errors that can occur during service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Overlay error.
    #[error("network error: {0}")]
    Network(#[from] P2pError),

    /// Encoding or decoding error.
    #[error("encoding error: {0}")]
    Encoding(#[from] CoreError),

    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    /// The order is already in the requested state.
    #[error("order {id} is already {state}")]
    AlreadyInState { id: String, state: &'static str },

    /// The local node does not own the order.
    #[error("not authorized: {0}")]
    PermissionDenied(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Stored identity halves do not belong together.
    #[error("identity corrupted: {0}")]
    Identity(String),
}

impl ServiceError {
    /// The status an API surface reports for this error.
    pub fn code(&self) -> StatusCode {
        match self {
            ServiceError::OrderNotFound(_) | ServiceError::ChannelNotFound(_) => {
                StatusCode::NotFound
            }
            ServiceError::AlreadyInState { .. } => StatusCode::AlreadyExists,
            ServiceError::PermissionDenied(_) | ServiceError::Validation(_) => {
                StatusCode::PermissionDenied
            }
            ServiceError::InvalidArgument(_) | ServiceError::Encoding(_) => {
                StatusCode::InvalidArgument
            }
            ServiceError::Store(_) | ServiceError::Network(_) | ServiceError::Identity(_) => {
                StatusCode::Internal
            }
        }
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
