//! Error types for Sprawl Core.

use thiserror::Error;

/// Core errors that can occur while encoding, decoding, or signing.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid peer id: {0}")]
    InvalidPeerId(String),

    /// Channel ids must be UTF-8 so they map one-to-one onto topic names.
    #[error("channel id is not UTF-8: {0}")]
    InvalidChannelId(String),

    #[error("decoding error: {0}")]
    DecodingError(#[from] prost::DecodeError),

    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

/// Validation errors for order structure and authorship.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("signature verification failed")]
    SignatureFailed,

    #[error("order id is missing")]
    MissingId,

    #[error("order has no creation timestamp")]
    MissingTimestamp,

    #[error("signature must be 64 bytes, got {0}")]
    SignatureLength(usize),

    #[error("sender identity is not an Ed25519 key")]
    UnknownSender,

    #[error("structural error: {0}")]
    StructuralError(String),
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidSignature => ValidationError::SignatureFailed,
            CoreError::InvalidPublicKey | CoreError::InvalidPeerId(_) => {
                ValidationError::UnknownSender
            }
            CoreError::DecodingError(err) => ValidationError::StructuralError(err.to_string()),
            CoreError::MalformedMessage(msg) => ValidationError::StructuralError(msg),
            CoreError::InvalidChannelId(id) => {
                ValidationError::StructuralError(format!("channel id {id} is not UTF-8"))
            }
        }
    }
}
