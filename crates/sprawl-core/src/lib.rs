//! # Sprawl Core
//!
//! Pure primitives for Sprawl: wire messages, orders, channels, and peer
//! identities.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over the protocol's data structures.
//!
//! ## Key Types
//!
//! - [`WireMessage`] - The envelope for all peer-to-peer traffic
//! - [`Payload`] - A decoded envelope, one variant per [`Operation`]
//! - [`Order`] - A signed, versioned resting order
//! - [`ChannelId`] - Deterministic topic identifier for an asset pair
//! - [`PeerId`] - Network identity that embeds the peer's Ed25519 public key
//!
//! ## Canonicalization
//!
//! Orders are signed over a canonical form with `state`, `nonce`, and
//! `signature` reset. See the [`canonical`] module.

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod ids;
pub mod keys;
pub mod order;
pub mod peer;
pub mod validation;
pub mod wire;

pub use canonical::{canonical_order, canonical_order_bytes};
pub use crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::{CoreError, ValidationError};
pub use ids::{ChannelId, OrderId};
pub use order::OrderBuilder;
pub use peer::PeerId;
pub use validation::{authenticate_order, validate_order_structure};
pub use wire::{
    Channel, ChannelOptions, CreateRequest, Operation, Order, OrderList, Payload, Recipient,
    State, WireMessage,
};
