//! Canonical form of an order for signing and verification.
//!
//! The canonical form is the protobuf encoding of a copy of the order with:
//! - `state` reset to `OPEN`
//! - `nonce` reset to 0
//! - `signature` cleared
//!
//! Locking, unlocking, and nonce bumps therefore never invalidate a
//! signature. The live order is never mutated; callers can sign and
//! broadcast the same value concurrently.

use prost::Message;

use crate::crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::error::CoreError;
use crate::wire::{Order, State};

/// A copy of `order` with its mutable fields reset.
pub fn canonical_order(order: &Order) -> Order {
    Order {
        state: State::Open as i32,
        nonce: 0,
        signature: Vec::new(),
        ..order.clone()
    }
}

/// Encode the canonical form of `order`.
pub fn canonical_order_bytes(order: &Order) -> Vec<u8> {
    canonical_order(order).encode_to_vec()
}

/// Sign the canonical form of `order`.
pub fn sign_order(keypair: &Keypair, order: &Order) -> Ed25519Signature {
    keypair.sign(&canonical_order_bytes(order))
}

/// Verify `order.signature` against `public_key`.
pub fn verify_order(public_key: &Ed25519PublicKey, order: &Order) -> Result<(), CoreError> {
    let signature = Ed25519Signature::try_from(order.signature.as_slice())?;
    public_key.verify(&canonical_order_bytes(order), &signature)
}
