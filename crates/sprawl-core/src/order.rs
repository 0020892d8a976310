//! Order construction and lifecycle transitions.

use prost_types::Timestamp;
use std::time::SystemTime;

use crate::canonical::sign_order;
use crate::crypto::Keypair;
use crate::ids::OrderId;
use crate::wire::{CreateRequest, Order, State};

/// Builder for creating signed orders.
pub struct OrderBuilder {
    request: CreateRequest,
    created: Timestamp,
}

impl OrderBuilder {
    /// Start building an order from a creation request.
    pub fn new(request: CreateRequest) -> Self {
        Self {
            request,
            created: Timestamp::from(SystemTime::now()),
        }
    }

    /// Set the creation timestamp.
    pub fn created(mut self, created: Timestamp) -> Self {
        self.created = created;
        self
    }

    /// Derive the id, then build and sign the order.
    ///
    /// The result is `OPEN` with nonce 0.
    pub fn sign(self, keypair: &Keypair) -> Order {
        let id = OrderId::derive(&keypair.public_key(), &self.request, &self.created);

        let mut order = Order {
            id: id.as_bytes().to_vec(),
            created: Some(self.created),
            asset: self.request.asset,
            counter_asset: self.request.counter_asset,
            amount: self.request.amount,
            price: self.request.price,
            state: State::Open as i32,
            nonce: 0,
            signature: Vec::new(),
        };
        order.signature = sign_order(keypair, &order).to_vec();
        order
    }
}

impl Order {
    /// The next version of this order in `state`: nonce bumped and freshly
    /// signed.
    pub fn transition(&self, state: State, keypair: &Keypair) -> Order {
        let mut next = Order {
            state: state as i32,
            nonce: self.nonce.saturating_add(1),
            ..self.clone()
        };
        next.signature = sign_order(keypair, &next).to_vec();
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::verify_order;

    fn request() -> CreateRequest {
        CreateRequest {
            channel_id: b"BTC,ETH".to_vec(),
            asset: "ETH".into(),
            counter_asset: "BTC".into(),
            amount: 52617562718,
            price: 0.1,
        }
    }

    #[test]
    fn test_builder_produces_signed_open_order() {
        let keypair = Keypair::generate();
        let order = OrderBuilder::new(request()).sign(&keypair);

        assert_eq!(order.id.len(), 32);
        assert_eq!(order.state(), State::Open);
        assert_eq!(order.nonce, 0);
        assert_eq!(order.asset, "ETH");
        assert_eq!(order.counter_asset, "BTC");
        assert_eq!(order.amount, 52617562718);
        assert_eq!(order.price, 0.1);
        assert!(order.created.is_some());
        verify_order(&keypair.public_key(), &order).unwrap();
    }

    #[test]
    fn test_builder_id_is_deterministic_for_fixed_time() {
        let keypair = Keypair::from_seed(&[5; 32]);
        let created = Timestamp {
            seconds: 1,
            nanos: 2,
        };
        let a = OrderBuilder::new(request()).created(created.clone()).sign(&keypair);
        let b = OrderBuilder::new(request()).created(created).sign(&keypair);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_transition_bumps_nonce_and_resigns() {
        let keypair = Keypair::generate();
        let order = OrderBuilder::new(request()).sign(&keypair);

        let locked = order.transition(State::Locked, &keypair);
        assert!(locked.is_locked());
        assert_eq!(locked.nonce, 1);
        assert_eq!(locked.id, order.id);
        verify_order(&keypair.public_key(), &locked).unwrap();

        let unlocked = locked.transition(State::Open, &keypair);
        assert!(!unlocked.is_locked());
        assert_eq!(unlocked.nonce, 2);
    }
}
