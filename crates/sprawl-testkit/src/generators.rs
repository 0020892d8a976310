//! Proptest generators for property-based testing.

use proptest::prelude::*;
use prost_types::Timestamp;

use sprawl_core::{ChannelId, CreateRequest, Keypair, Order, OrderBuilder, PeerId, State};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a peer id with a recoverable key.
pub fn peer_id() -> impl Strategy<Value = PeerId> {
    keypair().prop_map(|kp| PeerId::from_public_key(&kp.public_key()))
}

/// Generate an asset ticker.
pub fn asset() -> impl Strategy<Value = String> {
    "[A-Z]{2,5}".prop_map(String::from)
}

/// Generate two distinct asset tickers.
pub fn asset_pair() -> impl Strategy<Value = (String, String)> {
    (asset(), asset()).prop_filter("assets must differ", |(a, b)| a != b)
}

/// Generate a positive order amount.
pub fn amount() -> impl Strategy<Value = u64> {
    1u64..=u64::MAX
}

/// Generate a finite positive price.
pub fn price() -> impl Strategy<Value = f64> {
    (1u32..=1_000_000u32).prop_map(|p| f64::from(p) / 1000.0)
}

/// Parameters for generating an order.
#[derive(Debug, Clone)]
pub struct OrderParams {
    pub keypair: Keypair,
    pub asset: String,
    pub counter_asset: String,
    pub amount: u64,
    pub price: f64,
    /// Number of lock/unlock transitions applied after creation.
    pub transitions: u8,
}

impl OrderParams {
    pub fn channel(&self) -> ChannelId {
        ChannelId::derive(&self.asset, &self.counter_asset)
    }

    pub fn request(&self) -> CreateRequest {
        CreateRequest {
            channel_id: self.channel().as_bytes().to_vec(),
            asset: self.asset.clone(),
            counter_asset: self.counter_asset.clone(),
            amount: self.amount,
            price: self.price,
        }
    }
}

impl Arbitrary for OrderParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (any::<[u8; 32]>(), asset_pair(), amount(), price(), 0u8..6)
            .prop_map(|(seed, (asset, counter_asset), amount, price, transitions)| {
                OrderParams {
                    keypair: Keypair::from_seed(&seed),
                    asset,
                    counter_asset,
                    amount,
                    price,
                    transitions,
                }
            })
            .boxed()
    }
}

/// Creation time of generated orders, fixed so equal params give equal ids.
pub const GENERATED_AT: Timestamp = Timestamp {
    seconds: 1_600_000_000,
    nanos: 0,
};

/// Build the order described by `params`, alternating lock and unlock.
pub fn order_from_params(params: &OrderParams) -> Order {
    let mut order = OrderBuilder::new(params.request())
        .created(GENERATED_AT)
        .sign(&params.keypair);
    for _ in 0..params.transitions {
        let next = if order.is_locked() {
            State::Open
        } else {
            State::Locked
        };
        order = order.transition(next, &params.keypair);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprawl_core::authenticate_order;

    proptest! {
        #[test]
        fn generated_orders_authenticate(params: OrderParams) {
            let order = order_from_params(&params);
            let owner = PeerId::from_public_key(&params.keypair.public_key());
            prop_assert!(authenticate_order(&order, &owner).is_ok());
            prop_assert_eq!(order.nonce, u64::from(params.transitions));
        }

        #[test]
        fn equal_params_give_equal_ids(params: OrderParams) {
            let unlocked = OrderParams { transitions: 0, ..params.clone() };
            prop_assert_eq!(order_from_params(&params).id, order_from_params(&unlocked).id);
        }

        #[test]
        fn channel_ignores_pair_order((a, b) in asset_pair()) {
            prop_assert_eq!(ChannelId::derive(&a, &b), ChannelId::derive(&b, &a));
        }
    }
}
