//! Properties of the order projection under arbitrary network input.

use prost::Message;
use proptest::prelude::*;
use sprawl_core::{Operation, Order, OrderList, PeerId, State, WireMessage};
use sprawl_p2p::{MemoryNetwork, Origin, Receiver};
use sprawl_store::Storage;
use sprawl_testkit::generators::{keypair, order_from_params, OrderParams};
use sprawl_testkit::TestNode;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn envelope(operation: Operation, order: &Order, params: &OrderParams) -> Vec<u8> {
    WireMessage::new(&params.channel(), operation, order.encode_to_vec())
        .with_sender(&owner(params))
        .encode_to_vec()
}

fn owner(params: &OrderParams) -> PeerId {
    PeerId::from_public_key(&params.keypair.public_key())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn lock_applies_only_with_higher_nonce(mut params in any::<OrderParams>(), stored_steps in 0u8..6, incoming_steps in 0u8..6) {
        runtime().block_on(async {
            let node = TestNode::spawn(&MemoryNetwork::new()).await;
            let channel = params.channel();

            params.transitions = stored_steps;
            let stored = order_from_params(&params);
            node.orders.receive(&envelope(Operation::Create, &stored, &params), &owner(&params), Origin::Topic).await.unwrap();

            params.transitions = incoming_steps;
            let incoming = order_from_params(&params);
            let operation = if incoming.is_locked() { Operation::Lock } else { Operation::Unlock };
            let _ = node.orders.receive(&envelope(operation, &incoming, &params), &owner(&params), Origin::Topic).await;

            let held = node.orders.get_order(&channel, &stored.id).await.unwrap();
            if incoming.nonce > stored.nonce {
                assert_eq!(held, incoming);
            } else {
                assert_eq!(held, stored);
            }
        });
    }

    #[test]
    fn sync_merge_is_idempotent(orders in prop::collection::vec(any::<OrderParams>(), 0..8)) {
        runtime().block_on(async {
            let once = TestNode::spawn(&MemoryNetwork::new()).await;
            let twice = TestNode::spawn(&MemoryNetwork::new()).await;

            for params in &orders {
                let reply = WireMessage::new(
                    &params.channel(),
                    Operation::SyncReceive,
                    OrderList { orders: vec![order_from_params(params)] }.encode_to_vec(),
                )
                .encode_to_vec();

                let member = owner(params);
                let channel = params.channel();

                once.p2p.election().requested(&channel, &member);
                once.orders.receive(&reply, &member, Origin::Stream).await.unwrap();
                for _ in 0..2 {
                    twice.p2p.election().requested(&channel, &member);
                    twice.orders.receive(&reply, &member, Origin::Stream).await.unwrap();
                }
            }

            assert_eq!(
                once.storage.get_all().await.unwrap(),
                twice.storage.get_all().await.unwrap()
            );
        });
    }

    #[test]
    fn foreign_sender_claim_changes_nothing(params in any::<OrderParams>(), relayer in keypair(), lock in any::<bool>()) {
        prop_assume!(relayer.public_key() != params.keypair.public_key());

        runtime().block_on(async {
            let node = TestNode::spawn(&MemoryNetwork::new()).await;
            let order = order_from_params(&params);
            node.orders.receive(&envelope(Operation::Create, &order, &params), &owner(&params), Origin::Topic).await.unwrap();

            // A genuine owner payload, relayed under the owner's name
            let (operation, payload) = if lock {
                (Operation::Lock, Order { state: State::Locked as i32, nonce: order.nonce + 1, ..order.clone() })
            } else {
                (Operation::Delete, order.clone())
            };
            let relayed_by = PeerId::from_public_key(&relayer.public_key());
            assert!(node.orders.receive(&envelope(operation, &payload, &params), &relayed_by, Origin::Topic).await.is_err());
            assert_eq!(node.orders.get_order(&params.channel(), &order.id).await.unwrap(), order);
        });
    }

    #[test]
    fn forged_create_and_delete_change_nothing(params in any::<OrderParams>(), forger in keypair()) {
        prop_assume!(forger.public_key() != params.keypair.public_key());

        runtime().block_on(async {
            let node = TestNode::spawn(&MemoryNetwork::new()).await;
            let order = order_from_params(&params);
            let claimed = owner(&params);

            // Signed by the forger but claiming the owner
            let forged = Order {
                signature: order_from_params(&OrderParams { keypair: forger.clone(), ..params.clone() }).signature,
                ..order.clone()
            };
            let message = WireMessage::new(&params.channel(), Operation::Create, forged.encode_to_vec())
                .with_sender(&claimed)
                .encode_to_vec();
            assert!(node.orders.receive(&message, &claimed, Origin::Topic).await.is_err());
            assert!(node.orders.get_all_orders(&params.channel()).await.unwrap().is_empty());

            // A genuine order survives a forged delete
            node.orders.receive(&envelope(Operation::Create, &order, &params), &claimed, Origin::Topic).await.unwrap();
            let message = WireMessage::new(&params.channel(), Operation::Delete, forged.encode_to_vec())
                .with_sender(&claimed)
                .encode_to_vec();
            assert!(node.orders.receive(&message, &claimed, Origin::Topic).await.is_err());
            assert_eq!(node.orders.get_order(&params.channel(), &order.id).await.unwrap(), order);
        });
    }
}
