//! # Sprawl Testkit
//!
//! Testing utilities for Sprawl.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Test nodes**: complete nodes wired to an in-memory network
//! - **Generators**: Proptest strategies for property-based testing
//! - **Helpers**: the standard test order, a polling [`wait_until`], and a
//!   [`Wiretap`] that counts what a channel broadcasts
//!
//! ## Test Nodes
//!
//! ```rust
//! use sprawl_p2p::MemoryNetwork;
//! use sprawl_testkit::{multi_node, test_channel, test_request, wait_until};
//!
//! async fn two_nodes() {
//!     let network = MemoryNetwork::new();
//!     let nodes = multi_node(&network, 2).await;
//!     for node in &nodes {
//!         node.channels.join("ETH", "BTC").await.unwrap();
//!     }
//!
//!     let order = nodes[0].orders.create(test_request(&test_channel())).await.unwrap();
//!     assert!(wait_until(|| async {
//!         nodes[1].orders.get_order(&test_channel(), &order.id).await.is_ok()
//!     })
//!     .await);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use sprawl_testkit::generators::{order_from_params, OrderParams};
//!
//! proptest! {
//!     #[test]
//!     fn nonce_counts_transitions(params: OrderParams) {
//!         let order = order_from_params(&params);
//!         prop_assert_eq!(order.nonce, u64::from(params.transitions));
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    multi_node, test_channel, test_request, wait_until, TestNode, Wiretap, TEST_AMOUNT,
    TEST_ASSET, TEST_COUNTER_ASSET, TEST_PRICE,
};
pub use generators::{order_from_params, OrderParams};
