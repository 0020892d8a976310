//! The order projection.
//!
//! Local calls sign, persist, and broadcast order operations. Network
//! traffic arrives through the [`Receiver`] impl, which authenticates each
//! operation against the transport-level author before touching storage.
//! An envelope whose `sender` names anyone else is dropped whole.

use std::sync::Arc;

use async_trait::async_trait;
use prost::Message;
use sprawl_core::keys::{channel_orders_prefix, order_key};
use sprawl_core::{
    authenticate_order, ChannelId, CoreError, CreateRequest, Operation, Order, OrderBuilder,
    Payload, PeerId, Recipient, State, WireMessage,
};
use sprawl_p2p::{protocol, Origin, P2p, Receiver};
use sprawl_store::Storage;
use tracing::{debug, error, info, instrument};

use crate::error::{Result, ServiceError, StatusCode};
use crate::identity::Identity;

/// Creates, mutates, and serves the orders of joined channels.
pub struct OrderService<S: Storage + ?Sized> {
    storage: Arc<S>,
    p2p: Arc<P2p>,
    identity: Arc<Identity>,
}

impl<S: Storage + ?Sized> OrderService<S> {
    pub fn new(storage: Arc<S>, p2p: Arc<P2p>, identity: Arc<Identity>) -> Self {
        Self {
            storage,
            p2p,
            identity,
        }
    }

    /// Create, persist, and broadcast a new order.
    ///
    /// The broadcast is attempted even if persisting fails; the persistence
    /// error is still returned.
    #[instrument(skip_all, fields(asset = %request.asset, counter_asset = %request.counter_asset))]
    pub async fn create(&self, request: CreateRequest) -> Result<Order> {
        if request.channel_id.is_empty() {
            return Err(ServiceError::InvalidArgument("channel id is empty".into()));
        }

        let channel = ChannelId::from_bytes(request.channel_id.clone())
            .map_err(|err| ServiceError::InvalidArgument(err.to_string()))?;
        let order = OrderBuilder::new(request).sign(self.identity.keypair());
        let bytes = order.encode_to_vec();

        let stored = self
            .storage
            .put(&order_key(&channel, &order.id), &bytes)
            .await;
        if let Err(err) = &stored {
            error!(%channel, error = %err, "failed to persist created order");
        }

        if let Err(err) = self.p2p.send(WireMessage::new(&channel, Operation::Create, bytes)) {
            error!(%channel, error = %err, "failed to broadcast created order");
        }

        stored?;
        info!(%channel, order = %hex_id(&order.id), "order created");
        Ok(order)
    }

    /// Broadcast the deletion of an order this node owns, then remove it.
    pub async fn delete(&self, channel: &ChannelId, order_id: &[u8]) -> Result<()> {
        let order = self.get_order(channel, order_id).await?;
        self.check_ownership(&order)?;

        self.p2p.send(WireMessage::new(
            channel,
            Operation::Delete,
            order.encode_to_vec(),
        ))?;
        self.storage.delete(&order_key(channel, order_id)).await?;

        info!(%channel, order = %hex_id(order_id), "order deleted");
        Ok(())
    }

    /// Lock an order this node owns.
    pub async fn lock(&self, channel: &ChannelId, order_id: &[u8]) -> Result<Order> {
        self.transition(channel, order_id, State::Locked).await
    }

    /// Unlock an order this node owns.
    pub async fn unlock(&self, channel: &ChannelId, order_id: &[u8]) -> Result<Order> {
        self.transition(channel, order_id, State::Open).await
    }

    pub async fn get_order(&self, channel: &ChannelId, order_id: &[u8]) -> Result<Order> {
        let bytes = self
            .storage
            .get(&order_key(channel, order_id))
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(hex_id(order_id)))?;
        decode_order(&bytes)
    }

    /// Every order held for `channel`, ordered by id.
    pub async fn get_all_orders(&self, channel: &ChannelId) -> Result<Vec<Order>> {
        self.storage
            .get_all_with_prefix(&channel_orders_prefix(channel))
            .await?
            .iter()
            .map(|(_, value)| decode_order(value))
            .collect()
    }

    async fn transition(&self, channel: &ChannelId, order_id: &[u8], state: State) -> Result<Order> {
        let order = self.get_order(channel, order_id).await?;
        if order.state() == state {
            return Err(ServiceError::AlreadyInState {
                id: hex_id(order_id),
                state: state_name(state),
            });
        }
        self.check_ownership(&order)?;

        let next = order.transition(state, self.identity.keypair());
        let bytes = next.encode_to_vec();
        self.storage
            .put(&order_key(channel, order_id), &bytes)
            .await?;

        let operation = match state {
            State::Locked => Operation::Lock,
            State::Open => Operation::Unlock,
        };
        self.p2p.send(WireMessage::new(channel, operation, bytes))?;

        info!(%channel, order = %hex_id(order_id), nonce = next.nonce, state = state_name(state), "order updated");
        Ok(next)
    }

    /// Local mutations are allowed only on orders signed by this node.
    fn check_ownership(&self, order: &Order) -> Result<()> {
        authenticate_order(order, self.identity.peer_id()).map_err(|_| {
            ServiceError::PermissionDenied(format!("order {} is not ours", hex_id(&order.id)))
        })
    }

    async fn handle(&self, data: &[u8], from: &PeerId, origin: Origin) -> Result<()> {
        let message = WireMessage::from_bytes(data)?;
        if !message.sender.is_empty() && message.sender != from.as_bytes() {
            return Err(ServiceError::PermissionDenied(format!(
                "message from {from} claims another sender"
            )));
        }
        let channel = message.channel()?;
        let sender = from;

        match message.payload()? {
            Payload::Create(order) => self.apply_create(&channel, order, sender).await,
            Payload::Delete(order) => self.apply_delete(&channel, order, sender).await,
            Payload::Lock(order) => {
                self.apply_transition(&channel, order, State::Locked, sender)
                    .await
            }
            Payload::Unlock(order) => {
                self.apply_transition(&channel, order, State::Open, sender)
                    .await
            }
            Payload::SyncRequest => {
                direct_only(origin, "sync request")?;
                self.serve_sync(&channel, sender).await
            }
            Payload::SyncReceive(list) => {
                direct_only(origin, "sync reply")?;
                if !self.p2p.election().accept_reply(&channel, sender) {
                    return Err(ServiceError::PermissionDenied(format!(
                        "unsolicited sync reply from {sender}"
                    )));
                }
                self.merge(&channel, list.orders).await
            }
            Payload::Ping(recipient) => self.on_ping(&channel, &recipient, sender),
            Payload::Pong(recipient) => self.on_pong(&channel, &recipient, sender).await,
            Payload::Unknown(operation) => {
                debug!(operation, %sender, "ignoring unknown operation");
                Ok(())
            }
        }
    }

    async fn apply_create(&self, channel: &ChannelId, order: Order, sender: &PeerId) -> Result<()> {
        authenticate_order(&order, sender)?;

        let key = order_key(channel, &order.id);
        if let Some(stored) = self.stored(&key).await? {
            if stored.nonce > order.nonce {
                debug!(%channel, order = %hex_id(&order.id), "create older than stored order");
                return Ok(());
            }
        }

        self.storage.put(&key, &order.encode_to_vec()).await?;
        debug!(%channel, order = %hex_id(&order.id), %sender, "applied create");
        Ok(())
    }

    async fn apply_delete(&self, channel: &ChannelId, order: Order, sender: &PeerId) -> Result<()> {
        authenticate_order(&order, sender)?;

        self.storage.delete(&order_key(channel, &order.id)).await?;
        debug!(%channel, order = %hex_id(&order.id), %sender, "applied delete");
        Ok(())
    }

    async fn apply_transition(
        &self,
        channel: &ChannelId,
        order: Order,
        state: State,
        sender: &PeerId,
    ) -> Result<()> {
        if order.state() != state {
            return Err(ServiceError::InvalidArgument(format!(
                "{} message carries a {} order",
                state_name(state),
                state_name(order.state())
            )));
        }

        let key = order_key(channel, &order.id);
        if let Some(stored) = self.stored(&key).await? {
            // Equal nonces are re-deliveries
            if order.nonce <= stored.nonce {
                debug!(
                    %channel,
                    order = %hex_id(&order.id),
                    incoming = order.nonce,
                    stored = stored.nonce,
                    "stale update rejected"
                );
                return Ok(());
            }
        }

        authenticate_order(&order, sender)?;
        self.storage.put(&key, &order.encode_to_vec()).await?;
        debug!(%channel, order = %hex_id(&order.id), nonce = order.nonce, "applied update");
        Ok(())
    }

    /// Stream every order of `channel` to `peer`.
    async fn serve_sync(&self, channel: &ChannelId, peer: &PeerId) -> Result<()> {
        let orders = self.get_all_orders(channel).await?;
        debug!(%channel, %peer, orders = orders.len(), "serving sync");
        self.p2p
            .send_direct(peer, protocol::sync_receive(channel, orders))
            .await?;
        Ok(())
    }

    /// Store a solicited sync reply as-is. Replaying it changes nothing.
    async fn merge(&self, channel: &ChannelId, orders: Vec<Order>) -> Result<()> {
        let mut merged = 0;
        for order in orders.iter().filter(|order| !order.id.is_empty()) {
            self.storage
                .put(&order_key(channel, &order.id), &order.encode_to_vec())
                .await?;
            merged += 1;
        }

        info!(%channel, merged, "sync merged");
        Ok(())
    }

    fn on_ping(&self, channel: &ChannelId, recipient: &Recipient, sender: &PeerId) -> Result<()> {
        if let Some(pong) = self.p2p.election().accept_ping(channel, recipient, sender) {
            self.p2p.send(pong)?;
        }
        Ok(())
    }

    async fn on_pong(&self, channel: &ChannelId, recipient: &Recipient, sender: &PeerId) -> Result<()> {
        if self.p2p.election().won(recipient) {
            debug!(%channel, newcomer = %sender, "won sync election");
            self.serve_sync(channel, sender).await?;
        }
        Ok(())
    }

    async fn stored(&self, key: &[u8]) -> Result<Option<Order>> {
        match self.storage.get(key).await? {
            Some(bytes) => Ok(Some(decode_order(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl<S: Storage + ?Sized + 'static> Receiver for OrderService<S> {
    async fn receive(&self, data: &[u8], from: &PeerId, origin: Origin) -> anyhow::Result<()> {
        match self.handle(data, from, origin).await {
            // A local effect failed; the sender is not at fault
            Err(err) if err.code() == StatusCode::Internal => {
                error!(%from, error = %err, "failed to apply network message");
                Ok(())
            }
            result => Ok(result?),
        }
    }
}

/// Sync traffic is point-to-point and never honoured from a broadcast.
fn direct_only(origin: Origin, what: &str) -> Result<()> {
    match origin {
        Origin::Stream => Ok(()),
        Origin::Topic => Err(ServiceError::PermissionDenied(format!(
            "{what} arrived over pub/sub"
        ))),
    }
}

fn decode_order(bytes: &[u8]) -> Result<Order> {
    Ok(Order::decode(bytes).map_err(CoreError::from)?)
}

fn hex_id(id: &[u8]) -> String {
    sprawl_core::OrderId::try_from(id)
        .map(|id| id.to_hex())
        .unwrap_or_else(|_| format!("{id:02x?}"))
}

fn state_name(state: State) -> &'static str {
    match state {
        State::Open => "open",
        State::Locked => "locked",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprawl_core::{Keypair, OrderList};
    use sprawl_p2p::MemoryNetwork;
    use sprawl_store::MemoryStore;
    use std::time::Duration;

    struct Node {
        orders: Arc<OrderService<MemoryStore>>,
        p2p: Arc<P2p>,
        identity: Arc<Identity>,
    }

    async fn node(network: &Arc<MemoryNetwork>) -> Node {
        let identity = Arc::new(Identity::from_keypair(Keypair::generate()));
        let transport = network.create_transport(identity.peer_id().clone()).await;
        let p2p = P2p::start(Arc::new(transport)).await;
        let orders = Arc::new(OrderService::new(
            Arc::new(MemoryStore::new()),
            Arc::clone(&p2p),
            Arc::clone(&identity),
        ));
        p2p.add_receiver(orders.clone()).await;
        Node {
            orders,
            p2p,
            identity,
        }
    }

    fn channel() -> ChannelId {
        ChannelId::derive("ETH", "BTC")
    }

    fn request() -> CreateRequest {
        CreateRequest {
            channel_id: channel().as_bytes().to_vec(),
            asset: "ETH".into(),
            counter_asset: "BTC".into(),
            amount: 52617562718,
            price: 0.1,
        }
    }

    fn envelope(operation: Operation, order: &Order, sender: &PeerId) -> Vec<u8> {
        WireMessage::new(&channel(), operation, order.encode_to_vec())
            .with_sender(sender)
            .encode_to_vec()
    }

    #[tokio::test]
    async fn test_create_persists_signed_order() {
        let network = MemoryNetwork::new();
        let a = node(&network).await;

        let order = a.orders.create(request()).await.unwrap();
        assert_eq!(order.state(), State::Open);
        assert_eq!(order.nonce, 0);
        assert_eq!(a.orders.get_order(&channel(), &order.id).await.unwrap(), order);
        authenticate_order(&order, a.identity.peer_id()).unwrap();
    }

    #[tokio::test]
    async fn test_create_requires_channel() {
        let network = MemoryNetwork::new();
        let a = node(&network).await;
        let mut request = request();
        request.channel_id.clear();

        let err = a.orders.create(request).await.unwrap_err();
        assert_eq!(err.code(), StatusCode::InvalidArgument);
    }

    #[tokio::test]
    async fn test_lock_twice_is_rejected() {
        let network = MemoryNetwork::new();
        let a = node(&network).await;
        let order = a.orders.create(request()).await.unwrap();

        let locked = a.orders.lock(&channel(), &order.id).await.unwrap();
        assert!(locked.is_locked());
        assert_eq!(locked.nonce, 1);

        let err = a.orders.lock(&channel(), &order.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyInState { .. }));
        assert_eq!(a.orders.get_order(&channel(), &order.id).await.unwrap(), locked);

        let unlocked = a.orders.unlock(&channel(), &order.id).await.unwrap();
        assert!(!unlocked.is_locked());
        assert_eq!(unlocked.nonce, 2);
    }

    #[tokio::test]
    async fn test_unlock_open_order_is_rejected() {
        let network = MemoryNetwork::new();
        let a = node(&network).await;
        let order = a.orders.create(request()).await.unwrap();

        assert!(a.orders.unlock(&channel(), &order.id).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_order_is_not_found() {
        let network = MemoryNetwork::new();
        let a = node(&network).await;

        let err = a.orders.get_order(&channel(), &[0; 32]).await.unwrap_err();
        assert_eq!(err.code(), StatusCode::NotFound);
        assert_eq!(
            a.orders.delete(&channel(), &[0; 32]).await.unwrap_err().code(),
            StatusCode::NotFound
        );
    }

    #[tokio::test]
    async fn test_foreign_order_cannot_be_mutated_locally() {
        let network = MemoryNetwork::new();
        let a = node(&network).await;
        let owner = Keypair::generate();
        let foreign = OrderBuilder::new(request()).sign(&owner);

        a.orders
            .receive(
                &envelope(Operation::Create, &foreign, &PeerId::from_public_key(&owner.public_key())),
                &PeerId::from_public_key(&owner.public_key()),
                Origin::Topic,
            )
            .await
            .unwrap();

        let err = a.orders.delete(&channel(), &foreign.id).await.unwrap_err();
        assert_eq!(err.code(), StatusCode::PermissionDenied);
        let err = a.orders.lock(&channel(), &foreign.id).await.unwrap_err();
        assert_eq!(err.code(), StatusCode::PermissionDenied);

        // Still held after the refused calls
        assert!(a.orders.get_order(&channel(), &foreign.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_impostor_create_is_dropped() {
        let network = MemoryNetwork::new();
        let a = node(&network).await;
        let owner = Keypair::generate();
        let impostor = PeerId::from_public_key(&Keypair::generate().public_key());
        let order = OrderBuilder::new(request()).sign(&owner);

        assert!(a
            .orders
            .receive(&envelope(Operation::Create, &order, &impostor), &impostor, Origin::Topic)
            .await
            .is_err());
        assert!(a.orders.get_all_orders(&channel()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sender_falls_back_to_transport_peer() {
        let network = MemoryNetwork::new();
        let a = node(&network).await;
        let owner = Keypair::generate();
        let order = OrderBuilder::new(request()).sign(&owner);

        let unsigned_envelope =
            WireMessage::new(&channel(), Operation::Create, order.encode_to_vec()).encode_to_vec();
        a.orders
            .receive(
                &unsigned_envelope,
                &PeerId::from_public_key(&owner.public_key()),
                Origin::Topic,
            )
            .await
            .unwrap();
        assert!(a.orders.get_order(&channel(), &order.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_stale_lock_is_ignored() {
        let network = MemoryNetwork::new();
        let a = node(&network).await;
        let owner = Keypair::generate();
        let sender = PeerId::from_public_key(&owner.public_key());

        let open = OrderBuilder::new(request()).sign(&owner);
        let locked = open.transition(State::Locked, &owner);
        let unlocked = locked.transition(State::Open, &owner);
        let relocked = unlocked.transition(State::Locked, &owner);

        a.orders
            .receive(&envelope(Operation::Create, &open, &sender), &sender, Origin::Topic)
            .await
            .unwrap();
        a.orders
            .receive(&envelope(Operation::Lock, &relocked, &sender), &sender, Origin::Topic)
            .await
            .unwrap();

        // nonce 1 and nonce 3 (a re-delivery) are both stale now
        for stale in [&locked, &relocked] {
            a.orders
                .receive(&envelope(Operation::Lock, stale, &sender), &sender, Origin::Topic)
                .await
                .unwrap();
        }
        a.orders
            .receive(&envelope(Operation::Unlock, &unlocked, &sender), &sender, Origin::Topic)
            .await
            .unwrap();

        assert_eq!(a.orders.get_order(&channel(), &open.id).await.unwrap(), relocked);
    }

    #[tokio::test]
    async fn test_lock_message_must_carry_locked_order() {
        let network = MemoryNetwork::new();
        let a = node(&network).await;
        let owner = Keypair::generate();
        let sender = PeerId::from_public_key(&owner.public_key());
        let open = OrderBuilder::new(request()).sign(&owner);
        let mislabeled = Order {
            nonce: 5,
            ..open.clone()
        };

        assert!(a
            .orders
            .receive(&envelope(Operation::Lock, &mislabeled, &sender), &sender, Origin::Topic)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_duplicate_create_does_not_regress() {
        let network = MemoryNetwork::new();
        let a = node(&network).await;
        let owner = Keypair::generate();
        let sender = PeerId::from_public_key(&owner.public_key());
        let open = OrderBuilder::new(request()).sign(&owner);
        let locked = open.transition(State::Locked, &owner);

        for (operation, order) in [
            (Operation::Create, &open),
            (Operation::Lock, &locked),
            (Operation::Create, &open),
        ] {
            a.orders
                .receive(&envelope(operation, order, &sender), &sender, Origin::Topic)
                .await
                .unwrap();
        }
        assert!(a
            .orders
            .get_order(&channel(), &open.id)
            .await
            .unwrap()
            .is_locked());
    }

    fn sync_reply(orders: Vec<Order>) -> Vec<u8> {
        WireMessage::new(&channel(), Operation::SyncReceive, OrderList { orders }.encode_to_vec())
            .encode_to_vec()
    }

    fn signed_orders(owner: &Keypair, count: u64) -> Vec<Order> {
        (0..count)
            .map(|i| {
                let mut request = request();
                request.amount = i;
                OrderBuilder::new(request).sign(owner)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_elected_sync_reply_merges_once() {
        let network = MemoryNetwork::new();
        let a = node(&network).await;
        let owner = Keypair::generate();
        let orders = signed_orders(&owner, 3);

        let pinger = PeerId::from_public_key(&owner.public_key());
        a.p2p
            .election()
            .accept_ping(&channel(), &Recipient::new(a.identity.peer_id()), &pinger)
            .unwrap();
        assert!(a.p2p.election().is_synchronizing(&channel()));

        let reply = sync_reply(orders.clone());
        a.orders.receive(&reply, &pinger, Origin::Stream).await.unwrap();
        assert!(!a.p2p.election().is_synchronizing(&channel()));

        let mut held = a.orders.get_all_orders(&channel()).await.unwrap();
        let mut expected = orders;
        held.sort_by(|x, y| x.id.cmp(&y.id));
        expected.sort_by(|x, y| x.id.cmp(&y.id));
        assert_eq!(held, expected);

        // The election is spent, so a second push is unsolicited
        let extra = sync_reply(signed_orders(&Keypair::generate(), 1));
        let err = a.orders.handle(&extra, &pinger, Origin::Stream).await.unwrap_err();
        assert_eq!(err.code(), StatusCode::PermissionDenied);
        assert_eq!(a.orders.get_all_orders(&channel()).await.unwrap(), held);
    }

    #[tokio::test]
    async fn test_requested_peer_may_answer() {
        let network = MemoryNetwork::new();
        let a = node(&network).await;
        let member = PeerId::from_public_key(&Keypair::generate().public_key());
        let orders = signed_orders(&Keypair::generate(), 2);

        a.p2p.election().requested(&channel(), &member);
        a.orders
            .receive(&sync_reply(orders), &member, Origin::Stream)
            .await
            .unwrap();
        assert_eq!(a.orders.get_all_orders(&channel()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_broadcast_sync_reply_is_ignored() {
        let network = MemoryNetwork::new();
        let a = node(&network).await;
        let intruder = PeerId::from_public_key(&Keypair::generate().public_key());
        let junk = Order {
            signature: vec![0; 64],
            ..signed_orders(&Keypair::generate(), 1).remove(0)
        };

        // Even a peer we asked may not answer over pub/sub
        a.p2p.election().requested(&channel(), &intruder);
        let err = a
            .orders
            .handle(&sync_reply(vec![junk.clone()]), &intruder, Origin::Topic)
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::PermissionDenied);

        let other = ChannelId::derive("DOGE", "BTC");
        let unasked = WireMessage::new(
            &other,
            Operation::SyncReceive,
            OrderList { orders: vec![junk] }.encode_to_vec(),
        )
        .encode_to_vec();
        assert!(a.orders.receive(&unasked, &intruder, Origin::Stream).await.is_err());

        assert!(a.orders.get_all_orders(&channel()).await.unwrap().is_empty());
        assert!(a.orders.get_all_orders(&other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_request_needs_direct_stream() {
        let network = MemoryNetwork::new();
        let a = node(&network).await;
        a.orders.create(request()).await.unwrap();
        let asker = PeerId::from_public_key(&Keypair::generate().public_key());

        let request = protocol::sync_request(&channel())
            .with_sender(&asker)
            .encode_to_vec();
        let err = a.orders.handle(&request, &asker, Origin::Topic).await.unwrap_err();
        assert_eq!(err.code(), StatusCode::PermissionDenied);
    }

    #[tokio::test]
    async fn test_spoofed_sender_cannot_lock_or_delete() {
        let network = MemoryNetwork::new();
        let a = node(&network).await;
        let owner = Keypair::generate();
        let owner_id = PeerId::from_public_key(&owner.public_key());
        let relayer = PeerId::from_public_key(&Keypair::generate().public_key());

        let open = OrderBuilder::new(request()).sign(&owner);
        a.orders
            .receive(&envelope(Operation::Create, &open, &owner_id), &owner_id, Origin::Topic)
            .await
            .unwrap();

        // The canonical form drops state and nonce, so the owner's
        // signature still verifies on a bumped copy
        let pinned = Order {
            state: State::Locked as i32,
            nonce: u64::MAX,
            ..open.clone()
        };
        let err = a
            .orders
            .handle(&envelope(Operation::Lock, &pinned, &owner_id), &relayer, Origin::Topic)
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::PermissionDenied);

        let err = a
            .orders
            .handle(&envelope(Operation::Delete, &open, &owner_id), &relayer, Origin::Topic)
            .await
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::PermissionDenied);

        assert_eq!(a.orders.get_order(&channel(), &open.id).await.unwrap(), open);

        // The owner's own update still applies afterwards
        let locked = open.transition(State::Locked, &owner);
        a.orders
            .receive(&envelope(Operation::Lock, &locked, &owner_id), &owner_id, Origin::Topic)
            .await
            .unwrap();
        assert_eq!(a.orders.get_order(&channel(), &open.id).await.unwrap(), locked);
    }

    #[tokio::test]
    async fn test_non_utf8_channel_is_refused() {
        let network = MemoryNetwork::new();
        let a = node(&network).await;
        let mut request = request();
        request.channel_id = vec![0xff, 0xfe];

        let err = a.orders.create(request).await.unwrap_err();
        assert_eq!(err.code(), StatusCode::InvalidArgument);
    }

    #[tokio::test]
    async fn test_pong_winner_streams_orders_to_newcomer() {
        let network = MemoryNetwork::new();
        let member = node(&network).await;
        let newcomer = node(&network).await;
        let order = member.orders.create(request()).await.unwrap();

        // The newcomer answered this member's ping
        newcomer
            .p2p
            .election()
            .accept_ping(
                &channel(),
                &Recipient::new(newcomer.identity.peer_id()),
                member.identity.peer_id(),
            )
            .unwrap();
        let pong = protocol::pong(&channel(), member.identity.peer_id())
            .with_sender(newcomer.identity.peer_id())
            .encode_to_vec();
        member
            .orders
            .receive(&pong, newcomer.identity.peer_id(), Origin::Topic)
            .await
            .unwrap();

        for _ in 0..200 {
            if let Ok(received) = newcomer.orders.get_order(&channel(), &order.id).await {
                assert_eq!(received, order);
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("sync never arrived");
    }

    #[tokio::test]
    async fn test_pong_for_another_member_is_ignored() {
        let network = MemoryNetwork::new();
        let member = node(&network).await;
        let newcomer = node(&network).await;
        let other = PeerId::from_public_key(&Keypair::generate().public_key());
        member.orders.create(request()).await.unwrap();

        let pong = protocol::pong(&channel(), &other)
            .with_sender(newcomer.identity.peer_id())
            .encode_to_vec();
        member
            .orders
            .receive(&pong, newcomer.identity.peer_id(), Origin::Topic)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(newcomer
            .orders
            .get_all_orders(&channel())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unknown_operation_is_ignored() {
        let network = MemoryNetwork::new();
        let a = node(&network).await;
        let message = WireMessage {
            channel_id: channel().as_bytes().to_vec(),
            operation: 99,
            sender: Vec::new(),
            data: vec![1, 2, 3],
        };
        a.orders
            .receive(&message.encode_to_vec(), a.identity.peer_id(), Origin::Topic)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_reaches_subscribed_peer() {
        let network = MemoryNetwork::new();
        let a = node(&network).await;
        let b = node(&network).await;
        a.p2p.subscribe(&channel()).await.unwrap();
        b.p2p.subscribe(&channel()).await.unwrap();

        let order = a.orders.create(request()).await.unwrap();

        for _ in 0..200 {
            if let Ok(received) = b.orders.get_order(&channel(), &order.id).await {
                assert_eq!(received, order);
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("order never arrived");
    }
}
