//! The channel projection: which asset pairs this node has joined.

use std::sync::Arc;

use prost::Message;
use sprawl_core::keys::{channel_key, CHANNEL_PREFIX};
use sprawl_core::{Channel, ChannelId, ChannelOptions, CoreError};
use sprawl_p2p::P2p;
use sprawl_store::Storage;
use tracing::info;

use crate::error::{Result, ServiceError};

pub struct ChannelService<S: Storage + ?Sized> {
    storage: Arc<S>,
    p2p: Arc<P2p>,
}

impl<S: Storage + ?Sized> ChannelService<S> {
    pub fn new(storage: Arc<S>, p2p: Arc<P2p>) -> Self {
        Self { storage, p2p }
    }

    /// Subscribe to the channel of an asset pair and record it.
    ///
    /// The pair is unordered: `("ETH", "BTC")` and `("BTC", "ETH")` join the
    /// same channel. Joining again returns the same channel.
    pub async fn join(&self, asset: &str, counter_asset: &str) -> Result<Channel> {
        if asset.is_empty() || counter_asset.is_empty() {
            return Err(ServiceError::InvalidArgument("asset names must not be empty".into()));
        }

        let id = ChannelId::derive(asset, counter_asset);
        self.p2p.subscribe(&id).await?;

        let channel = Channel {
            id: id.as_bytes().to_vec(),
            options: Some(ChannelOptions {
                asset: asset.to_string(),
                counter_asset: counter_asset.to_string(),
            }),
        };
        self.storage
            .put(&channel_key(&id), &channel.encode_to_vec())
            .await?;

        info!(channel = %id, "joined channel");
        Ok(channel)
    }

    /// Unsubscribe and forget the channel. Other peers are not told.
    pub async fn leave(&self, id: &ChannelId) -> Result<()> {
        self.p2p.unsubscribe(id).await?;
        self.storage.delete(&channel_key(id)).await?;

        info!(channel = %id, "left channel");
        Ok(())
    }

    pub async fn get_channel(&self, id: &ChannelId) -> Result<Channel> {
        let bytes = self
            .storage
            .get(&channel_key(id))
            .await?
            .ok_or_else(|| ServiceError::ChannelNotFound(id.to_string()))?;
        decode_channel(&bytes)
    }

    pub async fn get_all_channels(&self) -> Result<Vec<Channel>> {
        self.storage
            .get_all_with_prefix(CHANNEL_PREFIX)
            .await?
            .iter()
            .map(|(_, value)| decode_channel(value))
            .collect()
    }
}

fn decode_channel(bytes: &[u8]) -> Result<Channel> {
    Ok(Channel::decode(bytes).map_err(CoreError::from)?)
}
