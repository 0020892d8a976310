//! Wires storage, identity, the overlay, and the services into one node.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sprawl_core::{ChannelId, CreateRequest};
use sprawl_p2p::{Libp2pNetwork, Network, P2p};
use sprawl_service::{ChannelService, Identity, NodeService, OrderService};
use sprawl_store::{MemoryStore, SqliteStore, Storage};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{Config, DatabaseConfig};

/// Channel the debug pinger publishes on.
pub const DEBUG_CHANNEL: &str = "testChannel";

/// Delay between the debug pinger's create and delete.
const DEBUG_PING_PERIOD: Duration = Duration::from_secs(60);

/// A running node.
pub struct App {
    config: Config,
    identity: Arc<Identity>,
    p2p: Arc<P2p>,
    pub orders: Arc<OrderService<dyn Storage>>,
    pub channels: ChannelService<dyn Storage>,
    pub node: NodeService,
}

impl App {
    /// Open storage, load the identity, and start a libp2p host.
    pub async fn init(config: Config) -> anyhow::Result<Self> {
        let storage = open_storage(&config.database)?;
        let identity = Identity::load_or_generate(storage.as_ref())
            .await
            .context("failed to load identity")?;
        info!(peer = %identity.peer_id(), "identity loaded");

        let network = Libp2pNetwork::start(identity.keypair(), config.p2p.host_config())
            .await
            .context("failed to start p2p host")?;

        Ok(Self::assemble(config, storage, identity, network).await)
    }

    /// Build the services on top of an already running network.
    pub async fn assemble(
        config: Config,
        storage: Arc<dyn Storage>,
        identity: Identity,
        network: Arc<dyn Network>,
    ) -> Self {
        let identity = Arc::new(identity);
        let p2p = P2p::start(network).await;

        let orders = Arc::new(OrderService::new(
            Arc::clone(&storage),
            Arc::clone(&p2p),
            Arc::clone(&identity),
        ));
        p2p.add_receiver(orders.clone()).await;

        Self {
            channels: ChannelService::new(Arc::clone(&storage), Arc::clone(&p2p)),
            node: NodeService::new(Arc::clone(&p2p)),
            config,
            identity,
            p2p,
            orders,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Subscribe again to every channel joined in an earlier run.
    pub async fn rejoin_channels(&self) -> anyhow::Result<usize> {
        let channels = self
            .channels
            .get_all_channels()
            .await
            .context("failed to list joined channels")?;

        let mut rejoined = 0;
        for channel in channels {
            let Some(options) = channel.options else {
                warn!(channel = %String::from_utf8_lossy(&channel.id), "joined channel has no assets");
                continue;
            };
            self.channels
                .join(&options.asset, &options.counter_asset)
                .await
                .context("failed to rejoin channel")?;
            rejoined += 1;
        }
        Ok(rejoined)
    }

    /// Run until SIGINT or SIGTERM, then shut down.
    pub async fn run(self) -> anyhow::Result<()> {
        let rejoined = self.rejoin_channels().await?;
        info!(channels = rejoined, "rejoined channels");

        let pinger = self.config.p2p.debug.then(|| {
            info!(channel = DEBUG_CHANNEL, "running the debug pinger");
            self.spawn_debug_pinger(DEBUG_PING_PERIOD)
        });

        let signal = shutdown_signal().await.context("failed to listen for signals")?;
        info!(signal, "shutting down");

        if let Some(pinger) = pinger {
            pinger.abort();
        }
        self.close().await
    }

    /// Leave every channel and stop the overlay. Storage closes on drop.
    pub async fn close(self) -> anyhow::Result<()> {
        self.p2p.close().await.context("failed to close p2p")?;
        info!("node stopped");
        Ok(())
    }

    /// Join the debug channel, then create and delete a test order every
    /// `period`.
    pub fn spawn_debug_pinger(&self, period: Duration) -> JoinHandle<()> {
        let p2p = Arc::clone(&self.p2p);
        let orders = Arc::clone(&self.orders);

        tokio::spawn(async move {
            let channel = ChannelId::from(DEBUG_CHANNEL);
            if let Err(err) = p2p.subscribe(&channel).await {
                error!(%channel, error = %err, "debug pinger failed to subscribe");
                return;
            }

            loop {
                let created = orders.create(debug_request(&channel)).await;
                tokio::time::sleep(period).await;

                match created {
                    Ok(order) => {
                        if let Err(err) = orders.delete(&channel, &order.id).await {
                            warn!(error = %err, "debug pinger failed to delete");
                        }
                    }
                    Err(err) => warn!(error = %err, "debug pinger failed to create"),
                }
            }
        })
    }
}

fn debug_request(channel: &ChannelId) -> CreateRequest {
    CreateRequest {
        channel_id: channel.as_bytes().to_vec(),
        asset: "ETH".to_string(),
        counter_asset: "BTC".to_string(),
        amount: 52153,
        price: 0.2,
    }
}

fn open_storage(config: &DatabaseConfig) -> anyhow::Result<Arc<dyn Storage>> {
    if config.in_memory {
        info!("using in-memory storage");
        return Ok(Arc::new(MemoryStore::new()));
    }

    info!(path = %config.path.display(), "opening database");
    let store = SqliteStore::open(&config.path)
        .with_context(|| format!("failed to open database {}", config.path.display()))?;
    Ok(Arc::new(store))
}

/// Resolve with the name of the first shutdown signal received.
async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|_| "SIGINT")
    }
}
