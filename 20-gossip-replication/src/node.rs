//! Wires the replicated value, membership, gossip and HTTP surface together.
//!
//! A running node is four independent activities sharing one
//! [`VersionedValue`]:
//!
//! - the HTTP server, which spawns one task per inbound request,
//! - the dissemination loop,
//! - the debug reporter,
//! - whoever owns the shutdown future passed to [`Node::run_until`].
//!
//! None of them wait on each other. A slow peer only ever delays its own
//! push, bounded by the push timeout.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tokio::{net::TcpListener, sync::watch, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    gossip::{AntiEntropyDisseminator, GossipConfig},
    http::{AppState, router},
    membership::{MembershipView, join_cluster},
    reconcile::ReconciliationEngine,
    register::VersionedValue,
    reporter::{DEFAULT_REPORT_INTERVAL, DebugReporter},
    transport::Transport,
};

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Address peers use to reach this node. Defaults to the bound address.
    pub advertise: Option<String>,
    pub seeds: Vec<String>,
    pub initial_value: i64,
    pub gossip: GossipConfig,
    pub report_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            advertise: None,
            seeds: Vec::new(),
            initial_value: 0,
            gossip: GossipConfig::default(),
            report_interval: DEFAULT_REPORT_INTERVAL,
        }
    }
}

pub struct Node<M, T> {
    listener: TcpListener,
    advertise: String,
    config: NodeConfig,
    value: Arc<VersionedValue>,
    engine: Arc<ReconciliationEngine>,
    membership: Arc<M>,
    transport: Arc<T>,
}

impl<M, T> Node<M, T>
where
    M: MembershipView,
    T: Transport,
{
    pub fn new(
        listener: TcpListener,
        config: NodeConfig,
        membership: Arc<M>,
        transport: Arc<T>,
    ) -> Result<Self> {
        let bound = listener
            .local_addr()
            .context("failed to read listener address")?;
        let advertise = advertise_addr(config.advertise.as_deref(), bound)?;

        let value = Arc::new(VersionedValue::new(config.initial_value));
        let engine = Arc::new(ReconciliationEngine::new(Arc::clone(&value)));

        Ok(Self {
            listener,
            advertise,
            config,
            value,
            engine,
            membership,
            transport,
        })
    }

    /// Joins the cluster, serves until `shutdown` resolves, then leaves.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Node {
            listener,
            advertise,
            config,
            value,
            engine,
            membership,
            transport,
        } = self;

        let guard = join_cluster(Arc::clone(&membership), &config.seeds);
        let (stop_tx, stop_rx) = watch::channel(false);

        let app = router(AppState {
            engine: Arc::clone(&engine),
            membership: Arc::clone(&membership),
        });
        let mut server = tokio::spawn({
            let stop = stopped(stop_rx.clone());
            async move { axum::serve(listener, app).with_graceful_shutdown(stop).await }
        });

        let gossip = AntiEntropyDisseminator::new(
            advertise.clone(),
            Arc::clone(&value),
            Arc::clone(&membership),
            transport,
            config.gossip.clone(),
        );
        let gossip_task = tokio::spawn(gossip.run_until(stopped(stop_rx.clone())));

        let reporter = DebugReporter::new(Arc::clone(&membership), engine, config.report_interval);
        let reporter_task = tokio::spawn(reporter.run_until(stopped(stop_rx)));

        info!(
            node = %advertise,
            fanout = config.gossip.fanout,
            interval = ?config.gossip.interval,
            "node running"
        );

        let exit = wait_for_exit(shutdown, &mut server).await;
        match &exit {
            ServerExit::Requested => info!(node = %advertise, "node shutting down"),
            ServerExit::Stopped(err) => {
                warn!(node = %advertise, error = ?err, "http server stopped; shutting node down")
            }
        }
        let _ = stop_tx.send(true);

        if let Err(err) = gossip_task.await {
            warn!(error = ?err, "dissemination task panicked");
        }
        if let Err(err) = reporter_task.await {
            warn!(error = ?err, "debug reporter task panicked");
        }

        let result = match exit {
            ServerExit::Requested => server
                .await
                .context("http server task panicked")?
                .context("http server failed"),
            ServerExit::Stopped(err) => Err(err),
        };

        drop(guard);
        result
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

/// Picks the address this node announces to peers.
///
/// Peers push to this address and it is compared against member lists to
/// skip the local node, so a wildcard bind without an explicit address is
/// refused.
pub fn advertise_addr(advertise: Option<&str>, bound: SocketAddr) -> Result<String> {
    match advertise {
        Some(addr) => Ok(addr.to_string()),
        None if bound.ip().is_unspecified() => bail!(
            "listening on {bound} needs an explicit advertise address reachable by peers"
        ),
        None => Ok(bound.to_string()),
    }
}

enum ServerExit {
    Requested,
    Stopped(anyhow::Error),
}

/// Waits for `shutdown`, or for the HTTP server if it ends first.
async fn wait_for_exit<F>(shutdown: F, server: &mut JoinHandle<io::Result<()>>) -> ServerExit
where
    F: Future<Output = ()>,
{
    tokio::select! {
        _ = shutdown => ServerExit::Requested,
        joined = server => ServerExit::Stopped(match joined {
            Ok(Ok(())) => anyhow!("http server stopped unexpectedly"),
            Ok(Err(err)) => anyhow::Error::new(err).context("http server failed"),
            Err(err) => anyhow::Error::new(err).context("http server task panicked"),
        }),
    }
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    // A dropped sender also counts as shutdown.
    let _ = rx.wait_for(|stop| *stop).await;
}
