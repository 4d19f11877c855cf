use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use gossip_replication::{
    cli::Cli,
    membership::StaticMembership,
    node::{Node, advertise_addr},
    transport::HttpTransport,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = cli.node_config();

    let listener = TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("failed to bind {}", cli.listen))?;
    let bound = listener.local_addr()?;
    let advertise = advertise_addr(config.advertise.as_deref(), bound)
        .context("set --advertise to an address peers can reach")?;
    config.advertise = Some(advertise.clone());
    info!("node listening on {}", bound);

    let membership = Arc::new(StaticMembership::new(advertise));
    let transport = Arc::new(
        HttpTransport::new(config.gossip.push_timeout).context("failed to build http client")?,
    );

    let node = Node::new(listener, config, membership, transport)?;
    if let Err(err) = node.run_until_ctrl_c().await {
        warn!("node exited with error: {err:?}");
        return Err(err);
    }

    Ok(())
}
