use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, value_parser};

use crate::{gossip::GossipConfig, node::NodeConfig};

/// Run one node of the gossip-replicated integer store.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Socket address to bind the HTTP surface to. Use port 0 for an ephemeral port.
    #[arg(long, env = "GOSSIP_LISTEN", default_value = "127.0.0.1:7000")]
    pub listen: SocketAddr,

    /// Address peers should use to reach this node (defaults to the bound address).
    #[arg(long, env = "GOSSIP_ADVERTISE")]
    pub advertise: Option<String>,

    /// Seed members to join at startup, e.g. 127.0.0.1:7001.
    #[arg(long = "seed", env = "GOSSIP_SEEDS", value_delimiter = ',')]
    pub seeds: Vec<String>,

    /// Value the node starts with, at generation 0.
    #[arg(long, env = "GOSSIP_INITIAL_VALUE", default_value_t = 0, allow_hyphen_values = true)]
    pub initial_value: i64,

    /// Peers contacted per gossip cycle.
    #[arg(long, env = "GOSSIP_FANOUT", default_value_t = 2, value_parser = value_parser!(u16).range(1..))]
    pub fanout: u16,

    /// Milliseconds between gossip cycles.
    #[arg(long, default_value_t = 2000)]
    pub gossip_interval_ms: u64,

    /// Milliseconds between debug status reports.
    #[arg(long, default_value_t = 5000)]
    pub debug_interval_ms: u64,

    /// Milliseconds allowed for a single push to a single peer.
    #[arg(long, default_value_t = 500)]
    pub push_timeout_ms: u64,
}

impl Cli {
    pub fn node_config(&self) -> NodeConfig {
        NodeConfig {
            advertise: self.advertise.clone(),
            seeds: self.seeds.clone(),
            initial_value: self.initial_value,
            gossip: GossipConfig {
                fanout: usize::from(self.fanout),
                interval: Duration::from_millis(self.gossip_interval_ms.max(1)),
                push_timeout: Duration::from_millis(self.push_timeout_ms),
            },
            report_interval: Duration::from_millis(self.debug_interval_ms.max(1)),
        }
    }
}
