//! CLI surface (§6, §11): a config file supplies the bulk of a node's
//! settings (`NodeConfig`); these flags cover what necessarily lives outside
//! that file — where to read it from, where to keep local state, and how
//! loud to log — the same split the teacher's `cli.rs` draws between
//! `--network`/`--datadir` and everything else.

use std::path::PathBuf;

use clap::Parser;

pub const VERSION_STRING: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "coc-node", version = VERSION_STRING, about = "Proof-of-Service settlement node")]
pub struct Options {
    #[arg(
        long = "config",
        value_name = "CONFIG_FILE",
        help = "Path to the node's TOML or JSON configuration file.",
        help_heading = "Node options"
    )]
    pub config: PathBuf,

    #[arg(
        long = "datadir",
        value_name = "DATABASE_DIRECTORY",
        default_value = "coc-data",
        help = "Directory for persistent state. The word `memory` runs with the in-memory store instead.",
        help_heading = "Node options"
    )]
    pub datadir: String,

    #[arg(
        long = "http.addr",
        value_name = "ADDRESS",
        default_value = "0.0.0.0",
        help = "Listening address for the JSON-RPC/WS HTTP server.",
        help_heading = "RPC options"
    )]
    pub http_addr: String,

    #[arg(
        long = "p2p.enabled",
        action = clap::ArgAction::SetTrue,
        help = "Enables the P2P fabric (wire protocol, gossip, discovery).",
        help_heading = "P2P options"
    )]
    pub p2p_enabled: bool,

    #[arg(
        long = "p2p.bootnodes",
        value_name = "BOOTNODE_ADDR_LIST",
        value_delimiter = ',',
        help = "Comma separated host:port addresses to dial at startup.",
        help_heading = "P2P options"
    )]
    pub p2p_bootnodes: Vec<String>,

    #[arg(
        long = "challenger",
        action = clap::ArgAction::SetTrue,
        help = "Runs this node as a PoSe challenger, issuing challenges over /pose/challenge.",
        help_heading = "PoSe options"
    )]
    pub challenger: bool,

    #[arg(
        long = "aggregator",
        action = clap::ArgAction::SetTrue,
        help = "Runs the per-epoch batch aggregator and relayer against the accepted-receipt log.",
        help_heading = "PoSe options"
    )]
    pub aggregator: bool,

    #[arg(
        long = "log.level",
        value_name = "LOG_LEVEL",
        default_value = "info",
        help = "Possible values: trace, debug, info, warn, error.",
        help_heading = "Node options"
    )]
    pub log_level: String,
}
