use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

/// An API-compatibility gateway for Copilot upstreams.
#[derive(Debug, Parser)]
#[command(name = "relay", version, about)]
pub struct Args {
    /// Path to the relay TOML configuration.
    #[arg(short, long, env = "RELAY_CONFIG", default_value = "relay.toml")]
    pub config: PathBuf,

    /// Listen address override; takes precedence over the config file.
    #[arg(short, long, env = "RELAY_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Log filter, e.g. "info" or "gateway=debug,translate=debug".
    #[arg(long, env = "RELAY_LOG", default_value = "info")]
    pub log_filter: String,
}
