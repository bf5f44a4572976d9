//! Relay configuration structures mapping the relay.toml file.

#![deny(missing_docs)]

mod accounts;
mod loader;
mod server;

use std::{collections::BTreeMap, path::Path};

pub use accounts::{AccountConfig, AccountKind, Platform};
use serde::Deserialize;
pub use server::ServerConfig;

/// Main configuration structure for the relay.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,

    /// Upstream accounts, keyed by account id.
    pub accounts: BTreeMap<String, AccountConfig>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validate that the configuration can serve requests at all.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate_has_accounts(self)
    }
}
