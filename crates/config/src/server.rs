use std::net::SocketAddr;

use serde::Deserialize;

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// The socket address the server binds to. Defaults to
    /// `127.0.0.1:8085` when unset.
    pub listen_address: Option<SocketAddr>,
}

impl ServerConfig {
    /// The address to bind, applying the default.
    pub fn listen_address_or_default(&self) -> SocketAddr {
        self.listen_address
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8085)))
    }
}
