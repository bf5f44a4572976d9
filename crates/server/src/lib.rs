//! Relay server library.
//!
//! Builds the axum router over the gateway pipeline and serves it, either
//! for the binary or for integration tests.

#![deny(missing_docs)]

mod admin;
mod error;
mod handlers;
mod sse;
mod state;
mod token_counter;

use std::{collections::BTreeMap, net::SocketAddr, sync::Arc};

use axum::{
    Router,
    routing::{get, post},
};
use config::Config;
use gateway::{Gateway, ReqwestUpstream, VersionCache, default_http_client_builder};
use github_auth::{device::DeviceFlow, token::TokenExchanger};
pub use state::AppState;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Configuration for serving the relay.
pub struct ServeConfig {
    /// The socket address the server binds to.
    pub listen_address: SocketAddr,
    /// The deserialized relay TOML configuration.
    pub config: Config,
    /// Cancellation token for graceful shutdown.
    pub shutdown_signal: CancellationToken,
    /// Version string logged on startup.
    pub version: String,
    /// Optional oneshot sender for the bound address (useful with port 0).
    pub bound_addr_sender: Option<tokio::sync::oneshot::Sender<SocketAddr>>,
}

/// Starts and runs the relay server with the provided configuration.
pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        shutdown_signal,
        version,
        bound_addr_sender,
    }: ServeConfig,
) -> anyhow::Result<()> {
    log::info!("Relay {version}");

    let state = build_state(&config)?;
    let app = router(state);

    let listener = TcpListener::bind(listen_address).await?;
    let bound = listener.local_addr()?;

    log::info!("listening on {bound}");

    if let Some(sender) = bound_addr_sender {
        let _ = sender.send(bound);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_signal.cancelled().await })
        .await?;

    Ok(())
}

/// Assemble the application state from configuration.
pub fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    config.validate()?;

    let client = default_http_client_builder()
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;

    let versions = Arc::new(VersionCache::new());

    let auth = Arc::new(TokenExchanger::new(client.clone(), versions.user_agent()));
    let device = Arc::new(DeviceFlow::new(client));

    let gateway = Arc::new(Gateway::new(Arc::new(ReqwestUpstream::new()), auth, versions));

    let accounts: BTreeMap<String, Arc<gateway::Account>> = config
        .accounts
        .iter()
        .map(|(id, account)| {
            (
                id.clone(),
                Arc::new(gateway::Account::from_config(id.clone(), account.clone())),
            )
        })
        .collect();

    Ok(Arc::new(AppState {
        gateway,
        accounts,
        device,
    }))
}

/// Build the relay router over prepared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/messages", post(handlers::anthropic_messages))
        .route("/v1/messages/count_tokens", post(handlers::count_tokens))
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/responses", post(handlers::responses))
        .route("/v1/models", get(handlers::list_models))
        .route("/admin/github/device/start", post(admin::device_start))
        .route("/admin/github/device/poll", post(admin::device_poll))
        .route("/admin/github/device/cancel", post(admin::device_cancel))
        .with_state(state)
}
