//! The upstream-facing gateway pipeline.
//!
//! After the outer layer has parsed a request and picked an account, the
//! [`Gateway`] applies the account's model mapping, decides which
//! upstream protocol serves the model, translates the body when the
//! inbound protocol differs, composes the Copilot headers, dispatches
//! through the injected [`UpstreamClient`] and fans the response back
//! out, translating non-streaming bodies and bridging SSE streams
//! incrementally.

mod account;
mod error;
mod headers;
mod http_client;
mod pipeline;
mod route;
mod streaming;
mod usage;

pub use account::Account;
pub use error::GatewayError;
pub use headers::{VersionCache, anthropic_beta_header, detect_initiator, wants_vision};
pub use http_client::{ReqwestUpstream, UpstreamClient, UpstreamRequest, default_http_client_builder};
pub use pipeline::{Gateway, GatewayResponse};
pub use streaming::SseStream;
pub use route::{Protocol, apply_codex_transform, is_codex_model, uses_responses_api};
pub use usage::{UsageRecord, extract_usage};

/// Result alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
