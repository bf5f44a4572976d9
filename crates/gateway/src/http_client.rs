//! The upstream HTTP client seam.
//!
//! The pipeline never builds sockets itself; it hands a fully composed
//! request to an injected [`UpstreamClient`]. The default implementation
//! wraps `reqwest`, caches one client per proxy URL and applies the
//! account-level concurrency cap around the dispatch. Deployments that
//! need TLS fingerprinting swap in their own implementation.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use http::HeaderMap;
use reqwest::{Client, Method};
use tokio::sync::Semaphore;

use crate::GatewayError;

/// A composed upstream request.
#[derive(Debug)]
pub struct UpstreamRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Headers, already composed by the pipeline.
    pub headers: HeaderMap,
    /// Serialized body, if any.
    pub body: Option<Vec<u8>>,
    /// Account-level proxy URL.
    pub proxy: Option<String>,
    /// Account id, for concurrency accounting and logs.
    pub account_id: String,
    /// Account-level concurrency cap.
    pub concurrency: Option<u32>,
}

/// Opaque dispatch interface the pipeline calls.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Send the request and return the raw response, body unread.
    async fn execute(&self, request: UpstreamRequest) -> crate::Result<reqwest::Response>;
}

/// Shared builder defaults for upstream connections. Connection pooling
/// keeps the idle timeout short so DNS changes are picked up.
pub fn default_http_client_builder() -> reqwest::ClientBuilder {
    let mut headers = HeaderMap::new();
    headers.insert(http::header::CONNECTION, http::HeaderValue::from_static("keep-alive"));

    Client::builder()
        .timeout(Duration::from_secs(600))
        .connect_timeout(Duration::from_secs(30))
        .pool_idle_timeout(Some(Duration::from_secs(5)))
        .tcp_nodelay(true)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .default_headers(headers)
}

/// Default `reqwest`-backed upstream client.
pub struct ReqwestUpstream {
    base: Client,
    /// One client per proxy URL, built lazily.
    proxied: DashMap<String, Client>,
    /// One semaphore per account with a concurrency cap.
    limits: DashMap<String, Arc<Semaphore>>,
}

impl Default for ReqwestUpstream {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqwestUpstream {
    /// Build the default client.
    pub fn new() -> Self {
        let base = default_http_client_builder()
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base,
            proxied: DashMap::new(),
            limits: DashMap::new(),
        }
    }

    fn client_for(&self, proxy: Option<&str>) -> Client {
        let Some(proxy) = proxy else {
            return self.base.clone();
        };

        if let Some(client) = self.proxied.get(proxy) {
            return client.clone();
        }

        let client = reqwest::Proxy::all(proxy)
            .and_then(|p| default_http_client_builder().proxy(p).build())
            .unwrap_or_else(|e| {
                log::warn!("failed to build proxied client for {proxy}: {e}, using direct connection");
                self.base.clone()
            });

        self.proxied.insert(proxy.to_string(), client.clone());
        client
    }

    fn semaphore(&self, account_id: &str, cap: u32) -> Arc<Semaphore> {
        self.limits
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(cap as usize)))
            .clone()
    }
}

#[async_trait]
impl UpstreamClient for ReqwestUpstream {
    async fn execute(&self, request: UpstreamRequest) -> crate::Result<reqwest::Response> {
        let _permit = match request.concurrency {
            Some(cap) if cap > 0 => {
                let semaphore = self.semaphore(&request.account_id, cap);
                Some(semaphore.acquire_owned().await.map_err(|_| {
                    GatewayError::Internal(Some("concurrency limiter closed".to_string()))
                })?)
            }
            _ => None,
        };

        let client = self.client_for(request.proxy.as_deref());

        let mut builder = client
            .request(request.method, &request.url)
            .headers(request.headers);

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        builder
            .send()
            .await
            .map_err(|e| GatewayError::Connection(format!("failed to reach upstream: {e}")))
    }
}
