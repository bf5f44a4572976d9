//! Copilot token exchange with single-flight caching.
//!
//! A GitHub OAuth token is traded for a short-lived Copilot bearer token
//! at `copilot_internal/v2/token`. Tokens are cached per account, and
//! refreshes for the same account are serialized through a per-key lock:
//! whoever wins the lock performs the exchange and everyone waiting
//! re-reads the cache. A waiter that cannot get the lock quickly falls
//! back to an unlocked exchange; a thundering herd is preferable to
//! starving requests.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use mini_moka::sync::Cache;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::{AuthError, GithubAccount};

/// Exchange endpoint path on api.github.com.
const TOKEN_PATH: &str = "/copilot_internal/v2/token";
const DEFAULT_API_BASE: &str = "https://api.github.com";

const TOKEN_KEY_PREFIX: &str = "copilot:";

/// Tokens are refreshed this long before they actually expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Lower bound for the cache TTL, so a token that is about to expire is
/// not hammered on every request.
const MIN_TTL: Duration = Duration::from_secs(30);

/// TTL used when the upstream reports neither refresh_in nor expires_at.
const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Cap applied to tokens obtained on the degraded (unlocked) path.
const DEGRADED_TTL: Duration = Duration::from_secs(60);

/// How long a waiter blocks on the refresh lock before degrading.
const LOCK_WAIT: Duration = Duration::from_millis(200);

/// Upper bound on cached token lifetimes; individual entries carry their
/// own expiry and are checked on read.
const CACHE_TTL_CEILING: Duration = Duration::from_secs(3600);

#[derive(Clone)]
struct CachedToken {
    token: SecretString,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    token: String,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    refresh_in: Option<i64>,
}

/// Per-account Copilot token cache with single-flight refresh.
pub struct TokenExchanger {
    client: reqwest::Client,
    tokens: Cache<String, CachedToken>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    api_base: String,
    user_agent: String,
}

impl TokenExchanger {
    /// Build an exchanger over a shared HTTP client.
    pub fn new(client: reqwest::Client, user_agent: impl Into<String>) -> Self {
        Self {
            client,
            tokens: Cache::builder().time_to_live(CACHE_TTL_CEILING).build(),
            locks: DashMap::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            user_agent: user_agent.into(),
        }
    }

    /// Point the exchanger at a different API base URL. Used by tests.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// The Copilot bearer token for an account, from cache or freshly
    /// exchanged.
    pub async fn access_token_for(&self, account: &dyn GithubAccount) -> Result<SecretString, AuthError> {
        let github_token = account
            .credential("github_token")
            .or_else(|| account.credential("gh_token"))
            .ok_or_else(|| AuthError::MissingCredential(account.id().to_string()))?
            .clone();

        let key = format!("{TOKEN_KEY_PREFIX}{}", account.id());

        if let Some(token) = self.cached(&key) {
            return Ok(token);
        }

        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        match lock.try_lock() {
            Ok(_guard) => {
                // Another holder may have filled the cache while we raced
                // for the lock.
                if let Some(token) = self.cached(&key) {
                    return Ok(token);
                }

                let (token, ttl) = self.exchange(&github_token).await?;
                self.store(&key, &token, ttl);
                Ok(token)
            }
            Err(_) => {
                // Someone is already refreshing; give them a moment.
                match tokio::time::timeout(LOCK_WAIT, lock.lock()).await {
                    Ok(_guard) => {
                        if let Some(token) = self.cached(&key) {
                            return Ok(token);
                        }

                        let (token, ttl) = self.exchange(&github_token).await?;
                        self.store(&key, &token, ttl);
                        Ok(token)
                    }
                    Err(_) => {
                        // Degraded path: refresh without the lock rather
                        // than starve the request.
                        log::warn!("refresh lock wait timed out for {key}, exchanging unlocked");

                        let (token, ttl) = self.exchange(&github_token).await?;
                        self.store(&key, &token, ttl.min(DEGRADED_TTL));
                        Ok(token)
                    }
                }
            }
        }
    }

    fn cached(&self, key: &str) -> Option<SecretString> {
        let entry = self.tokens.get(&key.to_string())?;

        if entry.expires_at <= Instant::now() {
            self.tokens.invalidate(&key.to_string());
            return None;
        }

        Some(entry.token)
    }

    fn store(&self, key: &str, token: &SecretString, ttl: Duration) {
        self.tokens.insert(
            key.to_string(),
            CachedToken {
                token: token.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn exchange(&self, github_token: &SecretString) -> Result<(SecretString, Duration), AuthError> {
        let response = self
            .client
            .get(format!("{}{TOKEN_PATH}", self.api_base))
            .header("Authorization", format!("Token {}", github_token.expose_secret()))
            .header("User-Agent", &self.user_agent)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("Copilot token exchange failed ({status})");

            return Err(AuthError::Github {
                status: status.as_u16(),
                message: crate::error::error_message(&body),
            });
        }

        let exchange: ExchangeResponse = response.json().await?;

        let ttl = token_ttl(&exchange);
        Ok((SecretString::from(exchange.token), ttl))
    }
}

/// TTL for a freshly exchanged token: `refresh_in` minus a minute, else
/// time to `expires_at` minus a minute, else ten minutes; never below
/// thirty seconds.
fn token_ttl(exchange: &ExchangeResponse) -> Duration {
    let ttl = if let Some(refresh_in) = exchange.refresh_in {
        Duration::from_secs(refresh_in.max(0) as u64).saturating_sub(EXPIRY_MARGIN)
    } else if let Some(expires_at) = exchange.expires_at {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;

        Duration::from_secs((expires_at - now).max(0) as u64).saturating_sub(EXPIRY_MARGIN)
    } else {
        DEFAULT_TTL
    };

    ttl.max(MIN_TTL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::get};
    use secrecy::SecretString;
    use serde_json::json;
    use std::{
        collections::BTreeMap,
        sync::atomic::{AtomicUsize, Ordering},
    };
    use tokio::net::TcpListener;

    struct TestAccount {
        id: String,
        credentials: BTreeMap<String, SecretString>,
    }

    impl TestAccount {
        fn new(id: &str) -> Self {
            let mut credentials = BTreeMap::new();
            credentials.insert("github_token".to_string(), SecretString::from("gho_test".to_string()));
            Self {
                id: id.to_string(),
                credentials,
            }
        }
    }

    impl GithubAccount for TestAccount {
        fn id(&self) -> &str {
            &self.id
        }

        fn credential(&self, key: &str) -> Option<&SecretString> {
            self.credentials.get(key)
        }
    }

    async fn serve_exchange(hits: Arc<AtomicUsize>) -> String {
        let app = Router::new().route(
            "/copilot_internal/v2/token",
            get(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(json!({ "token": "cop_abc", "refresh_in": 1500 }))
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{address}")
    }

    #[tokio::test]
    async fn exchange_is_cached_per_account() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve_exchange(hits.clone()).await;

        let exchanger = TokenExchanger::new(reqwest::Client::new(), "relay/0.1").with_api_base(base);
        let account = TestAccount::new("acct-1");

        let first = exchanger.access_token_for(&account).await.unwrap();
        let second = exchanger.access_token_for(&account).await.unwrap();

        assert_eq!(first.expose_secret(), "cop_abc");
        assert_eq!(second.expose_secret(), "cop_abc");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // A different account exchanges independently.
        let other = TestAccount::new("acct-2");
        exchanger.access_token_for(&other).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_exchange() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = serve_exchange(hits.clone()).await;

        let exchanger =
            Arc::new(TokenExchanger::new(reqwest::Client::new(), "relay/0.1").with_api_base(base));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let exchanger = exchanger.clone();
            tasks.push(tokio::spawn(async move {
                let account = TestAccount::new("acct-1");
                exchanger.access_token_for(&account).await.unwrap()
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }

        // Everyone shares the winner's exchange, within the lock-wait
        // budget of the degraded path.
        assert!(hits.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn missing_credential_is_an_error() {
        let exchanger = TokenExchanger::new(reqwest::Client::new(), "relay/0.1");

        let account = TestAccount {
            id: "acct-1".to_string(),
            credentials: BTreeMap::new(),
        };

        let result = exchanger.access_token_for(&account).await;
        assert!(matches!(result, Err(AuthError::MissingCredential(_))));
    }

    #[tokio::test]
    async fn upstream_error_body_is_sanitized() {
        let app = Router::new().route(
            "/copilot_internal/v2/token",
            get(|| async {
                (
                    axum::http::StatusCode::UNAUTHORIZED,
                    Json(json!({ "error_details": { "message": "token revoked" } })),
                )
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let exchanger = TokenExchanger::new(reqwest::Client::new(), "relay/0.1")
            .with_api_base(format!("http://{address}"));
        let account = TestAccount::new("acct-1");

        let error = exchanger.access_token_for(&account).await.unwrap_err();
        let AuthError::Github { status, message } = error else {
            unreachable!("expected github error");
        };
        assert_eq!(status, 401);
        assert_eq!(message, "token revoked");
    }

    #[test]
    fn ttl_prefers_refresh_in_with_margin_and_floor() {
        let ttl = token_ttl(&ExchangeResponse {
            token: String::new(),
            expires_at: None,
            refresh_in: Some(1500),
        });
        assert_eq!(ttl, Duration::from_secs(1440));

        // Tiny refresh windows floor at thirty seconds.
        let ttl = token_ttl(&ExchangeResponse {
            token: String::new(),
            expires_at: None,
            refresh_in: Some(10),
        });
        assert_eq!(ttl, MIN_TTL);

        // Nothing reported: ten minutes.
        let ttl = token_ttl(&ExchangeResponse {
            token: String::new(),
            expires_at: None,
            refresh_in: None,
        });
        assert_eq!(ttl, DEFAULT_TTL);
    }
}
