//! GitHub OAuth device-code flow.
//!
//! The flow is split across three admin calls: `start` creates a device
//! code and a server-side session, the client shows the user code and
//! polls `poll` until GitHub reports success or a terminal error, and
//! `cancel` discards an abandoned session. Sessions live in a TTL store
//! keyed by a freshly generated 16-byte hex id.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use mini_moka::sync::Cache;
use serde::{Deserialize, Serialize};

use crate::AuthError;

/// VS Code's OAuth client id, the well-known one Copilot tooling uses.
pub const GITHUB_CLIENT_ID: &str = "Iv1.b507a08c87ecfe98";

/// Default OAuth scope.
pub const DEFAULT_SCOPE: &str = "read:user";

const DEVICE_CODE_PATH: &str = "/login/device/code";
const ACCESS_TOKEN_PATH: &str = "/login/oauth/access_token";
const DEFAULT_GITHUB_BASE: &str = "https://github.com";

/// GitHub's default when the device-code response omits `expires_in`.
const DEFAULT_EXPIRES_IN: u64 = 900;

/// Polling interval fallback.
const DEFAULT_INTERVAL: u64 = 5;

/// Extra interval added on `slow_down` when GitHub does not send one.
const SLOW_DOWN_STEP: u64 = 5;

const SESSION_KEY_PREFIX: &str = "github:device_session:";

/// One in-flight device authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSession {
    /// 16-byte hex session id, the store key.
    pub session_id: String,
    /// Account this authorization is for.
    pub account_id: String,
    /// Proxy for the polling calls, inherited from the account.
    pub proxy_url: Option<String>,
    /// OAuth client id used at start.
    pub client_id: String,
    /// OAuth scope used at start.
    pub scope: String,
    /// The device code GitHub issued.
    pub device_code: String,
    /// Current polling interval in seconds.
    pub interval: u64,
    /// Unix timestamp after which the session is dead.
    pub expires_at: u64,
    /// Unix timestamp of creation.
    pub created_at: u64,
}

impl DeviceSession {
    fn is_expired(&self) -> bool {
        self.expires_at <= now_unix()
    }
}

/// TTL store for device sessions. The cache-wide TTL is an upper bound;
/// each read also checks the session's own `expires_at` so a session
/// never outlives its device code.
pub struct SessionStore {
    sessions: Cache<String, DeviceSession>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// A fresh store.
    pub fn new() -> Self {
        Self {
            sessions: Cache::builder()
                .time_to_live(Duration::from_secs(DEFAULT_EXPIRES_IN))
                .build(),
        }
    }

    fn key(session_id: &str) -> String {
        format!("{SESSION_KEY_PREFIX}{session_id}")
    }

    fn insert(&self, session: DeviceSession) {
        self.sessions.insert(Self::key(&session.session_id), session);
    }

    fn get(&self, session_id: &str) -> Option<DeviceSession> {
        let key = Self::key(session_id);
        let session = self.sessions.get(&key)?;

        if session.is_expired() {
            self.sessions.invalidate(&key);
            return None;
        }

        Some(session)
    }

    fn remove(&self, session_id: &str) {
        self.sessions.invalidate(&Self::key(session_id));
    }
}

/// Result of a `start` call, shown to the user.
#[derive(Debug, Clone, Serialize)]
pub struct StartResponse {
    /// Session id for subsequent poll/cancel calls.
    pub session_id: String,
    /// The code the user types at the verification URL.
    pub user_code: String,
    /// Where the user enters the code.
    pub verification_uri: String,
    /// Verification URL with the code pre-filled.
    pub verification_uri_complete: String,
    /// Seconds until the device code expires.
    pub expires_in: u64,
    /// Seconds the client should wait between polls.
    pub interval: u64,
}

/// Result of one `poll` call.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PollOutcome {
    /// The user authorized; the session is gone after this.
    Success {
        /// The GitHub OAuth access token.
        access_token: String,
    },

    /// Not authorized yet; poll again after `interval` seconds.
    Pending {
        /// Current polling interval.
        interval: u64,
        /// Set to "slow_down" when GitHub asked to back off.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Terminal failure.
    Error {
        /// GitHub's error code when it identifies one.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    #[serde(default)]
    verification_uri_complete: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    interval: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    interval: Option<u64>,
}

/// The device-code coordinator.
pub struct DeviceFlow {
    client: reqwest::Client,
    sessions: SessionStore,
    github_base: String,
}

impl DeviceFlow {
    /// Build a flow over a shared HTTP client.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            sessions: SessionStore::new(),
            github_base: DEFAULT_GITHUB_BASE.to_string(),
        }
    }

    /// Point the flow at a different GitHub base URL. Used by tests.
    pub fn with_github_base(mut self, base: impl Into<String>) -> Self {
        self.github_base = base.into();
        self
    }

    /// Begin a device authorization for an account.
    pub async fn start(
        &self,
        account_id: &str,
        proxy_url: Option<String>,
        client_id: Option<String>,
        scope: Option<String>,
    ) -> Result<StartResponse, AuthError> {
        let client_id = client_id.unwrap_or_else(|| GITHUB_CLIENT_ID.to_string());
        let scope = scope.unwrap_or_else(|| DEFAULT_SCOPE.to_string());

        let response = self
            .client
            .post(format!("{}{DEVICE_CODE_PATH}", self.github_base))
            .header("Accept", "application/json")
            .form(&[("client_id", client_id.as_str()), ("scope", scope.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Github {
                status: status.as_u16(),
                message: crate::error::error_message(&body),
            });
        }

        let device: DeviceCodeResponse = response.json().await?;

        let expires_in = device.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        let interval = device.interval.unwrap_or(DEFAULT_INTERVAL);
        let now = now_unix();

        let session = DeviceSession {
            session_id: uuid::Uuid::new_v4().simple().to_string(),
            account_id: account_id.to_string(),
            proxy_url,
            client_id,
            scope,
            device_code: device.device_code,
            interval,
            expires_at: now + expires_in,
            created_at: now,
        };

        let response = StartResponse {
            session_id: session.session_id.clone(),
            user_code: device.user_code,
            verification_uri_complete: device
                .verification_uri_complete
                .unwrap_or_else(|| device.verification_uri.clone()),
            verification_uri: device.verification_uri,
            expires_in,
            interval,
        };

        log::info!(
            "device flow started for account {account_id}, session {}",
            session.session_id
        );
        self.sessions.insert(session);

        Ok(response)
    }

    /// Poll an authorization once.
    pub async fn poll(&self, account_id: &str, session_id: &str) -> Result<PollOutcome, AuthError> {
        let mut session = self
            .sessions
            .get(session_id)
            .ok_or(AuthError::SessionNotFound)?;

        if session.account_id != account_id {
            return Err(AuthError::SessionAccountMismatch);
        }

        let response = self
            .client
            .post(format!("{}{ACCESS_TOKEN_PATH}", self.github_base))
            .header("Accept", "application/json")
            .form(&[
                ("client_id", session.client_id.as_str()),
                ("device_code", session.device_code.as_str()),
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
            ])
            .send()
            .await?;

        let token: AccessTokenResponse = response.json().await?;

        match token.error.as_deref() {
            None | Some("") => match token.access_token {
                Some(access_token) => {
                    self.sessions.remove(session_id);
                    log::info!("device flow completed for account {account_id}");
                    Ok(PollOutcome::Success { access_token })
                }
                None => Ok(PollOutcome::Error { error: None }),
            },

            Some("authorization_pending") => Ok(PollOutcome::Pending {
                interval: session.interval,
                error: None,
            }),

            Some("slow_down") => {
                let interval = token.interval.unwrap_or(session.interval + SLOW_DOWN_STEP);
                session.interval = interval;
                self.sessions.insert(session);

                Ok(PollOutcome::Pending {
                    interval,
                    error: Some("slow_down".to_string()),
                })
            }

            Some(code @ ("expired_token" | "access_denied")) => {
                self.sessions.remove(session_id);
                Ok(PollOutcome::Error {
                    error: Some(code.to_string()),
                })
            }

            Some(other) => {
                log::warn!("unexpected device flow error code: {other}");
                Ok(PollOutcome::Error { error: None })
            }
        }
    }

    /// Discard an abandoned authorization.
    pub async fn cancel(&self, account_id: &str, session_id: &str) -> Result<(), AuthError> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or(AuthError::SessionNotFound)?;

        if session.account_id != account_id {
            return Err(AuthError::SessionAccountMismatch);
        }

        self.sessions.remove(session_id);
        Ok(())
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
