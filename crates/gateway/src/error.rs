use thiserror::Error;

/// Gateway errors, classified the way the outer layers need them.
///
/// [`GatewayError::Failover`] is not a client-facing error: it tells the
/// outer collaborator "this account is in trouble, retry elsewhere". The
/// core itself never retries.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The client body could not be parsed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The account cannot authenticate against the upstream.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Transport-level failure reaching the upstream.
    #[error("upstream connection error: {0}")]
    Connection(String),

    /// Upstream status that should be retried on another account
    /// (401, 402, 403, 429 and 5xx).
    #[error("upstream returned {status}, failover advised")]
    Failover {
        /// The upstream HTTP status.
        status: u16,
        /// The raw upstream body, for the outer collaborator's logs.
        body: String,
    },

    /// Upstream status passed through to the client.
    #[error("upstream error ({status}): {message}")]
    Upstream {
        /// The upstream HTTP status.
        status: u16,
        /// Sanitized message.
        message: String,
    },

    /// Internal error. `Some` messages came from elsewhere and may be
    /// shown; `None` must not leak details.
    #[error("internal error")]
    Internal(Option<String>),
}

impl GatewayError {
    /// Classify an upstream HTTP status into a failover signal or a
    /// pass-through error.
    pub fn from_upstream_status(status: u16, body: String) -> Self {
        match status {
            401 | 402 | 403 | 429 => Self::Failover { status, body },
            s if s >= 500 => Self::Failover { status, body },
            _ => {
                let message = sanitize_upstream_body(&body);
                Self::Upstream { status, message }
            }
        }
    }

    /// The HTTP status to answer the client with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::AuthenticationFailed(_) => 401,
            Self::Connection(_) => 502,
            Self::Failover { status, .. } | Self::Upstream { status, .. } => *status,
            Self::Internal(_) => 500,
        }
    }

    /// The protocol-envelope error type for this error.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::AuthenticationFailed(_) => "authentication_error",
            Self::Connection(_) => "upstream_error",
            Self::Failover { status, .. } | Self::Upstream { status, .. } => match status {
                401 | 402 | 403 => "upstream_error",
                429 => "rate_limit_error",
                529 => "overloaded_error",
                400 => "invalid_request_error",
                500 | 502 | 503 | 504 => "upstream_error",
                s if *s >= 500 => "upstream_error",
                _ => "api_error",
            },
            Self::Internal(_) => "api_error",
        }
    }

    /// Message safe to expose to API consumers.
    pub fn client_message(&self) -> String {
        match self {
            Self::Failover { body, .. } => sanitize_upstream_body(body),
            Self::Internal(Some(message)) => message.clone(),
            Self::Internal(None) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Pull a displayable message out of an upstream error body, preferring
/// the structured fields over the raw text.
fn sanitize_upstream_body(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = value["error"]["message"].as_str() {
            return message.to_string();
        }
        if let Some(message) = value["message"].as_str() {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        "upstream error".to_string()
    } else {
        trimmed.to_string()
    }
}

impl From<github_auth::AuthError> for GatewayError {
    fn from(error: github_auth::AuthError) -> Self {
        match error {
            github_auth::AuthError::Github { status, message } => {
                // A broken token exchange means the account cannot serve;
                // surface it as an account error.
                Self::AuthenticationFailed(format!("token exchange failed ({status}): {message}"))
            }
            other => Self::AuthenticationFailed(other.to_string()),
        }
    }
}

impl From<translate::TranslateError> for GatewayError {
    fn from(error: translate::TranslateError) -> Self {
        Self::Internal(Some(error.to_string()))
    }
}
