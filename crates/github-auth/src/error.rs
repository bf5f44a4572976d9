use thiserror::Error;

/// Errors from the device flow and token exchange.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The account carries no GitHub token credential.
    #[error("account '{0}' has no github_token credential")]
    MissingCredential(String),

    /// The referenced device session does not exist or expired.
    #[error("device session not found or expired")]
    SessionNotFound,

    /// The session belongs to a different account.
    #[error("device session does not belong to this account")]
    SessionAccountMismatch,

    /// Network-level failure talking to GitHub.
    #[error("GitHub request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// GitHub answered with a non-success status.
    #[error("GitHub error ({status}): {message}")]
    Github {
        /// HTTP status code.
        status: u16,
        /// Sanitized message extracted from the body.
        message: String,
    },
}

/// Extract a human-readable message from a GitHub error body.
///
/// Prefers `error_details.message`, then `message`, then the raw body.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = value["error_details"]["message"].as_str() {
            return message.to_string();
        }
        if let Some(message) = value["message"].as_str() {
            return message.to_string();
        }
    }

    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_error_details() {
        let body = r#"{"error_details":{"message":"quota exhausted"},"message":"outer"}"#;
        assert_eq!(error_message(body), "quota exhausted");

        let body = r#"{"message":"bad credentials"}"#;
        assert_eq!(error_message(body), "bad credentials");

        assert_eq!(error_message("plain text"), "plain text");
    }
}
