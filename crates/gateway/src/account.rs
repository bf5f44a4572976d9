use std::collections::BTreeMap;

use config::{AccountConfig, AccountKind, Platform};
use secrecy::SecretString;

/// One upstream account, resolved from configuration.
///
/// The core consumes accounts through two calls: model mapping and
/// credential lookup. Everything else on the account (proxy, concurrency
/// cap) is forwarded opaquely to the HTTP client layer.
pub struct Account {
    id: String,
    platform: Platform,
    kind: AccountKind,
    credentials: BTreeMap<String, SecretString>,
    proxy: Option<String>,
    concurrency: Option<u32>,
    model_mappings: BTreeMap<String, String>,
}

impl Account {
    /// Build an account from its configuration entry.
    pub fn from_config(id: impl Into<String>, config: AccountConfig) -> Self {
        Self {
            id: id.into(),
            platform: config.platform,
            kind: config.kind,
            credentials: config.credentials,
            proxy: config.proxy,
            concurrency: config.concurrency,
            model_mappings: config.model_mappings,
        }
    }

    /// Stable account identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The upstream platform.
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// The credential kind.
    pub fn kind(&self) -> AccountKind {
        self.kind
    }

    /// The upstream model id for a requested model. Unmapped models pass
    /// through unchanged.
    pub fn mapped_model<'a>(&'a self, requested: &'a str) -> &'a str {
        self.model_mappings
            .get(requested)
            .map(String::as_str)
            .unwrap_or(requested)
    }

    /// Look up an opaque credential.
    pub fn credential(&self, key: &str) -> Option<&SecretString> {
        self.credentials.get(key)
    }

    /// Proxy URL for this account's upstream traffic.
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    /// Concurrency cap for this account.
    pub fn concurrency(&self) -> Option<u32> {
        self.concurrency
    }
}

impl github_auth::GithubAccount for Account {
    fn id(&self) -> &str {
        &self.id
    }

    fn credential(&self, key: &str) -> Option<&SecretString> {
        self.credentials.get(key)
    }

    fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("platform", &self.platform)
            .field("kind", &self.kind)
            .field("proxy", &self.proxy)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}
