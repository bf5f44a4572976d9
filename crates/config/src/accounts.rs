use std::collections::BTreeMap;

use secrecy::SecretString;
use serde::Deserialize;

/// Upstream platform an account belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// GitHub Copilot endpoints.
    Copilot,
}

/// How the account authenticates against its platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountKind {
    /// GitHub OAuth token obtained through the device flow.
    Oauth,
    /// Static API key.
    Apikey,
    /// Setup token pasted by an operator.
    SetupToken,
    /// Pass-through upstream credentials.
    Upstream,
}

/// One upstream account.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    /// The upstream platform.
    pub platform: Platform,

    /// Credential kind.
    pub kind: AccountKind,

    /// Opaque credentials, e.g. `github_token`. Values never appear in
    /// Debug output.
    #[serde(default)]
    pub credentials: BTreeMap<String, SecretString>,

    /// Optional proxy URL for this account's upstream traffic.
    #[serde(default)]
    pub proxy: Option<String>,

    /// Concurrency cap enforced by the HTTP client layer.
    #[serde(default)]
    pub concurrency: Option<u32>,

    /// Requested model → upstream model id.
    #[serde(default)]
    pub model_mappings: BTreeMap<String, String>,
}
