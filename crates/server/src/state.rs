use std::{collections::BTreeMap, sync::Arc};

use gateway::{Account, Gateway};
use github_auth::device::DeviceFlow;

use crate::error::ProtocolError;
use gateway::Protocol;

/// Header a client may set to pick a specific upstream account.
const ACCOUNT_HEADER: &str = "x-relay-account";

/// Process-wide state shared by every handler.
pub struct AppState {
    /// The upstream pipeline.
    pub gateway: Arc<Gateway>,
    /// Configured accounts by id.
    pub accounts: BTreeMap<String, Arc<Account>>,
    /// The device-code coordinator.
    pub device: Arc<DeviceFlow>,
}

impl AppState {
    /// Pick the account serving this request: the one named by the
    /// account header, or the first configured one.
    pub(crate) fn pick_account(
        &self,
        headers: &http::HeaderMap,
        protocol: Protocol,
    ) -> Result<Arc<Account>, ProtocolError> {
        if let Some(requested) = headers.get(ACCOUNT_HEADER).and_then(|v| v.to_str().ok()) {
            return self.accounts.get(requested).cloned().ok_or_else(|| {
                ProtocolError::new(
                    protocol,
                    gateway::GatewayError::InvalidRequest(format!("unknown account '{requested}'")),
                )
            });
        }

        self.accounts.values().next().cloned().ok_or_else(|| {
            ProtocolError::new(
                protocol,
                gateway::GatewayError::Internal(Some("no accounts configured".to_string())),
            )
        })
    }

    /// Look up an account by id for the admin endpoints.
    pub(crate) fn account(&self, id: &str) -> Option<Arc<Account>> {
        self.accounts.get(id).cloned()
    }
}
