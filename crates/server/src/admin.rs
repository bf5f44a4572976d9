//! Device-code admin endpoints.
//!
//! These are implementation-local endpoints used by operators to attach
//! a GitHub identity to an account. Successful responses use the
//! `{"code":0,"data":...}` envelope; failures carry a non-zero code and
//! a message.

use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use github_auth::AuthError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::AppState;

/// Admin response envelope.
#[derive(Debug, Serialize)]
struct Envelope {
    code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl Envelope {
    fn ok(data: impl Serialize) -> Json<Envelope> {
        Json(Envelope {
            code: 0,
            data: serde_json::to_value(data).ok(),
            message: None,
        })
    }

    fn error(message: impl Into<String>) -> Json<Envelope> {
        Json(Envelope {
            code: 1,
            data: None,
            message: Some(message.into()),
        })
    }
}

fn auth_error(error: AuthError) -> Json<Envelope> {
    Envelope::error(error.to_string())
}

#[derive(Debug, Deserialize)]
pub(crate) struct StartRequest {
    account_id: String,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionRequest {
    account_id: String,
    session_id: String,
}

/// `POST /admin/github/device/start`
pub(crate) async fn device_start(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRequest>,
) -> impl IntoResponse {
    let Some(account) = state.account(&request.account_id) else {
        return Envelope::error(format!("unknown account '{}'", request.account_id));
    };

    let proxy = account.proxy().map(str::to_string);

    match state
        .device
        .start(account.id(), proxy, request.client_id, request.scope)
        .await
    {
        Ok(response) => Envelope::ok(response),
        Err(error) => auth_error(error),
    }
}

/// `POST /admin/github/device/poll`
pub(crate) async fn device_poll(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SessionRequest>,
) -> impl IntoResponse {
    match state.device.poll(&request.account_id, &request.session_id).await {
        Ok(outcome) => Envelope::ok(outcome),
        Err(error) => auth_error(error),
    }
}

/// `POST /admin/github/device/cancel`
pub(crate) async fn device_cancel(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SessionRequest>,
) -> impl IntoResponse {
    match state.device.cancel(&request.account_id, &request.session_id).await {
        Ok(()) => Envelope::ok(serde_json::json!({ "cancelled": true })),
        Err(error) => auth_error(error),
    }
}
