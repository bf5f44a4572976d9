//! Inference endpoint handlers.
//!
//! Each handler parses the body as raw JSON, picks the serving account,
//! and hands everything to the gateway pipeline. Responses come back
//! either as a complete JSON body in the client's protocol or as an SSE
//! stream that is forwarded as-is.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use axum_serde::Sonic;
use gateway::{GatewayError, GatewayResponse, Protocol};
use serde_json::Value;

use crate::{
    error::{HandlerResult, ProtocolError},
    sse::sse_response,
    state::AppState,
    token_counter,
};

/// `POST /v1/messages`: Anthropic Messages, streaming or not.
pub(crate) async fn anthropic_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Sonic(body): Sonic<Value>,
) -> HandlerResult<Response> {
    dispatch(state, Protocol::AnthropicMessages, headers, body).await
}

/// `POST /v1/chat/completions`: OpenAI Chat Completions.
pub(crate) async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Sonic(body): Sonic<Value>,
) -> HandlerResult<Response> {
    dispatch(state, Protocol::ChatCompletions, headers, body).await
}

/// `POST /v1/responses`: OpenAI Responses.
pub(crate) async fn responses(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Sonic(body): Sonic<Value>,
) -> HandlerResult<Response> {
    dispatch(state, Protocol::Responses, headers, body).await
}

async fn dispatch(
    state: Arc<AppState>,
    protocol: Protocol,
    headers: HeaderMap,
    body: Value,
) -> HandlerResult<Response> {
    let account = state.pick_account(&headers, protocol)?;

    log::debug!(
        "dispatching {protocol:?} request for model {} via account {}",
        body["model"].as_str().unwrap_or("<missing>"),
        account.id()
    );

    let response = state
        .gateway
        .handle(&account, protocol, body, &headers)
        .await
        .map_err(|error| ProtocolError::new(protocol, error))?;

    Ok(match response {
        GatewayResponse::Json(value) => Json(value).into_response(),
        GatewayResponse::Stream(stream) => sse_response(stream),
    })
}

/// `POST /v1/messages/count_tokens`: local prompt-size estimate.
pub(crate) async fn count_tokens(
    Sonic(body): Sonic<Value>,
) -> HandlerResult<Json<protocol::anthropic::CountTokensResponse>> {
    let request: protocol::anthropic::MessagesRequest = serde_json::from_value(body)
        .map_err(|e| {
            ProtocolError::new(
                Protocol::AnthropicMessages,
                GatewayError::InvalidRequest(e.to_string()),
            )
        })?;

    let input_tokens = token_counter::count_input_tokens(&request);

    Ok(Json(protocol::anthropic::CountTokensResponse { input_tokens }))
}

/// `GET /v1/models`: upstream model list passthrough.
pub(crate) async fn list_models(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> HandlerResult<Json<Value>> {
    let account = state.pick_account(&headers, Protocol::ChatCompletions)?;

    let models = state
        .gateway
        .models(&account)
        .await
        .map_err(|error| ProtocolError::new(Protocol::ChatCompletions, error))?;

    Ok(Json(models))
}
