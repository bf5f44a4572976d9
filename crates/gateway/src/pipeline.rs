//! The per-request gateway pipeline.

use std::{sync::Arc, time::Instant};

use github_auth::token::TokenExchanger;
use http::{HeaderMap, HeaderValue, Method, header};
use protocol::{anthropic, chat, responses};
use secrecy::ExposeSecret;
use serde_json::Value;

use crate::{
    Account, GatewayError, Protocol, UpstreamClient, UpstreamRequest, VersionCache,
    headers::{anthropic_beta_header, detect_initiator, wants_vision},
    route::{apply_codex_transform, is_codex_model, upstream_path, upstream_protocol},
    streaming::{
        ResponsesBridgeMode, SseStream, StreamTelemetry, anthropic_passthrough_sse,
        chat_passthrough_sse, chat_to_anthropic_sse, responses_sse,
    },
    usage::extract_usage,
};

const DEFAULT_UPSTREAM_BASE: &str = "https://api.githubcopilot.com";

/// What the pipeline hands back to the HTTP layer.
pub enum GatewayResponse {
    /// A complete JSON body, already in the client's protocol.
    Json(Value),
    /// An SSE byte stream, already framed for the client's protocol.
    Stream(SseStream),
}

impl std::fmt::Debug for GatewayResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayResponse::Json(value) => f.debug_tuple("Json").field(value).finish(),
            GatewayResponse::Stream(_) => f.debug_tuple("Stream").finish(),
        }
    }
}

/// The upstream-facing pipeline. One instance serves the whole process;
/// per-request state lives on the stack of [`Gateway::handle`].
pub struct Gateway {
    client: Arc<dyn UpstreamClient>,
    auth: Arc<TokenExchanger>,
    versions: Arc<VersionCache>,
    upstream_base: String,
}

impl Gateway {
    /// Build a pipeline over an injected upstream client and token
    /// exchanger.
    pub fn new(client: Arc<dyn UpstreamClient>, auth: Arc<TokenExchanger>, versions: Arc<VersionCache>) -> Self {
        Self {
            client,
            auth,
            versions,
            upstream_base: DEFAULT_UPSTREAM_BASE.to_string(),
        }
    }

    /// Point the pipeline at a different upstream base URL. Used by tests.
    pub fn with_upstream_base(mut self, base: impl Into<String>) -> Self {
        self.upstream_base = base.into();
        self
    }

    /// Run one inference request through the pipeline.
    pub async fn handle(
        &self,
        account: &Account,
        inbound: Protocol,
        mut body: Value,
        client_headers: &HeaderMap,
    ) -> crate::Result<GatewayResponse> {
        if !body.is_object() {
            return Err(GatewayError::InvalidRequest("request body must be a JSON object".to_string()));
        }

        let requested_model = body["model"]
            .as_str()
            .map(str::to_string)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| GatewayError::InvalidRequest("missing model".to_string()))?;

        // Model mapping is a patch on the raw body so unknown extension
        // fields survive pass-through untouched.
        let model = account.mapped_model(&requested_model).to_string();
        if model != requested_model {
            body["model"] = Value::String(model.clone());
        }

        let upstream = upstream_protocol(inbound, &model);

        // Derived from the inbound body before any translation rewrites
        // its shape.
        let initiator = detect_initiator(inbound, &body);
        let vision = wants_vision(&body);
        let client_streams = body["stream"].as_bool().unwrap_or(false);
        let requests_thinking = body["thinking"]["budget_tokens"].as_u64().unwrap_or(0) > 0;

        let mut body = translate_request(inbound, upstream, body)?;

        if upstream == Protocol::Responses && is_codex_model(&model) {
            if !client_streams {
                return Err(GatewayError::InvalidRequest(
                    "codex models are stream-only; set stream=true".to_string(),
                ));
            }

            let instructions = account
                .credential("codex_instructions")
                .map(|s| s.expose_secret().to_string());
            apply_codex_transform(&mut body, instructions.as_deref());
        }

        let headers = self
            .compose_headers(account, upstream, initiator, vision, requests_thinking, client_headers)
            .await?;

        let url = format!("{}{}", self.upstream_base, upstream_path(upstream));
        let started = Instant::now();

        let payload = sonic_rs::to_vec(&body).map_err(|e| {
            log::error!("failed to serialize upstream body: {e}");
            GatewayError::Internal(None)
        })?;

        let response = self
            .client
            .execute(UpstreamRequest {
                method: Method::POST,
                url,
                headers,
                body: Some(payload),
                proxy: account.proxy().map(str::to_string),
                account_id: account.id().to_string(),
                concurrency: account.concurrency(),
            })
            .await?;

        let status = response.status();
        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            log::warn!(
                "upstream error for account {}: status={status} request_id={request_id}",
                account.id()
            );
            return Err(GatewayError::from_upstream_status(status.as_u16(), body));
        }

        if client_streams {
            let telemetry = StreamTelemetry::new(account.id(), &model, &request_id);

            let stream = match (upstream, inbound) {
                (Protocol::ChatCompletions, Protocol::AnthropicMessages) => {
                    chat_to_anthropic_sse(response, telemetry)
                }
                (Protocol::ChatCompletions, _) => chat_passthrough_sse(response, telemetry),
                (Protocol::Responses, Protocol::Responses) => {
                    responses_sse(response, ResponsesBridgeMode::Passthrough, telemetry)
                }
                (Protocol::Responses, Protocol::ChatCompletions) => {
                    responses_sse(response, ResponsesBridgeMode::ToChat, telemetry)
                }
                (Protocol::Responses, Protocol::AnthropicMessages) => {
                    responses_sse(response, ResponsesBridgeMode::ToAnthropic, telemetry)
                }
                (Protocol::AnthropicMessages, _) => anthropic_passthrough_sse(response, telemetry),
            };

            return Ok(GatewayResponse::Stream(stream));
        }

        let text = response.text().await.map_err(|e| {
            GatewayError::Connection(format!("failed to read upstream response: {e}"))
        })?;

        let upstream_body: Value = sonic_rs::from_str(&text).map_err(|e| {
            log::error!("failed to parse upstream response: {e}");
            log::error!("raw response that failed to parse: {text}");
            GatewayError::Internal(Some("upstream returned malformed JSON".to_string()))
        })?;

        let usage = extract_usage(&upstream_body);

        log::info!(
            "request completed: account={} model={model} request_id={request_id} duration_ms={} input_tokens={:?} output_tokens={:?}",
            account.id(),
            started.elapsed().as_millis(),
            usage.map(|u| u.input_tokens),
            usage.map(|u| u.output_tokens),
        );

        let translated = translate_response(inbound, upstream, upstream_body)?;

        Ok(GatewayResponse::Json(translated))
    }

    /// Pass the upstream model list through.
    pub async fn models(&self, account: &Account) -> crate::Result<Value> {
        let mut headers = HeaderMap::new();
        self.insert_auth_headers(account, &mut headers).await?;

        let response = self
            .client
            .execute(UpstreamRequest {
                method: Method::GET,
                url: format!("{}/models", self.upstream_base),
                headers,
                body: None,
                proxy: account.proxy().map(str::to_string),
                account_id: account.id().to_string(),
                concurrency: account.concurrency(),
            })
            .await?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_upstream_status(status.as_u16(), body));
        }

        response.json().await.map_err(|e| {
            log::error!("failed to parse upstream model list: {e}");
            GatewayError::Internal(Some("upstream returned malformed JSON".to_string()))
        })
    }

    async fn compose_headers(
        &self,
        account: &Account,
        upstream: Protocol,
        initiator: &str,
        vision: bool,
        requests_thinking: bool,
        client_headers: &HeaderMap,
    ) -> crate::Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        self.insert_auth_headers(account, &mut headers).await?;

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("Openai-Intent", HeaderValue::from_static("conversation-edits"));
        headers.insert(
            "X-Initiator",
            HeaderValue::from_str(initiator).unwrap_or(HeaderValue::from_static("agent")),
        );

        if vision {
            headers.insert("Copilot-Vision-Request", HeaderValue::from_static("true"));
        }

        if upstream == Protocol::AnthropicMessages {
            let client_beta = client_headers
                .get("anthropic-beta")
                .and_then(|v| v.to_str().ok());

            if let Some(beta) = anthropic_beta_header(client_beta, requests_thinking)
                && let Ok(value) = HeaderValue::from_str(&beta)
            {
                headers.insert("Anthropic-Beta", value);
            }

            if let Some(version) = client_headers.get("anthropic-version") {
                headers.insert("Anthropic-Version", version.clone());
            }
        }

        Ok(headers)
    }

    async fn insert_auth_headers(&self, account: &Account, headers: &mut HeaderMap) -> crate::Result<()> {
        let token = self.auth.access_token_for(account).await?;

        let bearer = format!("Bearer {}", token.expose_secret());
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&bearer)
                .map_err(|_| GatewayError::Internal(Some("invalid bearer token".to_string())))?,
        );

        let user_agent = self.versions.user_agent();
        if let Ok(value) = HeaderValue::from_str(&user_agent) {
            headers.insert(header::USER_AGENT, value);
        }

        Ok(())
    }
}

/// Translate the request body from the inbound protocol to the upstream
/// one. Same-protocol pairs pass through untouched.
fn translate_request(inbound: Protocol, upstream: Protocol, body: Value) -> crate::Result<Value> {
    let translated = match (inbound, upstream) {
        (Protocol::AnthropicMessages, Protocol::ChatCompletions) => {
            let request: anthropic::MessagesRequest = parse_body(body)?;
            to_value(translate::request::anthropic_to_chat(request))?
        }
        (Protocol::AnthropicMessages, Protocol::Responses) => {
            let request: anthropic::MessagesRequest = parse_body(body)?;
            let chat = translate::request::anthropic_to_chat(request);
            to_value(translate::request::chat_to_responses(chat))?
        }
        (Protocol::ChatCompletions, Protocol::Responses) => {
            let request: chat::ChatCompletionRequest = parse_body(body)?;
            to_value(translate::request::chat_to_responses(request))?
        }
        _ => body,
    };

    Ok(translated)
}

/// Translate a non-streaming upstream response body back to the client's
/// protocol.
fn translate_response(inbound: Protocol, upstream: Protocol, body: Value) -> crate::Result<Value> {
    let translated = match (upstream, inbound) {
        (Protocol::ChatCompletions, Protocol::AnthropicMessages) => {
            let response: chat::ChatCompletionResponse = parse_upstream(body)?;
            to_value(translate::response::chat_to_anthropic(response))?
        }
        (Protocol::Responses, Protocol::ChatCompletions) => {
            let response: responses::ResponsesResponse = parse_upstream(body)?;
            to_value(translate::response::responses_to_chat(response))?
        }
        (Protocol::Responses, Protocol::AnthropicMessages) => {
            let response: responses::ResponsesResponse = parse_upstream(body)?;
            let chat = translate::response::responses_to_chat(response);
            to_value(translate::response::chat_to_anthropic(chat))?
        }
        _ => body,
    };

    Ok(translated)
}

fn parse_body<T: serde::de::DeserializeOwned>(body: Value) -> crate::Result<T> {
    serde_json::from_value(body).map_err(|e| GatewayError::InvalidRequest(e.to_string()))
}

fn parse_upstream<T: serde::de::DeserializeOwned>(body: Value) -> crate::Result<T> {
    serde_json::from_value(body).map_err(|e| {
        log::error!("failed to parse upstream response: {e}");
        GatewayError::Internal(Some("upstream response did not match protocol".to_string()))
    })
}

fn to_value<T: serde::Serialize>(value: T) -> crate::Result<Value> {
    serde_json::to_value(value).map_err(|e| {
        log::error!("failed to re-encode translated body: {e}");
        GatewayError::Internal(None)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::State,
        http::HeaderMap as AxumHeaderMap,
        routing::{get, post},
    };
    use config::{AccountConfig, AccountKind, Platform};
    use secrecy::SecretString;
    use serde_json::json;
    use std::{
        collections::BTreeMap,
        sync::{Arc, Mutex},
    };
    use tokio::net::TcpListener;

    use crate::ReqwestUpstream;

    #[derive(Clone, Default)]
    struct Captured {
        requests: Arc<Mutex<Vec<(AxumHeaderMap, Value)>>>,
    }

    async fn handle_chat(
        State(captured): State<Captured>,
        headers: AxumHeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        captured.requests.lock().unwrap().push((headers, body));

        Json(json!({
            "id": "chatcmpl-42",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "Hello!" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12 }
        }))
    }

    async fn test_gateway(app: Router) -> Gateway {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let auth = Arc::new(
            TokenExchanger::new(reqwest::Client::new(), "relay/0.1")
                .with_api_base(format!("http://{address}")),
        );

        Gateway::new(Arc::new(ReqwestUpstream::new()), auth, Arc::new(VersionCache::new()))
            .with_upstream_base(format!("http://{address}"))
    }

    fn test_account() -> Account {
        let mut credentials = BTreeMap::new();
        credentials.insert("github_token".to_string(), SecretString::from("gho_test".to_string()));

        let mut model_mappings = BTreeMap::new();
        model_mappings.insert("my-gpt".to_string(), "gpt-4o".to_string());

        Account::from_config(
            "acct-1",
            AccountConfig {
                platform: Platform::Copilot,
                kind: AccountKind::Oauth,
                credentials,
                proxy: None,
                concurrency: None,
                model_mappings,
            },
        )
    }

    fn exchange_route() -> Router<Captured> {
        Router::new().route(
            "/copilot_internal/v2/token",
            get(|| async { Json(json!({ "token": "cop_abc", "refresh_in": 1500 })) }),
        )
    }

    #[tokio::test]
    async fn anthropic_request_is_translated_and_answered_in_kind() {
        let captured = Captured::default();
        let app = exchange_route()
            .route("/chat/completions", post(handle_chat))
            .with_state(captured.clone());

        let gateway = test_gateway(app).await;
        let account = test_account();

        let body = json!({
            "model": "my-gpt",
            "max_tokens": 256,
            "messages": [{ "role": "user", "content": "Hello" }]
        });

        let response = gateway
            .handle(&account, Protocol::AnthropicMessages, body, &HeaderMap::new())
            .await
            .unwrap();

        let GatewayResponse::Json(value) = response else {
            unreachable!("expected a JSON response");
        };

        // The client gets Anthropic shape back.
        assert_eq!(value["type"], "message");
        assert_eq!(value["content"][0]["text"], "Hello!");
        assert_eq!(value["stop_reason"], "end_turn");
        assert_eq!(value["usage"]["input_tokens"], 9);

        // The upstream saw the mapped model, the translated shape and the
        // composed headers.
        let requests = captured.requests.lock().unwrap();
        let (headers, sent) = &requests[0];

        assert_eq!(sent["model"], "gpt-4o");
        assert_eq!(sent["messages"][0]["role"], "user");
        assert_eq!(sent["max_tokens"], 256);

        assert_eq!(headers.get("authorization").unwrap(), "Bearer cop_abc");
        assert_eq!(headers.get("openai-intent").unwrap(), "conversation-edits");
        assert_eq!(headers.get("x-initiator").unwrap(), "user");
        assert_eq!(headers.get("user-agent").unwrap(), "opencode/1.2.13");
        assert!(headers.get("copilot-vision-request").is_none());
    }

    #[tokio::test]
    async fn upstream_429_becomes_a_failover_signal() {
        let captured = Captured::default();
        let app = exchange_route()
            .route(
                "/chat/completions",
                post(|| async {
                    (
                        axum::http::StatusCode::TOO_MANY_REQUESTS,
                        Json(json!({ "error": { "message": "slow down" } })),
                    )
                }),
            )
            .with_state(captured);

        let gateway = test_gateway(app).await;
        let account = test_account();

        let body = json!({
            "model": "gpt-4o",
            "messages": [{ "role": "user", "content": "hi" }]
        });

        let error = gateway
            .handle(&account, Protocol::ChatCompletions, body, &HeaderMap::new())
            .await
            .unwrap_err();

        assert!(matches!(error, GatewayError::Failover { status: 429, .. }));
        assert_eq!(error.error_type(), "rate_limit_error");
    }

    #[tokio::test]
    async fn missing_model_is_invalid_request() {
        let captured = Captured::default();
        let gateway = test_gateway(exchange_route().with_state(captured)).await;
        let account = test_account();

        let error = gateway
            .handle(
                &account,
                Protocol::ChatCompletions,
                json!({ "messages": [] }),
                &HeaderMap::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(error, GatewayError::InvalidRequest(_)));
    }
}
