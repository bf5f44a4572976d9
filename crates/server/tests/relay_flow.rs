//! End-to-end tests: a real relay router in front of a mock Copilot.

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    Json, Router,
    body::Body,
    http::{HeaderValue, header},
    response::Response,
    routing::{get, post},
};
use config::{AccountConfig, AccountKind, Platform};
use gateway::{Gateway, ReqwestUpstream, VersionCache};
use github_auth::{device::DeviceFlow, token::TokenExchanger};
use indoc::indoc;
use secrecy::SecretString;
use serde_json::{Value, json};
use server::AppState;
use tokio::net::TcpListener;

async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{address}")
}

fn sse_response(body: &'static str) -> Response {
    let mut response = Response::new(Body::from(body));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    response
}

/// Mock Copilot: token exchange, a streaming chat endpoint and a model
/// list.
fn mock_upstream() -> Router {
    Router::new()
        .route(
            "/copilot_internal/v2/token",
            get(|| async { Json(json!({ "token": "cop_abc", "refresh_in": 1500 })) }),
        )
        .route(
            "/chat/completions",
            post(|| async {
                sse_response(indoc! {r#"
                    data: {"id":"chatcmpl-1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"role":"assistant","content":"Hi"},"finish_reason":null}]}

                    data: {"id":"chatcmpl-1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":4,"completion_tokens":1,"total_tokens":5}}

                    data: [DONE]

                "#})
            }),
        )
        .route(
            "/models",
            get(|| async {
                Json(json!({
                    "object": "list",
                    "data": [{ "id": "gpt-4o", "object": "model" }]
                }))
            }),
        )
}

async fn relay_over(upstream_base: String) -> String {
    let client = reqwest::Client::new();

    let auth = Arc::new(
        TokenExchanger::new(client.clone(), "relay/test").with_api_base(upstream_base.clone()),
    );
    let device = Arc::new(DeviceFlow::new(client).with_github_base(upstream_base.clone()));

    let gateway = Arc::new(
        Gateway::new(Arc::new(ReqwestUpstream::new()), auth, Arc::new(VersionCache::new()))
            .with_upstream_base(upstream_base),
    );

    let mut credentials = BTreeMap::new();
    credentials.insert("github_token".to_string(), SecretString::from("gho_test".to_string()));

    let account = gateway::Account::from_config(
        "copilot-main",
        AccountConfig {
            platform: Platform::Copilot,
            kind: AccountKind::Oauth,
            credentials,
            proxy: None,
            concurrency: None,
            model_mappings: BTreeMap::new(),
        },
    );

    let mut accounts = BTreeMap::new();
    accounts.insert("copilot-main".to_string(), Arc::new(account));

    let state = Arc::new(AppState {
        gateway,
        accounts,
        device,
    });

    spawn(server::router(state)).await
}

#[tokio::test]
async fn anthropic_stream_over_chat_upstream() {
    let upstream = spawn(mock_upstream()).await;
    let relay = relay_over(upstream).await;

    let response = reqwest::Client::new()
        .post(format!("{relay}/v1/messages"))
        .json(&json!({
            "model": "gpt-4o",
            "max_tokens": 64,
            "stream": true,
            "messages": [{ "role": "user", "content": "Hello" }]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );

    let body = response.text().await.unwrap();

    // The full Anthropic event sequence, in order.
    let positions: Vec<usize> = [
        "event: message_start",
        "event: content_block_start",
        "event: content_block_delta",
        "event: content_block_stop",
        "event: message_delta",
        "event: message_stop",
    ]
    .iter()
    .map(|marker| {
        assert!(body.contains(marker), "missing {marker} in {body}");
        body.find(marker).unwrap()
    })
    .collect();

    assert!(positions.windows(2).all(|w| w[0] < w[1]), "events out of order: {body}");
    assert!(body.contains(r#""text":"Hi""#));
    assert!(body.contains(r#""stop_reason":"end_turn""#));
    // Anthropic streams do not use the [DONE] sentinel.
    assert!(!body.contains("[DONE]"));
}

#[tokio::test]
async fn chat_stream_passes_through() {
    let upstream = spawn(mock_upstream()).await;
    let relay = relay_over(upstream).await;

    let response = reqwest::Client::new()
        .post(format!("{relay}/v1/chat/completions"))
        .json(&json!({
            "model": "gpt-4o",
            "stream": true,
            "messages": [{ "role": "user", "content": "Hello" }]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);

    let body = response.text().await.unwrap();
    assert!(body.contains(r#""content":"Hi""#));
    assert!(body.trim_end().ends_with("data: [DONE]"));
}

#[tokio::test]
async fn models_pass_through() {
    let upstream = spawn(mock_upstream()).await;
    let relay = relay_over(upstream).await;

    let models: Value = reqwest::Client::new()
        .get(format!("{relay}/v1/models"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(models["data"][0]["id"], "gpt-4o");
}

#[tokio::test]
async fn count_tokens_answers_locally() {
    // No upstream routes needed; the endpoint never leaves the process.
    let upstream = spawn(Router::new()).await;
    let relay = relay_over(upstream).await;

    let response: Value = reqwest::Client::new()
        .post(format!("{relay}/v1/messages/count_tokens"))
        .json(&json!({
            "model": "claude-sonnet-4",
            "max_tokens": 64,
            "messages": [{ "role": "user", "content": "Hello there, how are you?" }]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert!(response["input_tokens"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn unknown_account_yields_protocol_error() {
    let upstream = spawn(mock_upstream()).await;
    let relay = relay_over(upstream).await;

    let response = reqwest::Client::new()
        .post(format!("{relay}/v1/messages"))
        .header("x-relay-account", "nope")
        .json(&json!({
            "model": "gpt-4o",
            "max_tokens": 64,
            "messages": [{ "role": "user", "content": "Hello" }]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["type"], "error");
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn device_admin_envelope() {
    let upstream_app = Router::new().route(
        "/login/device/code",
        post(|| async {
            Json(json!({
                "device_code": "dev_1",
                "user_code": "ABCD-1234",
                "verification_uri": "https://github.com/login/device",
                "expires_in": 900,
                "interval": 5
            }))
        }),
    );

    let upstream = spawn(upstream_app).await;
    let relay = relay_over(upstream).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{relay}/admin/github/device/start"))
        .json(&json!({ "account_id": "copilot-main" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["user_code"], "ABCD-1234");
    assert_eq!(body["data"]["interval"], 5);

    // Unknown accounts report a non-zero code.
    let body: Value = reqwest::Client::new()
        .post(format!("{relay}/admin/github/device/cancel"))
        .json(&json!({ "account_id": "copilot-main", "session_id": "missing" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["code"], 1);
}
