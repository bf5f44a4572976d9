//! Copilot header composition.
//!
//! The upstream cares about more than the bearer token: it wants to know
//! whether the request was typed by a human or produced by an agent loop
//! (`X-Initiator`), whether vision processing is needed
//! (`Copilot-Vision-Request`), and which client version is speaking
//! (`User-Agent`). All of that is derived here from the raw request body
//! so pass-through extensions are never lost.

use std::sync::RwLock;

use serde_json::Value;

use crate::route::Protocol;

/// Fallback client identity when the version cache was never refreshed.
const DEFAULT_USER_AGENT: &str = "opencode/1.2.13";

/// Beta token stripped from client `Anthropic-Beta` headers; the
/// upstream rejects it.
const STRIPPED_BETA: &str = "claude-code-20250219";

/// Beta token injected when a thinking-enabled request arrives without a
/// client-provided beta header.
const THINKING_BETA: &str = "interleaved-thinking-2025-05-14";

/// Process-wide cache of the `User-Agent` the relay presents upstream.
/// An external refresher keeps it at the latest released client version;
/// until then the default applies.
#[derive(Debug)]
pub struct VersionCache {
    user_agent: RwLock<String>,
}

impl Default for VersionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionCache {
    /// A cache holding the default user agent.
    pub fn new() -> Self {
        Self {
            user_agent: RwLock::new(DEFAULT_USER_AGENT.to_string()),
        }
    }

    /// The current user agent.
    pub fn user_agent(&self) -> String {
        self.user_agent
            .read()
            .map(|v| v.clone())
            .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string())
    }

    /// Replace the cached user agent.
    pub fn set_user_agent(&self, value: impl Into<String>) {
        if let Ok(mut guard) = self.user_agent.write() {
            *guard = value.into();
        }
    }
}

/// Decide the `X-Initiator` value by scanning the last conversation
/// entry of the request body.
///
/// A plain user message means a human pressed enter. Anything else (a
/// tool result, an assistant turn, a function call output) means an
/// agent loop is driving.
pub fn detect_initiator(protocol: Protocol, body: &Value) -> &'static str {
    let initiated_by_user = match protocol {
        Protocol::ChatCompletions => body["messages"]
            .as_array()
            .and_then(|messages| messages.last())
            .is_some_and(|last| last["role"].as_str() == Some("user")),

        Protocol::Responses => body["input"]
            .as_array()
            .and_then(|input| input.last())
            .is_some_and(|last| {
                let kind = last["type"].as_str().unwrap_or("message");
                kind == "message" && last["role"].as_str() == Some("user")
            }),

        Protocol::AnthropicMessages => body["messages"]
            .as_array()
            .and_then(|messages| messages.last())
            .is_some_and(|last| {
                if last["role"].as_str() != Some("user") {
                    return false;
                }

                // A user message whose blocks are all tool_result is the
                // agent loop reporting back, not the user talking.
                match last["content"].as_array() {
                    Some(blocks) => !blocks
                        .iter()
                        .all(|block| block["type"].as_str() == Some("tool_result")),
                    None => true,
                }
            }),
    };

    if initiated_by_user { "user" } else { "agent" }
}

/// Whether any message in the body carries an image block, in any of the
/// three protocols' spellings.
pub fn wants_vision(body: &Value) -> bool {
    let containers = body["messages"].as_array().or_else(|| body["input"].as_array());

    let Some(entries) = containers else {
        return false;
    };

    entries.iter().any(|entry| {
        entry["content"].as_array().is_some_and(|blocks| {
            blocks.iter().any(|block| {
                matches!(
                    block["type"].as_str(),
                    Some("image") | Some("image_url") | Some("input_image")
                )
            })
        })
    })
}

/// Compute the `Anthropic-Beta` header to forward upstream.
///
/// The client's header is forwarded with the unsupported token stripped;
/// when the client sent none and the body enables thinking, the
/// interleaved-thinking beta is injected.
pub fn anthropic_beta_header(client_beta: Option<&str>, requests_thinking: bool) -> Option<String> {
    match client_beta {
        Some(beta) => {
            let kept: Vec<&str> = beta
                .split(',')
                .map(str::trim)
                .filter(|token| !token.is_empty() && *token != STRIPPED_BETA)
                .collect();

            if kept.is_empty() {
                None
            } else {
                Some(kept.join(","))
            }
        }
        None if requests_thinking => Some(THINKING_BETA.to_string()),
        None => None,
    }
}
