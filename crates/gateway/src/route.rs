//! Routing decisions and body patches applied before dispatch.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

/// A wire protocol the relay speaks, inbound or upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Anthropic Messages.
    AnthropicMessages,
    /// OpenAI Chat Completions.
    ChatCompletions,
    /// OpenAI Responses.
    Responses,
}

/// GPT generation 5 and later route through the Responses API, with the
/// mini variant as the exception.
fn responses_model_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^gpt-(?:[5-9]|[1-9][0-9]+)(?:[.\-]|$)").expect("responses model pattern should be valid")
    })
}

/// Whether the Copilot upstream serves this model through `/responses`
/// rather than `/chat/completions`.
pub fn uses_responses_api(model: &str) -> bool {
    responses_model_pattern().is_match(model) && !model.starts_with("gpt-5-mini")
}

/// Whether the model gets the Codex request transform.
pub fn is_codex_model(model: &str) -> bool {
    model == "codex" || model.starts_with("codex-")
}

/// Pick the upstream protocol for a request.
///
/// Native Anthropic requests for Claude models pass straight through to
/// the upstream Messages endpoint. Everything else lands on Chat
/// Completions unless the model is served by the Responses API.
pub fn upstream_protocol(inbound: Protocol, model: &str) -> Protocol {
    match inbound {
        Protocol::AnthropicMessages if model.starts_with("claude") => Protocol::AnthropicMessages,
        // Responses clients always reach the Responses endpoint; there is
        // no reverse request translation.
        Protocol::Responses => Protocol::Responses,
        _ if uses_responses_api(model) => Protocol::Responses,
        _ => Protocol::ChatCompletions,
    }
}

/// The upstream path for a protocol.
pub fn upstream_path(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::AnthropicMessages => "/v1/messages",
        Protocol::ChatCompletions => "/chat/completions",
        Protocol::Responses => "/responses",
    }
}

/// Codex models run through a stripped-down Responses request: the
/// upstream insists on streaming, refuses sampling overrides and takes
/// its instructions from a cached header.
pub fn apply_codex_transform(body: &mut Value, instructions: Option<&str>) {
    let Some(object) = body.as_object_mut() else {
        return;
    };

    object.insert("store".to_string(), Value::Bool(false));
    object.insert("stream".to_string(), Value::Bool(true));

    for field in [
        "max_output_tokens",
        "temperature",
        "top_p",
        "frequency_penalty",
        "presence_penalty",
    ] {
        object.remove(field);
    }

    if let Some(instructions) = instructions {
        object.insert(
            "instructions".to_string(),
            Value::String(instructions.to_string()),
        );
    }
}
