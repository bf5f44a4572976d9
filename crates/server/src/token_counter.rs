//! Local prompt token estimation.
//!
//! `count_tokens` answers from a local o200k estimate rather than a
//! round-trip to the upstream; the endpoint stays available even when
//! Copilot is not. Counts include the system prompt, message text, tool
//! results and tool definitions, plus a small per-message overhead for
//! the chat scaffolding.

use std::sync::OnceLock;

use protocol::anthropic;
use tiktoken_rs::CoreBPE;

/// Scaffolding tokens charged per message (role markers, separators).
const TOKENS_PER_MESSAGE: u32 = 4;

fn bpe() -> Option<&'static CoreBPE> {
    static BPE: OnceLock<Option<CoreBPE>> = OnceLock::new();

    BPE.get_or_init(|| match tiktoken_rs::o200k_base() {
        Ok(bpe) => Some(bpe),
        Err(e) => {
            log::error!("failed to initialize tokenizer: {e}");
            None
        }
    })
    .as_ref()
}

fn count_text(text: &str) -> u32 {
    match bpe() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len() as u32,
        // Rough fallback when the tokenizer failed to load: one token
        // per four characters.
        None => (text.len() as u32).div_ceil(4),
    }
}

/// Estimate the prompt tokens of a Messages request.
pub(crate) fn count_input_tokens(request: &anthropic::MessagesRequest) -> u32 {
    let mut total = 0;

    if let Some(system) = &request.system {
        total += count_text(&system.joined());
    }

    for message in &request.messages {
        total += TOKENS_PER_MESSAGE;

        match &message.content {
            anthropic::MessageContent::Text(text) => total += count_text(text),
            anthropic::MessageContent::Blocks(blocks) => {
                for block in blocks {
                    match block {
                        anthropic::ContentBlock::Text { text } => total += count_text(text),
                        anthropic::ContentBlock::Thinking { thinking, .. } => {
                            total += count_text(thinking);
                        }
                        anthropic::ContentBlock::ToolUse { name, input, .. } => {
                            total += count_text(name);
                            total += count_text(&input.to_string());
                        }
                        anthropic::ContentBlock::ToolResult { content, .. } => {
                            if let Some(content) = content {
                                total += count_text(&content.flattened());
                            }
                        }
                        anthropic::ContentBlock::Image { .. }
                        | anthropic::ContentBlock::RedactedThinking { .. } => {}
                    }
                }
            }
        }
    }

    for tool in request.tools.iter().flatten() {
        total += count_text(&tool.name);
        total += count_text(&tool.description);
        total += count_text(&tool.input_schema.to_string());
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: serde_json::Value) -> anthropic::MessagesRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn counts_grow_with_content() {
        let small = count_input_tokens(&request(json!({
            "model": "claude-sonnet-4",
            "max_tokens": 16,
            "messages": [{ "role": "user", "content": "Hi" }]
        })));

        let large = count_input_tokens(&request(json!({
            "model": "claude-sonnet-4",
            "max_tokens": 16,
            "system": "You are a verbose assistant with many instructions.",
            "messages": [{
                "role": "user",
                "content": "Please summarize the complete history of the Roman Empire in detail."
            }]
        })));

        assert!(small >= TOKENS_PER_MESSAGE);
        assert!(large > small);
    }

    #[test]
    fn tool_definitions_count() {
        let without = count_input_tokens(&request(json!({
            "model": "claude-sonnet-4",
            "max_tokens": 16,
            "messages": [{ "role": "user", "content": "Hi" }]
        })));

        let with = count_input_tokens(&request(json!({
            "model": "claude-sonnet-4",
            "max_tokens": 16,
            "messages": [{ "role": "user", "content": "Hi" }],
            "tools": [{
                "name": "get_weather",
                "description": "Look up current weather for a city",
                "input_schema": { "type": "object", "properties": { "city": { "type": "string" } } }
            }]
        })));

        assert!(with > without);
    }
}
