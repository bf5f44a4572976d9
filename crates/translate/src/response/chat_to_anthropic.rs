//! Chat Completions → Anthropic Messages response translation.

use protocol::{anthropic, chat, stop};

/// Placeholder for thinking blocks whose upstream carried only a
/// signature; clients render something instead of an empty block.
const EMPTY_THINKING_TEXT: &str = "Thinking...";

/// Translate a Chat Completions response into Anthropic Messages form.
///
/// Blocks are emitted in a fixed order: thinking (when the Copilot
/// reasoning extension produced one), then text, then one tool_use block
/// per tool call. The response never has zero blocks; an empty text
/// block stands in when the upstream produced nothing.
pub fn chat_to_anthropic(response: chat::ChatCompletionResponse) -> anthropic::MessagesResponse {
    let mut content = Vec::new();
    let mut stop_reason = "end_turn".to_string();

    if let Some(choice) = response.choices.into_iter().next() {
        let message = choice.message;

        let has_reasoning = message.reasoning_text.as_deref().is_some_and(|t| !t.is_empty())
            || message.reasoning_opaque.as_deref().is_some_and(|s| !s.is_empty());

        if has_reasoning {
            let thinking = message
                .reasoning_text
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| EMPTY_THINKING_TEXT.to_string());

            content.push(anthropic::ResponseBlock::Thinking {
                thinking,
                signature: message.reasoning_opaque.filter(|s| !s.is_empty()),
            });
        }

        if let Some(text) = message.content.filter(|t| !t.is_empty()) {
            content.push(anthropic::ResponseBlock::Text { text });
        }

        let mut has_tool_calls = false;

        for call in message.tool_calls.into_iter().flatten() {
            has_tool_calls = true;
            content.push(anthropic::ResponseBlock::ToolUse {
                id: call.id,
                name: call.function.name,
                input: serde_json::from_str(&call.function.arguments)
                    .unwrap_or_else(|_| serde_json::json!({})),
            });
        }

        stop_reason = match choice.finish_reason.as_deref() {
            _ if has_tool_calls => "tool_use".to_string(),
            Some(reason) => stop::chat_to_anthropic(reason).to_string(),
            None => "end_turn".to_string(),
        };
    }

    if content.is_empty() {
        content.push(anthropic::ResponseBlock::Text { text: String::new() });
    }

    let usage = response.usage.unwrap_or_default();

    anthropic::MessagesResponse {
        id: message_id(&response.id),
        kind: "message".to_string(),
        role: anthropic::Role::Assistant,
        content,
        model: response.model,
        stop_reason: Some(stop_reason),
        stop_sequence: None,
        usage: anthropic::Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            cache_creation_input_tokens: None,
            cache_read_input_tokens: None,
        },
    }
}

/// Derive a `msg_` id from the upstream completion id.
pub(crate) fn message_id(chat_id: &str) -> String {
    match chat_id.strip_prefix("chatcmpl-") {
        Some(rest) if !rest.is_empty() => format!("msg_{rest}"),
        _ if !chat_id.is_empty() => format!("msg_{chat_id}"),
        _ => format!("msg_{}", uuid::Uuid::new_v4().simple()),
    }
}
