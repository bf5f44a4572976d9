//! Gemini GenerateContent → Anthropic Messages request translation.

use std::collections::HashMap;

use protocol::{anthropic, gemini};

/// Anthropic requires `max_tokens`; Gemini does not, so a translated
/// request without a configured limit gets this one.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Translate a Gemini request into Anthropic Messages form.
///
/// Gemini carries the model in the URL rather than the body, so the
/// caller passes it in. `functionCall` parts frequently arrive without
/// ids; a synthesized id is recorded per function name so the matching
/// `functionResponse` can reference the same tool_use id.
pub fn gemini_to_anthropic(
    request: gemini::GenerateContentRequest,
    model: impl Into<String>,
) -> anthropic::MessagesRequest {
    let system = request.system_instruction.as_ref().map(|instruction| {
        anthropic::SystemPrompt::Text(
            instruction
                .parts
                .iter()
                .filter_map(|part| match part {
                    gemini::Part::Text(text) => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n\n"),
        )
    });

    // Synthesized tool_use ids per function name, so responses without an
    // explicit id still reference the call that produced them.
    let mut pending_calls: HashMap<String, String> = HashMap::new();

    let messages = request
        .contents
        .into_iter()
        .map(|content| convert_content(content, &mut pending_calls))
        .collect();

    let config = request.generation_config.unwrap_or_default();

    anthropic::MessagesRequest {
        model: model.into(),
        messages,
        max_tokens: config.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        system,
        temperature: config.temperature,
        top_p: config.top_p,
        top_k: config.top_k,
        stop_sequences: config.stop_sequences,
        stream: None,
        metadata: None,
        tools: None,
        tool_choice: None,
        thinking: None,
    }
}

fn convert_content(
    content: gemini::Content,
    pending_calls: &mut HashMap<String, String>,
) -> anthropic::Message {
    let role = match content.role.as_deref() {
        Some("model") => anthropic::Role::Assistant,
        _ => anthropic::Role::User,
    };

    let blocks = content
        .parts
        .into_iter()
        .map(|part| convert_part(part, pending_calls))
        .collect();

    anthropic::Message {
        role,
        content: anthropic::MessageContent::Blocks(blocks),
    }
}

fn convert_part(part: gemini::Part, pending_calls: &mut HashMap<String, String>) -> anthropic::ContentBlock {
    match part {
        gemini::Part::Text(text) => anthropic::ContentBlock::Text { text },

        gemini::Part::InlineData { mime_type, data } => anthropic::ContentBlock::Image {
            source: anthropic::ImageSource {
                source_type: "base64".to_string(),
                media_type: mime_type,
                data,
            },
        },

        gemini::Part::FunctionCall { id, name, args } => {
            let id = id.unwrap_or_else(|| format!("toolu_{}", uuid::Uuid::new_v4().simple()));
            pending_calls.insert(name.clone(), id.clone());

            anthropic::ContentBlock::ToolUse {
                id,
                name,
                input: args,
            }
        }

        gemini::Part::FunctionResponse { id, name, response } => {
            let tool_use_id = id
                .or_else(|| pending_calls.remove(&name))
                .unwrap_or_else(|| format!("toolu_{}", uuid::Uuid::new_v4().simple()));

            anthropic::ContentBlock::ToolResult {
                tool_use_id,
                content: Some(anthropic::ToolResultContent::Text(
                    serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_string()),
                )),
                is_error: None,
            }
        }
    }
}
