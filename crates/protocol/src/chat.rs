//! OpenAI Chat Completions wire types.
//!
//! Covers `POST /v1/chat/completions` requests, responses and streaming
//! chunks. Two Copilot extensions ride on assistant deltas and messages:
//! `reasoning_text` (readable thinking) and `reasoning_opaque` (a
//! signature blob); the Anthropic translators map these to `thinking`
//! blocks.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for `POST /v1/chat/completions`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChatCompletionRequest {
    /// The model to use.
    pub model: String,

    /// Conversation messages in order.
    pub messages: Vec<ChatMessage>,

    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Nucleus sampling cutoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Repetition penalty by frequency.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    /// Repetition penalty by presence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,

    /// Stop sequences: a string or an array of strings, passed through
    /// opaquely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Value>,

    /// Whether to stream the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    /// Streaming options (usage in the final chunk).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,

    /// Tools the model may call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,

    /// Tool choice; shape varies, passed through opaquely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,

    /// Whether multiple tool calls may be emitted in one turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,

    /// End-user identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Streaming options.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StreamOptions {
    /// Ask for a final usage-bearing chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_usage: Option<bool>,
}

/// One chat message.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatMessage {
    /// Sender role.
    pub role: ChatRole,

    /// Content: string or multimodal parts. Null for assistant messages
    /// that only carry tool calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ChatContent>,

    /// Tool calls issued by the assistant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// For role=tool: which call this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    /// Plain text helper used by the translators.
    pub fn text(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(ChatContent::Text(text.into())),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// Message sender role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System instructions.
    System,
    /// Developer instructions (newer alias for system).
    Developer,
    /// End-user input.
    User,
    /// Model output.
    Assistant,
    /// Tool execution result.
    Tool,
    /// Unknown role, preserved for forward compatibility.
    #[serde(untagged)]
    Other(String),
}

/// Message content: string or an array of parts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ChatContent {
    /// Plain string content.
    Text(String),
    /// Multimodal parts.
    Parts(Vec<ContentPart>),
}

impl ChatContent {
    /// Concatenated text of the content.
    pub fn text(&self) -> String {
        match self {
            ChatContent::Text(text) => text.clone(),
            ChatContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Whether any part is an image.
    pub fn has_image(&self) -> bool {
        match self {
            ChatContent::Text(_) => false,
            ChatContent::Parts(parts) => parts.iter().any(|p| matches!(p, ContentPart::ImageUrl { .. })),
        }
    }
}

/// One part of a multimodal message.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text part.
    Text {
        /// The text content.
        text: String,
    },
    /// Image part, by URL or data URI.
    ImageUrl {
        /// The image reference.
        image_url: ImageUrl,
    },
}

/// Image reference in a content part.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageUrl {
    /// HTTP(S) URL or `data:` URI.
    pub url: String,

    /// Requested detail level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A completed tool call on an assistant message.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolCall {
    /// Unique call id, correlated by role=tool messages.
    pub id: String,

    /// Always "function".
    #[serde(rename = "type")]
    pub kind: String,

    /// The function being called.
    pub function: FunctionCall,
}

/// Function name and serialized arguments.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionCall {
    /// Function name.
    pub name: String,

    /// Arguments as a JSON string.
    #[serde(default)]
    pub arguments: String,
}

/// Tool definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tool {
    /// Tool kind; only "function" is meaningful.
    #[serde(rename = "type")]
    pub kind: String,

    /// The function specification.
    pub function: FunctionDefinition,
}

/// Function specification inside a tool definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionDefinition {
    /// Function name.
    pub name: String,

    /// What the function does.
    #[serde(default)]
    pub description: String,

    /// JSON Schema of the parameters.
    #[serde(default)]
    pub parameters: Value,

    /// Strict schema mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// Response body for a non-streaming completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    /// Completion id, `chatcmpl-` prefixed.
    pub id: String,

    /// Always "chat.completion".
    #[serde(default)]
    pub object: String,

    /// Unix timestamp of creation.
    #[serde(default)]
    pub created: u64,

    /// The model that answered.
    #[serde(default)]
    pub model: String,

    /// Response choices; index 0 is the primary answer.
    pub choices: Vec<ChatChoice>,

    /// Token accounting. Some providers omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ChatUsage>,
}

/// One response choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    /// Choice index.
    #[serde(default)]
    pub index: u32,

    /// The assistant message.
    pub message: AssistantMessage,

    /// Why generation stopped. Kept as a raw string so unknown values
    /// survive the trip; the finish-reason maps are total over strings.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Assistant message in a response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Always assistant.
    #[serde(default)]
    pub role: ChatRole,

    /// Text content, null when only tool calls were produced.
    #[serde(default)]
    pub content: Option<String>,

    /// Copilot reasoning extension: readable thinking text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_text: Option<String>,

    /// Copilot reasoning extension: opaque signature blob.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_opaque: Option<String>,

    /// Tool calls, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Default for ChatRole {
    fn default() -> Self {
        ChatRole::Assistant
    }
}

/// Token usage.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ChatUsage {
    /// Tokens in the prompt.
    #[serde(default)]
    pub prompt_tokens: u32,

    /// Tokens generated.
    #[serde(default)]
    pub completion_tokens: u32,

    /// Sum of both.
    #[serde(default)]
    pub total_tokens: u32,
}

/// One SSE chunk of a streaming completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// Completion id, stable across chunks.
    #[serde(default)]
    pub id: String,

    /// Always "chat.completion.chunk". Some providers omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,

    /// Unix timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<u64>,

    /// The model producing the stream.
    #[serde(default)]
    pub model: String,

    /// Incremental choice updates. Empty in the final usage-only chunk.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,

    /// Usage, present on the final chunk when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ChatUsage>,
}

impl ChatCompletionChunk {
    /// The first choice's delta, which is the only one Copilot emits.
    pub fn first_choice(&self) -> Option<&ChunkChoice> {
        self.choices.first()
    }
}

/// Incremental update for one choice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Choice index.
    #[serde(default)]
    pub index: u32,

    /// The content delta.
    #[serde(default)]
    pub delta: MessageDelta,

    /// Set on the last content-bearing chunk for this choice.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Delta payload of a chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageDelta {
    /// Role, present only on the first chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ChatRole>,

    /// Text fragment to append.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Reasoning text fragment (Copilot extension).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_text: Option<String>,

    /// Reasoning signature blob (Copilot extension).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_opaque: Option<String>,

    /// Incremental tool call updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// Incremental update to one tool call.
///
/// The first fragment carries `id` and `function.name`; later fragments
/// carry only `function.arguments` pieces, routed by `index`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Tool call slot this fragment belongs to.
    #[serde(default)]
    pub index: u32,

    /// Call id, present on the first fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// "function", present on the first fragment.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Function name and argument fragments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionDelta>,
}

/// Function fragment inside a tool call delta.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionDelta {
    /// Function name, present on the first fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Argument JSON fragment to append.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// Error envelope: `{"error":{...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error details.
    pub error: ErrorDetails,
}

impl ErrorResponse {
    /// Build an envelope from an error type and message.
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetails {
                error_type: error_type.into(),
                message: message.into(),
                code: None,
            },
        }
    }
}

/// Error payload inside the envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Machine-readable error type.
    #[serde(rename = "type")]
    pub error_type: String,

    /// Human-readable message.
    pub message: String,

    /// Optional provider-specific code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserialize_chunk_with_tool_call_delta() {
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "delta": {
                    "tool_calls": [{
                        "index": 0,
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "get_weather", "arguments": "" }
                    }]
                },
                "finish_reason": null
            }]
        }))
        .unwrap();

        let delta = &chunk.choices[0].delta;
        let calls = delta.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id.as_deref(), Some("call_1"));
        assert_eq!(
            calls[0].function.as_ref().and_then(|f| f.name.as_deref()),
            Some("get_weather")
        );
    }

    #[test]
    fn deserialize_reasoning_extension() {
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "choices": [{
                "delta": { "reasoning_text": "let me think", "reasoning_opaque": "sig==" }
            }]
        }))
        .unwrap();

        let delta = &chunk.choices[0].delta;
        assert_eq!(delta.reasoning_text.as_deref(), Some("let me think"));
        assert_eq!(delta.reasoning_opaque.as_deref(), Some("sig=="));
    }

    #[test]
    fn content_text_joins_parts_and_detects_images() {
        let content: ChatContent = serde_json::from_value(json!([
            { "type": "text", "text": "look: " },
            { "type": "image_url", "image_url": { "url": "data:image/png;base64,AAAA" } }
        ]))
        .unwrap();

        assert_eq!(content.text(), "look: ");
        assert!(content.has_image());

        let content: ChatContent = serde_json::from_value(json!("plain")).unwrap();
        assert!(!content.has_image());
    }

    #[test]
    fn unknown_roles_are_preserved() {
        let message: ChatMessage = serde_json::from_value(json!({
            "role": "critic",
            "content": "hm"
        }))
        .unwrap();

        assert_eq!(message.role, ChatRole::Other("critic".to_string()));
    }

    #[test]
    fn serialize_chunk_skips_empty_fields() {
        let chunk = ChatCompletionChunk {
            id: "chatcmpl-1".to_string(),
            object: Some("chat.completion.chunk".to_string()),
            created: Some(1),
            model: "gpt-4o".to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: MessageDelta {
                    content: Some("Hi".to_string()),
                    ..Default::default()
                },
                finish_reason: None,
            }],
            usage: None,
        };

        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["choices"][0]["delta"], json!({ "content": "Hi" }));
        assert!(json.get("usage").is_none());
    }
}
