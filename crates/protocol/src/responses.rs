//! OpenAI Responses API wire types.
//!
//! The Responses API replaces the messages array with a flat list of
//! *input items* on the request side and *output items* on the response
//! side. Streaming uses named SSE events (`response.created`,
//! `response.output_item.added`, ...) whose payloads vary per event; the
//! stream scanner in `translate` works on raw JSON values and uses
//! [`StreamEventKind`] to dispatch on the event name.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for `POST /v1/responses`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ResponsesRequest {
    /// The model to use.
    pub model: String,

    /// Input items in conversation order.
    pub input: Vec<InputItem>,

    /// System-level instructions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Nucleus sampling cutoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Whether to stream the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    /// Whether the provider should persist the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<bool>,

    /// Extra response fields to include.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,

    /// Tools the model may call. Flat shape, unlike Chat's nested one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ResponsesTool>>,

    /// Tool choice, passed through opaquely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,

    /// Reasoning configuration, passed through opaquely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Value>,

    /// Request metadata, passed through opaquely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// The include entry that requests encrypted reasoning content, needed
/// for stateless (`store=false`) multi-turn reasoning.
pub const INCLUDE_REASONING_ENCRYPTED_CONTENT: &str = "reasoning.encrypted_content";

impl ResponsesRequest {
    /// Ensure `include` carries the encrypted-reasoning entry exactly
    /// once. Applying this twice is a no-op.
    pub fn ensure_reasoning_include(&mut self) {
        let include = self.include.get_or_insert_with(Vec::new);
        if !include.iter().any(|i| i == INCLUDE_REASONING_ENCRYPTED_CONTENT) {
            include.push(INCLUDE_REASONING_ENCRYPTED_CONTENT.to_string());
        }
    }
}

/// One input item.
///
/// Untagged: items written by the relay always carry a `type` field, but
/// plain `{role, content}` messages from clients omit it, so the message
/// variant matches last.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum InputItem {
    /// A prior function call replayed into the conversation.
    FunctionCall(FunctionCallItem),
    /// The output of a function call.
    FunctionCallOutput(FunctionCallOutputItem),
    /// A plain conversation message.
    Message(InputMessage),
}

/// A conversation message input item.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputMessage {
    /// "message" when present; plain client messages omit it.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Sender role: system, developer, user or assistant.
    pub role: String,

    /// String content or an array of content parts, passed through
    /// opaquely.
    pub content: Value,
}

impl InputMessage {
    /// Build a plain text message item.
    pub fn text(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: Some("message".to_string()),
            role: role.into(),
            content: Value::String(text.into()),
        }
    }
}

/// A `function_call` input item.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionCallItem {
    /// Always "function_call".
    #[serde(rename = "type")]
    pub kind: String,

    /// Call id, correlated by a `function_call_output` item.
    pub call_id: String,

    /// Function name.
    pub name: String,

    /// Arguments as a JSON string.
    #[serde(default)]
    pub arguments: String,
}

/// A `function_call_output` input item.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FunctionCallOutputItem {
    /// Always "function_call_output".
    #[serde(rename = "type")]
    pub kind: String,

    /// The call this output answers.
    pub call_id: String,

    /// Tool output text.
    #[serde(default)]
    pub output: String,
}

/// Tool definition. The Responses API flattens the function fields onto
/// the tool itself.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResponsesTool {
    /// Tool kind; only "function" is meaningful here.
    #[serde(rename = "type")]
    pub kind: String,

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

/// Response body for a non-streaming `POST /v1/responses`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesResponse {
    /// Response id, `resp_` prefixed.
    pub id: String,

    /// Terminal status: completed, incomplete, failed.
    #[serde(default)]
    pub status: Option<String>,

    /// Why the response is incomplete, when it is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incomplete_details: Option<IncompleteDetails>,

    /// The model that answered.
    #[serde(default)]
    pub model: String,

    /// Unix timestamp of creation.
    #[serde(default)]
    pub created_at: u64,

    /// Ordered output items.
    #[serde(default)]
    pub output: Vec<OutputItem>,

    /// Token accounting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ResponsesUsage>,
}

/// Incompleteness details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncompleteDetails {
    /// Machine-readable reason, e.g. "max_output_tokens".
    #[serde(default)]
    pub reason: Option<String>,
}

/// One output item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    /// An assistant message.
    Message {
        /// Item id.
        #[serde(default)]
        id: String,
        /// Always assistant.
        #[serde(default)]
        role: String,
        /// Ordered content parts.
        #[serde(default)]
        content: Vec<OutputContent>,
    },

    /// A function call the model wants executed.
    FunctionCall {
        /// Item id.
        #[serde(default)]
        id: String,
        /// Call id, echoed back in `function_call_output`.
        call_id: String,
        /// Function name.
        name: String,
        /// Arguments as a JSON string.
        #[serde(default)]
        arguments: String,
        /// Item status, e.g. "completed".
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },

    /// Model reasoning; not forwarded to Chat clients.
    Reasoning {
        /// Item id.
        #[serde(default)]
        id: String,
        /// Summary parts, passed through opaquely.
        #[serde(default)]
        summary: Value,
        /// Encrypted reasoning payload when requested via `include`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        encrypted_content: Option<String>,
    },

    /// Unknown item kinds, preserved for forward compatibility.
    #[serde(untagged)]
    Other(Value),
}

/// One content part of a message output item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputContent {
    /// Text produced by the model.
    OutputText {
        /// The text content.
        text: String,
    },

    /// A refusal to answer.
    Refusal {
        /// The refusal message.
        refusal: String,
    },

    /// Unknown part kinds, preserved for forward compatibility.
    #[serde(untagged)]
    Other(Value),
}

/// Token usage.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResponsesUsage {
    /// Tokens in the input.
    #[serde(default)]
    pub input_tokens: u32,

    /// Tokens generated.
    #[serde(default)]
    pub output_tokens: u32,

    /// Sum of both; computed when the provider omits it.
    #[serde(default)]
    pub total_tokens: u32,
}

impl ResponsesUsage {
    /// Total, falling back to the sum when the wire carried zero.
    pub fn total(&self) -> u32 {
        if self.total_tokens > 0 {
            self.total_tokens
        } else {
            self.input_tokens + self.output_tokens
        }
    }
}

/// The SSE event names a Responses stream can carry, parsed from the
/// `event:` line. Unrecognized names map to [`StreamEventKind::Other`]
/// and are forwarded untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEventKind {
    /// `response.created`
    Created,
    /// `response.output_item.added`
    OutputItemAdded,
    /// `response.output_item.done`
    OutputItemDone,
    /// `response.output_text.delta`
    OutputTextDelta,
    /// `response.output_text.done`
    OutputTextDone,
    /// `response.function_call_arguments.delta`
    FunctionCallArgumentsDelta,
    /// `response.function_call_arguments.done`
    FunctionCallArgumentsDone,
    /// `response.reasoning_summary_part.added`
    ReasoningSummaryPartAdded,
    /// `response.reasoning_summary_text.delta`
    ReasoningSummaryTextDelta,
    /// `response.reasoning_summary_text.done`
    ReasoningSummaryTextDone,
    /// `response.completed`
    Completed,
    /// `response.incomplete`
    Incomplete,
    /// `response.failed`
    Failed,
    /// Anything else.
    Other,
}

impl StreamEventKind {
    /// Map an `event:` name to its kind.
    pub fn from_name(name: &str) -> Self {
        match name {
            "response.created" => Self::Created,
            "response.output_item.added" => Self::OutputItemAdded,
            "response.output_item.done" => Self::OutputItemDone,
            "response.output_text.delta" => Self::OutputTextDelta,
            "response.output_text.done" => Self::OutputTextDone,
            "response.function_call_arguments.delta" => Self::FunctionCallArgumentsDelta,
            "response.function_call_arguments.done" => Self::FunctionCallArgumentsDone,
            "response.reasoning_summary_part.added" => Self::ReasoningSummaryPartAdded,
            "response.reasoning_summary_text.delta" => Self::ReasoningSummaryTextDelta,
            "response.reasoning_summary_text.done" => Self::ReasoningSummaryTextDone,
            "response.completed" => Self::Completed,
            "response.incomplete" => Self::Incomplete,
            "response.failed" => Self::Failed,
            _ => Self::Other,
        }
    }

    /// Whether this event terminates the response.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Incomplete | Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn input_items_discriminate_without_type_tag() {
        let items: Vec<InputItem> = serde_json::from_value(json!([
            { "role": "user", "content": "hello" },
            { "type": "function_call", "call_id": "call_1", "name": "f", "arguments": "{}" },
            { "type": "function_call_output", "call_id": "call_1", "output": "42" }
        ]))
        .unwrap();

        assert!(matches!(items[0], InputItem::Message(_)));
        assert!(matches!(items[1], InputItem::FunctionCall(_)));
        assert!(matches!(items[2], InputItem::FunctionCallOutput(_)));
    }

    #[test]
    fn ensure_reasoning_include_is_idempotent() {
        let mut request = ResponsesRequest {
            model: "gpt-5".to_string(),
            ..Default::default()
        };

        request.ensure_reasoning_include();
        request.ensure_reasoning_include();

        assert_eq!(
            request.include.as_deref(),
            Some(&["reasoning.encrypted_content".to_string()][..])
        );
    }

    #[test]
    fn output_items_parse_and_preserve_unknown() {
        let response: ResponsesResponse = serde_json::from_value(json!({
            "id": "resp_1",
            "status": "completed",
            "output": [
                { "type": "reasoning", "id": "rs_1", "summary": [] },
                { "type": "message", "id": "msg_1", "role": "assistant",
                  "content": [{ "type": "output_text", "text": "hi" }] },
                { "type": "web_search_call", "id": "ws_1" }
            ]
        }))
        .unwrap();

        assert!(matches!(response.output[0], OutputItem::Reasoning { .. }));
        assert!(matches!(response.output[1], OutputItem::Message { .. }));
        assert!(matches!(response.output[2], OutputItem::Other(_)));
    }

    #[test]
    fn usage_total_falls_back_to_sum() {
        let usage = ResponsesUsage {
            input_tokens: 7,
            output_tokens: 3,
            total_tokens: 0,
        };
        assert_eq!(usage.total(), 10);
    }

    #[test]
    fn event_kinds_parse_from_names() {
        assert_eq!(
            StreamEventKind::from_name("response.output_item.added"),
            StreamEventKind::OutputItemAdded
        );
        assert_eq!(
            StreamEventKind::from_name("response.unknown.thing"),
            StreamEventKind::Other
        );
        assert!(StreamEventKind::from_name("response.incomplete").is_terminal());
    }
}
