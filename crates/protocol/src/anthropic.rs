//! Anthropic Messages API wire types.
//!
//! Request and response shapes for the [Messages API](https://docs.anthropic.com/en/api/messages),
//! including the streaming event surface. The format differs from OpenAI's
//! in a few structural ways that the translators care about:
//!
//! - the system prompt lives outside the messages array and can itself be
//!   a string or an array of text blocks
//! - message content is a string or an array of typed content blocks
//! - tool interactions are content blocks (`tool_use` / `tool_result`)
//!   rather than sibling fields on the message

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for `POST /v1/messages`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessagesRequest {
    /// The model to use for the completion.
    pub model: String,

    /// Conversation turns, alternating between user and assistant.
    pub messages: Vec<Message>,

    /// Maximum number of tokens to generate. Required by the protocol.
    pub max_tokens: u32,

    /// System prompt, either a bare string or an array of text blocks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,

    /// Sampling temperature, 0.0 to 1.0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Nucleus sampling cutoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Only sample from the top K tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    /// Sequences that stop generation when emitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,

    /// When true, the response arrives as Server-Sent Events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    /// Request metadata (user attribution).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    /// Tools the model may call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,

    /// Controls how the model uses tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    /// Extended thinking configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
}

impl MessagesRequest {
    /// Whether the request opts into extended thinking with a budget.
    pub fn requests_thinking(&self) -> bool {
        self.thinking
            .as_ref()
            .is_some_and(|t| t.budget_tokens.is_some_and(|b| b > 0))
    }
}

/// System prompt: a bare string or an array of text blocks.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    /// Plain string form.
    Text(String),
    /// Block form, used by clients attaching cache_control markers.
    Blocks(Vec<SystemBlock>),
}

impl SystemPrompt {
    /// Collapse the prompt into a single string. Block texts are joined
    /// with a blank line, matching the order they were sent.
    pub fn joined(&self) -> String {
        match self {
            SystemPrompt::Text(text) => text.clone(),
            SystemPrompt::Blocks(blocks) => blocks
                .iter()
                .map(|b| b.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}

/// A single text block inside a block-form system prompt.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemBlock {
    /// Always "text".
    #[serde(rename = "type")]
    pub block_type: String,

    /// The text content.
    pub text: String,
}

/// One conversation turn.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    /// Who sent this turn.
    pub role: Role,

    /// String or block content.
    pub content: MessageContent,
}

/// Role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message.
    User,
    /// Assistant message.
    Assistant,
}

/// Message content: a bare string or an array of typed blocks.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text message.
    Text(String),
    /// Multi-block message (text, images, tool interactions, thinking).
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Iterate the content as blocks regardless of wire form. A string
    /// message yields nothing; callers that want its text use
    /// [`MessageContent::text`] instead.
    pub fn blocks(&self) -> &[ContentBlock] {
        match self {
            MessageContent::Text(_) => &[],
            MessageContent::Blocks(blocks) => blocks,
        }
    }

    /// Concatenated text of the message: the string itself, or the text
    /// blocks joined in order.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// Content block in a request message.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },

    /// Base64 image for multi-modal input.
    Image {
        /// The image source.
        source: ImageSource,
    },

    /// Tool call issued by the assistant.
    ToolUse {
        /// Unique id for this call, referenced by a later tool_result.
        id: String,
        /// Name of the tool.
        name: String,
        /// Tool arguments as JSON.
        input: Value,
    },

    /// Result of a tool execution, sent back by the client.
    ToolResult {
        /// The tool_use id this result answers.
        tool_use_id: String,
        /// Result content; string or nested text blocks.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<ToolResultContent>,
        /// Whether the tool execution failed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },

    /// Extended thinking emitted by the model on a previous turn.
    Thinking {
        /// The thinking text.
        thinking: String,
        /// Opaque signature over the thinking content.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },

    /// Thinking the model chose not to reveal.
    RedactedThinking {
        /// Opaque payload.
        data: String,
    },
}

/// Tool result content: string or an array of blocks. Blocks nest no
/// further; this is the bottom of the content shape.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    /// Simple string result.
    Text(String),
    /// Block-form result.
    Blocks(Vec<ToolResultBlock>),
}

impl ToolResultContent {
    /// Flatten the result into one string; block texts join with newlines.
    pub fn flattened(&self) -> String {
        match self {
            ToolResultContent::Text(text) => text.clone(),
            ToolResultContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ToolResultBlock::Text { text } => Some(text.as_str()),
                    ToolResultBlock::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A block inside a tool result.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResultBlock {
    /// Text block.
    Text {
        /// The text content.
        text: String,
    },
    /// Image block.
    Image {
        /// The image source.
        source: ImageSource,
    },
}

/// Image source for image content blocks.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageSource {
    /// Source kind, "base64" in practice.
    #[serde(rename = "type")]
    pub source_type: String,

    /// Media type, e.g. "image/png".
    pub media_type: String,

    /// Base64-encoded payload.
    pub data: String,
}

/// Request metadata.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Metadata {
    /// Opaque user identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Tool definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tool {
    /// Tool name, unique per request.
    pub name: String,

    /// What the tool does.
    #[serde(default)]
    pub description: String,

    /// JSON Schema for the tool's input.
    pub input_schema: Value,
}

/// Tool choice configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
    /// Model decides whether to call tools.
    Auto,
    /// Model must call some tool.
    Any,
    /// Model must call the named tool.
    Tool {
        /// Name of the required tool.
        name: String,
    },
}

/// Extended thinking configuration on a request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThinkingConfig {
    /// "enabled" or "disabled".
    #[serde(rename = "type", default)]
    pub mode: String,

    /// Token budget for thinking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<u32>,
}

/// Response body for a non-streaming `POST /v1/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    /// Unique message identifier, `msg_` prefixed.
    pub id: String,

    /// Always "message".
    #[serde(rename = "type")]
    pub kind: String,

    /// Always assistant.
    pub role: Role,

    /// Ordered content blocks of the response.
    pub content: Vec<ResponseBlock>,

    /// The model that generated the response.
    pub model: String,

    /// Why generation stopped.
    pub stop_reason: Option<String>,

    /// The matched stop sequence, if that is why generation stopped.
    pub stop_sequence: Option<String>,

    /// Token accounting.
    pub usage: Usage,
}

/// Content block in a response (and in `content_block_start` events).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBlock {
    /// Text block.
    Text {
        /// The text content.
        text: String,
    },

    /// Tool call.
    ToolUse {
        /// Unique id, `toolu_` prefixed by Anthropic itself.
        id: String,
        /// Tool name.
        name: String,
        /// Arguments as JSON. Empty object in stream starts.
        input: Value,
    },

    /// Extended thinking block.
    Thinking {
        /// The thinking text.
        thinking: String,
        /// Opaque signature, present once the block is complete.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
}

/// Token usage, including prompt-cache accounting.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt. May be omitted in `message_delta` events.
    #[serde(default)]
    pub input_tokens: u32,

    /// Tokens generated so far.
    #[serde(default)]
    pub output_tokens: u32,

    /// Tokens written to the prompt cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u32>,

    /// Tokens read from the prompt cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u32>,
}

impl Usage {
    /// Prompt tokens including the cache components. This is the number
    /// that maps to Chat's `prompt_tokens`.
    pub fn prompt_total(&self) -> u32 {
        self.input_tokens
            + self.cache_creation_input_tokens.unwrap_or(0)
            + self.cache_read_input_tokens.unwrap_or(0)
    }
}

/// Error envelope: `{"type":"error","error":{...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always "error".
    #[serde(rename = "type")]
    pub kind: String,

    /// Error details.
    pub error: ErrorDetails,
}

impl ErrorResponse {
    /// Build an envelope from an error type and message.
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: "error".to_string(),
            error: ErrorDetails {
                error_type: error_type.into(),
                message: message.into(),
            },
        }
    }
}

/// Error payload inside the envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Machine-readable error type, e.g. "rate_limit_error".
    #[serde(rename = "type")]
    pub error_type: String,

    /// Human-readable message.
    pub message: String,
}

/// Response body for `POST /v1/messages/count_tokens`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CountTokensResponse {
    /// Estimated prompt token count.
    pub input_tokens: u32,
}

/// Streaming event surface for the Messages API.
///
/// A stream always begins with `message_start`, runs one or more content
/// block lifecycles (`content_block_start` → `content_block_delta`* →
/// `content_block_stop`), then `message_delta` with the stop reason and
/// final usage, and ends with `message_stop`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Announces the streamed message with its id, model and initial usage.
    MessageStart {
        /// Initial message metadata; content is always empty here.
        message: StreamMessageStart,
    },

    /// A new content block begins at `index`.
    ContentBlockStart {
        /// Block index, used by subsequent delta and stop events.
        index: u32,
        /// The block being opened.
        content_block: ResponseBlock,
    },

    /// Incremental update to the block at `index`.
    ContentBlockDelta {
        /// Block index.
        index: u32,
        /// The delta payload.
        delta: BlockDelta,
    },

    /// No further deltas will arrive for the block at `index`.
    ContentBlockStop {
        /// Block index.
        index: u32,
    },

    /// Top-level message changes: stop reason and cumulative usage.
    MessageDelta {
        /// Stop reason and sequence.
        delta: MessageDeltaBody,
        /// Cumulative usage.
        usage: Usage,
    },

    /// Terminal event; the stream closes after this.
    MessageStop,

    /// Keep-alive; ignored by clients.
    Ping,

    /// Recoverable error surfaced without tearing the connection down.
    Error {
        /// Error details.
        error: ErrorDetails,
    },
}

impl StreamEvent {
    /// The SSE `event:` name this payload is framed under.
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamEvent::MessageStart { .. } => "message_start",
            StreamEvent::ContentBlockStart { .. } => "content_block_start",
            StreamEvent::ContentBlockDelta { .. } => "content_block_delta",
            StreamEvent::ContentBlockStop { .. } => "content_block_stop",
            StreamEvent::MessageDelta { .. } => "message_delta",
            StreamEvent::MessageStop => "message_stop",
            StreamEvent::Ping => "ping",
            StreamEvent::Error { .. } => "error",
        }
    }
}

/// Message metadata carried by `message_start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMessageStart {
    /// Unique message id.
    pub id: String,

    /// Always "message".
    #[serde(rename = "type")]
    pub kind: String,

    /// Always assistant.
    pub role: Role,

    /// Always empty; content arrives through block events.
    pub content: Vec<ResponseBlock>,

    /// The model producing the stream.
    pub model: String,

    /// Stop reason, null at stream start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,

    /// Stop sequence, null at stream start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,

    /// Usage snapshot; input tokens are known at start, output grows.
    pub usage: Usage,
}

/// Delta payload for `content_block_delta`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    /// Text fragment for a text block.
    TextDelta {
        /// Text to append.
        text: String,
    },

    /// Partial JSON for a tool_use block's input.
    InputJsonDelta {
        /// JSON fragment to append.
        partial_json: String,
    },

    /// Thinking fragment for a thinking block.
    ThinkingDelta {
        /// Thinking text to append.
        thinking: String,
    },

    /// Signature for a thinking block, emitted once before the block stops.
    SignatureDelta {
        /// Opaque signature, possibly empty.
        signature: String,
    },
}

/// Body of a `message_delta` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageDeltaBody {
    /// Why generation stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,

    /// Which stop sequence matched, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}
