//! Stateful SSE stream converters.
//!
//! Each converter consumes one parsed input event at a time and returns
//! the output events it produced, keeping its bookkeeping in plain
//! fields. A converter instance belongs to exactly one request; nothing
//! here is shared across tasks.

mod chat_to_anthropic;
mod item_ids;
mod responses_parser;
mod responses_to_chat;

pub use chat_to_anthropic::ChatToAnthropicStream;
pub use item_ids::ItemIdTracker;
pub use responses_parser::{
    ReasoningState, ResponsesStreamParser, ResponsesStreamState, ScannerOutput, ToolCallState,
};
pub use responses_to_chat::ResponsesToChatStream;
