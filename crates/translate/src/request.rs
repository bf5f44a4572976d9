//! Request-body translators.

mod anthropic_to_chat;
mod chat_to_responses;
mod gemini_to_anthropic;

pub use anthropic_to_chat::anthropic_to_chat;
pub use chat_to_responses::chat_to_responses;
pub use gemini_to_anthropic::gemini_to_anthropic;
