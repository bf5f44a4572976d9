//! Response-body translators for non-streaming requests.

mod chat_to_anthropic;
mod responses_to_chat;

pub use chat_to_anthropic::chat_to_anthropic;
pub(crate) use chat_to_anthropic::message_id;
pub use responses_to_chat::responses_to_chat;
