//! Cross-protocol translation for the relay.
//!
//! Three layers, each usable on its own:
//!
//! - [`request`]: whole-body request translation (Anthropic → Chat,
//!   Chat → Responses, Gemini → Anthropic)
//! - [`response`]: whole-body response translation for non-streaming
//!   requests (Chat → Anthropic, Responses → Chat)
//! - [`stream`]: stateful SSE converters that re-emit one protocol's
//!   event sequence as another's while bytes arrive, plus the item-id
//!   tracker and the Responses stream scanner they build on
//!
//! Every converter is a plain struct owned by a single request task.
//! Methods mutate the struct and return the emitted events; there are no
//! channels and no shared state.

mod error;

pub mod request;
pub mod response;
pub mod stream;

pub use error::TranslateError;
