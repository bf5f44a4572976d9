//! Wire types for the protocols the relay speaks.
//!
//! Each module mirrors one protocol's request, response and streaming
//! shapes as they appear on the wire. Fields that can be either a string
//! or an array of blocks are modelled as untagged two-level enums; the
//! protocols only ever nest content once (a `tool_result` may carry
//! blocks, and that is the bottom), so no general tree type exists here.
//!
//! Translation between protocols lives in the `translate` crate; this
//! crate only defines shapes plus the total finish-reason maps that
//! every translator shares.

pub mod anthropic;
pub mod chat;
pub mod gemini;
pub mod responses;
pub mod stop;
