//! Finish-reason maps between the three protocols.
//!
//! Every function here is total: unknown inputs fall back to the
//! protocol's natural-completion value, so a new upstream reason can
//! never fail a translation.

/// Map a Chat `finish_reason` to an Anthropic `stop_reason`.
pub fn chat_to_anthropic(finish_reason: &str) -> &'static str {
    match finish_reason {
        "stop" => "end_turn",
        "tool_calls" => "tool_use",
        "length" => "max_tokens",
        _ => "end_turn",
    }
}

/// Map an Anthropic `stop_reason` to a Chat `finish_reason`.
pub fn anthropic_to_chat(stop_reason: &str) -> &'static str {
    match stop_reason {
        "end_turn" => "stop",
        "tool_use" => "tool_calls",
        "max_tokens" => "length",
        _ => "stop",
    }
}

/// Map a Responses terminal status (plus the incomplete reason, when
/// present) to a Chat `finish_reason`.
pub fn responses_status_to_chat(status: &str, incomplete_reason: Option<&str>) -> &'static str {
    match status {
        "incomplete" if incomplete_reason == Some("max_output_tokens") => "length",
        _ => "stop",
    }
}

/// Map a Chat `finish_reason` to a Responses terminal status.
pub fn chat_to_responses_status(finish_reason: &str) -> &'static str {
    match finish_reason {
        "length" => "incomplete",
        _ => "completed",
    }
}
