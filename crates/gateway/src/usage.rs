//! Usage extraction across the protocols' accounting formats.

use serde_json::Value;

/// Normalized token accounting for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageRecord {
    /// Prompt-side tokens, including Anthropic cache accounting.
    pub input_tokens: u32,
    /// Generated tokens.
    pub output_tokens: u32,
    /// Sum of both.
    pub total_tokens: u32,
}

/// Extract usage from a response body of any of the three protocols.
///
/// Tries the Chat shape (`prompt_tokens`/`completion_tokens`) first,
/// then the Anthropic/Responses shape (`input_tokens`/`output_tokens`).
/// Anthropic's prompt-cache counters are folded into the prompt side,
/// matching how billing views them.
pub fn extract_usage(body: &Value) -> Option<UsageRecord> {
    let usage = body.get("usage")?;

    if let Some(prompt) = usage["prompt_tokens"].as_u64() {
        let completion = usage["completion_tokens"].as_u64().unwrap_or(0);
        let total = usage["total_tokens"]
            .as_u64()
            .unwrap_or(prompt + completion);

        return Some(UsageRecord {
            input_tokens: prompt as u32,
            output_tokens: completion as u32,
            total_tokens: total as u32,
        });
    }

    let input = usage["input_tokens"].as_u64()?;
    let output = usage["output_tokens"].as_u64().unwrap_or(0);

    let cache_creation = usage["cache_creation_input_tokens"].as_u64().unwrap_or(0);
    let cache_read = usage["cache_read_input_tokens"].as_u64().unwrap_or(0);
    let prompt = input + cache_creation + cache_read;

    Some(UsageRecord {
        input_tokens: prompt as u32,
        output_tokens: output as u32,
        total_tokens: (prompt + output) as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_format() {
        let usage = extract_usage(&json!({
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        }))
        .unwrap();

        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 5);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn anthropic_format_folds_cache_into_prompt() {
        let usage = extract_usage(&json!({
            "usage": {
                "input_tokens": 10,
                "output_tokens": 4,
                "cache_creation_input_tokens": 6,
                "cache_read_input_tokens": 20
            }
        }))
        .unwrap();

        assert_eq!(usage.input_tokens, 36);
        assert_eq!(usage.output_tokens, 4);
        assert_eq!(usage.total_tokens, 40);
    }

    #[test]
    fn responses_format_computes_total() {
        let usage = extract_usage(&json!({
            "usage": { "input_tokens": 7, "output_tokens": 3 }
        }))
        .unwrap();

        assert_eq!(usage.total_tokens, 10);
    }

    #[test]
    fn missing_usage_is_none() {
        assert_eq!(extract_usage(&json!({ "id": "x" })), None);
        assert_eq!(extract_usage(&json!({ "usage": {} })), None);
    }
}
