//! Gemini GenerateContent wire types, request side only.
//!
//! The relay accepts Gemini-style request bodies solely to translate them
//! into Anthropic Messages form, so only the request shapes are modelled.
//! Field names follow Gemini's camelCase convention.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for `generateContent`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    /// Conversation turns.
    pub contents: Vec<Content>,

    /// System instruction; a content object whose parts hold the text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,

    /// Tool declarations, passed through opaquely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,

    /// Generation parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

/// One conversation turn.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Content {
    /// "user" or "model". May be absent on system instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Ordered parts of the turn.
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// One part of a turn. Gemini discriminates parts by which field is set.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    /// Plain text.
    #[serde(rename = "text")]
    Text(String),

    /// Inline binary data (images).
    #[serde(rename = "inlineData")]
    InlineData {
        /// MIME type, e.g. "image/png".
        #[serde(rename = "mimeType")]
        mime_type: String,
        /// Base64-encoded payload.
        data: String,
    },

    /// A function call emitted by the model.
    #[serde(rename = "functionCall")]
    FunctionCall {
        /// Call id; Gemini often omits it.
        #[serde(default)]
        id: Option<String>,
        /// Function name.
        name: String,
        /// Arguments as JSON.
        #[serde(default)]
        args: Value,
    },

    /// A function response from the client.
    #[serde(rename = "functionResponse")]
    FunctionResponse {
        /// Call id being answered; often omitted.
        #[serde(default)]
        id: Option<String>,
        /// Function name.
        name: String,
        /// Response payload as JSON.
        #[serde(default)]
        response: Value,
    },
}

/// Generation parameters.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Maximum tokens to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Nucleus sampling cutoff.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Top-K sampling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    /// Stop sequences.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parts_discriminate_by_field() {
        let content: Content = serde_json::from_value(json!({
            "role": "model",
            "parts": [
                { "text": "checking" },
                { "functionCall": { "name": "lookup", "args": { "q": "rust" } } }
            ]
        }))
        .unwrap();

        assert!(matches!(content.parts[0], Part::Text(_)));
        let Part::FunctionCall { name, args, .. } = &content.parts[1] else {
            unreachable!("expected functionCall part");
        };
        assert_eq!(name, "lookup");
        assert_eq!(args["q"], "rust");
    }

    #[test]
    fn inline_data_parses_camel_case() {
        let part: Part = serde_json::from_value(json!({
            "inlineData": { "mimeType": "image/png", "data": "AAAA" }
        }))
        .unwrap();

        let Part::InlineData { mime_type, data } = part else {
            unreachable!("expected inlineData part");
        };
        assert_eq!(mime_type, "image/png");
        assert_eq!(data, "AAAA");
    }
}
