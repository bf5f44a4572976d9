//! Responses API → Chat Completions response translation.

use protocol::{chat, responses, stop};

/// Translate a Responses API response into Chat Completions form.
///
/// Message items' `output_text` parts join in order into the message
/// content, `function_call` items become tool calls, and reasoning items
/// are not forwarded. When the model called tools and the status maps to
/// a plain stop, the finish reason is forced to `tool_calls` so Chat
/// clients run their tool loop.
pub fn responses_to_chat(response: responses::ResponsesResponse) -> chat::ChatCompletionResponse {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for item in &response.output {
        match item {
            responses::OutputItem::Message { content, .. } => {
                for part in content {
                    if let responses::OutputContent::OutputText { text: part_text } = part {
                        text.push_str(part_text);
                    }
                }
            }
            responses::OutputItem::FunctionCall {
                call_id, name, arguments, ..
            } => {
                tool_calls.push(chat::ToolCall {
                    id: call_id.clone(),
                    kind: "function".to_string(),
                    function: chat::FunctionCall {
                        name: name.clone(),
                        arguments: arguments.clone(),
                    },
                });
            }
            responses::OutputItem::Reasoning { .. } | responses::OutputItem::Other(_) => {}
        }
    }

    let status = response.status.as_deref().unwrap_or("completed");
    let incomplete_reason = response
        .incomplete_details
        .as_ref()
        .and_then(|d| d.reason.as_deref());

    let mut finish_reason = stop::responses_status_to_chat(status, incomplete_reason);
    if !tool_calls.is_empty() && finish_reason == "stop" {
        finish_reason = "tool_calls";
    }

    let usage = response.usage.map(|u| chat::ChatUsage {
        prompt_tokens: u.input_tokens,
        completion_tokens: u.output_tokens,
        total_tokens: u.total(),
    });

    chat::ChatCompletionResponse {
        id: response.id,
        object: "chat.completion".to_string(),
        created: response.created_at,
        model: response.model,
        choices: vec![chat::ChatChoice {
            index: 0,
            message: chat::AssistantMessage {
                role: chat::ChatRole::Assistant,
                content: if text.is_empty() { None } else { Some(text) },
                reasoning_text: None,
                reasoning_opaque: None,
                tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
            },
            finish_reason: Some(finish_reason.to_string()),
        }],
        usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn response(value: Value) -> responses::ResponsesResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn output_text_parts_join_in_order() {
        let out = responses_to_chat(response(json!({
            "id": "resp_1",
            "status": "completed",
            "model": "gpt-5",
            "output": [
                { "type": "reasoning", "id": "rs_1", "summary": [] },
                { "type": "message", "id": "msg_1", "role": "assistant", "content": [
                    { "type": "output_text", "text": "Hello, " },
                    { "type": "output_text", "text": "world." }
                ]}
            ],
            "usage": { "input_tokens": 12, "output_tokens": 4 }
        })));

        let choice = &out.choices[0];
        assert_eq!(choice.message.content.as_deref(), Some("Hello, world."));
        assert_eq!(choice.finish_reason.as_deref(), Some("stop"));

        let usage = out.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.completion_tokens, 4);
        assert_eq!(usage.total_tokens, 16);
    }

    #[test]
    fn function_calls_force_tool_calls_finish() {
        let out = responses_to_chat(response(json!({
            "id": "resp_1",
            "status": "completed",
            "model": "gpt-5",
            "output": [
                { "type": "function_call", "id": "fc_1", "call_id": "call_1",
                  "name": "get_weather", "arguments": "{\"city\":\"Paris\"}" }
            ]
        })));

        let choice = &out.choices[0];
        assert_eq!(choice.finish_reason.as_deref(), Some("tool_calls"));

        let calls = choice.message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].function.name, "get_weather");
    }

    #[test]
    fn incomplete_max_output_tokens_maps_to_length() {
        let out = responses_to_chat(response(json!({
            "id": "resp_1",
            "status": "incomplete",
            "incomplete_details": { "reason": "max_output_tokens" },
            "model": "gpt-5",
            "output": []
        })));

        assert_eq!(out.choices[0].finish_reason.as_deref(), Some("length"));
    }
}
