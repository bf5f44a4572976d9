//! Anthropic Messages → Chat Completions request translation.

use protocol::{anthropic, chat};
use serde_json::Value;

/// Translate an Anthropic Messages request into Chat Completions form.
///
/// The system prompt becomes a leading system message. Tool results
/// embedded in user messages split into separate role=tool messages that
/// precede the remaining user content, so the tool_use → tool_result →
/// user ordering the upstream expects is preserved. Assistant thinking
/// blocks are dropped; Chat has no slot for them on the request side.
pub fn anthropic_to_chat(request: anthropic::MessagesRequest) -> chat::ChatCompletionRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(system) = &request.system {
        messages.push(chat::ChatMessage::text(chat::ChatRole::System, system.joined()));
    }

    for message in &request.messages {
        match message.role {
            anthropic::Role::User => convert_user_message(message, &mut messages),
            anthropic::Role::Assistant => convert_assistant_message(message, &mut messages),
        }
    }

    chat::ChatCompletionRequest {
        model: request.model,
        messages,
        max_tokens: Some(request.max_tokens),
        temperature: request.temperature,
        top_p: request.top_p,
        frequency_penalty: None,
        presence_penalty: None,
        stop: request
            .stop_sequences
            .map(|sequences| Value::Array(sequences.into_iter().map(Value::String).collect())),
        stream: request.stream,
        stream_options: None,
        tools: request.tools.map(|tools| tools.into_iter().map(convert_tool).collect()),
        tool_choice: request.tool_choice.map(convert_tool_choice),
        parallel_tool_calls: None,
        user: request.metadata.and_then(|m| m.user_id),
    }
}

fn convert_user_message(message: &anthropic::Message, out: &mut Vec<chat::ChatMessage>) {
    let blocks = match &message.content {
        anthropic::MessageContent::Text(text) => {
            out.push(chat::ChatMessage::text(chat::ChatRole::User, text.clone()));
            return;
        }
        anthropic::MessageContent::Blocks(blocks) => blocks,
    };

    // Tool results first, each as its own tool message.
    for block in blocks {
        if let anthropic::ContentBlock::ToolResult {
            tool_use_id, content, ..
        } = block
        {
            out.push(chat::ChatMessage {
                role: chat::ChatRole::Tool,
                content: Some(chat::ChatContent::Text(
                    content.as_ref().map(|c| c.flattened()).unwrap_or_default(),
                )),
                tool_calls: None,
                tool_call_id: Some(tool_use_id.clone()),
            });
        }
    }

    // Remaining text and images collapse into one user message after the
    // tool messages.
    let mut parts = Vec::new();
    let mut texts = Vec::new();

    for block in blocks {
        match block {
            anthropic::ContentBlock::Text { text } => texts.push(text.as_str()),
            anthropic::ContentBlock::Image { source } => parts.push(chat::ContentPart::ImageUrl {
                image_url: chat::ImageUrl {
                    url: format!("data:{};base64,{}", source.media_type, source.data),
                    detail: None,
                },
            }),
            _ => {}
        }
    }

    if parts.is_empty() {
        if !texts.is_empty() {
            out.push(chat::ChatMessage::text(chat::ChatRole::User, texts.join("\n")));
        }
    } else {
        if !texts.is_empty() {
            parts.insert(
                0,
                chat::ContentPart::Text {
                    text: texts.join("\n"),
                },
            );
        }
        out.push(chat::ChatMessage {
            role: chat::ChatRole::User,
            content: Some(chat::ChatContent::Parts(parts)),
            tool_calls: None,
            tool_call_id: None,
        });
    }
}

fn convert_assistant_message(message: &anthropic::Message, out: &mut Vec<chat::ChatMessage>) {
    let text = message.content.text();

    let tool_calls: Vec<chat::ToolCall> = message
        .content
        .blocks()
        .iter()
        .filter_map(|block| match block {
            anthropic::ContentBlock::ToolUse { id, name, input } => Some(chat::ToolCall {
                id: id.clone(),
                kind: "function".to_string(),
                function: chat::FunctionCall {
                    name: name.clone(),
                    arguments: serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string()),
                },
            }),
            _ => None,
        })
        .collect();

    out.push(chat::ChatMessage {
        role: chat::ChatRole::Assistant,
        content: if text.is_empty() {
            None
        } else {
            Some(chat::ChatContent::Text(text))
        },
        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
        tool_call_id: None,
    });
}

fn convert_tool(tool: anthropic::Tool) -> chat::Tool {
    chat::Tool {
        kind: "function".to_string(),
        function: chat::FunctionDefinition {
            name: tool.name,
            description: tool.description,
            parameters: tool.input_schema,
            strict: None,
        },
    }
}

fn convert_tool_choice(choice: anthropic::ToolChoice) -> Value {
    match choice {
        anthropic::ToolChoice::Auto => Value::String("auto".to_string()),
        anthropic::ToolChoice::Any => Value::String("required".to_string()),
        anthropic::ToolChoice::Tool { name } => serde_json::json!({
            "type": "function",
            "function": { "name": name }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: Value) -> anthropic::MessagesRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn passthrough_text() {
        let chat = anthropic_to_chat(request(json!({
            "model": "claude-sonnet-4",
            "max_tokens": 1024,
            "messages": [{ "role": "user", "content": "Hello" }]
        })));

        assert_eq!(chat.model, "claude-sonnet-4");
        assert_eq!(chat.max_tokens, Some(1024));
        assert_eq!(chat.messages.len(), 1);
        assert_eq!(chat.messages[0].role, chat::ChatRole::User);
        assert_eq!(chat.messages[0].content.as_ref().unwrap().text(), "Hello");
    }

    #[test]
    fn system_prompt_becomes_leading_message() {
        let chat = anthropic_to_chat(request(json!({
            "model": "claude-sonnet-4",
            "max_tokens": 64,
            "system": [
                { "type": "text", "text": "Be brief." },
                { "type": "text", "text": "Answer in French." }
            ],
            "messages": [{ "role": "user", "content": "Hi" }]
        })));

        assert_eq!(chat.messages[0].role, chat::ChatRole::System);
        assert_eq!(
            chat.messages[0].content.as_ref().unwrap().text(),
            "Be brief.\n\nAnswer in French."
        );
    }

    #[test]
    fn tool_result_splits_into_tool_message() {
        let chat = anthropic_to_chat(request(json!({
            "model": "claude-sonnet-4",
            "max_tokens": 64,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "tool_result", "tool_use_id": "tu_1", "content": "Sunny, 72F" }
                ]
            }]
        })));

        assert_eq!(chat.messages.len(), 1);
        assert_eq!(chat.messages[0].role, chat::ChatRole::Tool);
        assert_eq!(chat.messages[0].tool_call_id.as_deref(), Some("tu_1"));
        assert_eq!(chat.messages[0].content.as_ref().unwrap().text(), "Sunny, 72F");
    }

    #[test]
    fn tool_messages_precede_user_text() {
        let chat = anthropic_to_chat(request(json!({
            "model": "claude-sonnet-4",
            "max_tokens": 64,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": "And now?" },
                    { "type": "tool_result", "tool_use_id": "tu_1", "content": [
                        { "type": "text", "text": "42" }
                    ]}
                ]
            }]
        })));

        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[0].role, chat::ChatRole::Tool);
        assert_eq!(chat.messages[1].role, chat::ChatRole::User);
        assert_eq!(chat.messages[1].content.as_ref().unwrap().text(), "And now?");
    }

    #[test]
    fn assistant_tool_use_becomes_tool_calls_and_thinking_drops() {
        let chat = anthropic_to_chat(request(json!({
            "model": "claude-sonnet-4",
            "max_tokens": 64,
            "messages": [{
                "role": "assistant",
                "content": [
                    { "type": "thinking", "thinking": "hmm", "signature": "sig" },
                    { "type": "text", "text": "Checking the weather." },
                    { "type": "tool_use", "id": "tu_1", "name": "get_weather",
                      "input": { "city": "Paris" } }
                ]
            }]
        })));

        let message = &chat.messages[0];
        assert_eq!(message.content.as_ref().unwrap().text(), "Checking the weather.");

        let calls = message.tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "tu_1");
        assert_eq!(calls[0].function.name, "get_weather");
        assert_eq!(
            serde_json::from_str::<Value>(&calls[0].function.arguments).unwrap(),
            json!({ "city": "Paris" })
        );
    }

    #[test]
    fn tools_and_stop_sequences_map() {
        let chat = anthropic_to_chat(request(json!({
            "model": "claude-sonnet-4",
            "max_tokens": 64,
            "stop_sequences": ["END"],
            "tools": [{
                "name": "get_weather",
                "description": "Weather lookup",
                "input_schema": { "type": "object" }
            }],
            "tool_choice": { "type": "tool", "name": "get_weather" },
            "messages": []
        })));

        assert_eq!(chat.stop, Some(json!(["END"])));

        let tools = chat.tools.as_ref().unwrap();
        assert_eq!(tools[0].kind, "function");
        assert_eq!(tools[0].function.name, "get_weather");
        assert_eq!(tools[0].function.parameters, json!({ "type": "object" }));

        assert_eq!(
            chat.tool_choice,
            Some(json!({ "type": "function", "function": { "name": "get_weather" } }))
        );
    }

    #[test]
    fn images_become_data_urls() {
        let chat = anthropic_to_chat(request(json!({
            "model": "claude-sonnet-4",
            "max_tokens": 64,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": "what is this?" },
                    { "type": "image", "source": {
                        "type": "base64", "media_type": "image/png", "data": "AAAA"
                    }}
                ]
            }]
        })));

        let content = chat.messages[0].content.as_ref().unwrap();
        assert!(content.has_image());

        let chat::ChatContent::Parts(parts) = content else {
            unreachable!("expected parts");
        };
        let chat::ContentPart::ImageUrl { image_url } = &parts[1] else {
            unreachable!("expected image part");
        };
        assert_eq!(image_url.url, "data:image/png;base64,AAAA");
    }
}
