//! Chat Completions → Responses API request translation.

use protocol::{chat, responses};

/// The upstream rejects `max_output_tokens` below this value.
const MIN_MAX_OUTPUT_TOKENS: u32 = 128;

/// Translate a Chat Completions request into Responses form.
///
/// Each chat message becomes one or more input items: assistant text and
/// tool calls split into a message item plus one `function_call` item per
/// call, and role=tool messages become `function_call_output` items. The
/// request is always marked `store=false` and asks for encrypted
/// reasoning content so multi-turn reasoning survives statelessness.
pub fn chat_to_responses(request: chat::ChatCompletionRequest) -> responses::ResponsesRequest {
    let mut input = Vec::with_capacity(request.messages.len());

    for message in request.messages {
        convert_message(message, &mut input);
    }

    let tools = request.tools.map(|tools| {
        tools
            .into_iter()
            .filter(|t| t.kind == "function")
            .map(|t| responses::ResponsesTool {
                kind: "function".to_string(),
                name: t.function.name,
                description: t.function.description,
                parameters: t.function.parameters,
                strict: t.function.strict,
            })
            .collect::<Vec<_>>()
    });

    let mut out = responses::ResponsesRequest {
        model: request.model,
        input,
        instructions: None,
        max_output_tokens: request.max_tokens.map(|m| m.max(MIN_MAX_OUTPUT_TOKENS)),
        temperature: request.temperature,
        top_p: request.top_p,
        stream: request.stream,
        store: Some(false),
        include: None,
        tools,
        tool_choice: request.tool_choice,
        reasoning: None,
        metadata: None,
    };

    out.ensure_reasoning_include();
    out
}

fn convert_message(message: chat::ChatMessage, input: &mut Vec<responses::InputItem>) {
    let text = message.content.as_ref().map(|c| c.text()).unwrap_or_default();

    match message.role {
        chat::ChatRole::System | chat::ChatRole::Developer => {
            input.push(responses::InputItem::Message(responses::InputMessage::text(
                "system", text,
            )));
        }
        chat::ChatRole::Assistant => {
            if !text.is_empty() {
                input.push(responses::InputItem::Message(responses::InputMessage::text(
                    "assistant", text,
                )));
            }

            for call in message.tool_calls.into_iter().flatten() {
                input.push(responses::InputItem::FunctionCall(responses::FunctionCallItem {
                    kind: "function_call".to_string(),
                    call_id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                }));
            }
        }
        chat::ChatRole::Tool => {
            input.push(responses::InputItem::FunctionCallOutput(
                responses::FunctionCallOutputItem {
                    kind: "function_call_output".to_string(),
                    call_id: message.tool_call_id.unwrap_or_default(),
                    output: text,
                },
            ));
        }
        // User and anything unknown map to a user message.
        chat::ChatRole::User | chat::ChatRole::Other(_) => {
            input.push(responses::InputItem::Message(responses::InputMessage::text("user", text)));
        }
    }
}
