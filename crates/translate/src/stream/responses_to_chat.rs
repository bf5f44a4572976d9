//! Responses API stream events → Chat Completions chunks.

use std::collections::HashMap;

use protocol::{
    chat::{self, ChatCompletionChunk, ChunkChoice, FunctionDelta, MessageDelta, ToolCallDelta},
    responses::StreamEventKind,
    stop,
};
use serde_json::Value;

/// Converts Responses API stream events into Chat Completions chunks.
///
/// Output items map onto Chat's flat tool-call index space: every
/// `function_call` item added allocates the next tool index, and
/// argument deltas route through the recorded `output_index` mapping.
/// Reasoning items are tracked but never emitted; Chat has no slot for
/// them.
pub struct ResponsesToChatStream {
    response_id: String,
    model: String,
    created: u64,
    next_tool_index: u32,
    /// `output_index` of a function_call item → Chat tool call index.
    tool_indexes: HashMap<u64, u32>,
    saw_tool_calls: bool,
    finish_sent: bool,
}

impl Default for ResponsesToChatStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponsesToChatStream {
    /// A fresh converter for one stream.
    pub fn new() -> Self {
        Self {
            response_id: String::new(),
            model: String::new(),
            created: 0,
            next_tool_index: 0,
            tool_indexes: HashMap::new(),
            saw_tool_calls: false,
            finish_sent: false,
        }
    }

    /// Feed one upstream event, receiving the chunks to emit.
    pub fn process_event(&mut self, kind: StreamEventKind, data: &Value) -> Vec<ChatCompletionChunk> {
        match kind {
            StreamEventKind::Created => {
                let response = &data["response"];
                self.response_id = response["id"].as_str().unwrap_or_default().to_string();
                self.model = response["model"].as_str().unwrap_or_default().to_string();
                self.created = response["created_at"].as_u64().unwrap_or(0);

                vec![self.chunk(
                    MessageDelta {
                        role: Some(chat::ChatRole::Assistant),
                        ..Default::default()
                    },
                    None,
                )]
            }

            StreamEventKind::OutputTextDelta => match data["delta"].as_str() {
                Some(delta) if !delta.is_empty() => vec![self.chunk(
                    MessageDelta {
                        content: Some(delta.to_string()),
                        ..Default::default()
                    },
                    None,
                )],
                _ => Vec::new(),
            },

            StreamEventKind::OutputItemAdded => {
                let item = &data["item"];
                let output_index = data["output_index"].as_u64().unwrap_or(0);

                match item["type"].as_str() {
                    Some("function_call") => {
                        let index = self.next_tool_index;
                        self.next_tool_index += 1;
                        self.tool_indexes.insert(output_index, index);
                        self.saw_tool_calls = true;

                        vec![self.chunk(
                            MessageDelta {
                                tool_calls: Some(vec![ToolCallDelta {
                                    index,
                                    id: item["call_id"].as_str().map(str::to_string),
                                    kind: Some("function".to_string()),
                                    function: Some(FunctionDelta {
                                        name: item["name"].as_str().map(str::to_string),
                                        arguments: None,
                                    }),
                                }]),
                                ..Default::default()
                            },
                            None,
                        )]
                    }
                    // Reasoning items are recorded upstream but have no
                    // Chat representation.
                    _ => Vec::new(),
                }
            }

            StreamEventKind::FunctionCallArgumentsDelta => {
                let output_index = data["output_index"].as_u64().unwrap_or(0);

                let Some(&index) = self.tool_indexes.get(&output_index) else {
                    log::warn!("argument delta for unmapped output index {output_index}");
                    return Vec::new();
                };

                match data["delta"].as_str() {
                    Some(delta) if !delta.is_empty() => vec![self.chunk(
                        MessageDelta {
                            tool_calls: Some(vec![ToolCallDelta {
                                index,
                                id: None,
                                kind: None,
                                function: Some(FunctionDelta {
                                    name: None,
                                    arguments: Some(delta.to_string()),
                                }),
                            }]),
                            ..Default::default()
                        },
                        None,
                    )],
                    _ => Vec::new(),
                }
            }

            StreamEventKind::OutputItemDone => {
                if data["item"]["type"].as_str() == Some("message") && !self.finish_sent {
                    self.finish_sent = true;
                    vec![self.chunk(MessageDelta::default(), Some("stop".to_string()))]
                } else {
                    Vec::new()
                }
            }

            StreamEventKind::Completed | StreamEventKind::Incomplete | StreamEventKind::Failed => {
                let mut chunks = Vec::new();

                if !self.finish_sent {
                    self.finish_sent = true;

                    let reason = if self.saw_tool_calls {
                        "tool_calls".to_string()
                    } else {
                        let status = data["response"]["status"]
                            .as_str()
                            .unwrap_or(match kind {
                                StreamEventKind::Incomplete => "incomplete",
                                StreamEventKind::Failed => "failed",
                                _ => "completed",
                            })
                            .to_string();
                        let incomplete_reason = data["response"]["incomplete_details"]["reason"].as_str();

                        stop::responses_status_to_chat(&status, incomplete_reason).to_string()
                    };

                    chunks.push(self.chunk(MessageDelta::default(), Some(reason)));
                } else if self.saw_tool_calls {
                    chunks.push(self.chunk(MessageDelta::default(), Some("tool_calls".to_string())));
                }

                let usage = &data["response"]["usage"];
                if usage.is_object() {
                    let input = usage["input_tokens"].as_u64().unwrap_or(0) as u32;
                    let output = usage["output_tokens"].as_u64().unwrap_or(0) as u32;

                    chunks.push(ChatCompletionChunk {
                        id: self.response_id.clone(),
                        object: Some("chat.completion.chunk".to_string()),
                        created: Some(self.created),
                        model: self.model.clone(),
                        choices: Vec::new(),
                        usage: Some(chat::ChatUsage {
                            prompt_tokens: input,
                            completion_tokens: output,
                            total_tokens: input + output,
                        }),
                    });
                }

                chunks
            }

            _ => Vec::new(),
        }
    }

    fn chunk(&self, delta: MessageDelta, finish_reason: Option<String>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.response_id.clone(),
            object: Some("chat.completion.chunk".to_string()),
            created: Some(self.created),
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed(converter: &mut ResponsesToChatStream, kind: StreamEventKind, data: serde_json::Value) -> Vec<ChatCompletionChunk> {
        converter.process_event(kind, &data)
    }

    #[test]
    fn created_emits_role_chunk() {
        let mut converter = ResponsesToChatStream::new();

        let chunks = feed(
            &mut converter,
            StreamEventKind::Created,
            json!({ "response": { "id": "resp_1", "model": "gpt-5", "created_at": 1700000000 } }),
        );

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "resp_1");
        assert_eq!(chunks[0].model, "gpt-5");
        assert_eq!(chunks[0].choices[0].delta.role, Some(chat::ChatRole::Assistant));
    }

    #[test]
    fn text_deltas_become_content_chunks() {
        let mut converter = ResponsesToChatStream::new();

        let chunks = feed(
            &mut converter,
            StreamEventKind::OutputTextDelta,
            json!({ "output_index": 0, "delta": "Hello" }),
        );

        assert_eq!(chunks[0].choices[0].delta.content.as_deref(), Some("Hello"));
    }

    #[test]
    fn function_calls_allocate_sequential_tool_indexes() {
        let mut converter = ResponsesToChatStream::new();

        // A reasoning item first; it allocates nothing.
        let chunks = feed(
            &mut converter,
            StreamEventKind::OutputItemAdded,
            json!({ "output_index": 0, "item": { "type": "reasoning", "id": "rs_1" } }),
        );
        assert!(chunks.is_empty());

        let first = feed(
            &mut converter,
            StreamEventKind::OutputItemAdded,
            json!({ "output_index": 1, "item": {
                "type": "function_call", "id": "fc_1", "call_id": "call_1", "name": "f"
            }}),
        );
        let second = feed(
            &mut converter,
            StreamEventKind::OutputItemAdded,
            json!({ "output_index": 2, "item": {
                "type": "function_call", "id": "fc_2", "call_id": "call_2", "name": "g"
            }}),
        );

        let call = &first[0].choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.index, 0);
        assert_eq!(call.id.as_deref(), Some("call_1"));

        let call = &second[0].choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.index, 1);

        // Argument deltas route through the output-index mapping.
        let chunks = feed(
            &mut converter,
            StreamEventKind::FunctionCallArgumentsDelta,
            json!({ "output_index": 1, "delta": "{\"q\":1}" }),
        );
        let call = &chunks[0].choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.index, 0);
        assert_eq!(
            call.function.as_ref().unwrap().arguments.as_deref(),
            Some("{\"q\":1}")
        );
    }

    #[test]
    fn message_done_emits_stop_then_completed_adds_usage() {
        let mut converter = ResponsesToChatStream::new();

        let chunks = feed(
            &mut converter,
            StreamEventKind::OutputItemDone,
            json!({ "output_index": 0, "item": { "type": "message", "id": "msg_1" } }),
        );
        assert_eq!(chunks[0].choices[0].finish_reason.as_deref(), Some("stop"));

        let chunks = feed(
            &mut converter,
            StreamEventKind::Completed,
            json!({ "response": { "usage": { "input_tokens": 8, "output_tokens": 2 } } }),
        );

        // Finish already sent and no tools streamed: only the usage chunk.
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].choices.is_empty());

        let usage = chunks[0].usage.unwrap();
        assert_eq!(usage.prompt_tokens, 8);
        assert_eq!(usage.completion_tokens, 2);
        assert_eq!(usage.total_tokens, 10);
    }

    #[test]
    fn tool_streams_finish_with_tool_calls() {
        let mut converter = ResponsesToChatStream::new();

        feed(
            &mut converter,
            StreamEventKind::OutputItemAdded,
            json!({ "output_index": 0, "item": {
                "type": "function_call", "id": "fc_1", "call_id": "call_1", "name": "f"
            }}),
        );

        let chunks = feed(
            &mut converter,
            StreamEventKind::Completed,
            json!({ "response": { "status": "completed",
                "usage": { "input_tokens": 1, "output_tokens": 1 } } }),
        );

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].choices[0].finish_reason.as_deref(), Some("tool_calls"));
        assert!(chunks[1].choices.is_empty());
        assert!(chunks[1].usage.is_some());
    }

    #[test]
    fn incomplete_for_length_maps_to_length() {
        let mut converter = ResponsesToChatStream::new();

        let chunks = feed(
            &mut converter,
            StreamEventKind::Incomplete,
            json!({ "response": {
                "status": "incomplete",
                "incomplete_details": { "reason": "max_output_tokens" }
            }}),
        );

        assert_eq!(chunks[0].choices[0].finish_reason.as_deref(), Some("length"));
    }
}
