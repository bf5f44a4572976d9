//! Chat Completions chunks → Anthropic Messages stream events.

use std::collections::HashMap;

use protocol::{
    anthropic::{self, BlockDelta, MessageDeltaBody, ResponseBlock, StreamEvent, StreamMessageStart},
    chat, stop,
};

/// Placeholder text for synthesized thinking blocks that only carry a
/// signature.
const EMPTY_THINKING_TEXT: &str = "Thinking...";

/// Which kind of content block is currently open downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenBlock {
    Text,
    Thinking,
    Tool,
}

/// Converts a Chat Completions SSE chunk sequence into Anthropic
/// Messages stream events.
///
/// The converter guarantees, across one stream:
///
/// - `message_start` precedes everything else
/// - every `content_block_delta` targets an index whose `_start` was
///   emitted and whose `_stop` was not
/// - tool argument deltas are routed by the upstream tool index, so
///   interleaved tool calls stay independently consistent
/// - `message_stop` is emitted at most once
///
/// [`ChatToAnthropicStream::finalize`] closes the stream cleanly when the
/// upstream disconnects without a finish chunk.
pub struct ChatToAnthropicStream {
    message_start_sent: bool,
    message_stop_sent: bool,
    block_index: u32,
    open_block: Option<OpenBlock>,
    /// Upstream tool index → downstream block index. Text can interleave
    /// between argument fragments, so the two index spaces diverge.
    tool_blocks: HashMap<u32, u32>,
    last_usage: Option<chat::ChatUsage>,
}

impl Default for ChatToAnthropicStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatToAnthropicStream {
    /// A fresh converter for one stream.
    pub fn new() -> Self {
        Self {
            message_start_sent: false,
            message_stop_sent: false,
            block_index: 0,
            open_block: None,
            tool_blocks: HashMap::new(),
            last_usage: None,
        }
    }

    /// Feed one upstream chunk, receiving the Anthropic events to emit.
    pub fn process_chunk(&mut self, chunk: &chat::ChatCompletionChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if self.message_stop_sent {
            return events;
        }

        if chunk.usage.is_some() {
            self.last_usage = chunk.usage;
        }

        if !self.message_start_sent {
            events.push(self.message_start(chunk));
            self.message_start_sent = true;
        }

        let Some(choice) = chunk.first_choice() else {
            return events;
        };

        let delta = &choice.delta;
        let reasoning_text = delta.reasoning_text.as_deref().unwrap_or("");
        let content = delta.content.as_deref().unwrap_or("");
        let opaque = delta.reasoning_opaque.as_deref().unwrap_or("");

        // Tracks whether this chunk's signature still needs a home. It is
        // consumed the moment it is emitted as a signature_delta.
        let mut opaque_pending = !opaque.is_empty();

        if !reasoning_text.is_empty() {
            if self.open_block != Some(OpenBlock::Thinking) {
                self.close_open_block(&mut events, "");
                events.push(StreamEvent::ContentBlockStart {
                    index: self.block_index,
                    content_block: ResponseBlock::Thinking {
                        thinking: String::new(),
                        signature: None,
                    },
                });
                self.open_block = Some(OpenBlock::Thinking);
            }

            events.push(StreamEvent::ContentBlockDelta {
                index: self.block_index,
                delta: BlockDelta::ThinkingDelta {
                    thinking: reasoning_text.to_string(),
                },
            });
        }

        if !content.is_empty() {
            match self.open_block {
                Some(OpenBlock::Thinking) => {
                    self.close_open_block(&mut events, "");
                }
                Some(OpenBlock::Tool) => {
                    self.close_open_block(&mut events, "");
                }
                _ => {}
            }

            if self.open_block.is_none() {
                events.push(StreamEvent::ContentBlockStart {
                    index: self.block_index,
                    content_block: ResponseBlock::Text { text: String::new() },
                });
                self.open_block = Some(OpenBlock::Text);
            }

            events.push(StreamEvent::ContentBlockDelta {
                index: self.block_index,
                delta: BlockDelta::TextDelta {
                    text: content.to_string(),
                },
            });
        }

        // A signature arriving without text closes the open thinking block.
        if content.is_empty() && opaque_pending && self.open_block == Some(OpenBlock::Thinking) {
            self.close_open_block(&mut events, opaque);
            opaque_pending = false;
        }

        for call in delta.tool_calls.iter().flatten() {
            let id = call.id.as_deref().unwrap_or("");
            let name = call
                .function
                .as_ref()
                .and_then(|f| f.name.as_deref())
                .unwrap_or("");

            if !id.is_empty() && !name.is_empty() {
                // A bare signature that never had a thinking block gets a
                // synthetic one before the first tool block opens.
                if self.tool_blocks.is_empty()
                    && opaque_pending
                    && reasoning_text.is_empty()
                    && content.is_empty()
                {
                    self.close_open_block(&mut events, "");
                    self.emit_synthetic_thinking(&mut events, opaque);
                    opaque_pending = false;
                }

                self.close_open_block(&mut events, "");

                self.tool_blocks.insert(call.index, self.block_index);
                events.push(StreamEvent::ContentBlockStart {
                    index: self.block_index,
                    content_block: ResponseBlock::ToolUse {
                        id: id.to_string(),
                        name: name.to_string(),
                        input: serde_json::json!({}),
                    },
                });
                self.open_block = Some(OpenBlock::Tool);
            }

            let arguments = call
                .function
                .as_ref()
                .and_then(|f| f.arguments.as_deref())
                .unwrap_or("");

            if !arguments.is_empty() {
                if let Some(&block_index) = self.tool_blocks.get(&call.index) {
                    events.push(StreamEvent::ContentBlockDelta {
                        index: block_index,
                        delta: BlockDelta::InputJsonDelta {
                            partial_json: arguments.to_string(),
                        },
                    });
                } else {
                    log::warn!(
                        "tool argument fragment for unknown tool index {}",
                        call.index
                    );
                }
            }
        }

        if let Some(finish_reason) = choice.finish_reason.as_deref() {
            let closed_tool = self.open_block == Some(OpenBlock::Tool);
            let thinking_signature = if self.open_block == Some(OpenBlock::Thinking) && opaque_pending {
                opaque_pending = false;
                opaque
            } else {
                ""
            };
            self.close_open_block(&mut events, thinking_signature);

            if !closed_tool && opaque_pending {
                self.emit_synthetic_thinking(&mut events, opaque);
            }

            let usage = chunk.usage.or(self.last_usage).unwrap_or_default();

            events.push(StreamEvent::MessageDelta {
                delta: MessageDeltaBody {
                    stop_reason: Some(stop::chat_to_anthropic(finish_reason).to_string()),
                    stop_sequence: None,
                },
                usage: anthropic::Usage {
                    input_tokens: usage.prompt_tokens,
                    output_tokens: usage.completion_tokens,
                    cache_creation_input_tokens: None,
                    cache_read_input_tokens: None,
                },
            });
            events.push(StreamEvent::MessageStop);
            self.message_stop_sent = true;
        }

        events
    }

    /// Close the stream after an upstream disconnect. Emits the finish
    /// sequence exactly once, and only when a `message_start` went out
    /// without a matching `message_stop`.
    pub fn finalize(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if !self.message_start_sent || self.message_stop_sent {
            return events;
        }

        self.close_open_block(&mut events, "");

        let usage = self.last_usage.unwrap_or_default();

        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some(stop::chat_to_anthropic("stop").to_string()),
                stop_sequence: None,
            },
            usage: anthropic::Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                cache_creation_input_tokens: None,
                cache_read_input_tokens: None,
            },
        });
        events.push(StreamEvent::MessageStop);
        self.message_stop_sent = true;

        events
    }

    fn message_start(&self, chunk: &chat::ChatCompletionChunk) -> StreamEvent {
        let id = if chunk.id.is_empty() {
            format!("msg_{}", uuid::Uuid::new_v4().simple())
        } else {
            crate::response::message_id(&chunk.id)
        };

        StreamEvent::MessageStart {
            message: StreamMessageStart {
                id,
                kind: "message".to_string(),
                role: anthropic::Role::Assistant,
                content: Vec::new(),
                model: chunk.model.clone(),
                stop_reason: None,
                stop_sequence: None,
                usage: anthropic::Usage {
                    input_tokens: chunk.usage.map(|u| u.prompt_tokens).unwrap_or(0),
                    output_tokens: 0,
                    cache_creation_input_tokens: None,
                    cache_read_input_tokens: None,
                },
            },
        }
    }

    /// Close whatever block is open and advance the index. Thinking
    /// blocks always receive a signature_delta first, empty when the
    /// upstream never produced one.
    fn close_open_block(&mut self, events: &mut Vec<StreamEvent>, thinking_signature: &str) {
        let Some(open) = self.open_block.take() else {
            return;
        };

        if open == OpenBlock::Thinking {
            events.push(StreamEvent::ContentBlockDelta {
                index: self.block_index,
                delta: BlockDelta::SignatureDelta {
                    signature: thinking_signature.to_string(),
                },
            });
        }

        events.push(StreamEvent::ContentBlockStop {
            index: self.block_index,
        });
        self.block_index += 1;
    }

    /// Emit a complete thinking block for a signature that arrived
    /// without any thinking text.
    fn emit_synthetic_thinking(&mut self, events: &mut Vec<StreamEvent>, signature: &str) {
        events.push(StreamEvent::ContentBlockStart {
            index: self.block_index,
            content_block: ResponseBlock::Thinking {
                thinking: String::new(),
                signature: None,
            },
        });
        events.push(StreamEvent::ContentBlockDelta {
            index: self.block_index,
            delta: BlockDelta::ThinkingDelta {
                thinking: EMPTY_THINKING_TEXT.to_string(),
            },
        });
        events.push(StreamEvent::ContentBlockDelta {
            index: self.block_index,
            delta: BlockDelta::SignatureDelta {
                signature: signature.to_string(),
            },
        });
        events.push(StreamEvent::ContentBlockStop {
            index: self.block_index,
        });
        self.block_index += 1;
    }
}
