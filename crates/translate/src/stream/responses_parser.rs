//! Line scanner for upstream Responses API SSE bodies.
//!
//! Reads the raw byte stream, recognizes SSE line kinds (`:` comments,
//! `event:` names, `data:` payloads, the `[DONE]` sentinel), runs every
//! payload through the [`ItemIdTracker`], maintains
//! [`ResponsesStreamState`] and hands each processed event to the
//! caller's callback. When the body ends with blocks still open (a
//! silent disconnect, or an upstream that never sent the `done` events)
//! matching `done` events are synthesized so downstream converters never
//! leave blocks permanently open.

use protocol::responses::{ResponsesUsage, StreamEventKind};
use serde_json::{Value, json};

use crate::TranslateError;

use super::ItemIdTracker;

/// Upstreams occasionally emit very long data lines (base64 reasoning
/// payloads); anything beyond this is treated as a broken stream.
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// One unit of scanner output.
#[derive(Debug, Clone)]
pub enum ScannerOutput {
    /// An SSE comment line, forwarded verbatim (including the colon).
    Comment(String),

    /// A processed event: the `event:` name, its parsed kind, and the
    /// `data:` payload after id fixing.
    Event {
        /// The literal event name.
        name: String,
        /// The parsed event kind.
        kind: StreamEventKind,
        /// The payload, with canonical item ids applied.
        data: String,
    },

    /// The `data: [DONE]` sentinel.
    Done,
}

/// Accumulated state of one tool call in the stream.
#[derive(Debug, Clone, Default)]
pub struct ToolCallState {
    /// Canonical item id.
    pub item_id: String,
    /// Call id, used by the Chat converter and for done-matching.
    pub call_id: String,
    /// Function name.
    pub name: String,
    /// Arguments accumulated from deltas.
    pub arguments: String,
    /// Output index of the item.
    pub output_index: u64,
    /// Whether an arguments-done or item-done event arrived.
    pub is_complete: bool,
}

/// Accumulated state of one reasoning block in the stream.
#[derive(Debug, Clone, Default)]
pub struct ReasoningState {
    /// Canonical item id.
    pub item_id: String,
    /// Summary text accumulated from deltas.
    pub summary_text: String,
    /// Output index of the item.
    pub output_index: u64,
    /// Whether a text-done or item-done event arrived.
    pub is_complete: bool,
}

/// Everything the scanner has learned about the response so far.
#[derive(Debug, Clone, Default)]
pub struct ResponsesStreamState {
    /// Response id from `response.created`.
    pub response_id: String,
    /// Model from `response.created`.
    pub model: String,
    /// Creation timestamp from `response.created`.
    pub created_at: u64,
    /// Message text accumulated from output_text deltas.
    pub current_text: String,
    /// Whether the message text was closed by a done event.
    pub text_done: bool,
    /// Tool calls in stream order.
    pub tool_calls: Vec<ToolCallState>,
    /// Reasoning blocks in stream order.
    pub reasoning: Vec<ReasoningState>,
    /// Final usage from the terminal event.
    pub usage: Option<ResponsesUsage>,
}

/// SSE scanner plus per-stream state for one upstream response body.
#[derive(Debug, Default)]
pub struct ResponsesStreamParser {
    tracker: ItemIdTracker,
    state: ResponsesStreamState,
    buffer: Vec<u8>,
    pending_event: Option<String>,
    finished: bool,
}

impl ResponsesStreamParser {
    /// A fresh parser for one response body.
    pub fn new() -> Self {
        Self::default()
    }

    /// The state accumulated so far.
    pub fn state(&self) -> &ResponsesStreamState {
        &self.state
    }

    /// Feed a chunk of body bytes, invoking `emit` for every completed
    /// line's output.
    pub fn push(
        &mut self,
        bytes: &[u8],
        emit: &mut dyn FnMut(ScannerOutput),
    ) -> Result<(), TranslateError> {
        self.buffer.extend_from_slice(bytes);

        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            self.process_line(line, emit)?;
        }

        if self.buffer.len() > MAX_LINE_BYTES {
            return Err(TranslateError::LineTooLong { limit: MAX_LINE_BYTES });
        }

        Ok(())
    }

    /// Signal EOF. Runs the flush-on-end contract when the stream ended
    /// without `[DONE]`.
    pub fn finish(&mut self, emit: &mut dyn FnMut(ScannerOutput)) -> Result<(), TranslateError> {
        if !self.finished {
            self.flush_open(emit);
            self.finished = true;
        }

        Ok(())
    }

    fn process_line(
        &mut self,
        line: &str,
        emit: &mut dyn FnMut(ScannerOutput),
    ) -> Result<(), TranslateError> {
        if line.is_empty() {
            return Ok(());
        }

        if line.starts_with(':') {
            emit(ScannerOutput::Comment(line.to_string()));
            return Ok(());
        }

        if let Some(name) = line.strip_prefix("event:") {
            self.pending_event = Some(name.trim().to_string());
            return Ok(());
        }

        let Some(payload) = line.strip_prefix("data:") else {
            return Ok(());
        };
        let payload = payload.trim_start();

        if payload == "[DONE]" {
            self.flush_open(emit);
            self.finished = true;
            emit(ScannerOutput::Done);
            return Ok(());
        }

        let name = self.pending_event.take().unwrap_or_default();
        let kind = StreamEventKind::from_name(&name);

        let fixed = self.tracker.fix(payload, &name)?;
        let value: Value = serde_json::from_str(&fixed)?;

        self.handle_event(kind, &value);

        emit(ScannerOutput::Event {
            name,
            kind,
            data: fixed,
        });

        Ok(())
    }

    fn handle_event(&mut self, kind: StreamEventKind, value: &Value) {
        match kind {
            StreamEventKind::Created => {
                self.tracker.clear();

                let response = &value["response"];
                self.state.response_id = string_at(response, "id");
                self.state.model = string_at(response, "model");
                self.state.created_at = response["created_at"].as_u64().unwrap_or(0);
            }

            StreamEventKind::OutputItemAdded => {
                let item = &value["item"];
                let output_index = value["output_index"].as_u64().unwrap_or(0);

                match item["type"].as_str() {
                    Some("function_call") => self.state.tool_calls.push(ToolCallState {
                        item_id: string_at(item, "id"),
                        call_id: string_at(item, "call_id"),
                        name: string_at(item, "name"),
                        arguments: string_at(item, "arguments"),
                        output_index,
                        is_complete: false,
                    }),
                    Some("reasoning") => self.state.reasoning.push(ReasoningState {
                        item_id: string_at(item, "id"),
                        summary_text: String::new(),
                        output_index,
                        is_complete: false,
                    }),
                    _ => {}
                }
            }

            StreamEventKind::OutputTextDelta => {
                if let Some(delta) = value["delta"].as_str() {
                    self.state.current_text.push_str(delta);
                }
            }

            StreamEventKind::OutputTextDone => {
                if let Some(text) = value["text"].as_str() {
                    self.state.current_text = text.to_string();
                }
                self.state.text_done = true;
            }

            StreamEventKind::FunctionCallArgumentsDelta => {
                let delta = string_at(value, "delta");
                if let Some(call) = find_tool_call(&mut self.state.tool_calls, value) {
                    call.arguments.push_str(&delta);
                }
            }

            StreamEventKind::FunctionCallArgumentsDone => {
                let arguments = value["arguments"].as_str().map(str::to_string);
                if let Some(call) = find_tool_call(&mut self.state.tool_calls, value) {
                    if let Some(arguments) = arguments {
                        call.arguments = arguments;
                    }
                    call.is_complete = true;
                }
            }

            StreamEventKind::ReasoningSummaryPartAdded => {
                let item_id = string_at(value, "item_id");
                let exists = self.state.reasoning.iter().any(|r| r.item_id == item_id);

                if !exists {
                    self.state.reasoning.push(ReasoningState {
                        item_id,
                        summary_text: String::new(),
                        output_index: value["output_index"].as_u64().unwrap_or(0),
                        is_complete: false,
                    });
                }
            }

            StreamEventKind::ReasoningSummaryTextDelta => {
                let item_id = string_at(value, "item_id");
                let delta = string_at(value, "delta");

                if let Some(block) = self.state.reasoning.iter_mut().find(|r| r.item_id == item_id) {
                    block.summary_text.push_str(&delta);
                }
            }

            StreamEventKind::ReasoningSummaryTextDone => {
                let item_id = string_at(value, "item_id");

                if let Some(block) = self.state.reasoning.iter_mut().find(|r| r.item_id == item_id) {
                    if let Some(text) = value["text"].as_str() {
                        block.summary_text = text.to_string();
                    }
                    block.is_complete = true;
                }
            }

            StreamEventKind::OutputItemDone => {
                let item = &value["item"];

                match item["type"].as_str() {
                    Some("message") => self.state.text_done = true,
                    Some("function_call") => {
                        let arguments = item["arguments"].as_str().map(str::to_string);
                        if let Some(call) = find_tool_call_by_item(&mut self.state.tool_calls, item) {
                            if let Some(arguments) = arguments {
                                call.arguments = arguments;
                            }
                            call.is_complete = true;
                        }
                    }
                    Some("reasoning") => {
                        let item_id = string_at(item, "id");
                        if let Some(block) =
                            self.state.reasoning.iter_mut().find(|r| r.item_id == item_id)
                        {
                            block.is_complete = true;
                        }
                    }
                    _ => {}
                }
            }

            StreamEventKind::Completed | StreamEventKind::Incomplete | StreamEventKind::Failed => {
                let usage = &value["response"]["usage"];
                if usage.is_object() {
                    self.state.usage = Some(ResponsesUsage {
                        input_tokens: usage["input_tokens"].as_u64().unwrap_or(0) as u32,
                        output_tokens: usage["output_tokens"].as_u64().unwrap_or(0) as u32,
                        total_tokens: usage["total_tokens"].as_u64().unwrap_or(0) as u32,
                    });
                }

                // The response is over; nothing is open anymore.
                self.state.text_done = true;
                for call in &mut self.state.tool_calls {
                    call.is_complete = true;
                }
                for block in &mut self.state.reasoning {
                    block.is_complete = true;
                }
            }

            StreamEventKind::Other => {}
        }
    }

    /// Synthesize `done` events for anything still open.
    fn flush_open(&mut self, emit: &mut dyn FnMut(ScannerOutput)) {
        if !self.state.text_done && !self.state.current_text.is_empty() {
            self.state.text_done = true;

            let data = json!({
                "type": "response.output_text.done",
                "text": self.state.current_text,
            });

            emit(ScannerOutput::Event {
                name: "response.output_text.done".to_string(),
                kind: StreamEventKind::OutputTextDone,
                data: data.to_string(),
            });
        }

        for call in &mut self.state.tool_calls {
            if call.is_complete {
                continue;
            }
            call.is_complete = true;

            let data = json!({
                "type": "response.function_call_arguments.done",
                "item_id": call.item_id,
                "output_index": call.output_index,
                "call_id": call.call_id,
                "name": call.name,
                "arguments": call.arguments,
            });

            log::warn!(
                "stream ended with tool call '{}' still open, synthesizing done",
                call.call_id
            );

            emit(ScannerOutput::Event {
                name: "response.function_call_arguments.done".to_string(),
                kind: StreamEventKind::FunctionCallArgumentsDone,
                data: data.to_string(),
            });
        }

        for block in &mut self.state.reasoning {
            if block.is_complete {
                continue;
            }
            block.is_complete = true;

            let data = json!({
                "type": "response.reasoning_summary_text.done",
                "item_id": block.item_id,
                "output_index": block.output_index,
                "text": block.summary_text,
            });

            emit(ScannerOutput::Event {
                name: "response.reasoning_summary_text.done".to_string(),
                kind: StreamEventKind::ReasoningSummaryTextDone,
                data: data.to_string(),
            });
        }
    }
}

fn string_at(value: &Value, key: &str) -> String {
    value[key].as_str().unwrap_or_default().to_string()
}

/// Locate a tool call by `call_id` first, then by `item_id`.
fn find_tool_call<'a>(calls: &'a mut [ToolCallState], value: &Value) -> Option<&'a mut ToolCallState> {
    let call_id = value["call_id"].as_str().unwrap_or_default();
    let item_id = value["item_id"].as_str().unwrap_or_default();

    if !call_id.is_empty() && calls.iter().any(|c| c.call_id == call_id) {
        return calls.iter_mut().find(|c| c.call_id == call_id);
    }

    if !item_id.is_empty() {
        return calls.iter_mut().find(|c| c.item_id == item_id);
    }

    None
}

/// Same matching order for `output_item.done`, whose ids sit on the item.
fn find_tool_call_by_item<'a>(
    calls: &'a mut [ToolCallState],
    item: &Value,
) -> Option<&'a mut ToolCallState> {
    let call_id = item["call_id"].as_str().unwrap_or_default();
    let item_id = item["id"].as_str().unwrap_or_default();

    if !call_id.is_empty() && calls.iter().any(|c| c.call_id == call_id) {
        return calls.iter_mut().find(|c| c.call_id == call_id);
    }

    if !item_id.is_empty() {
        return calls.iter_mut().find(|c| c.item_id == item_id);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn collect(parser: &mut ResponsesStreamParser, body: &str) -> Vec<ScannerOutput> {
        let mut outputs = Vec::new();
        parser.push(body.as_bytes(), &mut |o| outputs.push(o)).unwrap();
        outputs
    }

    #[test]
    fn scans_events_comments_and_done() {
        let body = indoc! {r#"
            : keep-alive

            event: response.created
            data: {"response":{"id":"resp_1","model":"gpt-5","created_at":1700000000}}

            event: response.output_text.delta
            data: {"output_index":0,"delta":"Hello"}

            data: [DONE]

        "#};

        let mut parser = ResponsesStreamParser::new();
        let outputs = collect(&mut parser, body);

        assert!(matches!(&outputs[0], ScannerOutput::Comment(c) if c == ": keep-alive"));
        assert!(matches!(
            &outputs[1],
            ScannerOutput::Event { kind: StreamEventKind::Created, .. }
        ));
        assert!(matches!(
            &outputs[2],
            ScannerOutput::Event { kind: StreamEventKind::OutputTextDelta, .. }
        ));
        // Text was still open, so [DONE] synthesized its done event first.
        assert!(matches!(
            &outputs[3],
            ScannerOutput::Event { kind: StreamEventKind::OutputTextDone, .. }
        ));
        assert!(matches!(&outputs[4], ScannerOutput::Done));

        assert_eq!(parser.state().response_id, "resp_1");
        assert_eq!(parser.state().model, "gpt-5");
        assert_eq!(parser.state().current_text, "Hello");
        assert!(parser.state().text_done);
    }

    #[test]
    fn lines_split_across_pushes_reassemble() {
        let mut parser = ResponsesStreamParser::new();
        let mut outputs = Vec::new();

        parser
            .push(b"event: response.output_text.delta\ndata: {\"output_index\":0,", &mut |o| {
                outputs.push(o)
            })
            .unwrap();
        assert!(outputs.is_empty());

        parser
            .push(b"\"delta\":\"split\"}\n", &mut |o| outputs.push(o))
            .unwrap();

        assert_eq!(outputs.len(), 1);
        assert_eq!(parser.state().current_text, "split");
    }

    #[test]
    fn tool_call_arguments_accumulate_and_match_by_call_id() {
        let body = indoc! {r#"
            event: response.output_item.added
            data: {"output_index":0,"item":{"type":"function_call","id":"fc_1","call_id":"call_1","name":"get_weather","arguments":""}}

            event: response.function_call_arguments.delta
            data: {"output_index":0,"call_id":"call_1","delta":"{\"city\":"}

            event: response.function_call_arguments.delta
            data: {"output_index":0,"item_id":"fc_1","delta":"\"Paris\"}"}

            event: response.function_call_arguments.done
            data: {"output_index":0,"call_id":"call_1","arguments":"{\"city\":\"Paris\"}"}
        "#};

        let mut parser = ResponsesStreamParser::new();
        collect(&mut parser, body);

        let call = &parser.state().tool_calls[0];
        assert_eq!(call.call_id, "call_1");
        assert_eq!(call.arguments, "{\"city\":\"Paris\"}");
        assert!(call.is_complete);
    }

    #[test]
    fn ids_are_fixed_across_added_and_done() {
        let body = indoc! {r#"
            event: response.output_item.added
            data: {"output_index":0,"item":{"type":"message","id":"canonical_123"}}

            event: response.output_item.done
            data: {"output_index":0,"item":{"type":"message","id":"different_456"}}
        "#};

        let mut parser = ResponsesStreamParser::new();
        let outputs = collect(&mut parser, body);

        let ScannerOutput::Event { data, .. } = &outputs[1] else {
            unreachable!("expected done event");
        };
        let value: serde_json::Value = serde_json::from_str(data).unwrap();
        assert_eq!(value["item"]["id"], "canonical_123");
    }

    #[test]
    fn silent_disconnect_flushes_open_blocks() {
        let body = indoc! {r#"
            event: response.output_item.added
            data: {"output_index":0,"item":{"type":"reasoning","id":"rs_1"}}

            event: response.reasoning_summary_text.delta
            data: {"output_index":0,"item_id":"rs_1","delta":"thinking hard"}

            event: response.output_item.added
            data: {"output_index":1,"item":{"type":"function_call","id":"fc_1","call_id":"call_1","name":"f","arguments":""}}

            event: response.function_call_arguments.delta
            data: {"output_index":1,"call_id":"call_1","delta":"{}"}
        "#};

        let mut parser = ResponsesStreamParser::new();
        collect(&mut parser, body);

        let mut flushed = Vec::new();
        parser.finish(&mut |o| flushed.push(o)).unwrap();

        let kinds: Vec<StreamEventKind> = flushed
            .iter()
            .filter_map(|o| match o {
                ScannerOutput::Event { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect();

        assert_eq!(
            kinds,
            [
                StreamEventKind::FunctionCallArgumentsDone,
                StreamEventKind::ReasoningSummaryTextDone
            ]
        );
        assert!(parser.state().tool_calls[0].is_complete);
        assert!(parser.state().reasoning[0].is_complete);

        // A second finish is a no-op.
        let mut again = Vec::new();
        parser.finish(&mut |o| again.push(o)).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn completed_records_usage_and_closes_everything() {
        let body = indoc! {r#"
            event: response.output_text.delta
            data: {"output_index":0,"delta":"hi"}

            event: response.completed
            data: {"response":{"id":"resp_1","usage":{"input_tokens":11,"output_tokens":3,"total_tokens":14}}}
        "#};

        let mut parser = ResponsesStreamParser::new();
        collect(&mut parser, body);

        let usage = parser.state().usage.unwrap();
        assert_eq!(usage.input_tokens, 11);
        assert_eq!(usage.output_tokens, 3);

        // Nothing left to flush.
        let mut flushed = Vec::new();
        parser.finish(&mut |o| flushed.push(o)).unwrap();
        assert!(flushed.is_empty());
    }

    #[test]
    fn malformed_data_is_a_hard_error() {
        let mut parser = ResponsesStreamParser::new();
        let result = parser.push(b"data: {broken\n", &mut |_| {});
        assert!(result.is_err());
    }
}
