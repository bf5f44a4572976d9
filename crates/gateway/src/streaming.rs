//! SSE bridges between upstream response bodies and client streams.
//!
//! Each bridge owns its converters for the lifetime of one request and
//! re-frames events as they arrive; nothing is buffered beyond the
//! current upstream chunk. Dropping the returned stream (a client
//! disconnect) drops the upstream response with it, aborting the read.

use std::time::Instant;

use eventsource_stream::Eventsource;
use futures::StreamExt;
use protocol::{
    anthropic::StreamEvent,
    chat::{ChatCompletionChunk, ChatUsage},
};
use serde_json::Value;
use translate::stream::{
    ChatToAnthropicStream, ResponsesStreamParser, ResponsesToChatStream, ScannerOutput,
};

use crate::{GatewayError, UsageRecord};

/// Byte stream of SSE frames, ready to hand to the HTTP layer.
pub type SseStream = futures::stream::BoxStream<'static, Result<Vec<u8>, GatewayError>>;

const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

/// Per-stream telemetry, logged once when the stream ends.
pub(crate) struct StreamTelemetry {
    pub account_id: String,
    pub model: String,
    pub request_id: String,
    pub started: Instant,
    first_token_ms: Option<u128>,
}

impl StreamTelemetry {
    pub(crate) fn new(account_id: &str, model: &str, request_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            model: model.to_string(),
            request_id: request_id.to_string(),
            started: Instant::now(),
            first_token_ms: None,
        }
    }

    fn mark_first_token(&mut self) {
        if self.first_token_ms.is_none() {
            self.first_token_ms = Some(self.started.elapsed().as_millis());
        }
    }

    fn finish(&self, usage: Option<UsageRecord>) {
        log::info!(
            "stream completed: account={} model={} request_id={} duration_ms={} first_token_ms={:?} input_tokens={:?} output_tokens={:?}",
            self.account_id,
            self.model,
            self.request_id,
            self.started.elapsed().as_millis(),
            self.first_token_ms,
            usage.map(|u| u.input_tokens),
            usage.map(|u| u.output_tokens),
        );
    }
}

fn usage_from_chat(usage: Option<ChatUsage>) -> Option<UsageRecord> {
    usage.map(|u| UsageRecord {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    })
}

fn anthropic_frames(events: &[StreamEvent]) -> Vec<u8> {
    let mut out = Vec::new();

    for event in events {
        match serde_json::to_string(event) {
            Ok(json) => {
                out.extend_from_slice(
                    format!("event: {}\ndata: {json}\n\n", event.event_name()).as_bytes(),
                );
            }
            Err(e) => log::error!("failed to serialize stream event: {e}"),
        }
    }

    out
}

fn chat_frames(chunks: &[ChatCompletionChunk]) -> Vec<u8> {
    let mut out = Vec::new();

    for chunk in chunks {
        match serde_json::to_string(chunk) {
            Ok(json) => out.extend_from_slice(format!("data: {json}\n\n").as_bytes()),
            Err(e) => log::error!("failed to serialize chunk: {e}"),
        }
    }

    out
}

/// Chat Completions upstream → Anthropic Messages client.
pub(crate) fn chat_to_anthropic_sse(response: reqwest::Response, telemetry: StreamTelemetry) -> SseStream {
    let events = response.bytes_stream().eventsource();
    let state = (
        Box::pin(events),
        ChatToAnthropicStream::new(),
        telemetry,
        None::<ChatUsage>,
    );

    futures::stream::unfold(Some(state), |state| async move {
        let (mut events, mut converter, mut telemetry, mut usage) = state?;

        loop {
            match events.next().await {
                Some(Ok(event)) => {
                    if event.data == "[DONE]" {
                        let frames = anthropic_frames(&converter.finalize());
                        telemetry.finish(usage_from_chat(usage));
                        return Some((Ok(frames), None));
                    }

                    let chunk: ChatCompletionChunk = match serde_json::from_str(&event.data) {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            log::warn!("skipping unparseable chat chunk: {e}");
                            continue;
                        }
                    };

                    if chunk.usage.is_some() {
                        usage = chunk.usage;
                    }

                    let out = converter.process_chunk(&chunk);
                    if out.is_empty() {
                        continue;
                    }

                    telemetry.mark_first_token();
                    return Some((
                        Ok(anthropic_frames(&out)),
                        Some((events, converter, telemetry, usage)),
                    ));
                }
                Some(Err(e)) => {
                    log::warn!("SSE parse error in upstream chat stream: {e}");
                    continue;
                }
                None => {
                    // Upstream disconnected without [DONE]; terminate the
                    // client stream cleanly.
                    let frames = anthropic_frames(&converter.finalize());
                    telemetry.finish(usage_from_chat(usage));

                    if frames.is_empty() {
                        return None;
                    }
                    return Some((Ok(frames), None));
                }
            }
        }
    })
    .boxed()
}

/// Chat Completions upstream → Chat Completions client. Frames are
/// normalized and usage is captured on the way through.
pub(crate) fn chat_passthrough_sse(response: reqwest::Response, telemetry: StreamTelemetry) -> SseStream {
    let events = response.bytes_stream().eventsource();
    let state = (Box::pin(events), telemetry, None::<UsageRecord>);

    futures::stream::unfold(Some(state), |state| async move {
        let (mut events, mut telemetry, mut usage) = state?;

        loop {
            match events.next().await {
                Some(Ok(event)) => {
                    if event.data == "[DONE]" {
                        telemetry.finish(usage);
                        return Some((Ok(DONE_FRAME.to_vec()), None));
                    }

                    if let Ok(value) = serde_json::from_str::<Value>(&event.data)
                        && let Some(found) = crate::usage::extract_usage(&value)
                    {
                        usage = Some(found);
                    }

                    telemetry.mark_first_token();
                    let frame = format!("data: {}\n\n", event.data).into_bytes();
                    return Some((Ok(frame), Some((events, telemetry, usage))));
                }
                Some(Err(e)) => {
                    log::warn!("SSE parse error in upstream chat stream: {e}");
                    continue;
                }
                None => {
                    telemetry.finish(usage);
                    return Some((Ok(DONE_FRAME.to_vec()), None));
                }
            }
        }
    })
    .boxed()
}

/// Anthropic Messages upstream → Anthropic Messages client.
pub(crate) fn anthropic_passthrough_sse(
    response: reqwest::Response,
    telemetry: StreamTelemetry,
) -> SseStream {
    let events = response.bytes_stream().eventsource();
    let state = (Box::pin(events), telemetry, UsageRecord::default());

    futures::stream::unfold(Some(state), |state| async move {
        let (mut events, mut telemetry, mut usage) = state?;

        loop {
            match events.next().await {
                Some(Ok(event)) => {
                    if let Ok(value) = serde_json::from_str::<Value>(&event.data) {
                        match value["type"].as_str() {
                            Some("message_start") => {
                                usage.input_tokens = value["message"]["usage"]["input_tokens"]
                                    .as_u64()
                                    .unwrap_or(0) as u32;
                            }
                            Some("message_delta") => {
                                usage.output_tokens =
                                    value["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32;
                            }
                            _ => {}
                        }
                    }

                    telemetry.mark_first_token();

                    let name = if event.event.is_empty() || event.event == "message" {
                        None
                    } else {
                        Some(event.event.clone())
                    };

                    let frame = match name {
                        Some(name) => format!("event: {name}\ndata: {}\n\n", event.data),
                        None => format!("data: {}\n\n", event.data),
                    };

                    return Some((Ok(frame.into_bytes()), Some((events, telemetry, usage))));
                }
                Some(Err(e)) => {
                    log::warn!("SSE parse error in upstream anthropic stream: {e}");
                    continue;
                }
                None => {
                    usage.total_tokens = usage.input_tokens + usage.output_tokens;
                    telemetry.finish(Some(usage));
                    return None;
                }
            }
        }
    })
    .boxed()
}

/// How a Responses upstream stream is re-spoken to the client.
#[derive(Clone, Copy)]
pub(crate) enum ResponsesBridgeMode {
    /// Fixed ids, otherwise verbatim.
    Passthrough,
    /// Convert to Chat Completions chunks.
    ToChat,
    /// Convert to Chat chunks, then to Anthropic events.
    ToAnthropic,
}

/// Responses upstream → any client protocol.
pub(crate) fn responses_sse(
    response: reqwest::Response,
    mode: ResponsesBridgeMode,
    telemetry: StreamTelemetry,
) -> SseStream {
    struct BridgeState {
        parser: ResponsesStreamParser,
        to_chat: ResponsesToChatStream,
        to_anthropic: ChatToAnthropicStream,
        mode: ResponsesBridgeMode,
        telemetry: StreamTelemetry,
        usage: Option<UsageRecord>,
        done: bool,
    }

    impl BridgeState {
        fn render(&mut self, outputs: Vec<ScannerOutput>, frames: &mut Vec<u8>) {
            for output in outputs {
                match output {
                    ScannerOutput::Comment(comment) => {
                        if matches!(self.mode, ResponsesBridgeMode::Passthrough) {
                            frames.extend_from_slice(format!("{comment}\n\n").as_bytes());
                        }
                    }

                    ScannerOutput::Event { name, kind, data } => match self.mode {
                        ResponsesBridgeMode::Passthrough => {
                            frames.extend_from_slice(
                                format!("event: {name}\ndata: {data}\n\n").as_bytes(),
                            );
                        }
                        ResponsesBridgeMode::ToChat | ResponsesBridgeMode::ToAnthropic => {
                            let Ok(value) = serde_json::from_str::<Value>(&data) else {
                                continue;
                            };

                            let chunks = self.to_chat.process_event(kind, &value);

                            for chunk in &chunks {
                                if chunk.usage.is_some() {
                                    self.usage = usage_from_chat(chunk.usage);
                                }
                            }

                            match self.mode {
                                ResponsesBridgeMode::ToChat => {
                                    frames.extend_from_slice(&chat_frames(&chunks));
                                }
                                _ => {
                                    for chunk in &chunks {
                                        let events = self.to_anthropic.process_chunk(chunk);
                                        frames.extend_from_slice(&anthropic_frames(&events));
                                    }
                                }
                            }

                            if kind.is_terminal()
                                && let Some(found) = self.parser.state().usage
                            {
                                self.usage = Some(UsageRecord {
                                    input_tokens: found.input_tokens,
                                    output_tokens: found.output_tokens,
                                    total_tokens: found.total(),
                                });
                            }
                        }
                    },

                    ScannerOutput::Done => {
                        self.done = true;
                        match self.mode {
                            ResponsesBridgeMode::Passthrough | ResponsesBridgeMode::ToChat => {
                                frames.extend_from_slice(DONE_FRAME);
                            }
                            ResponsesBridgeMode::ToAnthropic => {
                                let events = self.to_anthropic.finalize();
                                frames.extend_from_slice(&anthropic_frames(&events));
                            }
                        }
                    }
                }
            }
        }

        fn close(&mut self, frames: &mut Vec<u8>) {
            if self.done {
                return;
            }
            self.done = true;

            let mut outputs = Vec::new();
            if let Err(e) = self.parser.finish(&mut |o| outputs.push(o)) {
                log::warn!("failed to flush responses stream: {e}");
            }
            self.render(outputs, frames);

            match self.mode {
                ResponsesBridgeMode::Passthrough | ResponsesBridgeMode::ToChat => {
                    frames.extend_from_slice(DONE_FRAME);
                }
                ResponsesBridgeMode::ToAnthropic => {
                    let events = self.to_anthropic.finalize();
                    frames.extend_from_slice(&anthropic_frames(&events));
                }
            }
        }
    }

    let body = response.bytes_stream();
    let state = BridgeState {
        parser: ResponsesStreamParser::new(),
        to_chat: ResponsesToChatStream::new(),
        to_anthropic: ChatToAnthropicStream::new(),
        mode,
        telemetry,
        usage: None,
        done: false,
    };

    futures::stream::unfold(Some((Box::pin(body), state)), |item| async move {
        let (mut body, mut state) = item?;

        loop {
            match body.next().await {
                Some(Ok(bytes)) => {
                    let mut outputs = Vec::new();
                    if let Err(e) = state.parser.push(bytes.as_ref(), &mut |o| outputs.push(o)) {
                        state.telemetry.finish(state.usage);
                        return Some((Err(GatewayError::from(e)), None));
                    }

                    let mut frames = Vec::new();
                    let was_done = state.done;
                    state.render(outputs, &mut frames);

                    if frames.is_empty() {
                        continue;
                    }

                    state.telemetry.mark_first_token();

                    if state.done && !was_done {
                        state.telemetry.finish(state.usage);
                        return Some((Ok(frames), None));
                    }

                    return Some((Ok(frames), Some((body, state))));
                }
                Some(Err(e)) => {
                    log::warn!("upstream read error: {e}");
                    let mut frames = Vec::new();
                    state.close(&mut frames);
                    state.telemetry.finish(state.usage);

                    if frames.is_empty() {
                        return None;
                    }
                    return Some((Ok(frames), None));
                }
                None => {
                    let mut frames = Vec::new();
                    state.close(&mut frames);
                    state.telemetry.finish(state.usage);

                    if frames.is_empty() {
                        return None;
                    }
                    return Some((Ok(frames), None));
                }
            }
        }
    })
    .boxed()
}
