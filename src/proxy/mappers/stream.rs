use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::proxy::mappers::wire;
use crate::proxy::memory::MemoryGateway;

pub const DONE_SENTINEL: &str = "[DONE]";
pub const MEMORY_SUMMARY_CHARS: usize = 2000;

pub type ClientStream = Pin<Box<dyn Stream<Item = Result<Bytes, String>> + Send>>;

/// Two independently-paced views over one upstream byte sequence. The
/// channels are unbounded so neither consumer can back-pressure the other;
/// both observe the identical chunks.
pub struct StreamBranches {
    pub primary: mpsc::UnboundedReceiver<Result<Bytes, String>>,
    pub inspect: mpsc::UnboundedReceiver<Bytes>,
}

pub fn split_upstream_stream<S, E>(upstream: S) -> StreamBranches
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let (primary_tx, primary_rx) = mpsc::unbounded_channel();
    let (inspect_tx, inspect_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        futures::pin_mut!(upstream);
        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(bytes) => {
                    let _ = inspect_tx.send(bytes.clone());
                    // A closed primary means the client went away; keep
                    // draining so the inspector still sees the full reply.
                    // The upstream body is finite, so the drain is bounded.
                    let _ = primary_tx.send(Ok(bytes));
                }
                Err(e) => {
                    let _ = primary_tx.send(Err(format!("Upstream stream error: {}", e)));
                    break;
                }
            }
        }
    });

    StreamBranches {
        primary: primary_rx,
        inspect: inspect_rx,
    }
}

fn find_event_boundary(buffer: &BytesMut) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

// Event-stream framing: only `data:` lines contribute, multiple data lines
// within one event are concatenated.
fn event_data_payload(raw_event: &str) -> Option<String> {
    let data_lines: Vec<&str> = raw_event
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("data:"))
        .map(|line| line[5..].trim())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.concat())
    }
}

fn emit_finish(finished: &mut bool) -> Vec<Bytes> {
    if *finished {
        return vec![];
    }
    *finished = true;
    vec![wire::finish_part()]
}

fn transform_event(raw_event: &str, finished: &mut bool, trace_id: &str) -> Vec<Bytes> {
    let Some(payload) = event_data_payload(raw_event) else {
        return vec![];
    };

    if payload == DONE_SENTINEL {
        return emit_finish(finished);
    }

    let parsed: Value = match serde_json::from_str(&payload) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("[{}] Failed to parse upstream chunk: {}", trace_id, e);
            return vec![];
        }
    };

    match parsed.get("type").and_then(Value::as_str) {
        Some("token") | Some("delta") => {
            let token = parsed
                .get("content")
                .and_then(Value::as_str)
                .or_else(|| parsed.get("delta").and_then(Value::as_str));
            match token {
                Some(text) if !text.is_empty() => vec![wire::text_part(text)],
                _ => vec![],
            }
        }
        Some("error") => {
            let message = parsed
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("Upstream chat error");
            vec![wire::error_part(message)]
        }
        Some("final") => emit_finish(finished),
        other => {
            tracing::debug!("[{}] Dropping unrecognized upstream event: {:?}", trace_id, other);
            vec![]
        }
    }
}

/// Re-frames the primary branch into the client wire protocol. The outbound
/// stream is always well-terminated: exactly one finish frame per stream,
/// synthesized at transport EOF when the sentinel never arrived. A transport
/// error aborts the body with an error signal instead of a silent close.
pub fn create_client_stream(
    mut primary: mpsc::UnboundedReceiver<Result<Bytes, String>>,
    trace_id: String,
) -> ClientStream {
    use async_stream::stream;

    Box::pin(stream! {
        let mut buffer = BytesMut::new();
        let mut finished = false;

        while let Some(chunk) = primary.recv().await {
            match chunk {
                Ok(bytes) => {
                    buffer.extend_from_slice(&bytes);
                    while let Some(pos) = find_event_boundary(&buffer) {
                        let raw = buffer.split_to(pos + 2);
                        let event = String::from_utf8_lossy(&raw).to_string();
                        for frame in transform_event(&event, &mut finished, &trace_id) {
                            yield Ok(frame);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("[{}] Aborting client stream: {}", trace_id, e);
                    yield Err(e);
                    return;
                }
            }
        }
        if !buffer.is_empty() {
            let event = String::from_utf8_lossy(&buffer).to_string();
            for frame in transform_event(&event, &mut finished, &trace_id) {
                yield Ok(frame);
            }
        }
        for frame in emit_finish(&mut finished) {
            yield Ok(frame);
        }
    })
}

fn inspect_event(
    raw_event: &str,
    assistant_buffer: &mut String,
    sources_tx: &mpsc::UnboundedSender<Value>,
    log_pii: bool,
    trace_id: &str,
) {
    let Some(payload) = event_data_payload(raw_event) else {
        return;
    };
    if payload == DONE_SENTINEL {
        return;
    }

    match serde_json::from_str::<Value>(&payload) {
        Ok(parsed) => {
            if parsed.get("type").and_then(Value::as_str) == Some("sources") {
                if let Some(sources) = parsed.get("sources").filter(|s| s.is_array()) {
                    let _ = sources_tx.send(sources.clone());
                    return;
                }
            }
            let token = parsed
                .get("content")
                .and_then(Value::as_str)
                .or_else(|| parsed.get("data").and_then(Value::as_str))
                .or_else(|| parsed.get("delta").and_then(Value::as_str));
            if let Some(text) = token {
                assistant_buffer.push_str(text);
            }
        }
        Err(e) => {
            // Non-JSON data lines count as plain assistant text.
            if log_pii {
                tracing::debug!("[{}] Inspector accumulating raw payload ({})", trace_id, e);
            }
            assistant_buffer.push_str(&payload);
        }
    }
}

async fn inspect_stream(
    mut inspect: mpsc::UnboundedReceiver<Bytes>,
    sources_tx: mpsc::UnboundedSender<Value>,
    log_pii: bool,
    trace_id: &str,
) -> String {
    let mut buffer = BytesMut::new();
    let mut assistant_buffer = String::new();

    while let Some(chunk) = inspect.recv().await {
        buffer.extend_from_slice(&chunk);
        while let Some(pos) = find_event_boundary(&buffer) {
            let raw = buffer.split_to(pos + 2);
            let event = String::from_utf8_lossy(&raw).to_string();
            inspect_event(&event, &mut assistant_buffer, &sources_tx, log_pii, trace_id);
        }
    }
    if !buffer.is_empty() {
        let event = String::from_utf8_lossy(&buffer).to_string();
        inspect_event(&event, &mut assistant_buffer, &sources_tx, log_pii, trace_id);
    }

    assistant_buffer
}

pub struct InspectorContext {
    pub user_id: String,
    pub memory: Arc<MemoryGateway>,
    pub log_pii: bool,
    pub trace_id: String,
}

/// Best-effort branch: runs detached from the response lifecycle, closes the
/// side-channel when the bytes run out, then persists the accumulated reply.
/// Nothing here is awaited by the client-facing path and nothing here can
/// fail it.
pub fn spawn_stream_inspector(
    inspect: mpsc::UnboundedReceiver<Bytes>,
    sources_tx: mpsc::UnboundedSender<Value>,
    ctx: InspectorContext,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let assistant_buffer =
            inspect_stream(inspect, sources_tx, ctx.log_pii, &ctx.trace_id).await;

        let trimmed = assistant_buffer.trim();
        if ctx.memory.is_active() && !trimmed.is_empty() {
            ctx.memory
                .persist(&ctx.user_id, &tail_chars(trimmed, MEMORY_SUMMARY_CHARS))
                .await;
        }
    })
}

// Last `limit` characters on char boundaries; the recent end of the reply is
// the part worth remembering.
fn tail_chars(value: &str, limit: usize) -> String {
    let count = value.chars().count();
    value.chars().skip(count.saturating_sub(limit)).collect()
}

/// Interleaves side-channel frames into the client stream. The merged stream
/// ends when the transformer ends; queued side-channel frames are drained at
/// that point, but the inspector is never waited on.
pub fn merge_client_stream(
    mut client: ClientStream,
    mut sources_rx: mpsc::UnboundedReceiver<Value>,
) -> ClientStream {
    use async_stream::stream;

    enum Merged {
        Client(Option<Result<Bytes, String>>),
        Source(Option<Value>),
    }

    Box::pin(stream! {
        let mut sources_open = true;
        loop {
            let next = tokio::select! {
                part = client.next() => Merged::Client(part),
                source = sources_rx.recv(), if sources_open => Merged::Source(source),
            };
            match next {
                Merged::Client(Some(Ok(frame))) => yield Ok(frame),
                Merged::Client(Some(Err(e))) => {
                    yield Err(e);
                    return;
                }
                Merged::Client(None) => break,
                Merged::Source(Some(value)) => yield Ok(wire::data_part(&value)),
                Merged::Source(None) => sources_open = false,
            }
        }
        while let Ok(value) = sources_rx.try_recv() {
            yield Ok(wire::data_part(&value));
        }
    })
}
