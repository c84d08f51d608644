//! Incremental decoder for `text/event-stream` bodies.
//!
//! Both the model API (chat completion chunks) and MCP tool servers (JSON-RPC
//! messages) speak server-sent events, so the framing lives here once.
use futures::stream::{BoxStream, Stream, StreamExt};

/// A single dispatched server-sent event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, `None` for the default `message` type
    pub event: Option<String>,
    /// All `data:` lines joined with `\n`
    pub data: String,
    pub id: Option<String>,
}

impl SseEvent {
    /// Event type, `message` when none was given
    pub fn kind(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    /// Feed a chunk of bytes, returning every event completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let newline = start + pos;
            let mut end = newline;
            if end > start && self.buffer[end - 1] == b'\r' {
                end -= 1;
            }
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            self.process_line(&line, &mut events);
            start = newline + 1;
        }
        if start > 0 {
            self.buffer.drain(..start);
        }

        events
    }

    /// Flush whatever is left once the body has ended
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
            self.process_line(&line, &mut events);
        }
        self.dispatch(&mut events);
        events
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<SseEvent>) {
        if line.is_empty() {
            self.dispatch(events);
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
    }

    fn dispatch(&mut self, events: &mut Vec<SseEvent>) {
        if self.data.is_empty() && self.event.is_none() {
            return;
        }
        events.push(SseEvent {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
            id: self.id.take(),
        });
    }
}

/// Turn a byte stream (e.g. `reqwest::Response::bytes_stream`) into events.
/// The first transport error is yielded and ends the stream.
pub fn decode_stream<S, B, E>(stream: S) -> BoxStream<'static, Result<SseEvent, E>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut decoder = SseDecoder::default();
        let mut stream = Box::pin(stream);
        while let Some(chunk) = stream.next().await {
            let events = match chunk {
                Ok(bytes) => decoder.push(bytes.as_ref()),
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            for event in events {
                yield Ok(event);
            }
        }
        for event in decoder.finish() {
            yield Ok(event);
        }
    })
}
