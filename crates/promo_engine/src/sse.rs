use bytes::Bytes;
use engine_logging::engine_warn;
use promo_core::StreamEvent;
use tokio::sync::mpsc;

use crate::session::EventSink;

/// Terminal marker closing every channel: `data: [DONE]`.
pub const SENTINEL: &str = "[DONE]";

/// Frame one event as an SSE message: `data: <JSON>\n\n`.
pub fn encode_event(event: &StreamEvent) -> Bytes {
    match serde_json::to_string(event) {
        Ok(json) => Bytes::from(format!("data: {json}\n\n")),
        Err(err) => {
            // Unreachable for this enum, but the channel must keep flowing.
            engine_warn!("failed to serialize stream event: {err}");
            Bytes::from_static(b"data: {\"type\":\"error\",\"error\":\"serialization\"}\n\n")
        }
    }
}

pub fn encode_sentinel() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

/// Splits an incoming byte stream into text lines, tolerant of CRLF endings
/// and of chunk boundaries landing mid-line.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            match String::from_utf8(line) {
                Ok(text) => lines.push(text),
                Err(err) => engine_warn!("dropping non-utf8 stream line: {err}"),
            }
        }
        lines
    }
}

/// One decoded unit of the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Event(StreamEvent),
    Done,
}

/// Client-side decoder: SSE bytes in, protocol frames out. Malformed
/// payloads are dropped and logged; they never abort the channel.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    lines: LineBuffer,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        for line in self.lines.push(chunk) {
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let Some(payload) = line.strip_prefix("data:") else {
                // Other SSE fields (event:, id:, retry:) are not part of
                // this protocol.
                continue;
            };
            let payload = payload.strip_prefix(' ').unwrap_or(payload);
            if payload == SENTINEL {
                frames.push(Frame::Done);
                continue;
            }
            match serde_json::from_str::<StreamEvent>(payload) {
                Ok(event) => frames.push(Frame::Event(event)),
                Err(err) => engine_warn!("dropping malformed stream event: {err}"),
            }
        }
        frames
    }
}

/// Server-side sink: frames every emitted event onto the byte channel.
/// Send failures mean the consumer went away; the relay keeps running so
/// its own lifecycle stays deterministic.
pub struct SseFrameSink {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl SseFrameSink {
    pub fn new(tx: mpsc::UnboundedSender<Bytes>) -> Self {
        Self { tx }
    }

    /// Emit the terminating sentinel. Called exactly once per channel.
    pub fn finish(&self) {
        let _ = self.tx.send(encode_sentinel());
    }
}

impl EventSink for SseFrameSink {
    fn emit(&self, event: StreamEvent) {
        let _ = self.tx.send(encode_event(&event));
    }
}

#[cfg(test)]
mod tests {
    use super::{encode_event, Frame, FrameDecoder};
    use promo_core::StreamEvent;

    #[test]
    fn decoder_reassembles_frames_split_across_chunks() {
        let mut decoder = FrameDecoder::new();
        let encoded = encode_event(&StreamEvent::ProcessStart);
        let (head, tail) = encoded.split_at(7);

        assert!(decoder.push(head).is_empty());
        let frames = decoder.push(tail);
        assert_eq!(frames, vec![Frame::Event(StreamEvent::ProcessStart)]);
    }

    #[test]
    fn decoder_handles_crlf_and_comments() {
        let mut decoder = FrameDecoder::new();
        let frames =
            decoder.push(b": keepalive\r\ndata: {\"type\":\"generation_starting\"}\r\n\r\n");
        assert_eq!(frames, vec![Frame::Event(StreamEvent::GenerationStarting)]);
    }

    #[test]
    fn malformed_payload_is_dropped_not_fatal() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"data: {not json}\n\ndata: [DONE]\n\n");
        assert_eq!(frames, vec![Frame::Done]);
    }
}
