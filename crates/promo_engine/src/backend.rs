use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use engine_logging::engine_warn;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::sse::{LineBuffer, SENTINEL};
use crate::types::{BackendError, BackendEvent};

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// One opened generation call: an ordered sequence of backend events.
pub type BackendEventStream =
    Pin<Box<dyn Stream<Item = Result<BackendEvent, BackendError>> + Send>>;

/// Generative text backend collaborator. `create_stream` fails only when
/// the connection cannot be established; everything after that arrives as
/// stream items.
#[async_trait::async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn create_stream(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<BackendEventStream, BackendError>;
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    pub model: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            model: "promo-writer-ja".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Streaming HTTP client for the generation backend. The client instance is
/// constructed explicitly with its timeouts; there is no process-wide
/// singleton.
pub struct HttpBackend {
    client: reqwest::Client,
    settings: BackendSettings,
}

impl HttpBackend {
    pub fn new(settings: BackendSettings) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| BackendError::Connect(err.to_string()))?;
        Ok(Self { client, settings })
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequestBody<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

/// The backend's own wire events, as decoded from its SSE body.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BackendWireEvent {
    Status,
    Delta { text: String },
    Done,
}

#[async_trait::async_trait]
impl GenerationBackend for HttpBackend {
    async fn create_stream(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<BackendEventStream, BackendError> {
        let body = GenerateRequestBody {
            model: &self.settings.model,
            prompt,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/v1/generate", self.settings.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|err| BackendError::Connect(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Connect(format!(
                "backend returned status {status}"
            )));
        }

        let bytes: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>> =
            Box::pin(response.bytes_stream());
        let state = (bytes, LineBuffer::new(), VecDeque::new(), false);

        let stream = futures_util::stream::unfold(state, decode_step);
        Ok(Box::pin(stream))
    }
}

type DecodeState = (
    Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    LineBuffer,
    VecDeque<BackendEvent>,
    bool,
);

async fn decode_step(
    mut state: DecodeState,
) -> Option<(Result<BackendEvent, BackendError>, DecodeState)> {
    loop {
        if let Some(event) = state.2.pop_front() {
            return Some((Ok(event), state));
        }
        if state.3 {
            return None;
        }
        match state.0.next().await {
            Some(Ok(chunk)) => {
                for line in state.1.push(&chunk) {
                    if let Some(event) = decode_wire_line(&line) {
                        match event {
                            DecodedLine::Event(event) => state.2.push_back(event),
                            DecodedLine::End => {
                                state.3 = true;
                                break;
                            }
                        }
                    }
                }
            }
            Some(Err(err)) => {
                state.3 = true;
                return Some((Err(BackendError::Stream(err.to_string())), state));
            }
            None => {
                state.3 = true;
            }
        }
    }
}

enum DecodedLine {
    Event(BackendEvent),
    End,
}

fn decode_wire_line(line: &str) -> Option<DecodedLine> {
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let payload = line.strip_prefix("data:")?;
    let payload = payload.strip_prefix(' ').unwrap_or(payload);
    if payload == SENTINEL {
        return Some(DecodedLine::End);
    }
    match serde_json::from_str::<BackendWireEvent>(payload) {
        Ok(BackendWireEvent::Status) => Some(DecodedLine::Event(BackendEvent::Progress)),
        Ok(BackendWireEvent::Delta { text }) => Some(DecodedLine::Event(BackendEvent::Delta(text))),
        Ok(BackendWireEvent::Done) => Some(DecodedLine::Event(BackendEvent::Complete)),
        Err(err) => {
            engine_warn!("skipping malformed backend event: {err}");
            None
        }
    }
}
