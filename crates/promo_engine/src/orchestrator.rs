use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_info, engine_warn};
use futures_util::StreamExt;
use promo_core::{
    aggregate, fallback_title_for, update, Effect, GeneratedVariation, GenerationRequest, Msg,
    RequestState, RequestView,
};
use tokio_util::sync::CancellationToken;

use crate::sse::{Frame, FrameDecoder};
use crate::types::{ByteStream, OpenError, OrchestrateError};

/// Opens the event channel for one variation index. The HTTP implementation
/// talks to the relay endpoint; tests wire the relay in directly.
#[async_trait::async_trait]
pub trait ChannelOpener: Send + Sync {
    async fn open(
        &self,
        request: &GenerationRequest,
        index: usize,
    ) -> Result<ByteStream, OpenError>;
}

/// Receives a state snapshot after every applied message.
pub trait ProgressSink: Send + Sync {
    fn update(&self, view: RequestView);
}

pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn update(&self, _view: RequestView) {}
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Pause between a session reaching terminal state and the next channel
    /// opening, letting the previous channel close cleanly.
    pub settle_delay: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
        }
    }
}

/// Client-side sequencer: drives the pure reducer with frames from one
/// channel at a time, strictly in index order, and aggregates the final
/// result once all three sessions are terminal.
pub struct Orchestrator {
    opener: Arc<dyn ChannelOpener>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(opener: Arc<dyn ChannelOpener>, settings: OrchestratorSettings) -> Self {
        Self { opener, settings }
    }

    /// Run the whole request. Returns the ordered 3-element result, or
    /// `Cancelled` without any partial output.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<GeneratedVariation>, OrchestrateError> {
        let mut state = RequestState::new(fallback_title_for(request));
        let mut pending = VecDeque::new();
        apply(&mut state, Msg::GenerateRequested, &mut pending, progress);

        while let Some(effect) = pending.pop_front() {
            match effect {
                Effect::OpenChannel { index } => {
                    if index > 0 {
                        tokio::select! {
                            () = cancel.cancelled() => {}
                            () = tokio::time::sleep(self.settings.settle_delay) => {}
                        }
                    }
                    if cancel.is_cancelled() {
                        apply(&mut state, Msg::CancelRequested, &mut pending, progress);
                        return Err(OrchestrateError::Cancelled);
                    }
                    self.run_channel(&mut state, request, index, cancel, &mut pending, progress)
                        .await?;
                }
                Effect::Finalize => {
                    engine_info!("all variations terminal, aggregating result");
                    return Ok(aggregate(&state, request));
                }
            }
        }

        // The reducer always closes with Finalize; an empty queue without it
        // means cancellation raced ahead of the first channel.
        Err(OrchestrateError::Cancelled)
    }

    /// Consume one channel until its sentinel (or its death). The session is
    /// guaranteed terminal on return; follow-up effects land in `pending`.
    async fn run_channel(
        &self,
        state: &mut RequestState,
        request: &GenerationRequest,
        index: usize,
        cancel: &CancellationToken,
        pending: &mut VecDeque<Effect>,
        progress: &dyn ProgressSink,
    ) -> Result<(), OrchestrateError> {
        engine_info!("opening channel for variation {}", index + 1);
        let opened = tokio::select! {
            () = cancel.cancelled() => None,
            opened = self.opener.open(request, index) => Some(opened),
        };

        let mut stream = match opened {
            Some(Ok(stream)) => stream,
            Some(Err(err)) => {
                engine_warn!("channel {} failed to open: {err}", index + 1);
                apply(state, Msg::ChannelClosed { index }, pending, progress);
                return Ok(());
            }
            None => {
                apply(state, Msg::CancelRequested, pending, progress);
                return Err(OrchestrateError::Cancelled);
            }
        };

        let mut decoder = FrameDecoder::new();
        loop {
            let item = tokio::select! {
                () = cancel.cancelled() => {
                    // Dropping the stream closes the underlying channel.
                    apply(state, Msg::CancelRequested, pending, progress);
                    return Err(OrchestrateError::Cancelled);
                }
                item = stream.next() => item,
            };

            match item {
                Some(Ok(chunk)) => {
                    for frame in decoder.push(&chunk) {
                        match frame {
                            Frame::Event(event) => {
                                apply(state, Msg::ChannelEvent { index, event }, pending, progress);
                            }
                            Frame::Done => {
                                apply(state, Msg::ChannelClosed { index }, pending, progress);
                                return Ok(());
                            }
                        }
                    }
                }
                Some(Err(err)) => {
                    engine_warn!("channel {} read failed: {err}", index + 1);
                    apply(state, Msg::ChannelClosed { index }, pending, progress);
                    return Ok(());
                }
                None => {
                    engine_warn!("channel {} closed without sentinel", index + 1);
                    apply(state, Msg::ChannelClosed { index }, pending, progress);
                    return Ok(());
                }
            }
        }
    }
}

fn apply(
    state: &mut RequestState,
    msg: Msg,
    pending: &mut VecDeque<Effect>,
    progress: &dyn ProgressSink,
) {
    let (next, effects) = update(state.clone(), msg);
    *state = next;
    pending.extend(effects);
    progress.update(state.view());
}

/// Opens channels against a running relay server over HTTP. Built without
/// an overall request timeout: the channel stays open for the whole
/// generation, bounded by the server side.
pub struct HttpChannelOpener {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChannelOpener {
    pub fn new(base_url: impl Into<String>) -> Result<Self, OpenError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| OpenError::Connect(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait::async_trait]
impl ChannelOpener for HttpChannelOpener {
    async fn open(
        &self,
        request: &GenerationRequest,
        index: usize,
    ) -> Result<ByteStream, OpenError> {
        let payload =
            serde_json::to_string(request).map_err(|err| OpenError::Connect(err.to_string()))?;

        let response = self
            .client
            .get(format!(
                "{}/api/generate-stream",
                self.base_url.trim_end_matches('/')
            ))
            .query(&[("requestData", payload), ("variationIndex", index.to_string())])
            .send()
            .await
            .map_err(|err| OpenError::Connect(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OpenError::HttpStatus(status.as_u16()));
        }

        Ok(Box::pin(response.bytes_stream().map(|item| {
            item.map_err(|err| OpenError::Read(err.to_string()))
        })))
    }
}
