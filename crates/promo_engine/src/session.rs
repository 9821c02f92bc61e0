use std::sync::Arc;

use engine_logging::{engine_debug, engine_info, engine_warn};
use futures_util::StreamExt;
use promo_core::{GenerationRequest, ScrapedArticle, StreamEvent, VARIATION_COUNT};

use crate::backend::{GenerationBackend, GenerationOptions};
use crate::enhance::Enhancer;
use crate::prompt::build_prompt;
use crate::types::{BackendError, BackendEvent};

/// Fixed temperature increment between successive variation indices, so
/// each variation is a little more adventurous than the previous one.
pub const TEMPERATURE_STEP: f32 = 0.1;

/// Sink for normalized session events. The relay frames them onto the wire;
/// tests record them.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StreamEvent);
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub base_temperature: f32,
    pub max_tokens: u32,
    /// Extra attempts when the backend completes without any text. Bounded
    /// so an always-empty backend degrades to a failed session instead of
    /// looping forever.
    pub max_empty_retries: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            base_temperature: 0.7,
            max_tokens: 400,
            max_empty_retries: 2,
        }
    }
}

/// Runs one generation stream for one variation index and normalizes its
/// lifecycle into [`StreamEvent`]s.
pub struct GenerationSession {
    backend: Arc<dyn GenerationBackend>,
    enhancer: Arc<dyn Enhancer>,
    settings: SessionSettings,
}

impl GenerationSession {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        enhancer: Arc<dyn Enhancer>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            backend,
            enhancer,
            settings,
        }
    }

    /// Produce the event sequence for one variation. Returns `Err` only
    /// when the backend stream cannot be established (or every retry of an
    /// empty result was exhausted); every other failure degrades in place.
    pub async fn run(
        &self,
        article: &ScrapedArticle,
        request: &GenerationRequest,
        index: usize,
        sink: &dyn EventSink,
    ) -> Result<(), BackendError> {
        let enhancement = if request.enhance {
            match self.enhancer.enhance(&article.title).await {
                Ok(text) => {
                    sink.emit(StreamEvent::WebSearchComplete);
                    if text.trim().is_empty() {
                        None
                    } else {
                        Some(text)
                    }
                }
                Err(err) => {
                    engine_warn!("enhancement lookup failed for variation {}: {err}", index + 1);
                    sink.emit(StreamEvent::WebSearchError {
                        error: err.to_string(),
                    });
                    None
                }
            }
        } else {
            None
        };

        let prompt = build_prompt(article, request, enhancement.as_deref(), index);
        sink.emit(StreamEvent::VariationInfo {
            index,
            total: VARIATION_COUNT,
            message: format!("バリエーション {}/{} を生成します", index + 1, VARIATION_COUNT),
        });

        let options = GenerationOptions {
            temperature: self.settings.base_temperature + index as f32 * TEMPERATURE_STEP,
            max_tokens: self.settings.max_tokens,
        };

        let mut retries_left = self.settings.max_empty_retries;
        loop {
            let produced = self.stream_once(&prompt, &options, sink).await?;
            if produced > 0 {
                engine_info!("variation {} produced {produced} chars", index + 1);
                sink.emit(StreamEvent::VariationComplete {
                    index,
                    message: format!("バリエーション {} が完成しました", index + 1),
                });
                return Ok(());
            }
            if retries_left == 0 {
                return Err(BackendError::Empty);
            }
            retries_left -= 1;
            engine_warn!(
                "variation {} came back empty, retrying ({retries_left} attempts left)",
                index + 1
            );
        }
    }

    /// One backend call. Returns the number of characters relayed.
    async fn stream_once(
        &self,
        prompt: &str,
        options: &GenerationOptions,
        sink: &dyn EventSink,
    ) -> Result<usize, BackendError> {
        let mut stream = self.backend.create_stream(prompt, options).await?;

        let mut produced = 0usize;
        while let Some(item) = stream.next().await {
            match item {
                Ok(BackendEvent::Progress) => sink.emit(StreamEvent::GenerationProgress),
                Ok(BackendEvent::Delta(text)) => {
                    if text.is_empty() {
                        engine_debug!("skipping empty backend delta");
                        continue;
                    }
                    produced += text.chars().count();
                    sink.emit(StreamEvent::ContentDelta { text });
                }
                Ok(BackendEvent::Complete) => sink.emit(StreamEvent::GenerationComplete),
                Err(err) => {
                    // A stream break after text has flowed is treated like
                    // an early completion; an empty break falls into the
                    // bounded retry path.
                    engine_warn!("backend stream interrupted: {err}");
                    break;
                }
            }
        }
        Ok(produced)
    }
}
