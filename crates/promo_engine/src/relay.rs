use std::sync::Arc;

use bytes::Bytes;
use engine_logging::{engine_error, engine_info, engine_warn};
use promo_core::{
    fallback_title_for, GenerationRequest, ScrapedArticle, ScrapedContentData, StreamEvent,
    VARIATION_COUNT,
};
use tokio::sync::mpsc;

use crate::scrape::Scraper;
use crate::session::{EventSink, GenerationSession};
use crate::sse::SseFrameSink;

#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Scraped content shorter than this (in characters) is replaced by the
    /// request-derived placeholder.
    pub min_content_len: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            min_content_len: 100,
        }
    }
}

/// Server-side loop: drives content resolution plus one generation session
/// and serializes everything onto a single SSE byte channel. Every run ends
/// with the sentinel, no matter what failed upstream.
pub struct StreamRelay {
    scraper: Arc<dyn Scraper>,
    session: GenerationSession,
    settings: RelaySettings,
}

impl StreamRelay {
    pub fn new(
        scraper: Arc<dyn Scraper>,
        session: GenerationSession,
        settings: RelaySettings,
    ) -> Self {
        Self {
            scraper,
            session,
            settings,
        }
    }

    /// Run one variation end to end, writing frames to `tx`. The receiver
    /// half is the long-lived byte channel handed to the transport.
    pub async fn run(&self, request: &GenerationRequest, index: usize, tx: mpsc::UnboundedSender<Bytes>) {
        let sink = SseFrameSink::new(tx);
        self.run_inner(request, index, &sink).await;
        sink.finish();
    }

    async fn run_inner(&self, request: &GenerationRequest, index: usize, sink: &SseFrameSink) {
        engine_info!("relay: starting variation {}/{}", index + 1, VARIATION_COUNT);
        sink.emit(StreamEvent::ProcessStart);

        let article = self.resolve_article(request, sink).await;

        sink.emit(StreamEvent::VariationInfo {
            index,
            total: VARIATION_COUNT,
            message: format!("バリエーション {}/{}", index + 1, VARIATION_COUNT),
        });
        sink.emit(StreamEvent::GenerationStarting);

        if let Err(err) = self.session.run(&article, request, index, sink).await {
            engine_error!("relay: variation {} failed: {err}", index + 1);
            sink.emit(StreamEvent::Error {
                error: err.to_string(),
            });
        }
    }

    /// Resolve the article shared by this session: pre-scraped content when
    /// supplied, a live scrape otherwise, and the placeholder on any
    /// failure or too-short result. This step never aborts the stream.
    async fn resolve_article(
        &self,
        request: &GenerationRequest,
        sink: &SseFrameSink,
    ) -> ScrapedArticle {
        if let Some(article) = &request.prescraped {
            if !article.content.trim().is_empty() {
                emit_scraped(sink, article);
                return article.clone();
            }
        }

        let Some(url) = request.url.as_deref() else {
            let warning = "記事URLが指定されていません".to_string();
            return self.substitute_placeholder(request, sink, warning);
        };

        match self.scraper.scrape(url).await {
            Ok(article) if article.content.chars().count() >= self.settings.min_content_len => {
                emit_scraped(sink, &article);
                article
            }
            Ok(article) => {
                let warning = format!(
                    "記事本文が短すぎます ({} 文字)",
                    article.content.chars().count()
                );
                self.substitute_placeholder(request, sink, warning)
            }
            Err(err) => self.substitute_placeholder(request, sink, err.to_string()),
        }
    }

    fn substitute_placeholder(
        &self,
        request: &GenerationRequest,
        sink: &SseFrameSink,
        warning: String,
    ) -> ScrapedArticle {
        engine_warn!("relay: using placeholder content: {warning}");
        sink.emit(StreamEvent::ScrapingWarning { warning });
        placeholder_article(request)
    }
}

fn emit_scraped(sink: &SseFrameSink, article: &ScrapedArticle) {
    sink.emit(StreamEvent::ScrapedContent {
        data: ScrapedContentData {
            title: article.title.clone(),
            content_length: article.content.chars().count(),
            image_count: article.images.len(),
        },
    });
}

/// Deterministic stand-in article when no usable content could be resolved.
fn placeholder_article(request: &GenerationRequest) -> ScrapedArticle {
    let title = fallback_title_for(request);
    let content = match request.url.as_deref() {
        Some(url) => format!(
            "「{title}」の紹介記事です。詳しい内容は {url} をご覧ください。"
        ),
        None => format!("「{title}」の紹介記事です。"),
    };
    ScrapedArticle {
        title,
        content,
        images: Vec::new(),
    }
}
