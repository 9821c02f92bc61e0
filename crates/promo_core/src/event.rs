use serde::{Deserialize, Serialize};

/// Summary attached to a successful `scraped_content` event. Field names
/// stay camelCase on the wire for the browser client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedContentData {
    pub title: String,
    pub content_length: usize,
    pub image_count: usize,
}

/// Wire-level event envelope carried as `data: <JSON>` on the stream.
///
/// The `type` tag is the discriminator the browser client switches on, so
/// the snake_case names here are part of the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    ProcessStart,
    ScrapedContent {
        data: ScrapedContentData,
    },
    ScrapingWarning {
        warning: String,
    },
    VariationInfo {
        index: usize,
        total: usize,
        message: String,
    },
    GenerationStarting,
    /// Backend status signal: the generation call is underway.
    GenerationProgress,
    /// Backend token delta; the client appends `text` to the session.
    ContentDelta {
        text: String,
    },
    /// Backend text-complete signal, ahead of `variation_complete`.
    GenerationComplete,
    WebSearchComplete,
    WebSearchError {
        error: String,
    },
    VariationComplete {
        index: usize,
        message: String,
    },
    Error {
        error: String,
    },
}
