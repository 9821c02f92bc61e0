//! Promo engine: IO side of the variation pipeline. Scraping, backend
//! streaming, the server-side relay and the client-side orchestrator.
mod backend;
mod decode;
mod enhance;
mod extract;
mod orchestrator;
mod prompt;
mod relay;
mod scrape;
mod session;
mod sse;
mod types;

pub use backend::{
    BackendEventStream, BackendSettings, GenerationBackend, GenerationOptions, HttpBackend,
};
pub use decode::{decode_page, DecodeError, DecodedPage};
pub use enhance::{EnhanceSettings, Enhancer, HttpEnhancer};
pub use extract::{ArticleExtractor, ExtractedArticle, Extractor};
pub use orchestrator::{
    ChannelOpener, HttpChannelOpener, NullProgressSink, Orchestrator, OrchestratorSettings,
    ProgressSink,
};
pub use prompt::build_prompt;
pub use relay::{RelaySettings, StreamRelay};
pub use scrape::{HttpScraper, ScrapeSettings, Scraper};
pub use session::{EventSink, GenerationSession, SessionSettings, TEMPERATURE_STEP};
pub use sse::{encode_event, encode_sentinel, Frame, FrameDecoder, LineBuffer, SseFrameSink, SENTINEL};
pub use types::{
    BackendError, BackendEvent, ByteStream, EnhanceError, OpenError, OrchestrateError, RetryPolicy,
    ScrapeError, ScrapeFailureKind,
};
