use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt as _;
use promo_core::{GenerationRequest, RequestView, ScrapedArticle, SessionStatus};
use promo_engine::{
    BackendError, BackendEvent, ByteStream, ChannelOpener, GenerationBackend, GenerationOptions,
    GenerationSession, NullProgressSink, OpenError, Orchestrator, OrchestratorSettings,
    OrchestrateError, ProgressSink, RelaySettings, ScrapeError, Scraper, SessionSettings,
    StreamRelay,
};
use tokio_util::sync::CancellationToken;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

fn article() -> ScrapedArticle {
    ScrapedArticle {
        title: "Example Post".to_string(),
        content: "記".repeat(200),
        images: Vec::new(),
    }
}

fn request() -> GenerationRequest {
    GenerationRequest {
        url: Some("https://blog.example.com/post".to_string()),
        selected_images: vec!["https://cdn.example.com/a.png".to_string()],
        ..GenerationRequest::default()
    }
}

fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        settle_delay: Duration::from_millis(1),
    }
}

struct FixedScraper(ScrapedArticle);

#[async_trait::async_trait]
impl Scraper for FixedScraper {
    async fn scrape(&self, _url: &str) -> Result<ScrapedArticle, ScrapeError> {
        Ok(self.0.clone())
    }
}

struct UnusedEnhancer;

#[async_trait::async_trait]
impl promo_engine::Enhancer for UnusedEnhancer {
    async fn enhance(&self, _topic: &str) -> Result<String, promo_engine::EnhanceError> {
        Ok(String::new())
    }
}

/// Backend that refuses connections for the configured indices. The index
/// is recovered from the temperature ladder, which encodes it.
struct IndexedBackend {
    failing: Vec<usize>,
    base_temperature: f32,
}

impl IndexedBackend {
    fn index_of(&self, options: &GenerationOptions) -> usize {
        ((options.temperature - self.base_temperature) / promo_engine::TEMPERATURE_STEP).round()
            as usize
    }
}

#[async_trait::async_trait]
impl GenerationBackend for IndexedBackend {
    async fn create_stream(
        &self,
        _prompt: &str,
        options: &GenerationOptions,
    ) -> Result<promo_engine::BackendEventStream, BackendError> {
        let index = self.index_of(options);
        if self.failing.contains(&index) {
            return Err(BackendError::Connect("connection refused".to_string()));
        }
        Ok(Box::pin(futures_util::stream::iter(
            vec![
                Ok(BackendEvent::Progress),
                Ok(BackendEvent::Delta(format!("案{}の本文です。", index + 1))),
                Ok(BackendEvent::Complete),
            ]
            .into_iter(),
        )))
    }
}

/// In-process opener: each open spawns a real relay run and hands back its
/// byte channel, recording the opened indices and every emitted chunk.
struct RelayOpener {
    relay: Arc<StreamRelay>,
    opened: Mutex<Vec<usize>>,
    chunks: Arc<Mutex<Vec<(usize, Bytes)>>>,
}

impl RelayOpener {
    fn new(failing: Vec<usize>) -> Self {
        let settings = SessionSettings::default();
        let backend = IndexedBackend {
            failing,
            base_temperature: settings.base_temperature,
        };
        let session =
            GenerationSession::new(Arc::new(backend), Arc::new(UnusedEnhancer), settings);
        let relay = StreamRelay::new(
            Arc::new(FixedScraper(article())),
            session,
            RelaySettings::default(),
        );
        Self {
            relay: Arc::new(relay),
            opened: Mutex::new(Vec::new()),
            chunks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn opened(&self) -> Vec<usize> {
        self.opened.lock().unwrap().clone()
    }

    fn channel_bytes(&self, index: usize) -> Vec<u8> {
        self.chunks
            .lock()
            .unwrap()
            .iter()
            .filter(|(i, _)| *i == index)
            .flat_map(|(_, chunk)| chunk.iter().copied())
            .collect()
    }
}

#[async_trait::async_trait]
impl ChannelOpener for RelayOpener {
    async fn open(
        &self,
        request: &GenerationRequest,
        index: usize,
    ) -> Result<ByteStream, OpenError> {
        self.opened.lock().unwrap().push(index);

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let relay = self.relay.clone();
        let request = request.clone();
        tokio::spawn(async move {
            relay.run(&request, index, tx).await;
        });

        let chunks = self.chunks.clone();
        let stream = futures_util::stream::unfold(rx, move |mut rx| {
            let chunks = chunks.clone();
            async move {
                let chunk = rx.recv().await?;
                chunks.lock().unwrap().push((index, chunk.clone()));
                Some((Ok(chunk), rx))
            }
        });
        Ok(Box::pin(stream))
    }
}

#[derive(Default)]
struct RecordingProgress {
    views: Mutex<Vec<RequestView>>,
}

impl ProgressSink for RecordingProgress {
    fn update(&self, view: RequestView) {
        self.views.lock().unwrap().push(view);
    }
}

#[tokio::test]
async fn one_failing_backend_yields_fallback_and_the_rest_complete() {
    init_logging();
    let opener = Arc::new(RelayOpener::new(vec![1]));
    let orchestrator = Orchestrator::new(opener.clone(), fast_settings());
    let progress = RecordingProgress::default();

    let variations = orchestrator
        .generate(&request(), &CancellationToken::new(), &progress)
        .await
        .unwrap();

    assert_eq!(variations.len(), 3);
    assert_eq!(variations[0].content, "案1の本文です。");
    assert!(variations[1].content.contains("バリエーション 2 の生成に失敗しました"));
    assert!(variations[1].content.contains("Example Post"));
    assert_eq!(variations[2].content, "案3の本文です。");

    // Markdown carries the selected image and the source link, in order.
    assert_eq!(
        variations[0].markdown,
        "案1の本文です。\n\n![](https://cdn.example.com/a.png)\n\n[元記事](https://blog.example.com/post)"
    );

    // Strict sequencing: each channel opened exactly once, in index order.
    assert_eq!(opener.opened(), vec![0, 1, 2]);

    // Per-session progress is non-decreasing across every snapshot.
    let views = progress.views.lock().unwrap();
    for index in 0..3 {
        let mut previous = 0;
        for view in views.iter() {
            let progress = view.sessions[index].progress;
            assert!(progress >= previous);
            previous = progress;
        }
    }
}

#[tokio::test]
async fn every_backend_failing_still_terminates_all_channels() {
    init_logging();
    let opener = Arc::new(RelayOpener::new(vec![0, 1, 2]));
    let orchestrator = Orchestrator::new(opener.clone(), fast_settings());

    let variations = orchestrator
        .generate(&request(), &CancellationToken::new(), &NullProgressSink)
        .await
        .unwrap();

    assert_eq!(variations.len(), 3);
    for (index, variation) in variations.iter().enumerate() {
        assert!(variation.content.contains(&format!(
            "バリエーション {} の生成に失敗しました",
            index + 1
        )));
        assert!(variation.content.contains("Example Post"));
    }

    // Each of the three underlying channels terminated with the sentinel.
    for index in 0..3 {
        let bytes = opener.channel_bytes(index);
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.matches("data: [DONE]").count(), 1);
        assert!(text.ends_with("data: [DONE]\n\n"));
    }
}

#[tokio::test]
async fn open_failures_degrade_to_fallback_results() {
    init_logging();
    struct RefusingOpener;

    #[async_trait::async_trait]
    impl ChannelOpener for RefusingOpener {
        async fn open(
            &self,
            _request: &GenerationRequest,
            _index: usize,
        ) -> Result<ByteStream, OpenError> {
            Err(OpenError::Connect("no route to host".to_string()))
        }
    }

    let orchestrator = Orchestrator::new(Arc::new(RefusingOpener), fast_settings());
    let variations = orchestrator
        .generate(&request(), &CancellationToken::new(), &NullProgressSink)
        .await
        .unwrap();

    assert_eq!(variations.len(), 3);
    for variation in &variations {
        assert!(variation.content.contains("の生成に失敗しました"));
    }
}

#[tokio::test]
async fn cancelling_mid_stream_surfaces_cancelled_and_no_result() {
    init_logging();
    struct HangingOpener;

    #[async_trait::async_trait]
    impl ChannelOpener for HangingOpener {
        async fn open(
            &self,
            _request: &GenerationRequest,
            _index: usize,
        ) -> Result<ByteStream, OpenError> {
            let first = futures_util::stream::iter(vec![Ok(Bytes::from_static(
                b"data: {\"type\":\"process_start\"}\n\n",
            ))]);
            Ok(Box::pin(first.chain(futures_util::stream::pending())))
        }
    }

    let orchestrator = Orchestrator::new(Arc::new(HangingOpener), fast_settings());
    let cancel = CancellationToken::new();
    let progress = RecordingProgress::default();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel_clone.cancel();
    });

    let err = orchestrator
        .generate(&request(), &cancel, &progress)
        .await
        .unwrap_err();
    assert_eq!(err, OrchestrateError::Cancelled);

    // The active session ended in the cancelled-terminal state.
    let views = progress.views.lock().unwrap();
    let last = views.last().unwrap();
    assert_eq!(last.sessions[0].status, SessionStatus::Cancelled);
    assert!(!last.finalized);
}
