use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use clap::Args;
use engine_logging::{engine_info, engine_warn};
use futures_util::StreamExt;
use promo_core::{GenerationRequest, VARIATION_COUNT};
use promo_engine::{
    BackendSettings, EnhanceSettings, GenerationSession, HttpBackend, HttpEnhancer, HttpScraper,
    RelaySettings, ScrapeSettings, SessionSettings, StreamRelay,
};
use serde::Deserialize;
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8789")]
    pub addr: SocketAddr,
    /// Generation backend base URL.
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub backend_url: String,
    /// Web-enhancement search service base URL.
    #[arg(long, default_value = "http://127.0.0.1:8081")]
    pub search_url: String,
}

pub async fn run(args: ServeArgs) -> anyhow::Result<()> {
    let relay = build_relay(&args)?;
    let app = router(Arc::new(relay));

    engine_info!("relay server listening on http://{}", args.addr);
    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_relay(args: &ServeArgs) -> anyhow::Result<StreamRelay> {
    let scraper = HttpScraper::new(ScrapeSettings::default())?;
    let backend = HttpBackend::new(BackendSettings {
        base_url: args.backend_url.clone(),
        ..BackendSettings::default()
    })?;
    let enhancer = HttpEnhancer::new(EnhanceSettings {
        base_url: args.search_url.clone(),
        ..EnhanceSettings::default()
    })?;
    let session = GenerationSession::new(
        Arc::new(backend),
        Arc::new(enhancer),
        SessionSettings::default(),
    );
    Ok(StreamRelay::new(
        Arc::new(scraper),
        session,
        RelaySettings::default(),
    ))
}

pub fn router(relay: Arc<StreamRelay>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/generate-stream", get(generate_stream))
        .with_state(relay)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamParams {
    /// JSON-encoded [`GenerationRequest`].
    request_data: String,
    /// Variation index, 0-based.
    variation_index: usize,
}

/// Open one relay channel as an SSE response. The relay task runs to its
/// sentinel regardless of what the client does with the connection.
async fn generate_stream(
    State(relay): State<Arc<StreamRelay>>,
    Query(params): Query<StreamParams>,
) -> Response {
    if params.variation_index >= VARIATION_COUNT {
        return (StatusCode::BAD_REQUEST, "variation index out of range").into_response();
    }

    let request: GenerationRequest = match serde_json::from_str(&params.request_data) {
        Ok(request) => request,
        Err(err) => {
            engine_warn!("rejecting malformed request payload: {err}");
            return (StatusCode::BAD_REQUEST, "malformed request payload").into_response();
        }
    };

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let index = params.variation_index;
    tokio::spawn(async move {
        relay.run(&request, index, tx).await;
    });

    let stream = UnboundedReceiverStream::new(rx).map(Ok::<_, std::convert::Infallible>);
    match Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
    {
        Ok(response) => response,
        Err(err) => {
            engine_warn!("failed to build stream response: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
