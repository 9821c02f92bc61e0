use std::sync::{Arc, Mutex};

use clap::Args;
use engine_logging::engine_info;
use promo_core::{GenerationRequest, PromoStyle, RequestView, SessionStatus, Tone};
use promo_engine::{HttpChannelOpener, Orchestrator, OrchestratorSettings, ProgressSink};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Article URL to promote.
    pub url: String,
    /// Relay server base URL.
    #[arg(long, default_value = "http://127.0.0.1:8789")]
    pub server: String,
    /// Tone of the generated text.
    #[arg(long, value_enum, default_value_t = ToneArg::Casual)]
    pub tone: ToneArg,
    /// Append hashtags to each variation.
    #[arg(long)]
    pub hashtags: bool,
    /// Image URL to reference in the markdown output (repeatable).
    #[arg(long = "image")]
    pub images: Vec<String>,
    /// Enable the best-effort web-enhancement lookup.
    #[arg(long)]
    pub enhance: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum ToneArg {
    Casual,
    Formal,
    Energetic,
}

impl From<ToneArg> for Tone {
    fn from(tone: ToneArg) -> Self {
        match tone {
            ToneArg::Casual => Tone::Casual,
            ToneArg::Formal => Tone::Formal,
            ToneArg::Energetic => Tone::Energetic,
        }
    }
}

pub async fn run(args: GenerateArgs) -> anyhow::Result<()> {
    let request = GenerationRequest {
        url: Some(args.url.clone()),
        style: PromoStyle {
            tone: args.tone.into(),
            hashtags: args.hashtags,
        },
        selected_images: args.images.clone(),
        enhance: args.enhance,
        ..GenerationRequest::default()
    };

    let opener = HttpChannelOpener::new(args.server.clone())?;
    let orchestrator = Orchestrator::new(Arc::new(opener), OrchestratorSettings::default());

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            engine_info!("cancellation requested");
            ctrl_c_cancel.cancel();
        }
    });

    let progress = ConsoleProgress::default();
    let variations = orchestrator.generate(&request, &cancel, &progress).await?;

    for (index, variation) in variations.iter().enumerate() {
        println!("--- バリエーション {} ---", index + 1);
        println!("{}\n", variation.markdown);
    }
    Ok(())
}

/// Prints one progress line whenever any session's progress changes.
#[derive(Default)]
struct ConsoleProgress {
    last: Mutex<Vec<u8>>,
}

impl ProgressSink for ConsoleProgress {
    fn update(&self, view: RequestView) {
        let current: Vec<u8> = view.sessions.iter().map(|s| s.progress).collect();
        let Ok(mut last) = self.last.lock() else {
            return;
        };
        if *last == current {
            return;
        }
        *last = current;

        let line = view
            .sessions
            .iter()
            .map(|s| format!("{}:{} {:3}%", s.index + 1, status_label(s.status), s.progress))
            .collect::<Vec<_>>()
            .join("  ");
        println!("{line}");
    }
}

fn status_label(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Pending => "待機",
        SessionStatus::Loading => "生成中",
        SessionStatus::Complete => "完了",
        SessionStatus::Error => "失敗",
        SessionStatus::Cancelled => "中止",
    }
}
