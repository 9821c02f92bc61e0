use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;

/// Normalized events produced by one backend generation stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// The backend accepted the call and is generating.
    Progress,
    /// A chunk of generated text.
    Delta(String),
    /// The backend finished the text normally.
    Complete,
}

/// Byte stream carrying one SSE channel, as seen by the client side.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, OpenError>> + Send>>;

/// Linear retry schedule shared by the outbound HTTP helpers. Constructed
/// explicitly so tests can tighten or disable it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(300),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff * attempt.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeFailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    UnsupportedContentType { content_type: String },
    Decode,
    Network,
}

impl ScrapeFailureKind {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScrapeFailureKind::Timeout | ScrapeFailureKind::Network => true,
            ScrapeFailureKind::HttpStatus(code) => *code >= 500,
            _ => false,
        }
    }
}

impl fmt::Display for ScrapeFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrapeFailureKind::InvalidUrl => write!(f, "invalid url"),
            ScrapeFailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            ScrapeFailureKind::Timeout => write!(f, "timeout"),
            ScrapeFailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            ScrapeFailureKind::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            ScrapeFailureKind::Decode => write!(f, "decode error"),
            ScrapeFailureKind::Network => write!(f, "network error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ScrapeError {
    pub kind: ScrapeFailureKind,
    pub message: String,
}

impl ScrapeError {
    pub(crate) fn new(kind: ScrapeFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The stream could not be established at all. Fatal to one session.
    #[error("backend connection failed: {0}")]
    Connect(String),
    /// The established stream broke mid-flight.
    #[error("backend stream failed: {0}")]
    Stream(String),
    /// The backend completed without producing text, repeatedly.
    #[error("backend returned an empty result after all retries")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnhanceError {
    #[error("enhancement request failed: {0}")]
    Http(String),
    #[error("enhancement service returned status {0}")]
    Status(u16),
    #[error("enhancement payload malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OpenError {
    #[error("failed to open stream channel: {0}")]
    Connect(String),
    #[error("stream channel returned status {0}")]
    HttpStatus(u16),
    #[error("stream channel read failed: {0}")]
    Read(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestrateError {
    /// The caller cancelled; no aggregate result exists.
    #[error("generation cancelled")]
    Cancelled,
}
