use crate::view_model::{RequestView, SessionRowView};

/// Every request produces exactly this many variations.
pub const VARIATION_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Pending,
    Loading,
    Complete,
    Error,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Complete | SessionStatus::Error | SessionStatus::Cancelled
        )
    }
}

/// Mutable per-variation state, owned by [`RequestState`] and touched only
/// through the reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariationSession {
    pub index: usize,
    pub status: SessionStatus,
    pub progress: u8,
    pub text: String,
}

impl VariationSession {
    fn new(index: usize) -> Self {
        Self {
            index,
            status: SessionStatus::Pending,
            progress: 0,
            text: String::new(),
        }
    }

    /// Raise progress to `floor` without ever lowering it.
    pub(crate) fn raise_progress(&mut self, floor: u8) {
        self.progress = self.progress.max(floor.min(100));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestState {
    sessions: Vec<VariationSession>,
    active: Option<usize>,
    started: bool,
    cancelled: bool,
    finalized: bool,
    /// Title observed from a `scraped_content` event, if any.
    scraped_title: Option<String>,
    /// Title to use for fallback text before any scrape result arrives.
    title_hint: String,
    warnings: Vec<String>,
}

impl RequestState {
    pub fn new(title_hint: impl Into<String>) -> Self {
        Self {
            sessions: (0..VARIATION_COUNT).map(VariationSession::new).collect(),
            active: None,
            started: false,
            cancelled: false,
            finalized: false,
            scraped_title: None,
            title_hint: title_hint.into(),
            warnings: Vec::new(),
        }
    }

    pub fn sessions(&self) -> &[VariationSession] {
        &self.sessions
    }

    pub fn session(&self, index: usize) -> Option<&VariationSession> {
        self.sessions.get(index)
    }

    /// Index of the session currently holding the open channel.
    pub fn active(&self) -> Option<usize> {
        self.active
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// The title used for fallback synthesis: the scraped title when one
    /// has been observed, the caller-derived hint otherwise.
    pub fn effective_title(&self) -> &str {
        self.scraped_title.as_deref().unwrap_or(&self.title_hint)
    }

    pub fn all_terminal(&self) -> bool {
        self.sessions.iter().all(|s| s.status.is_terminal())
    }

    pub fn view(&self) -> RequestView {
        RequestView {
            sessions: self
                .sessions
                .iter()
                .map(|s| SessionRowView {
                    index: s.index,
                    status: s.status,
                    progress: s.progress,
                    chars: s.text.chars().count(),
                })
                .collect(),
            warnings: self.warnings.clone(),
            finalized: self.finalized,
        }
    }

    pub(crate) fn mark_started(&mut self) {
        self.started = true;
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub(crate) fn mark_finalized(&mut self) {
        self.finalized = true;
    }

    pub(crate) fn begin(&mut self, index: usize) {
        if let Some(session) = self.sessions.get_mut(index) {
            session.status = SessionStatus::Loading;
        }
        self.active = Some(index);
    }

    pub(crate) fn clear_active(&mut self) {
        self.active = None;
    }

    pub(crate) fn session_mut(&mut self, index: usize) -> Option<&mut VariationSession> {
        self.sessions.get_mut(index)
    }

    pub(crate) fn record_scraped_title(&mut self, title: &str) {
        if !title.trim().is_empty() {
            self.scraped_title = Some(title.to_string());
        }
    }

    pub(crate) fn push_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }
}
