use crate::state::VARIATION_COUNT;
use crate::{compose, Effect, Msg, RequestState, SessionStatus, StreamEvent};

/// Pure update function: applies a message to state and returns any effects.
///
/// Only the session holding the open channel is ever mutated; events for any
/// other index are ignored, which keeps late frames after a terminal
/// transition harmless.
pub fn update(mut state: RequestState, msg: Msg) -> (RequestState, Vec<Effect>) {
    let effects = match msg {
        Msg::GenerateRequested => {
            if state.is_started() || state.is_cancelled() {
                Vec::new()
            } else {
                state.mark_started();
                state.begin(0);
                vec![Effect::OpenChannel { index: 0 }]
            }
        }
        Msg::ChannelEvent { index, event } => apply_event(&mut state, index, event),
        Msg::ChannelClosed { index } => {
            // The sentinel normally arrives after `variation_complete`; a
            // close while the session is still live is an implicit failure.
            let live = state.active() == Some(index)
                && state
                    .session(index)
                    .is_some_and(|s| !s.status.is_terminal());
            if live {
                fail_session(&mut state, index, None)
            } else {
                Vec::new()
            }
        }
        Msg::CancelRequested => {
            if !state.is_cancelled() {
                state.mark_cancelled();
                if let Some(index) = state.active() {
                    if let Some(session) = state.session_mut(index) {
                        session.status = SessionStatus::Cancelled;
                    }
                    state.clear_active();
                }
            }
            Vec::new()
        }
    };

    (state, effects)
}

fn apply_event(state: &mut RequestState, index: usize, event: StreamEvent) -> Vec<Effect> {
    if state.active() != Some(index) {
        return Vec::new();
    }
    if state
        .session(index)
        .is_none_or(|s| s.status.is_terminal())
    {
        return Vec::new();
    }

    match event {
        StreamEvent::ProcessStart => raise(state, index, 10),
        StreamEvent::ScrapedContent { data } => {
            state.record_scraped_title(&data.title);
            raise(state, index, 20)
        }
        StreamEvent::ScrapingWarning { warning } => {
            state.push_warning(warning);
            raise(state, index, 25)
        }
        StreamEvent::VariationInfo { .. } => raise(state, index, 30),
        StreamEvent::GenerationStarting => raise(state, index, 35),
        StreamEvent::GenerationProgress => raise(state, index, 50),
        StreamEvent::WebSearchComplete | StreamEvent::WebSearchError { .. } => {
            raise(state, index, 60)
        }
        StreamEvent::ContentDelta { text } => {
            if let Some(session) = state.session_mut(index) {
                session.text.push_str(&text);
                let chars = session.text.chars().count();
                session.raise_progress((60 + chars / 15).min(95) as u8);
            }
            Vec::new()
        }
        StreamEvent::GenerationComplete => raise(state, index, 98),
        StreamEvent::VariationComplete { .. } => {
            if let Some(session) = state.session_mut(index) {
                session.raise_progress(100);
                session.status = SessionStatus::Complete;
            }
            advance(state, index)
        }
        StreamEvent::Error { error } => fail_session(state, index, Some(error)),
    }
}

fn raise(state: &mut RequestState, index: usize, floor: u8) -> Vec<Effect> {
    if let Some(session) = state.session_mut(index) {
        session.raise_progress(floor);
    }
    Vec::new()
}

/// Terminal failure for one session: deterministic fallback text, then the
/// sequencer moves on. The other sessions are unaffected.
fn fail_session(state: &mut RequestState, index: usize, error: Option<String>) -> Vec<Effect> {
    let fallback = compose::fallback_content(state.effective_title(), index);
    if let Some(error) = error {
        state.push_warning(error);
    }
    if let Some(session) = state.session_mut(index) {
        session.status = SessionStatus::Error;
        session.text = fallback;
    }
    advance(state, index)
}

fn advance(state: &mut RequestState, finished: usize) -> Vec<Effect> {
    let next = finished + 1;
    if next < VARIATION_COUNT {
        state.begin(next);
        vec![Effect::OpenChannel { index: next }]
    } else {
        state.clear_active();
        state.mark_finalized();
        vec![Effect::Finalize]
    }
}
