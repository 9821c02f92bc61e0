use std::sync::Once;

use promo_core::{
    aggregate, update, Effect, GenerationRequest, Msg, RequestState, ScrapedContentData,
    SessionStatus, StreamEvent,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

fn scraped(title: &str) -> StreamEvent {
    StreamEvent::ScrapedContent {
        data: ScrapedContentData {
            title: title.to_string(),
            content_length: 800,
            image_count: 0,
        },
    }
}

fn complete_session(mut state: RequestState, index: usize) -> (RequestState, Vec<Effect>) {
    for event in [
        StreamEvent::ProcessStart,
        scraped("Example Post"),
        StreamEvent::ContentDelta {
            text: "本文です。".to_string(),
        },
        StreamEvent::VariationComplete {
            index,
            message: "done".to_string(),
        },
    ] {
        let (next, effects) = update(state, Msg::ChannelEvent { index, event });
        state = next;
        if !effects.is_empty() {
            return (state, effects);
        }
    }
    unreachable!("variation_complete must advance the sequencer");
}

fn fail_session(mut state: RequestState, index: usize) -> (RequestState, Vec<Effect>) {
    for event in [
        StreamEvent::ProcessStart,
        scraped("Example Post"),
        StreamEvent::GenerationStarting,
    ] {
        let (next, _) = update(state, Msg::ChannelEvent { index, event });
        state = next;
    }
    update(
        state,
        Msg::ChannelEvent {
            index,
            event: StreamEvent::Error {
                error: "backend connection failed".to_string(),
            },
        },
    )
}

#[test]
fn backend_failure_synthesizes_fallback_and_continues() {
    init_logging();
    let state = RequestState::new("ご紹介記事");
    let (state, _) = update(state, Msg::GenerateRequested);

    let (state, effects) = complete_session(state, 0);
    assert_eq!(effects, vec![Effect::OpenChannel { index: 1 }]);

    let (state, effects) = fail_session(state, 1);
    assert_eq!(effects, vec![Effect::OpenChannel { index: 2 }]);
    let failed = state.session(1).unwrap();
    assert_eq!(failed.status, SessionStatus::Error);
    assert!(failed.text.contains("バリエーション 2 の生成に失敗しました"));
    assert!(failed.text.contains("Example Post"));

    let (state, effects) = complete_session(state, 2);
    assert_eq!(effects, vec![Effect::Finalize]);

    let variations = aggregate(&state, &GenerationRequest::default());
    assert_eq!(variations.len(), 3);
    assert_eq!(variations[0].content, "本文です。");
    assert!(variations[1].content.contains("バリエーション 2"));
    assert_eq!(variations[2].content, "本文です。");
}

#[test]
fn every_session_failing_still_yields_three_fallbacks() {
    init_logging();
    let state = RequestState::new("ご紹介記事");
    let (mut state, _) = update(state, Msg::GenerateRequested);

    for index in 0..3 {
        let (next, _) = fail_session(state, index);
        state = next;
    }
    assert!(state.all_terminal());

    let variations = aggregate(&state, &GenerationRequest::default());
    assert_eq!(variations.len(), 3);
    for (index, variation) in variations.iter().enumerate() {
        assert!(variation
            .content
            .contains(&format!("バリエーション {} の生成に失敗しました", index + 1)));
        assert!(variation.content.contains("Example Post"));
    }
}

#[test]
fn close_without_terminal_event_is_an_implicit_failure() {
    init_logging();
    let state = RequestState::new("Example Post");
    let (state, _) = update(state, Msg::GenerateRequested);

    let (state, _) = update(
        state,
        Msg::ChannelEvent {
            index: 0,
            event: StreamEvent::ProcessStart,
        },
    );
    let (state, effects) = update(state, Msg::ChannelClosed { index: 0 });
    assert_eq!(effects, vec![Effect::OpenChannel { index: 1 }]);

    let failed = state.session(0).unwrap();
    assert_eq!(failed.status, SessionStatus::Error);
    assert!(failed.text.contains("バリエーション 1"));
    assert!(failed.text.contains("Example Post"));
}

#[test]
fn error_message_is_recorded_as_a_warning() {
    init_logging();
    let state = RequestState::new("Example Post");
    let (state, _) = update(state, Msg::GenerateRequested);
    let (state, _) = fail_session(state, 0);
    assert!(state
        .warnings()
        .iter()
        .any(|w| w.contains("backend connection failed")));
}

#[test]
fn scraping_warning_is_non_fatal() {
    init_logging();
    let state = RequestState::new("Example Post");
    let (state, _) = update(state, Msg::GenerateRequested);

    let (state, effects) = update(
        state,
        Msg::ChannelEvent {
            index: 0,
            event: StreamEvent::ScrapingWarning {
                warning: "コンテンツが短すぎます".to_string(),
            },
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.session(0).unwrap().status, SessionStatus::Loading);
    assert_eq!(state.session(0).unwrap().progress, 25);
    assert_eq!(state.warnings(), ["コンテンツが短すぎます"]);
}

#[test]
fn cancel_terminates_the_active_session_without_finalizing() {
    init_logging();
    let state = RequestState::new("Example Post");
    let (state, _) = update(state, Msg::GenerateRequested);
    let (state, _) = complete_session(state, 0);

    let (state, effects) = update(state, Msg::CancelRequested);
    assert!(effects.is_empty());
    assert!(state.is_cancelled());
    assert_eq!(state.session(1).unwrap().status, SessionStatus::Cancelled);
    assert_eq!(state.active(), None);
    assert!(!state.is_finalized());

    // Frames still buffered on the dying channel are ignored.
    let (state, effects) = update(
        state,
        Msg::ChannelEvent {
            index: 1,
            event: StreamEvent::ContentDelta {
                text: "late".to_string(),
            },
        },
    );
    assert!(effects.is_empty());
    assert!(state.session(1).unwrap().text.is_empty());
}
