//! End-to-end turn orchestration against scripted engines.
//!
//! These tests drive `run_turn` directly with mock `ChatEngine` /
//! `ToolClassifier` implementations and assert the ordered event sequence
//! a client would see on the wire.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bn_domain::cancel::CancelToken;
use bn_domain::config::EnginesConfig;
use bn_domain::frame::ToolStatus;
use bn_domain::history::ChatTurn;
use bn_domain::persona::{Gender, Persona};
use bn_domain::stream::{SamplingParams, TokenChunk};
use bn_domain::{Error, Result};
use bn_engines::traits::Generation;
use bn_engines::{ChatEngine, GenerateRequest, StreamHandle, ToolClassifier};
use bn_gateway::report::ErrorReporter;
use bn_gateway::runtime::prefilter::ScreenshotFilter;
use bn_gateway::runtime::turn::{run_turn, TurnDeps, TurnEvent};
use bn_gateway::runtime::validate::ValidatedStart;
use bn_sanitize::Filters;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted engines
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Chat engine that replays a fixed chunk script, optionally pausing
/// between chunks, and honors its abort token.
struct ScriptedChat {
    chunks: Vec<&'static str>,
    chunk_delay: Duration,
}

impl ScriptedChat {
    fn instant(chunks: Vec<&'static str>) -> Self {
        Self {
            chunks,
            chunk_delay: Duration::ZERO,
        }
    }

    fn paced(chunks: Vec<&'static str>, chunk_delay: Duration) -> Self {
        Self {
            chunks,
            chunk_delay,
        }
    }
}

#[async_trait::async_trait]
impl ChatEngine for ScriptedChat {
    async fn generate_stream(&self, _req: GenerateRequest) -> Result<Generation> {
        let handle = StreamHandle::new();
        let cancel = handle.cancel_token().clone();
        let chunks: Vec<String> = self.chunks.iter().map(|c| c.to_string()).collect();
        let delay = self.chunk_delay;
        let stream = async_stream::stream! {
            for chunk in chunks {
                if cancel.is_cancelled() {
                    break;
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(TokenChunk::text(chunk));
            }
            yield Ok(TokenChunk::done());
        };
        Ok((handle, Box::pin(stream)))
    }
}

/// Chat engine whose stream never produces anything.
struct StalledChat;

#[async_trait::async_trait]
impl ChatEngine for StalledChat {
    async fn generate_stream(&self, _req: GenerateRequest) -> Result<Generation> {
        let handle = StreamHandle::new();
        let stream = async_stream::stream! {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            yield Ok(TokenChunk::done());
        };
        Ok((handle, Box::pin(stream)))
    }
}

/// Chat engine that refuses to start.
struct UnavailableChat;

#[async_trait::async_trait]
impl ChatEngine for UnavailableChat {
    async fn generate_stream(&self, _req: GenerateRequest) -> Result<Generation> {
        Err(Error::EngineNotReady("chat".into()))
    }
}

/// Chat engine that emits one chunk then fails mid-stream.
struct BrokenStreamChat;

#[async_trait::async_trait]
impl ChatEngine for BrokenStreamChat {
    async fn generate_stream(&self, _req: GenerateRequest) -> Result<Generation> {
        let handle = StreamHandle::new();
        let stream = async_stream::stream! {
            yield Ok(TokenChunk::text("Hi there "));
            yield Err(Error::Other("stream torn".into()));
        };
        Ok((handle, Box::pin(stream)))
    }
}

/// Classifier that records invocation and returns a fixed completion.
struct ScriptedClassifier {
    completion: &'static str,
    delay: Duration,
    called: Arc<AtomicBool>,
}

impl ScriptedClassifier {
    fn new(completion: &'static str) -> (Arc<Self>, Arc<AtomicBool>) {
        let called = Arc::new(AtomicBool::new(false));
        (
            Arc::new(Self {
                completion,
                delay: Duration::ZERO,
                called: called.clone(),
            }),
            called,
        )
    }

    fn slow(completion: &'static str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            completion,
            delay,
            called: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[async_trait::async_trait]
impl ToolClassifier for ScriptedClassifier {
    async fn generate(&self, _req: GenerateRequest) -> Result<String> {
        self.called.store(true, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.completion.to_string())
    }
}

/// Classifier that always errors.
struct FailingClassifier;

#[async_trait::async_trait]
impl ToolClassifier for FailingClassifier {
    async fn generate(&self, _req: GenerateRequest) -> Result<String> {
        Err(Error::EngineShutdown("tool".into()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn deps(chat: Arc<dyn ChatEngine>, tool: Option<Arc<dyn ToolClassifier>>) -> TurnDeps {
    TurnDeps {
        chat,
        tool,
        filters: Arc::new(Filters::new()),
        prefilter: Arc::new(ScreenshotFilter::new()),
        engines: EnginesConfig {
            timeout_s: 5.0,
            ..Default::default()
        },
        history_max_chars: 4000,
        reporter: Arc::new(ErrorReporter::new()),
    }
}

fn input(utterance: &str) -> ValidatedStart {
    ValidatedStart {
        session_id: "test-session".into(),
        persona: Persona {
            gender: Gender::Female,
            personality: "warm".into(),
            chat_prompt: "Be kind.".into(),
        },
        history: vec![ChatTurn::user("hey"), ChatTurn::assistant("hi!")],
        utterance: utterance.into(),
        sampling: SamplingParams {
            temperature: 0.8,
            top_p: 0.95,
            repetition_penalty: 1.1,
            max_tokens: 200,
        },
    }
}

async fn collect(mut rx: tokio::sync::mpsc::Receiver<TurnEvent>) -> Vec<TurnEvent> {
    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        events.push(ev);
    }
    events
}

fn token_text(events: &[TurnEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            TurnEvent::Token { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

fn done_count(events: &[TurnEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, TurnEvent::Done { .. }))
        .count()
}

fn index_of<F: Fn(&TurnEvent) -> bool>(events: &[TurnEvent], pred: F) -> Option<usize> {
    events.iter().position(pred)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenarios
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn prefilter_reject_skips_classifier() {
    // "take 3 screenshots" is a quantity rejection: toolcall no, chat still
    // runs, classifier never invoked.
    let (classifier, called) = ScriptedClassifier::new(r#"[{"name":"take_screenshot"}]"#);
    let chat = Arc::new(ScriptedChat::instant(vec!["sure, ", "here you go."]));
    let rx = run_turn(
        deps(chat, Some(classifier)),
        input("take 3 screenshots"),
        CancelToken::new(),
    );
    let events = collect(rx).await;

    assert_eq!(events[0], TurnEvent::Ack);
    match &events[1] {
        TurnEvent::ToolCall { status, raw } => {
            assert_eq!(*status, ToolStatus::No);
            assert!(raw.is_empty());
        }
        other => panic!("expected toolcall, got {other:?}"),
    }
    assert!(!called.load(Ordering::SeqCst), "classifier must be skipped");
    assert_eq!(token_text(&events), "Sure, here you go.");
    assert_eq!(done_count(&events), 1);
    assert_eq!(events.last(), Some(&TurnEvent::Done { cancelled: false }));
}

#[tokio::test]
async fn prefilter_trigger_emits_screenshot_call() {
    let (classifier, called) = ScriptedClassifier::new("[]");
    let chat = Arc::new(ScriptedChat::instant(vec!["okay, looking!"]));
    let rx = run_turn(
        deps(chat, Some(classifier)),
        input("screenshot this"),
        CancelToken::new(),
    );
    let events = collect(rx).await;

    match &events[1] {
        TurnEvent::ToolCall { status, raw } => {
            assert_eq!(*status, ToolStatus::Yes);
            assert_eq!(raw.len(), 1);
            assert_eq!(raw[0].name, "take_screenshot");
        }
        other => panic!("expected toolcall, got {other:?}"),
    }
    assert!(!called.load(Ordering::SeqCst));
    assert_eq!(done_count(&events), 1);
}

#[tokio::test]
async fn ellipsis_chunks_stay_boundary_safe() {
    // The sanitizer must never split mid-ellipsis; concatenated token text
    // is the cleaned full answer.
    let (classifier, _) = ScriptedClassifier::new("[]");
    let chat = Arc::new(ScriptedChat::instant(vec!["Hello", "...", "world."]));
    let rx = run_turn(
        deps(chat, Some(classifier)),
        input("tell me something"),
        CancelToken::new(),
    );
    let events = collect(rx).await;

    assert_eq!(token_text(&events), "Hello...world.");

    let toolcall_at = index_of(&events, |e| matches!(e, TurnEvent::ToolCall { .. })).unwrap();
    let first_token_at = index_of(&events, |e| matches!(e, TurnEvent::Token { .. })).unwrap();
    assert!(toolcall_at < first_token_at, "toolcall precedes tokens");

    match events.last() {
        Some(TurnEvent::Done { cancelled: false }) => {}
        other => panic!("expected clean done, got {other:?}"),
    }
    let final_at = index_of(&events, |e| matches!(e, TurnEvent::Final { .. })).unwrap();
    assert!(final_at < events.len() - 1, "final precedes done");
}

#[tokio::test]
async fn cancel_mid_stream_closes_with_single_done() {
    let (classifier, _) = ScriptedClassifier::new("[]");
    let chat = Arc::new(ScriptedChat::paced(
        vec![
            "one two ", "three four ", "five six ", "seven eight ", "nine ten ",
            "eleven twelve ", "thirteen ",
        ],
        Duration::from_millis(20),
    ));
    let cancel = CancelToken::new();
    let mut rx = run_turn(deps(chat, Some(classifier)), input("chat with me"), cancel.clone());

    let mut events = Vec::new();
    let mut cancelled_sent = false;
    while let Some(ev) = rx.recv().await {
        if !cancelled_sent && matches!(ev, TurnEvent::Token { .. }) {
            // Client cancels right after the first token arrives.
            cancel.cancel();
            cancelled_sent = true;
        }
        events.push(ev);
    }

    assert_eq!(done_count(&events), 1);
    assert_eq!(events.last(), Some(&TurnEvent::Done { cancelled: true }));
    // No token may follow the closing done.
    let done_at = index_of(&events, |e| matches!(e, TurnEvent::Done { .. })).unwrap();
    assert_eq!(done_at, events.len() - 1);
    // The cancel cut generation short.
    assert!(token_text(&events).len() < "One two three four five six seven eight nine ten eleven twelve thirteen".len());
    // Cancelled turns carry no final frame.
    assert!(index_of(&events, |e| matches!(e, TurnEvent::Final { .. })).is_none());
}

#[tokio::test]
async fn classifier_failure_defaults_to_no() {
    let chat = Arc::new(ScriptedChat::instant(vec!["all good."]));
    let rx = run_turn(
        deps(chat, Some(Arc::new(FailingClassifier))),
        input("what do you think about this weather"),
        CancelToken::new(),
    );
    let events = collect(rx).await;

    match index_of(&events, |e| matches!(e, TurnEvent::ToolCall { .. })) {
        Some(at) => match &events[at] {
            TurnEvent::ToolCall { status, raw } => {
                assert_eq!(*status, ToolStatus::No);
                assert!(raw.is_empty());
            }
            _ => unreachable!(),
        },
        None => panic!("toolcall missing"),
    }
    assert_eq!(token_text(&events), "All good.");
    assert_eq!(done_count(&events), 1);
}

#[tokio::test]
async fn slow_classifier_never_delays_tokens_out_of_order() {
    // Chat finishes before the classifier answers; tokens are buffered and
    // the toolcall still goes out first.
    let classifier = ScriptedClassifier::slow(r#"[{"name":"take_screenshot"}]"#, Duration::from_millis(80));
    let chat = Arc::new(ScriptedChat::instant(vec!["look", " at that!"]));
    let rx = run_turn(
        deps(chat, Some(classifier)),
        input("how does this look"),
        CancelToken::new(),
    );
    let events = collect(rx).await;

    let toolcall_at = index_of(&events, |e| matches!(e, TurnEvent::ToolCall { .. })).unwrap();
    let first_token_at = index_of(&events, |e| matches!(e, TurnEvent::Token { .. })).unwrap();
    assert!(toolcall_at < first_token_at);
    match &events[toolcall_at] {
        TurnEvent::ToolCall { status, .. } => assert_eq!(*status, ToolStatus::Yes),
        _ => unreachable!(),
    }
    assert_eq!(token_text(&events), "Look at that!");
    assert_eq!(done_count(&events), 1);
}

#[tokio::test]
async fn chat_engine_refusal_reports_internal_error() {
    let (classifier, _) = ScriptedClassifier::new("[]");
    let rx = run_turn(
        deps(Arc::new(UnavailableChat), Some(classifier)),
        input("hello"),
        CancelToken::new(),
    );
    let events = collect(rx).await;

    let error_at = index_of(&events, |e| matches!(e, TurnEvent::Error { .. })).unwrap();
    match &events[error_at] {
        TurnEvent::Error { code, .. } => assert_eq!(*code, "internal_error"),
        _ => unreachable!(),
    }
    assert_eq!(done_count(&events), 1);
    assert_eq!(events.last(), Some(&TurnEvent::Done { cancelled: false }));
}

#[tokio::test]
async fn mid_stream_failure_still_closes_once() {
    let (classifier, _) = ScriptedClassifier::new("[]");
    let rx = run_turn(
        deps(Arc::new(BrokenStreamChat), Some(classifier)),
        input("hello"),
        CancelToken::new(),
    );
    let events = collect(rx).await;

    assert!(index_of(&events, |e| matches!(
        e,
        TurnEvent::Error {
            code: "internal_error",
            ..
        }
    ))
    .is_some());
    assert_eq!(done_count(&events), 1);
    assert_eq!(events.last(), Some(&TurnEvent::Done { cancelled: false }));
}

#[tokio::test(start_paused = true)]
async fn stalled_stream_times_out() {
    let (classifier, _) = ScriptedClassifier::new("[]");
    let rx = run_turn(
        deps(Arc::new(StalledChat), Some(classifier)),
        input("hello"),
        CancelToken::new(),
    );
    let events = collect(rx).await;

    let error_at = index_of(&events, |e| matches!(e, TurnEvent::Error { .. })).unwrap();
    match &events[error_at] {
        TurnEvent::Error { code, .. } => assert_eq!(*code, "timeout"),
        _ => unreachable!(),
    }
    assert_eq!(done_count(&events), 1);
}

#[tokio::test]
async fn no_classifier_configured_falls_back_to_prefilter() {
    let chat = Arc::new(ScriptedChat::instant(vec!["sounds fun."]));
    let rx = run_turn(deps(chat, None), input("what a day"), CancelToken::new());
    let events = collect(rx).await;

    match &events[1] {
        TurnEvent::ToolCall { status, .. } => assert_eq!(*status, ToolStatus::No),
        other => panic!("expected toolcall, got {other:?}"),
    }
    assert_eq!(token_text(&events), "Sounds fun.");
    assert_eq!(done_count(&events), 1);
}
