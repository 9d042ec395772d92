//! Turn execution — the orchestrator that fans out to the tool classifier,
//! streams the chat engine through the sanitizer, and produces the ordered
//! event sequence for one turn.
//!
//! Entry point: [`run_turn`] spawns the turn task and returns a channel of
//! [`TurnEvent`]s. The session loop forwards events to the wire, so frame
//! order is exactly event order: ack, toolcall, token*, final?, done.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::Instrument;

use bn_domain::cancel::CancelToken;
use bn_domain::config::EnginesConfig;
use bn_domain::frame::{ToolCallSpec, ToolStatus};
use bn_domain::stream::SamplingParams;
use bn_domain::{Error, Result};
use bn_engines::{ChatEngine, GenerateRequest, ToolClassifier};
use bn_sanitize::{Filters, StreamingSanitizer};

use super::prefilter::{PrefilterOutcome, ScreenshotFilter};
use super::prompts;
use super::validate::ValidatedStart;
use super::ToolDecision;
use crate::report::ErrorReporter;

/// Scheduling priority for interactive turns on both engines.
const INTERACTIVE_PRIORITY: i32 = 0;

/// How long the post-cancel silent drain may take before the stream is
/// dropped outright.
const CANCEL_DRAIN_BUDGET: Duration = Duration::from_millis(250);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnEvent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted during a single turn, in wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// The start frame was accepted.
    Ack,
    /// The tool decision, from the prefilter or the classifier.
    ToolCall {
        status: ToolStatus,
        raw: Vec<ToolCallSpec>,
    },
    /// One stable sanitized delta.
    Token { text: String },
    /// The full sanitized text of the turn.
    Final { normalized_text: String },
    /// The turn failed; `done` follows.
    Error {
        code: &'static str,
        message: String,
    },
    /// The turn is over. Exactly one per turn.
    Done { cancelled: bool },
}

/// Everything a turn needs, cloned out of `AppState` by the session.
#[derive(Clone)]
pub struct TurnDeps {
    pub chat: Arc<dyn ChatEngine>,
    pub tool: Option<Arc<dyn ToolClassifier>>,
    pub filters: Arc<Filters>,
    pub prefilter: Arc<ScreenshotFilter>,
    pub engines: EnginesConfig,
    pub history_max_chars: usize,
    pub reporter: Arc<ErrorReporter>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one turn as a spawned task; the receiver yields the ordered event
/// sequence and closes after the single `Done`.
pub fn run_turn(deps: TurnDeps, input: ValidatedStart, cancel: CancelToken) -> mpsc::Receiver<TurnEvent> {
    let (tx, rx) = mpsc::channel::<TurnEvent>(64);

    let turn_span = tracing::info_span!("turn", session_id = %input.session_id);
    tokio::spawn(
        async move {
            tracing::debug!("turn started");
            if let Err(e) = run_turn_inner(&deps, input, &tx, &cancel).await {
                deps.reporter.report(&e, "chat_turn");
                let code = match &e {
                    Error::Timeout(_) => "timeout",
                    _ => "internal_error",
                };
                let _ = tx
                    .send(TurnEvent::Error {
                        code,
                        message: e.to_string(),
                    })
                    .await;
                let _ = tx.send(TurnEvent::Done { cancelled: false }).await;
            }
        }
        .instrument(turn_span),
    );

    rx
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inner loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The turn body. Returns `Err` only for failures the caller must still
/// wrap in `error` + `done` frames; every successful or cancelled path
/// emits its own closing `Done`.
async fn run_turn_inner(
    deps: &TurnDeps,
    input: ValidatedStart,
    tx: &mpsc::Sender<TurnEvent>,
    cancel: &CancelToken,
) -> Result<()> {
    let _ = tx.send(TurnEvent::Ack).await;

    let engine_timeout = Duration::from_secs_f64(deps.engines.timeout_s);

    // ── Tool decision: prefilter fast-path, classifier fan-out on miss ──
    let mut tool_emitted = false;
    let mut tool_task: Option<tokio::task::JoinHandle<ToolDecision>> = None;

    match deps.prefilter.evaluate(&input.utterance) {
        PrefilterOutcome::Hit(decision) => {
            tracing::debug!(status = ?decision.status, "prefilter hit; classifier skipped");
            send_toolcall(tx, decision).await;
            tool_emitted = true;
        }
        PrefilterOutcome::Miss => match &deps.tool {
            Some(tool) => {
                tool_task = Some(spawn_classifier(
                    tool.clone(),
                    deps,
                    &input,
                    engine_timeout,
                ));
            }
            None => {
                // No classifier deployed; the prefilter is the only signal.
                send_toolcall(tx, ToolDecision::none()).await;
                tool_emitted = true;
            }
        },
    }

    // ── Chat stream, started concurrently with the classifier ──────────
    let chat_req = GenerateRequest {
        prompt: prompts::build_chat_prompt(
            &input.persona,
            &input.history,
            &input.utterance,
            deps.history_max_chars,
            chrono::Utc::now(),
        ),
        sampling: input.sampling.clone(),
        priority: INTERACTIVE_PRIORITY,
    };
    let (handle, mut stream) = match tokio::time::timeout(
        engine_timeout,
        deps.chat.generate_stream(chat_req),
    )
    .await
    {
        Ok(started) => started?,
        Err(_) => return Err(Error::Timeout("chat engine connect".into())),
    };

    let mut sanitizer = StreamingSanitizer::new(&deps.filters);
    // Deltas that arrived before the toolcall frame went out.
    let mut pending_tokens: Vec<String> = Vec::new();
    let mut cancelled = false;

    loop {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        // Wait on the classifier verdict and the next chunk together; the
        // toolcall frame must precede any token frame.
        let next_chunk = if let Some(mut task) = tool_task.take() {
            tokio::select! {
                verdict = &mut task => {
                    // A cancel can land while parked here; nothing may go
                    // out once it has.
                    if cancel.is_cancelled() {
                        cancelled = true;
                        break;
                    }
                    let decision = verdict.unwrap_or_else(|e| {
                        tracing::warn!(error = %e, "classifier task failed; defaulting to no");
                        ToolDecision::none()
                    });
                    send_toolcall(tx, decision).await;
                    tool_emitted = true;
                    for text in pending_tokens.drain(..) {
                        let _ = tx.send(TurnEvent::Token { text }).await;
                    }
                    continue;
                }
                c = tokio::time::timeout(engine_timeout, stream.next()) => {
                    tool_task = Some(task);
                    c
                }
            }
        } else {
            tokio::time::timeout(engine_timeout, stream.next()).await
        };

        match next_chunk {
            Err(_elapsed) => {
                deps.chat.abort(&handle).await;
                abort_classifier(&mut tool_task);
                return Err(Error::Timeout("chat stream".into()));
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                deps.chat.abort(&handle).await;
                abort_classifier(&mut tool_task);
                return Err(e);
            }
            Ok(Some(Ok(chunk))) => {
                if !chunk.text.is_empty() {
                    let delta = sanitizer.push(&chunk.text);
                    if cancel.is_cancelled() {
                        cancelled = true;
                        break;
                    }
                    if !delta.is_empty() {
                        if tool_emitted {
                            let _ = tx.send(TurnEvent::Token { text: delta }).await;
                        } else {
                            pending_tokens.push(delta);
                        }
                    }
                }
                if chunk.done {
                    break;
                }
            }
        }
    }

    // A cancel that raced the stream's natural end still closes the turn
    // as cancelled; the trailing toolcall/token flush must not run.
    if cancelled || cancel.is_cancelled() {
        // Stop the engine best-effort, discard in-flight output silently,
        // and close the turn with exactly one frame.
        deps.chat.abort(&handle).await;
        abort_classifier(&mut tool_task);
        let _ = tokio::time::timeout(CANCEL_DRAIN_BUDGET, async {
            while stream.next().await.is_some() {}
        })
        .await;
        let _ = tx.send(TurnEvent::Done { cancelled: true }).await;
        return Ok(());
    }

    // ── Stream complete: settle the toolcall, flush, finalize ──────────
    if let Some(task) = tool_task.take() {
        let decision = task.await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "classifier task failed; defaulting to no");
            ToolDecision::none()
        });
        send_toolcall(tx, decision).await;
        tool_emitted = true;
    }
    if !tool_emitted {
        // Unreachable in practice: every branch above settles the decision.
        send_toolcall(tx, ToolDecision::none()).await;
    }
    for text in pending_tokens.drain(..) {
        let _ = tx.send(TurnEvent::Token { text }).await;
    }

    let tail = sanitizer.flush();
    if !tail.is_empty() {
        let _ = tx.send(TurnEvent::Token { text: tail }).await;
    }

    let _ = tx
        .send(TurnEvent::Final {
            normalized_text: sanitizer.full_text(),
        })
        .await;
    let _ = tx.send(TurnEvent::Done { cancelled: false }).await;
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn send_toolcall(tx: &mpsc::Sender<TurnEvent>, decision: ToolDecision) {
    let _ = tx
        .send(TurnEvent::ToolCall {
            status: decision.status,
            raw: decision.raw,
        })
        .await;
}

/// Classifier fan-out. Failures and timeouts resolve to "no" so the chat
/// turn continues; they are logged through the deduplicating reporter.
fn spawn_classifier(
    tool: Arc<dyn ToolClassifier>,
    deps: &TurnDeps,
    input: &ValidatedStart,
    engine_timeout: Duration,
) -> tokio::task::JoinHandle<ToolDecision> {
    let req = GenerateRequest {
        prompt: prompts::build_tool_prompt(&input.history, &input.utterance),
        sampling: SamplingParams {
            temperature: 0.0,
            top_p: 1.0,
            repetition_penalty: 1.0,
            max_tokens: deps.engines.tool_max_out,
        },
        priority: INTERACTIVE_PRIORITY,
    };
    let reporter = deps.reporter.clone();
    tokio::spawn(async move {
        match tokio::time::timeout(engine_timeout, tool.generate(req)).await {
            Ok(Ok(completion)) => prompts::parse_tool_completion(&completion),
            Ok(Err(e)) => {
                reporter.report(&e, "tool_classifier");
                ToolDecision::none()
            }
            Err(_) => {
                reporter.report(
                    &Error::Timeout("tool classifier".into()),
                    "tool_classifier",
                );
                ToolDecision::none()
            }
        }
    })
}

fn abort_classifier(task: &mut Option<tokio::task::JoinHandle<ToolDecision>>) {
    if let Some(task) = task.take() {
        task.abort();
    }
}
