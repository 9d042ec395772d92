//! The per-connection session loop.
//!
//! One task owns the socket and everything session-scoped: the state
//! machine, the rate buckets, the stored persona, the idle deadline, and
//! the channel of events from the (at most one) running turn. All outbound
//! frames are written by this task, so frames for a request id go out in
//! exactly the order the orchestrator produced them.

use std::borrow::Cow;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::OwnedSemaphorePermit;
use uuid::Uuid;

use bn_domain::cancel::CancelToken;
use bn_domain::frame::{parse_client_frame, ClientFrame, FrameParseError, ServerFrame};
use bn_domain::frame::{ChatPromptPayload, StartPayload};
use bn_domain::persona::Persona;

use super::limits::{
    bucket_for, Bucket, RateLimitExceeded, RateLimitNotices, SlidingWindowRateLimiter,
};
use crate::runtime::turn::{run_turn, TurnDeps, TurnEvent};
use crate::runtime::validate::{validate_chat_prompt, validate_start};
use crate::state::AppState;

type WsSink = SplitSink<WebSocket, Message>;

/// Write failure; the connection is gone.
struct SinkClosed;

enum Flow {
    Continue,
    Close(CloseFrame<'static>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Generating,
    Cancelling,
}

struct ActiveTurn {
    request_id: String,
    cancel: CancelToken,
    events: mpsc::Receiver<TurnEvent>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Drive one authenticated, admitted connection until it ends. The permit
/// is released when this returns.
pub(crate) async fn run(socket: WebSocket, state: AppState, _permit: OwnedSemaphorePermit) {
    let (mut sink, mut stream) = socket.split();
    let mut session = Session::new(state);
    tracing::info!(connection = %session.connection_id, "session opened");

    let close_frame = loop {
        let has_turn = session.has_turn();
        let idle_remaining = session.idle_remaining();
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    session.touch();
                    match session.handle_text(&text, &mut sink).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Close(frame)) => break Some(frame),
                        Err(SinkClosed) => break None,
                    }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    // Protocol-level pings are answered by the transport;
                    // they still count as activity.
                    session.touch();
                }
                Some(Ok(Message::Close(_))) | None => break None,
                Some(Ok(_)) => {} // binary frames are ignored
                Some(Err(e)) => {
                    tracing::debug!(connection = %session.connection_id, error = %e, "socket error");
                    break None;
                }
            },

            event = session.next_turn_event(), if has_turn => {
                session.touch();
                match event {
                    Some(ev) => {
                        if session.forward_event(ev, &mut sink).await.is_err() {
                            break None;
                        }
                    }
                    // Turn task went away without a Done; recover to idle.
                    None => session.clear_turn(),
                }
            },

            _ = tokio::time::sleep(idle_remaining) => {
                tracing::info!(connection = %session.connection_id, "closing idle session");
                break Some(CloseFrame {
                    code: 4000,
                    reason: Cow::from("idle_timeout"),
                });
            }
        }
    };

    session.abandon_turn();
    if let Some(frame) = close_frame {
        let _ = sink.send(Message::Close(Some(frame))).await;
    }
    tracing::info!(connection = %session.connection_id, "session closed");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Session {
    state: AppState,
    deps: TurnDeps,
    connection_id: Uuid,
    session_id: Option<String>,
    persona: Option<Persona>,
    phase: Phase,
    current: Option<ActiveTurn>,
    message_limiter: SlidingWindowRateLimiter,
    cancel_limiter: SlidingWindowRateLimiter,
    chat_prompt_limiter: SlidingWindowRateLimiter,
    notices: RateLimitNotices,
    last_activity: Instant,
    idle_timeout: Duration,
}

impl Session {
    fn new(state: AppState) -> Self {
        let limits = &state.config.limits;
        let deps = TurnDeps {
            chat: state.chat.clone(),
            tool: state.tool.clone(),
            filters: state.filters.clone(),
            prefilter: state.prefilter.clone(),
            engines: state.config.engines.clone(),
            history_max_chars: limits.history_max_chars,
            reporter: state.reporter.clone(),
        };
        Self {
            deps,
            connection_id: Uuid::new_v4(),
            session_id: None,
            persona: None,
            phase: Phase::Idle,
            current: None,
            message_limiter: SlidingWindowRateLimiter::new(
                limits.message_limit,
                limits.message_window_s,
            ),
            cancel_limiter: SlidingWindowRateLimiter::new(
                limits.cancel_limit,
                limits.cancel_window_s,
            ),
            chat_prompt_limiter: SlidingWindowRateLimiter::new(
                limits.chat_prompt_limit,
                limits.chat_prompt_window_s,
            ),
            notices: RateLimitNotices::new(),
            last_activity: Instant::now(),
            idle_timeout: Duration::from_secs_f64(state.config.limits.idle_timeout_s),
            state,
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn idle_remaining(&self) -> Duration {
        (self.last_activity + self.idle_timeout).saturating_duration_since(Instant::now())
    }

    fn has_turn(&self) -> bool {
        self.current.is_some()
    }

    fn clear_turn(&mut self) {
        self.current = None;
        self.phase = Phase::Idle;
    }

    /// Cancel whatever turn is still running; used on every exit path.
    fn abandon_turn(&mut self) {
        if let Some(turn) = self.current.take() {
            turn.cancel.cancel();
        }
    }

    async fn next_turn_event(&mut self) -> Option<TurnEvent> {
        match self.current.as_mut() {
            Some(turn) => turn.events.recv().await,
            None => std::future::pending().await,
        }
    }

    async fn send(&mut self, sink: &mut WsSink, frame: ServerFrame) -> Result<(), SinkClosed> {
        self.touch();
        sink.send(Message::Text(frame.to_json()))
            .await
            .map_err(|_| SinkClosed)
    }

    // ── Inbound dispatch ─────────────────────────────────────────────

    async fn handle_text(&mut self, text: &str, sink: &mut WsSink) -> Result<Flow, SinkClosed> {
        let frame = match parse_client_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                self.send(sink, parse_error_frame(&e)).await?;
                return Ok(Flow::Continue);
            }
        };

        let bucket = bucket_for(&frame);
        if bucket != Bucket::Exempt {
            if let Err(exceeded) = self.limiter_for(bucket).consume() {
                let notice = match bucket {
                    Bucket::Message => Some(self.notices.next()),
                    _ => None,
                };
                tracing::debug!(
                    connection = %self.connection_id,
                    bucket = bucket.label(),
                    "frame dropped by rate limiter"
                );
                self.send(sink, rate_limit_frame(bucket, &exceeded, notice))
                    .await?;
                return Ok(Flow::Continue);
            }
        }

        match frame {
            ClientFrame::Start(payload) => self.handle_start(payload, sink).await?,
            ClientFrame::Cancel => self.handle_cancel(),
            ClientFrame::ChatPrompt(payload) => self.handle_chat_prompt(payload, sink).await?,
            ClientFrame::Ping => self.send(sink, ServerFrame::Pong {}).await?,
            ClientFrame::Pong => {}
            ClientFrame::End => {
                return Ok(Flow::Close(CloseFrame {
                    code: 1000,
                    reason: Cow::from(""),
                }))
            }
        }
        Ok(Flow::Continue)
    }

    async fn handle_start(
        &mut self,
        payload: StartPayload,
        sink: &mut WsSink,
    ) -> Result<(), SinkClosed> {
        if self.phase != Phase::Idle {
            self.send(
                sink,
                ServerFrame::error("validation_error", "a generation is already in progress"),
            )
            .await?;
            return Ok(());
        }

        let validated = match validate_start(
            payload,
            self.session_id.as_deref(),
            self.persona.as_ref(),
            &self.state.config,
            &self.state.filters,
        ) {
            Ok(v) => v,
            Err(e) => {
                self.send(sink, ServerFrame::error(e.wire_code(), e.to_string()))
                    .await?;
                return Ok(());
            }
        };

        self.session_id = Some(validated.session_id.clone());
        self.persona = Some(validated.persona.clone());

        let request_id = Uuid::new_v4().to_string();
        let cancel = CancelToken::new();
        let events = run_turn(self.deps.clone(), validated, cancel.clone());
        tracing::debug!(
            connection = %self.connection_id,
            request_id = %request_id,
            "turn spawned"
        );
        self.current = Some(ActiveTurn {
            request_id,
            cancel,
            events,
        });
        self.phase = Phase::Generating;
        Ok(())
    }

    fn handle_cancel(&mut self) {
        match (&self.current, self.phase) {
            (Some(turn), Phase::Generating) => {
                turn.cancel.cancel();
                self.phase = Phase::Cancelling;
                tracing::debug!(
                    connection = %self.connection_id,
                    request_id = %turn.request_id,
                    "cancel requested"
                );
            }
            // A cancel that races the turn's end (or repeats) is dropped;
            // the client already has or will get its closing `done`.
            _ => tracing::debug!(connection = %self.connection_id, "cancel with no active turn"),
        }
    }

    async fn handle_chat_prompt(
        &mut self,
        payload: ChatPromptPayload,
        sink: &mut WsSink,
    ) -> Result<(), SinkClosed> {
        if self.phase != Phase::Idle {
            self.send(
                sink,
                ServerFrame::error(
                    "validation_error",
                    "chat_prompt cannot change while generating; it applies from the next turn",
                ),
            )
            .await?;
            return Ok(());
        }

        match validate_chat_prompt(
            payload,
            self.persona.as_ref(),
            &self.state.config,
            &self.state.filters,
        ) {
            Ok((persona, changed)) => {
                self.persona = Some(persona);
                let code = if changed { 200 } else { 204 };
                self.send(
                    sink,
                    ServerFrame::Ack {
                        target: "chat_prompt",
                        request_id: None,
                        code,
                    },
                )
                .await
            }
            Err(e) => {
                self.send(sink, ServerFrame::error(e.wire_code(), e.to_string()))
                    .await
            }
        }
    }

    fn limiter_for(&mut self, bucket: Bucket) -> &mut SlidingWindowRateLimiter {
        match bucket {
            Bucket::Cancel => &mut self.cancel_limiter,
            Bucket::ChatPrompt => &mut self.chat_prompt_limiter,
            _ => &mut self.message_limiter,
        }
    }

    // ── Turn event forwarding ────────────────────────────────────────

    async fn forward_event(
        &mut self,
        event: TurnEvent,
        sink: &mut WsSink,
    ) -> Result<(), SinkClosed> {
        let request_id = self
            .current
            .as_ref()
            .map(|t| t.request_id.clone())
            .unwrap_or_default();

        let frame = match event {
            TurnEvent::Ack => ServerFrame::Ack {
                target: "start",
                request_id: Some(request_id),
                code: 200,
            },
            TurnEvent::ToolCall { status, raw } => ServerFrame::Toolcall {
                status,
                raw,
                request_id,
            },
            TurnEvent::Token { text } => ServerFrame::Token {
                text,
                request_id,
            },
            TurnEvent::Final { normalized_text } => ServerFrame::Final {
                normalized_text,
                request_id,
            },
            TurnEvent::Error { code, message } => ServerFrame::error(code, message),
            TurnEvent::Done { cancelled } => {
                self.clear_turn();
                ServerFrame::Done {
                    request_id,
                    cancelled,
                }
            }
        };
        self.send(sink, frame).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Frame builders
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_error_frame(err: &FrameParseError) -> ServerFrame {
    let message = match err {
        FrameParseError::InvalidMessage => "frames must be JSON objects".to_string(),
        FrameParseError::UnknownType(ty) if ty.is_empty() => {
            "frame has no type field".to_string()
        }
        FrameParseError::UnknownType(ty) => format!("unknown message type: {ty}"),
        FrameParseError::InvalidPayload(detail) => detail.clone(),
    };
    ServerFrame::error(err.wire_code(), message)
}

fn rate_limit_frame(
    bucket: Bucket,
    exceeded: &RateLimitExceeded,
    notice: Option<&'static str>,
) -> ServerFrame {
    let retry_in = exceeded.retry_in.ceil().max(1.0) as u64;
    ServerFrame::Error {
        code: format!("{}_rate_limited", bucket.label()),
        message: format!(
            "{} rate limit: at most {} per {} seconds; retry in {} seconds",
            bucket.label(),
            exceeded.limit,
            exceeded.window_seconds as u64,
            retry_in,
        ),
        retry_in: Some(retry_in),
        friendly_message: notice.map(str::to_string),
        details: None,
    }
}
