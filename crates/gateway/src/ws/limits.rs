//! Per-session sliding-window rate limiting.
//!
//! Three buckets: `start` frames, `cancel` frames (their own bucket so a
//! cancel burst cannot starve messaging), and `chat_prompt` updates.
//! Control traffic (ping/pong/end) is exempt because it is liveness or
//! teardown bookkeeping, not work.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bn_domain::frame::ClientFrame;

/// Returned when a limiter rejects an event.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitExceeded {
    /// Seconds until the oldest in-window event expires.
    pub retry_in: f64,
    pub limit: u32,
    pub window_seconds: f64,
}

/// Sliding-window limiter backed by a ring of event timestamps, pruned
/// lazily on each consume. A limit or window of zero disables it.
pub struct SlidingWindowRateLimiter {
    limit: u32,
    window: Duration,
    hits: VecDeque<Instant>,
}

impl SlidingWindowRateLimiter {
    pub fn new(limit: u32, window_seconds: f64) -> Self {
        Self {
            limit,
            window: Duration::from_secs_f64(window_seconds.max(0.0)),
            hits: VecDeque::with_capacity(limit as usize),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window_seconds(&self) -> f64 {
        self.window.as_secs_f64()
    }

    /// Record one event, rejecting it if the window is full.
    pub fn consume(&mut self) -> Result<(), RateLimitExceeded> {
        self.consume_at(Instant::now())
    }

    fn consume_at(&mut self, now: Instant) -> Result<(), RateLimitExceeded> {
        if self.limit == 0 || self.window.is_zero() {
            return Ok(());
        }

        while let Some(oldest) = self.hits.front() {
            if now.duration_since(*oldest) >= self.window {
                self.hits.pop_front();
            } else {
                break;
            }
        }

        if self.hits.len() >= self.limit as usize {
            let oldest = *self.hits.front().expect("ring is non-empty at limit");
            let retry_in = (self.window - now.duration_since(oldest)).as_secs_f64();
            return Err(RateLimitExceeded {
                retry_in,
                limit: self.limit,
                window_seconds: self.window.as_secs_f64(),
            });
        }

        self.hits.push_back(now);
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Bucket selection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Message,
    Cancel,
    ChatPrompt,
    Exempt,
}

impl Bucket {
    /// The `<label>_rate_limited` wire prefix.
    pub fn label(&self) -> &'static str {
        match self {
            Bucket::Message => "message",
            Bucket::Cancel => "cancel",
            Bucket::ChatPrompt => "chat_prompt",
            Bucket::Exempt => "",
        }
    }
}

/// Pick which limiter bucket applies to a parsed frame.
pub fn bucket_for(frame: &ClientFrame) -> Bucket {
    match frame {
        ClientFrame::Start(_) => Bucket::Message,
        ClientFrame::Cancel => Bucket::Cancel,
        ClientFrame::ChatPrompt(_) => Bucket::ChatPrompt,
        ClientFrame::Ping | ClientFrame::Pong | ClientFrame::End => Bucket::Exempt,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Friendly notices
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const MESSAGE_RATE_LIMIT_NOTICES: &[&str] = &[
    "Whoa, slow down a little! Give me a second to catch up.",
    "You're too fast for me! Let's take a tiny breather.",
    "Easy there! I can only keep up with so much at once.",
    "One at a time, please! I promise I'm listening.",
];

/// Rotates through the notice pool without repeats until it is exhausted,
/// then starts over. Only `message` rate-limit errors carry one.
pub struct RateLimitNotices {
    next: usize,
}

impl RateLimitNotices {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn next(&mut self) -> &'static str {
        let notice = MESSAGE_RATE_LIMIT_NOTICES[self.next];
        self.next = (self.next + 1) % MESSAGE_RATE_LIMIT_NOTICES.len();
        notice
    }
}

impl Default for RateLimitNotices {
    fn default() -> Self {
        Self::new()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
