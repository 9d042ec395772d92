use serde::{Deserialize, Serialize};

use super::env_parse;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session limits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Idle-watchdog, rate-window, and inbound-size limits for one session.
///
/// A limit of 0 (or a window of 0) disables the corresponding bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Seconds without any frame in either direction before close 4000.
    #[serde(default = "d_idle")]
    pub idle_timeout_s: f64,

    /// `start` frame bucket.
    #[serde(default = "d_msg_limit")]
    pub message_limit: u32,
    #[serde(default = "d_window")]
    pub message_window_s: f64,

    /// `cancel` frame bucket. Separate so cancel bursts cannot starve
    /// regular messaging.
    #[serde(default = "d_cancel_limit")]
    pub cancel_limit: u32,
    #[serde(default = "d_window")]
    pub cancel_window_s: f64,

    /// `chat_prompt` update bucket.
    #[serde(default = "d_prompt_limit")]
    pub chat_prompt_limit: u32,
    #[serde(default = "d_window")]
    pub chat_prompt_window_s: f64,

    /// Maximum characters accepted for any inbound text field after
    /// sanitization.
    #[serde(default = "d_max_chars")]
    pub prompt_sanitize_max_chars: usize,

    /// Character budget for the history block of a chat prompt; oldest
    /// turns are dropped first.
    #[serde(default = "d_history_chars")]
    pub history_max_chars: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_s: d_idle(),
            message_limit: d_msg_limit(),
            message_window_s: d_window(),
            cancel_limit: d_cancel_limit(),
            cancel_window_s: d_window(),
            chat_prompt_limit: d_prompt_limit(),
            chat_prompt_window_s: d_window(),
            prompt_sanitize_max_chars: d_max_chars(),
            history_max_chars: d_history_chars(),
        }
    }
}

impl LimitsConfig {
    pub fn from_env() -> Self {
        Self {
            idle_timeout_s: env_parse("WS_IDLE_TIMEOUT_S", d_idle()),
            message_limit: env_parse("WS_MAX_MESSAGES_PER_WINDOW", d_msg_limit()),
            message_window_s: env_parse("WS_MESSAGE_WINDOW_SECONDS", d_window()),
            cancel_limit: env_parse("WS_MAX_CANCELS_PER_WINDOW", d_cancel_limit()),
            cancel_window_s: env_parse("WS_CANCEL_WINDOW_SECONDS", d_window()),
            chat_prompt_limit: env_parse("WS_MAX_CHAT_PROMPT_UPDATES_PER_WINDOW", d_prompt_limit()),
            chat_prompt_window_s: env_parse("WS_CHAT_PROMPT_WINDOW_SECONDS", d_window()),
            prompt_sanitize_max_chars: env_parse("PROMPT_SANITIZE_MAX_CHARS", d_max_chars()),
            history_max_chars: env_parse("HISTORY_MAX_CHARS", d_history_chars()),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_idle() -> f64 {
    150.0
}
fn d_msg_limit() -> u32 {
    20
}
fn d_cancel_limit() -> u32 {
    10
}
fn d_prompt_limit() -> u32 {
    5
}
fn d_window() -> f64 {
    60.0
}
fn d_max_chars() -> usize {
    8192
}
fn d_history_chars() -> usize {
    12_000
}
