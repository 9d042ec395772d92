use serde::{Deserialize, Serialize};

use super::{env_parse, env_string};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engines
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Endpoints and budgets for the two co-located generation engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnginesConfig {
    /// OpenAI-compatible completions endpoint of the chat engine.
    #[serde(default = "d_chat_url")]
    pub chat_url: String,
    /// OpenAI-compatible completions endpoint of the tool classifier.
    #[serde(default = "d_tool_url")]
    pub tool_url: String,
    /// Model name passed through to the chat engine.
    #[serde(default = "d_chat_model")]
    pub chat_model: String,
    /// Model name passed through to the tool classifier.
    #[serde(default = "d_tool_model")]
    pub tool_model: String,
    /// Output token cap for chat turns.
    #[serde(default = "d_chat_max_out")]
    pub chat_max_out: u32,
    /// Output token cap for classifier completions (tiny by design).
    #[serde(default = "d_tool_max_out")]
    pub tool_max_out: u32,
    /// Hard per-request deadline for either engine, in seconds.
    #[serde(default = "d_timeout")]
    pub timeout_s: f64,
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            chat_url: d_chat_url(),
            tool_url: d_tool_url(),
            chat_model: d_chat_model(),
            tool_model: d_tool_model(),
            chat_max_out: d_chat_max_out(),
            tool_max_out: d_tool_max_out(),
            timeout_s: d_timeout(),
        }
    }
}

impl EnginesConfig {
    pub fn from_env() -> Self {
        Self {
            chat_url: env_string("CHAT_ENGINE_URL", &d_chat_url()),
            tool_url: env_string("TOOL_ENGINE_URL", &d_tool_url()),
            chat_model: env_string("CHAT_MODEL", &d_chat_model()),
            tool_model: env_string("TOOL_MODEL", &d_tool_model()),
            chat_max_out: env_parse("CHAT_MAX_OUT", d_chat_max_out()),
            tool_max_out: env_parse("TOOL_MAX_OUT", d_tool_max_out()),
            timeout_s: env_parse("ENGINE_TIMEOUT_S", d_timeout()),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_chat_url() -> String {
    "http://127.0.0.1:8001".into()
}
fn d_tool_url() -> String {
    "http://127.0.0.1:8002".into()
}
fn d_chat_model() -> String {
    "chat".into()
}
fn d_tool_model() -> String {
    "tool".into()
}
fn d_chat_max_out() -> u32 {
    200
}
fn d_tool_max_out() -> u32 {
    10
}
fn d_timeout() -> f64 {
    45.0
}
