use serde::{Deserialize, Serialize};

use super::{env_parse, env_string};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the WebSocket listener.
    #[serde(default = "d_bind")]
    pub bind_addr: String,
    /// Shared API secret. Empty means unset (startup refuses to serve).
    /// Skipped in serialized dumps so `config show` never prints it.
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// Capacity semaphore size; one permit per live connection.
    #[serde(default = "d_capacity")]
    pub max_concurrent_connections: usize,
    /// How long a handshake may wait for an admission permit before being
    /// turned away with `server_at_capacity`.
    #[serde(default = "d_admission_ms")]
    pub admission_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: d_bind(),
            api_key: String::new(),
            max_concurrent_connections: d_capacity(),
            admission_timeout_ms: d_admission_ms(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_string("BIND_ADDR", &d_bind()),
            api_key: env_string("TEXT_API_KEY", ""),
            max_concurrent_connections: env_parse("MAX_CONCURRENT_CONNECTIONS", d_capacity()),
            admission_timeout_ms: env_parse("ADMISSION_TIMEOUT_MS", d_admission_ms()),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_bind() -> String {
    "0.0.0.0:8100".into()
}
fn d_capacity() -> usize {
    32
}
fn d_admission_ms() -> u64 {
    250
}
