//! Shared error type used across all banter crates.
//!
//! Every failure that can cross a crate boundary is a variant here, so the
//! gateway can translate any error into exactly one wire envelope and one
//! metrics label (see [`Error::classify`]).

/// Shared error type used across all banter crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    /// Caller-at-fault input rejection. `code` is the wire `error.code`.
    #[error("{message}")]
    Validation { code: &'static str, message: String },

    /// A sliding-window limiter rejected the frame.
    #[error("{label} rate limit exceeded")]
    RateLimited {
        label: &'static str,
        retry_in: f64,
        limit: u32,
        window_seconds: f64,
    },

    /// Cooperative cancel observed; control flow, not a failure.
    #[error("stream cancelled")]
    Cancelled,

    #[error("engine not ready: {0}")]
    EngineNotReady(String),

    #[error("engine shut down: {0}")]
    EngineShutdown(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("connection: {0}")]
    Connection(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Convenience constructor for validation failures.
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Error::Validation {
            code,
            message: message.into(),
        }
    }

    /// Map the error to a stable category label for metrics and report
    /// deduplication.
    pub fn classify(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "validation",
            Error::RateLimited { .. } => "rate_limit",
            Error::Cancelled => "cancelled",
            Error::EngineNotReady(_) => "engine_not_ready",
            Error::EngineShutdown(_) => "engine_shutdown",
            Error::Timeout(_) => "timeout",
            Error::Connection(_) | Error::Io(_) | Error::Http(_) => "connection",
            Error::Json(_) | Error::Other(_) => "unknown",
        }
    }

    /// The wire `error.code` this error maps to when it reaches a client.
    pub fn wire_code(&self) -> &'static str {
        match self {
            Error::Validation { code, .. } => code,
            Error::RateLimited { label, .. } => match *label {
                "message" => "message_rate_limited",
                "cancel" => "cancel_rate_limited",
                _ => "chat_prompt_rate_limited",
            },
            Error::Timeout(_) => "timeout",
            _ => "internal_error",
        }
    }
}
