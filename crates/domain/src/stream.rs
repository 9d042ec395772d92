//! Streaming primitives shared by the engine adapters and the gateway.

use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::config::SamplingBounds;

/// Boxed async stream alias used at every engine seam.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// One incremental slice of decoded model output.
///
/// The engine adapter owns incremental detokenization; by the time a chunk
/// reaches the gateway it is plain text. `done` is set on the final chunk
/// of a generation (possibly with empty `text`).
#[derive(Debug, Clone, PartialEq)]
pub struct TokenChunk {
    pub text: String,
    pub done: bool,
}

impl TokenChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            done: false,
        }
    }

    pub fn done() -> Self {
        Self {
            text: String::new(),
            done: true,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sampling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Client-supplied sampling overrides from a `start` frame. All fields are
/// optional; missing fields fall back to configured defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SamplingOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f32>,
}

/// Resolved sampling parameters sent to an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
    pub max_tokens: u32,
}

impl SamplingParams {
    /// Resolve overrides against defaults, rejecting out-of-bounds values.
    ///
    /// A `None` field takes the configured default; a `Some` outside its
    /// [min, max] range is a caller error (`invalid_settings`).
    pub fn resolve(
        overrides: &SamplingOverrides,
        bounds: &SamplingBounds,
        max_tokens: u32,
    ) -> crate::Result<Self> {
        let temperature = resolve_field(
            "temperature",
            overrides.temperature,
            bounds.temperature_default,
            bounds.temperature_min,
            bounds.temperature_max,
        )?;
        let top_p = resolve_field(
            "top_p",
            overrides.top_p,
            bounds.top_p_default,
            bounds.top_p_min,
            bounds.top_p_max,
        )?;
        let repetition_penalty = resolve_field(
            "repetition_penalty",
            overrides.repetition_penalty,
            bounds.repetition_penalty_default,
            bounds.repetition_penalty_min,
            bounds.repetition_penalty_max,
        )?;
        Ok(Self {
            temperature,
            top_p,
            repetition_penalty,
            max_tokens,
        })
    }
}

fn resolve_field(
    name: &'static str,
    value: Option<f32>,
    default: f32,
    min: f32,
    max: f32,
) -> crate::Result<f32> {
    match value {
        None => Ok(default),
        Some(v) if v.is_finite() && v >= min && v <= max => Ok(v),
        Some(v) => Err(crate::Error::validation(
            "invalid_settings",
            format!("{name} must be between {min} and {max}, got {v}"),
        )),
    }
}
