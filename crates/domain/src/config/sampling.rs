use serde::{Deserialize, Serialize};

use super::env_parse;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sampling bounds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Defaults and accepted ranges for client-tunable sampling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingBounds {
    #[serde(default = "d_temp")]
    pub temperature_default: f32,
    #[serde(default = "d_temp_min")]
    pub temperature_min: f32,
    #[serde(default = "d_temp_max")]
    pub temperature_max: f32,

    #[serde(default = "d_top_p")]
    pub top_p_default: f32,
    #[serde(default = "d_top_p_min")]
    pub top_p_min: f32,
    #[serde(default = "d_top_p_max")]
    pub top_p_max: f32,

    #[serde(default = "d_rep")]
    pub repetition_penalty_default: f32,
    #[serde(default = "d_rep_min")]
    pub repetition_penalty_min: f32,
    #[serde(default = "d_rep_max")]
    pub repetition_penalty_max: f32,
}

impl Default for SamplingBounds {
    fn default() -> Self {
        Self {
            temperature_default: d_temp(),
            temperature_min: d_temp_min(),
            temperature_max: d_temp_max(),
            top_p_default: d_top_p(),
            top_p_min: d_top_p_min(),
            top_p_max: d_top_p_max(),
            repetition_penalty_default: d_rep(),
            repetition_penalty_min: d_rep_min(),
            repetition_penalty_max: d_rep_max(),
        }
    }
}

impl SamplingBounds {
    pub fn from_env() -> Self {
        Self {
            temperature_default: env_parse("CHAT_TEMPERATURE_DEFAULT", d_temp()),
            temperature_min: env_parse("CHAT_TEMPERATURE_MIN", d_temp_min()),
            temperature_max: env_parse("CHAT_TEMPERATURE_MAX", d_temp_max()),
            top_p_default: env_parse("CHAT_TOP_P_DEFAULT", d_top_p()),
            top_p_min: env_parse("CHAT_TOP_P_MIN", d_top_p_min()),
            top_p_max: env_parse("CHAT_TOP_P_MAX", d_top_p_max()),
            repetition_penalty_default: env_parse("CHAT_REPETITION_PENALTY_DEFAULT", d_rep()),
            repetition_penalty_min: env_parse("CHAT_REPETITION_PENALTY_MIN", d_rep_min()),
            repetition_penalty_max: env_parse("CHAT_REPETITION_PENALTY_MAX", d_rep_max()),
        }
    }

    /// Sanity-check that every default sits inside its own range.
    pub fn check(&self) -> Result<(), String> {
        for (name, default, min, max) in [
            (
                "temperature",
                self.temperature_default,
                self.temperature_min,
                self.temperature_max,
            ),
            ("top_p", self.top_p_default, self.top_p_min, self.top_p_max),
            (
                "repetition_penalty",
                self.repetition_penalty_default,
                self.repetition_penalty_min,
                self.repetition_penalty_max,
            ),
        ] {
            if min > max {
                return Err(format!("{name}: min {min} exceeds max {max}"));
            }
            if default < min || default > max {
                return Err(format!(
                    "{name}: default {default} outside [{min}, {max}]"
                ));
            }
        }
        Ok(())
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_temp() -> f32 {
    0.8
}
fn d_temp_min() -> f32 {
    0.0
}
fn d_temp_max() -> f32 {
    2.0
}
fn d_top_p() -> f32 {
    0.95
}
fn d_top_p_min() -> f32 {
    0.05
}
fn d_top_p_max() -> f32 {
    1.0
}
fn d_rep() -> f32 {
    1.1
}
fn d_rep_min() -> f32 {
    1.0
}
fn d_rep_max() -> f32 {
    2.0
}
