//! Persona model: gender, personality tag, and the free-text chat prompt.
//!
//! Gender and personality arrive as loose client strings and are normalized
//! before they touch a prompt; the chat prompt itself goes through the
//! inbound sanitizer at the gateway layer.

use serde::{Deserialize, Serialize};

/// Longest accepted personality tag, in characters.
pub const PERSONALITY_MAX_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
}

impl Gender {
    pub fn label(&self) -> &'static str {
        match self {
            Gender::Female => "female",
            Gender::Male => "male",
        }
    }
}

/// Validated persona, immutable for the duration of one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub gender: Gender,
    pub personality: String,
    pub chat_prompt: String,
}

/// Normalize a client gender string to `Female`/`Male`.
pub fn normalize_gender(val: Option<&str>) -> Option<Gender> {
    match val?.trim().to_lowercase().as_str() {
        "female" => Some(Gender::Female),
        "male" => Some(Gender::Male),
        _ => None,
    }
}

/// Normalize a personality tag: letters-only, length-limited, lowercased.
pub fn normalize_personality(val: Option<&str>) -> Option<String> {
    let v = val?.trim();
    if v.is_empty() || v.chars().count() > PERSONALITY_MAX_LEN {
        return None;
    }
    if !v.chars().all(|c| c.is_alphabetic()) {
        return None;
    }
    Some(v.to_lowercase())
}
