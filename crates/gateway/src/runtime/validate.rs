//! Semantic validation for `start` and `chat_prompt` payloads.
//!
//! Shape checks already happened at frame parsing; this layer normalizes
//! persona fields, sanitizes every inbound string, clamps sampling
//! overrides, and merges payload fields with the session's stored persona.

use bn_domain::config::Config;
use bn_domain::frame::{ChatPromptPayload, StartPayload};
use bn_domain::history::ChatTurn;
use bn_domain::persona::{normalize_gender, normalize_personality, Persona};
use bn_domain::stream::{SamplingOverrides, SamplingParams};
use bn_domain::{Error, Result};
use bn_sanitize::{sanitize_prompt, Filters};

/// A `start` payload after validation: everything the orchestrator needs.
#[derive(Debug, Clone)]
pub struct ValidatedStart {
    pub session_id: String,
    pub persona: Persona,
    pub history: Vec<ChatTurn>,
    pub utterance: String,
    pub sampling: SamplingParams,
}

/// Validate a `start` payload against the session's stored state.
///
/// `current_session_id` and `stored_persona` fill in fields the payload
/// omits; persona fields supplied here also become the session's new
/// stored persona.
pub fn validate_start(
    payload: StartPayload,
    current_session_id: Option<&str>,
    stored_persona: Option<&Persona>,
    config: &Config,
    filters: &Filters,
) -> Result<ValidatedStart> {
    let session_id = match payload.session_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => current_session_id
            .map(str::to_string)
            .ok_or_else(|| Error::validation("missing_session_id", "session_id is required"))?,
    };

    let persona = resolve_persona(
        payload.gender.as_deref(),
        payload.personality.as_deref(),
        payload.chat_prompt.as_deref(),
        stored_persona,
        config,
        filters,
    )?;

    let max_chars = config.limits.prompt_sanitize_max_chars;
    let utterance = sanitize_prompt(
        filters,
        "user_utterance",
        payload.user_utterance.as_deref(),
        max_chars,
    )?;

    let mut history = Vec::with_capacity(payload.history.len());
    for turn in payload.history {
        let content = sanitize_prompt(filters, "history content", Some(&turn.content), max_chars)?;
        history.push(ChatTurn {
            role: turn.role,
            content,
        });
    }

    let sampling = SamplingParams::resolve(
        &payload.sampling.unwrap_or(SamplingOverrides::default()),
        &config.sampling,
        config.engines.chat_max_out,
    )?;

    Ok(ValidatedStart {
        session_id,
        persona,
        history,
        utterance,
        sampling,
    })
}

/// Validate a `chat_prompt` persona update. Returns the new persona and
/// whether it differs from the stored one.
pub fn validate_chat_prompt(
    payload: ChatPromptPayload,
    stored_persona: Option<&Persona>,
    config: &Config,
    filters: &Filters,
) -> Result<(Persona, bool)> {
    let persona = resolve_persona(
        payload.gender.as_deref(),
        payload.personality.as_deref(),
        payload.chat_prompt.as_deref(),
        stored_persona,
        config,
        filters,
    )?;
    let changed = stored_persona != Some(&persona);
    Ok((persona, changed))
}

/// Merge persona fields from a payload with the stored persona, validating
/// whatever the payload supplies.
fn resolve_persona(
    gender: Option<&str>,
    personality: Option<&str>,
    chat_prompt: Option<&str>,
    stored: Option<&Persona>,
    config: &Config,
    filters: &Filters,
) -> Result<Persona> {
    let gender = match gender {
        Some(raw) => normalize_gender(Some(raw)).ok_or_else(|| {
            Error::validation("invalid_payload", "gender must be \"female\" or \"male\"")
        })?,
        None => {
            stored
                .map(|p| p.gender)
                .ok_or_else(|| Error::validation("invalid_payload", "gender is required"))?
        }
    };

    let personality = match personality {
        Some(raw) => normalize_personality(Some(raw)).ok_or_else(|| {
            Error::validation(
                "invalid_payload",
                "personality must be letters only and reasonably short",
            )
        })?,
        None => stored
            .map(|p| p.personality.clone())
            .ok_or_else(|| Error::validation("invalid_payload", "personality is required"))?,
    };

    let chat_prompt = match chat_prompt {
        Some(raw) => sanitize_prompt(
            filters,
            "chat_prompt",
            Some(raw),
            config.limits.prompt_sanitize_max_chars,
        )?,
        None => stored
            .map(|p| p.chat_prompt.clone())
            .ok_or_else(|| Error::validation("invalid_payload", "chat_prompt is required"))?,
    };

    Ok(Persona {
        gender,
        personality,
        chat_prompt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bn_domain::persona::Gender;

    fn config() -> Config {
        Config::default()
    }

    fn filters() -> Filters {
        Filters::new()
    }

    fn full_payload() -> StartPayload {
        StartPayload {
            session_id: Some("s1".into()),
            gender: Some("female".into()),
            personality: Some("Warm".into()),
            chat_prompt: Some("Be kind.".into()),
            history: vec![ChatTurn::user("hi"), ChatTurn::assistant("hello!")],
            user_utterance: Some("look at this".into()),
            sampling: None,
        }
    }

    #[test]
    fn accepts_complete_payload() {
        let v = validate_start(full_payload(), None, None, &config(), &filters()).unwrap();
        assert_eq!(v.session_id, "s1");
        assert_eq!(v.persona.gender, Gender::Female);
        assert_eq!(v.persona.personality, "warm");
        assert_eq!(v.utterance, "look at this");
        assert_eq!(v.history.len(), 2);
    }

    #[test]
    fn missing_session_id_without_stored_fails() {
        let mut payload = full_payload();
        payload.session_id = None;
        let err = validate_start(payload, None, None, &config(), &filters()).unwrap_err();
        assert_eq!(err.wire_code(), "missing_session_id");
    }

    #[test]
    fn stored_session_id_fills_in() {
        let mut payload = full_payload();
        payload.session_id = None;
        let v = validate_start(payload, Some("prev"), None, &config(), &filters()).unwrap();
        assert_eq!(v.session_id, "prev");
    }

    #[test]
    fn bad_gender_rejected() {
        let mut payload = full_payload();
        payload.gender = Some("robot".into());
        let err = validate_start(payload, None, None, &config(), &filters()).unwrap_err();
        assert_eq!(err.wire_code(), "invalid_payload");
    }

    #[test]
    fn stored_persona_fills_missing_fields() {
        let stored = Persona {
            gender: Gender::Male,
            personality: "dry".into(),
            chat_prompt: "Keep it brief.".into(),
        };
        let mut payload = full_payload();
        payload.gender = None;
        payload.personality = None;
        payload.chat_prompt = None;
        let v = validate_start(payload, None, Some(&stored), &config(), &filters()).unwrap();
        assert_eq!(v.persona, stored);
    }

    #[test]
    fn missing_utterance_fails() {
        let mut payload = full_payload();
        payload.user_utterance = None;
        let err = validate_start(payload, None, None, &config(), &filters()).unwrap_err();
        assert_eq!(err.wire_code(), "validation_error");
    }

    #[test]
    fn oversized_history_entry_fails() {
        let mut payload = full_payload();
        let cap = config().limits.prompt_sanitize_max_chars;
        payload.history = vec![ChatTurn::user("y".repeat(cap + 1))];
        let err = validate_start(payload, None, None, &config(), &filters()).unwrap_err();
        assert_eq!(err.wire_code(), "validation_error");
    }

    #[test]
    fn out_of_range_sampling_fails() {
        let mut payload = full_payload();
        payload.sampling = Some(SamplingOverrides {
            temperature: Some(9.5),
            ..Default::default()
        });
        let err = validate_start(payload, None, None, &config(), &filters()).unwrap_err();
        assert_eq!(err.wire_code(), "invalid_settings");
    }

    #[test]
    fn chat_prompt_update_reports_changed_flag() {
        let config = config();
        let filters = filters();
        let payload = ChatPromptPayload {
            gender: Some("male".into()),
            personality: Some("dry".into()),
            chat_prompt: Some("Short answers.".into()),
        };
        let (persona, changed) =
            validate_chat_prompt(payload.clone(), None, &config, &filters).unwrap();
        assert!(changed);

        let (_, changed_again) =
            validate_chat_prompt(payload, Some(&persona), &config, &filters).unwrap();
        assert!(!changed_again);
    }
}
