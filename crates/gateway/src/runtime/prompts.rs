//! Prompt assembly for both engines and classifier output parsing.

use chrono::{DateTime, Timelike, Utc};

use bn_domain::history::ChatTurn;
use bn_domain::persona::Persona;

use super::ToolDecision;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat prompt
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Assemble the chat engine prompt: persona block, time-of-day context,
/// the character-budgeted history, and the new utterance.
pub fn build_chat_prompt(
    persona: &Persona,
    history: &[ChatTurn],
    utterance: &str,
    history_max_chars: usize,
    now: DateTime<Utc>,
) -> String {
    let mut prompt = String::with_capacity(
        persona.chat_prompt.len() + history_max_chars + utterance.len() + 128,
    );

    prompt.push_str(&persona.chat_prompt);
    prompt.push_str("\n\nYou are ");
    prompt.push_str(persona.gender.label());
    prompt.push_str(" and your personality is ");
    prompt.push_str(&persona.personality);
    prompt.push_str(".\nIt is currently ");
    prompt.push_str(time_classification(now.hour()));
    prompt.push_str(" for the user.\n\n");

    for turn in budget_history(history, history_max_chars) {
        prompt.push_str(match turn.role {
            bn_domain::history::Role::User => "User: ",
            bn_domain::history::Role::Assistant => "Assistant: ",
        });
        prompt.push_str(&turn.content);
        prompt.push('\n');
    }

    prompt.push_str("User: ");
    prompt.push_str(utterance);
    prompt.push_str("\nAssistant:");
    prompt
}

/// Keep the newest history turns whose contents fit the character budget;
/// oldest turns drop first.
fn budget_history(history: &[ChatTurn], max_chars: usize) -> &[ChatTurn] {
    let mut used = 0;
    let mut start = history.len();
    for (idx, turn) in history.iter().enumerate().rev() {
        used += turn.content.chars().count();
        if used > max_chars {
            break;
        }
        start = idx;
    }
    &history[start..]
}

/// Time-of-day label fed into the chat prompt for persona context.
pub fn time_classification(hour: u32) -> &'static str {
    match hour {
        0 => "Midnight",
        1..=3 => "Night",
        4..=6 => "Early Morning",
        7..=11 => "Morning",
        12 => "Noon",
        13..=16 => "Afternoon",
        17..=20 => "Early Evening",
        21..=23 => "Evening",
        _ => "Unknown",
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool classifier prompt
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Decision rules for the tool classifier. The model answers with a bare
/// JSON array: either `[{"name": "take_screenshot"}]` or `[]`.
const TOOL_DECISION_RULES: &str = r#"You are a tool-calling assistant. Decide: should a screenshot be taken to see what the user is showing right now?

Take a screenshot when the user issues a direct visual command ("look at this", "see this X", "check this out", "take a look") or asks for a visual evaluation ("how does this look", "is this good", "thoughts on this"), or mentions "this X" where X was never discussed before.

Do not take a screenshot for multiple or continuous requests (numbers, "twice", "keep", "forever"), abstract conversation, silent observation, past events ("just saw", "passed by"), future hypotheticals ("I'll show you"), or things already discussed in the conversation.

Output ONLY valid JSON, no explanations:
- screenshot: [{"name": "take_screenshot"}]
- no screenshot: []"#;

/// How many trailing history turns the classifier sees for context.
const TOOL_HISTORY_TURNS: usize = 6;

pub fn build_tool_prompt(history: &[ChatTurn], utterance: &str) -> String {
    let mut prompt = String::from(TOOL_DECISION_RULES);
    prompt.push_str("\n\nConversation:\n");
    let start = history.len().saturating_sub(TOOL_HISTORY_TURNS);
    for turn in &history[start..] {
        prompt.push_str(turn.role.label());
        prompt.push_str(": ");
        prompt.push_str(&turn.content);
        prompt.push('\n');
    }
    prompt.push_str("user: ");
    prompt.push_str(utterance);
    prompt.push_str("\nDecision:");
    prompt
}

/// Parse the classifier completion into a decision.
///
/// The completion should be a JSON array of named calls; anything
/// malformed, empty, or unexpected resolves to "no".
pub fn parse_tool_completion(completion: &str) -> ToolDecision {
    let text = completion.trim();
    let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) else {
        return ToolDecision::none();
    };
    if start >= end {
        return ToolDecision::none();
    }

    #[derive(serde::Deserialize)]
    struct NamedCall {
        name: String,
    }

    match serde_json::from_str::<Vec<NamedCall>>(&text[start..=end]) {
        Ok(calls) if calls.iter().any(|c| c.name == "take_screenshot") => {
            ToolDecision::screenshot()
        }
        Ok(_) => ToolDecision::none(),
        Err(e) => {
            tracing::debug!(error = %e, "classifier output was not a call array");
            ToolDecision::none()
        }
    }
}
