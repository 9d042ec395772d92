//! Regex assets shared by the prompt and stream sanitizers.
//!
//! Compiled once at startup into a [`Filters`] value and shared behind an
//! `Arc` across every session; nothing here is rebuilt per turn.

use regex::Regex;

/// Characters considered unstable at the end of a streamed chunk: trailing
/// whitespace, slash escapes, and dashes that later input may extend or
/// rewrite.
pub const TRAILING_UNSTABLE_CHARS: &[char] = &[' ', '\t', '\r', '\n', '/', '\\', '-'];

/// Spoken forms for phone digits.
pub const DIGIT_WORDS: [&str; 10] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
];

/// All compiled sanitizer patterns.
pub struct Filters {
    // ── one-shot stream prefix ──────────────────────────────────────
    pub freestyle_prefix: Regex,
    pub leading_newline_tokens: Regex,

    // ── verbalization ───────────────────────────────────────────────
    pub email: Regex,
    pub phone: Regex,

    // ── markup / emphasis ───────────────────────────────────────────
    pub action_emote: Regex,
    pub html_tag: Regex,
    pub emoji: Regex,
    pub emoticon: Regex,

    // ── punctuation ─────────────────────────────────────────────────
    pub unicode_ellipsis: Regex,
    pub spaced_dot_run: Regex,
    pub bang_question_run: Regex,
    pub dash: Regex,
    pub word_hyphen: Regex,
    pub space_before_punct: Regex,
    pub space_before_contraction: Regex,
    pub escaped_quote: Regex,

    // ── spacing / emphasis normalization ────────────────────────────
    pub newline_tokens: Regex,
    pub collapse_spaces: Regex,
    pub exaggerated_oh: Regex,

    // ── suffix-stability guards ─────────────────────────────────────
    pub html_entity_suffix: Regex,
    pub email_partial_suffix: Regex,
    pub phone_partial_suffix: Regex,
    pub emoticon_partial_suffix: Regex,

    // ── inbound prompt cleanup ──────────────────────────────────────
    pub ctrl_chars: Regex,
    pub bidi_chars: Regex,
}

impl Filters {
    pub fn new() -> Self {
        Self {
            freestyle_prefix: Regex::new(r"(?i)^\s*freestyle mode\.?\s*").unwrap(),
            leading_newline_tokens: Regex::new(r"^(?:\s|\\n|/n)+").unwrap(),

            email: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap(),
            // Explicit international form only; digit-count bounds are
            // enforced by the caller.
            phone: Regex::new(r"\+\d[\d ()\-]*\d").unwrap(),

            // Narration emotes are whole `*verb ...*` groups; bare asterisk
            // emphasis is handled separately (asterisks become spaces).
            action_emote: Regex::new(
                r"(?i)\*(?:smiles?|smirks?|winks?|giggles?|laughs?|waves?|blushes|grins?|nods?|sighs?|shrugs?|gasps?|leans?|whispers?)[^*\n]{0,40}\*",
            )
            .unwrap(),
            html_tag: Regex::new(r"<[^>]+>").unwrap(),
            emoji: Regex::new(concat!(
                "[",
                "\u{1F1E6}-\u{1F1FF}",
                "\u{1F300}-\u{1F5FF}",
                "\u{1F600}-\u{1F64F}",
                "\u{1F680}-\u{1F6FF}",
                "\u{1F700}-\u{1F77F}",
                "\u{1F780}-\u{1F7FF}",
                "\u{1F800}-\u{1F8FF}",
                "\u{1F900}-\u{1F9FF}",
                "\u{1FA00}-\u{1FA6F}",
                "\u{1FA70}-\u{1FAFF}",
                "\u{2600}-\u{26FF}",
                "\u{2700}-\u{27BF}",
                "\u{200D}",
                "\u{FE0F}",
                "]",
            ))
            .unwrap(),
            emoticon: Regex::new(
                r#"(?i)(?:[:=;8][-^]?[)dp(\]/\\o]|:'\(|<3|:-?\||:-?/|;-?\)|\^_\^|T_T|\b[x][d]\b|¯\\_\(ツ\)_/¯)"#,
            )
            .unwrap(),

            unicode_ellipsis: Regex::new(r"\u{2026}").unwrap(),
            spaced_dot_run: Regex::new(r"\.(?:[ \t]+\.){2,}").unwrap(),
            bang_question_run: Regex::new(r"[!?]{2,}").unwrap(),
            dash: Regex::new(r"[\u{2014}\u{2013}\u{2012}\u{2015}]+|-{2,}").unwrap(),
            word_hyphen: Regex::new(r"([A-Za-z0-9])-([A-Za-z0-9])").unwrap(),
            space_before_punct: Regex::new(r"[ \t]+([,.!?;:])").unwrap(),
            space_before_contraction: Regex::new(r"([A-Za-z])[ \t]+'(t|s|re|ll|ve|d|m)\b").unwrap(),
            escaped_quote: Regex::new(r#"\\(["'])"#).unwrap(),

            newline_tokens: Regex::new(r"[ \t]*(?:\\n|/n|\r\n|\n|\r)+[ \t]*").unwrap(),
            collapse_spaces: Regex::new(r"[ \t]{2,}").unwrap(),
            exaggerated_oh: Regex::new(r"\b[oO]+[hH]*\b").unwrap(),

            html_entity_suffix: Regex::new(r"&[A-Za-z]{0,10}$").unwrap(),
            email_partial_suffix: Regex::new(r"[A-Za-z0-9._%+-]+@?[A-Za-z0-9.-]*$").unwrap(),
            phone_partial_suffix: Regex::new(r"[+\d][\d ()\-]*$").unwrap(),
            emoticon_partial_suffix: Regex::new(r"(?:[:=;8][-^]?|<|[xX]|\^_?|[tT]_?)$").unwrap(),

            ctrl_chars: Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F\u{80}-\u{9F}]").unwrap(),
            bidi_chars: Regex::new(
                r"[\u{202A}-\u{202E}\u{2066}-\u{2069}\u{200E}\u{200F}\u{061C}]",
            )
            .unwrap(),
        }
    }
}

impl Default for Filters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_pattern_matches_common_addresses() {
        let f = Filters::new();
        assert!(f.email.is_match("me@example.com"));
        assert!(f.email.is_match("foo.bar+tag@mail.sub.example.org"));
        assert!(!f.email.is_match("not an email"));
        assert!(!f.email.is_match("user@host"));
    }

    #[test]
    fn phone_pattern_requires_plus() {
        let f = Filters::new();
        assert!(f.phone.is_match("+1 415-555-1234"));
        assert!(!f.phone.is_match("415-555-1234"));
    }

    #[test]
    fn emoticon_pattern_covers_classics() {
        let f = Filters::new();
        for sample in [":)", ":-(", ";)", ":D", ":P", "<3", ":-|", ":-/", "^_^", "T_T", "xD"] {
            assert!(f.emoticon.is_match(sample), "missed {sample}");
        }
        // Times and ratios must survive.
        assert!(!f.emoticon.is_match("12:34"));
        assert!(!f.emoticon.is_match("2024:3"));
    }

    #[test]
    fn emoji_pattern_strips_flags_and_zwj() {
        let f = Filters::new();
        assert!(f.emoji.is_match("😂"));
        assert!(f.emoji.is_match("🇺🇸"));
        assert!(f.emoji.is_match("👨\u{200D}👩"));
        assert!(!f.emoji.is_match("plain text"));
    }

    #[test]
    fn freestyle_prefix_is_case_insensitive() {
        let f = Filters::new();
        assert!(f.freestyle_prefix.is_match("Freestyle Mode. hey"));
        assert!(f.freestyle_prefix.is_match("  freestyle mode hey"));
        assert!(!f.freestyle_prefix.is_match("in freestyle mode"));
    }

    #[test]
    fn bidi_and_ctrl_classes_hit_expected_chars() {
        let f = Filters::new();
        assert!(f.bidi_chars.is_match("\u{202E}"));
        assert!(f.ctrl_chars.is_match("\x07"));
        assert!(!f.ctrl_chars.is_match("\t"));
        assert!(!f.ctrl_chars.is_match("\n"));
    }
}
