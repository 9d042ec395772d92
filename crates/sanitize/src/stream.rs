//! Streaming sanitizer for assistant output.
//!
//! Stateful transformer fed raw model text chunk by chunk. It:
//! - strips a "freestyle mode." preamble and leading newline tokens once
//! - verbalizes emails and explicit-`+` phone numbers
//! - normalizes ellipses, dashes, quotes, and spacing
//! - removes escaped quotes, emojis, emoticons, and HTML markup
//! - enforces a leading capital once
//! - buffers unstable suffixes (partial ellipsis, entities, tags, emails,
//!   phones, emoticons) so no emitted byte is ever retracted
//!
//! The raw tail is a bounded window: each push re-sanitizes only the last
//! [`MAX_TAIL`] bytes of input and reconciles against already-emitted text
//! by prefix/overlap matching.

use crate::filters::Filters;
use crate::suffix::compute_stable_and_tail;
use crate::verbalize::{verbalize_emails, verbalize_phone_numbers};

/// Size of the retained raw window backing the boundary detectors.
const MAX_TAIL: usize = 256;

/// Stateful sanitizer that emits stable chunks for streaming.
pub struct StreamingSanitizer<'f> {
    filters: &'f Filters,
    /// Raw tail retained for boundary-sensitive checks.
    raw_tail: String,
    /// Sanitized tail retained but not yet emitted.
    sanitized_tail: String,
    /// Sanitized stable output already emitted.
    emitted: String,
    /// One-shot flags.
    prefix_pending: bool,
    capital_pending: bool,
    /// Whether the true stream start has been dropped from the raw window.
    trimmed_stream_start: bool,
}

impl<'f> StreamingSanitizer<'f> {
    pub fn new(filters: &'f Filters) -> Self {
        Self {
            filters,
            raw_tail: String::new(),
            sanitized_tail: String::new(),
            emitted: String::new(),
            prefix_pending: true,
            capital_pending: true,
            trimmed_stream_start: false,
        }
    }

    /// Process a new raw chunk and return the newly stable sanitized delta.
    pub fn push(&mut self, chunk: &str) -> String {
        if chunk.is_empty() {
            return String::new();
        }

        self.raw_tail.push_str(chunk);

        let prefix_ctx = self.prefix_pending || !self.trimmed_stream_start;
        let capital_ctx = self.capital_pending || !self.trimmed_stream_start;
        let outcome = sanitize_stream_chunk(
            self.filters,
            &self.raw_tail,
            prefix_ctx,
            capital_ctx,
            prefix_ctx,
        );
        self.prefix_pending = outcome.prefix_pending;
        self.capital_pending = outcome.capital_pending;
        let sanitized = outcome.text;

        let (stable_len, _tail_len) =
            compute_stable_and_tail(self.filters, &self.raw_tail, &sanitized, MAX_TAIL);

        let mut delta = String::new();
        if stable_len > 0 {
            let stable = &sanitized[..stable_len];
            if let Some(new_suffix) = stable.strip_prefix(self.emitted.as_str()) {
                // Common case: sanitized text simply grew.
                delta = new_suffix.to_string();
            } else if stable.len() <= self.emitted.len() && self.emitted.ends_with(stable) {
                // Sanitized window shrank or stayed level; nothing new.
            } else {
                // Window slid past the emitted prefix; align by overlap to
                // avoid double-emitting.
                let overlap = suffix_prefix_overlap(&self.emitted, stable, MAX_TAIL);
                delta = stable[overlap..].to_string();
            }
            self.emitted.push_str(&delta);
        }

        self.sanitized_tail = sanitized[stable_len..].to_string();

        if self.raw_tail.len() > MAX_TAIL {
            self.trimmed_stream_start = true;
            let mut cut = self.raw_tail.len() - MAX_TAIL;
            while !self.raw_tail.is_char_boundary(cut) {
                cut += 1;
            }
            self.raw_tail.drain(..cut);
        }

        delta
    }

    /// Emit whatever buffered sanitized text remains, right-trimmed.
    pub fn flush(&mut self) -> String {
        if self.raw_tail.is_empty() && self.sanitized_tail.is_empty() {
            return String::new();
        }

        let prefix_ctx = self.prefix_pending || !self.trimmed_stream_start;
        let capital_ctx = self.capital_pending || !self.trimmed_stream_start;
        let outcome = sanitize_stream_chunk(
            self.filters,
            &self.raw_tail,
            prefix_ctx,
            capital_ctx,
            prefix_ctx,
        );
        self.prefix_pending = outcome.prefix_pending;
        self.capital_pending = outcome.capital_pending;
        let sanitized = outcome.text;

        let tail;
        if let Some(rest) = sanitized.strip_prefix(self.emitted.as_str()) {
            tail = rest.trim_end().to_string();
        } else if sanitized.len() <= self.emitted.len() && self.emitted.ends_with(sanitized.as_str())
        {
            tail = String::new();
        } else {
            // Never trim more prefix than the portion known to be buffered.
            let pending = self.sanitized_tail.trim_end();
            let max_overlap = sanitized.len().saturating_sub(pending.len());
            let overlap =
                suffix_prefix_overlap(&self.emitted, &sanitized, MAX_TAIL).min(max_overlap);
            let mut cut = overlap;
            while cut < sanitized.len() && !sanitized.is_char_boundary(cut) {
                cut += 1;
            }
            tail = sanitized[cut..].trim_end().to_string();
        }

        if !tail.is_empty() {
            self.emitted.push_str(&tail);
        }
        self.sanitized_tail.clear();
        self.raw_tail.clear();
        self.trimmed_stream_start = false;
        tail
    }

    /// The fully sanitized text accumulated so far (emitted + buffered).
    pub fn full_text(&self) -> String {
        let mut text = self.emitted.clone();
        text.push_str(&self.sanitized_tail);
        text
    }
}

/// One-shot sanitization: the exact pipeline a fully buffered stream would
/// produce, right-trimmed. Used as the reference for equivalence tests and
/// for non-streamed cleanup.
pub fn sanitize_full(filters: &Filters, text: &str) -> String {
    sanitize_stream_chunk(filters, text, true, true, true)
        .text
        .trim_end()
        .to_string()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pipeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ChunkOutcome {
    text: String,
    prefix_pending: bool,
    capital_pending: bool,
}

/// Run the full sanitization pipeline over one raw window.
fn sanitize_stream_chunk(
    filters: &Filters,
    text: &str,
    prefix_pending: bool,
    capital_pending: bool,
    strip_leading_ws: bool,
) -> ChunkOutcome {
    if text.is_empty() {
        return ChunkOutcome {
            text: String::new(),
            prefix_pending,
            capital_pending,
        };
    }

    let mut cleaned = text.to_string();
    let mut prefix_pending = prefix_pending;

    if prefix_pending {
        let stripped = filters.freestyle_prefix.replace(&cleaned, "");
        if stripped != cleaned {
            cleaned = stripped.trim_start().to_string();
        }
        cleaned = filters
            .leading_newline_tokens
            .replace(&cleaned, "")
            .into_owned();
        prefix_pending = false;
    }

    // Verbalize contacts before any dash or punctuation rewriting touches
    // the raw digits.
    cleaned = verbalize_emails(filters, &cleaned);
    cleaned = verbalize_phone_numbers(filters, &cleaned);

    // Emphasis markers.
    cleaned = filters.action_emote.replace_all(&cleaned, "").into_owned();
    cleaned = cleaned.replace('*', " ");

    // Ellipsis and dot-run normalization.
    cleaned = filters.unicode_ellipsis.replace_all(&cleaned, "...").into_owned();
    cleaned = filters.newline_tokens.replace_all(&cleaned, " ").into_owned();
    cleaned = filters.spaced_dot_run.replace_all(&cleaned, "...").into_owned();
    cleaned = normalize_dot_runs(&cleaned);
    cleaned = filters
        .bang_question_run
        .replace_all(&cleaned, |caps: &regex::Captures<'_>| {
            caps[0][..1].to_string()
        })
        .into_owned();
    cleaned = space_after_sentence_period(&cleaned);

    // Dashes become spaces; hyphenated compounds are spaced out.
    cleaned = filters.dash.replace_all(&cleaned, " ").into_owned();
    for _ in 0..2 {
        cleaned = filters.word_hyphen.replace_all(&cleaned, "$1 $2").into_owned();
    }

    cleaned = cleaned.replace('\u{2019}', "'");
    cleaned = cleaned.replace(['\u{201C}', '\u{201D}'], "\"");
    cleaned = filters.space_before_punct.replace_all(&cleaned, "$1").into_owned();
    cleaned = filters
        .space_before_contraction
        .replace_all(&cleaned, "$1'$2")
        .into_owned();
    cleaned = filters.escaped_quote.replace_all(&cleaned, "").into_owned();
    cleaned = filters
        .exaggerated_oh
        .replace_all(&cleaned, |caps: &regex::Captures<'_>| {
            normalize_exaggerated_oh(&caps[0])
        })
        .into_owned();

    // Emoji, emoticons, and markup.
    cleaned = filters.emoji.replace_all(&cleaned, " ").into_owned();
    cleaned = filters.emoticon.replace_all(&cleaned, " ").into_owned();
    cleaned = filters.html_tag.replace_all(&cleaned, "").into_owned();
    cleaned = html_escape::decode_html_entities(&cleaned).into_owned();

    // Whitespace.
    cleaned = cleaned.replace('\u{A0}', " ");
    cleaned = filters.collapse_spaces.replace_all(&cleaned, " ").into_owned();

    let capital_pending = if capital_pending {
        let (text, still_pending) = ensure_leading_capital(&cleaned);
        cleaned = text;
        still_pending
    } else {
        false
    };

    if strip_leading_ws {
        cleaned = cleaned.trim_start().to_string();
    }

    ChunkOutcome {
        text: cleaned,
        prefix_pending,
        capital_pending,
    }
}

/// Uppercase the first alphabetic character. Returns the text and whether
/// capitalization is still pending (no alphabetic character seen yet).
fn ensure_leading_capital(text: &str) -> (String, bool) {
    for (idx, c) in text.char_indices() {
        if c.is_alphabetic() {
            if c.is_lowercase() {
                let mut out = String::with_capacity(text.len());
                out.push_str(&text[..idx]);
                out.extend(c.to_uppercase());
                out.push_str(&text[idx + c.len_utf8()..]);
                return (out, false);
            }
            return (text.to_string(), false);
        }
    }
    (text.to_string(), true)
}

/// Collapse every run of two or more dots to a single ellipsis, leaving
/// single periods and the surrounding text untouched.
fn normalize_dot_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = 0usize;
    for c in text.chars() {
        if c == '.' {
            run += 1;
            continue;
        }
        flush_dot_run(&mut out, run);
        run = 0;
        out.push(c);
    }
    flush_dot_run(&mut out, run);
    out
}

fn flush_dot_run(out: &mut String, run: usize) {
    match run {
        0 => {}
        1 => out.push('.'),
        _ => out.push_str("..."),
    }
}

/// Insert a space after a lone sentence period directly followed by a
/// letter. Dots that are part of an ellipsis are left alone.
fn space_after_sentence_period(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut prev: Option<char> = None;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        if c == '.' && prev != Some('.') {
            if let Some(next) = chars.peek() {
                if next.is_alphabetic() {
                    out.push(' ');
                }
            }
        }
        prev = Some(c);
    }
    out
}

/// Collapse exaggerated "oooh"/"ohhh" forms to `Ooh`/`ooh`; short forms
/// pass through unchanged.
fn normalize_exaggerated_oh(word: &str) -> String {
    let o_count = word.chars().filter(|c| c.eq_ignore_ascii_case(&'o')).count();
    let h_count = word.chars().filter(|c| c.eq_ignore_ascii_case(&'h')).count();
    if o_count <= 2 && h_count <= 1 {
        return word.to_string();
    }
    if word.chars().next().is_some_and(|c| c.is_uppercase()) {
        "Ooh".to_string()
    } else {
        "ooh".to_string()
    }
}

/// Length of the longest suffix of `emitted` (bounded to its last
/// `max_check` bytes) that is a prefix of `candidate`.
fn suffix_prefix_overlap(emitted: &str, candidate: &str, max_check: usize) -> usize {
    if emitted.is_empty() || candidate.is_empty() {
        return 0;
    }
    let mut start = emitted.len().saturating_sub(max_check);
    while !emitted.is_char_boundary(start) {
        start += 1;
    }
    let window = &emitted[start..];

    let limit = window.len().min(candidate.len());
    for len in (1..=limit).rev() {
        if !window.is_char_boundary(window.len() - len) || !candidate.is_char_boundary(len) {
            continue;
        }
        if window[window.len() - len..] == candidate[..len] {
            return len;
        }
    }
    0
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
