//! Suffix length detection for streaming stability.
//!
//! Computes how much of a streamed text's tail must stay buffered because a
//! future chunk could still change it:
//!
//! - trailing unstable characters (whitespace, partial ellipsis dots)
//! - partial HTML entities (`&amp` without the `;`)
//! - unclosed HTML tags (`<div` with no `>`)
//! - partial email addresses (`user@domain`)
//! - partial phone numbers (`+1 234`)
//! - partial emoticons (`:`, `:-`, `<`, trailing `x`)
//!
//! Lengths are in bytes; the split helpers snap to char boundaries.

use crate::filters::{Filters, TRAILING_UNSTABLE_CHARS};

/// Length of trailing unstable characters, including any trailing run of
/// dots (a partial ellipsis).
pub fn unstable_suffix_len(text: &str) -> usize {
    let mut idx = text.len();
    for c in text.chars().rev() {
        if !TRAILING_UNSTABLE_CHARS.contains(&c) {
            break;
        }
        idx -= c.len_utf8();
    }
    while idx > 0 && text.as_bytes()[idx - 1] == b'.' {
        idx -= 1;
    }
    text.len() - idx
}

/// Length of a partial HTML entity at the end (`&amp` but not `&amp;`).
pub fn html_entity_suffix_len(filters: &Filters, text: &str) -> usize {
    match filters.html_entity_suffix.find(text) {
        Some(m) => text.len() - m.start(),
        None => 0,
    }
}

/// Length to retain if the last `<` is not closed.
///
/// Returns 0 when the last `<` has a matching `>` after it, or when it is
/// followed by a digit (`<3` is a heart, not a tag).
pub fn html_tag_suffix_len(raw_text: &str) -> usize {
    let Some(last_lt) = raw_text.rfind('<') else {
        return 0;
    };
    if let Some(last_gt) = raw_text.rfind('>') {
        if last_gt > last_lt {
            return 0;
        }
    }
    if raw_text[last_lt + 1..]
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit())
    {
        return 0;
    }
    (raw_text.len() - last_lt).min(256)
}

/// Length to retain for partial email detection.
pub fn email_suffix_len(filters: &Filters, raw_text: &str) -> usize {
    if raw_text.is_empty() {
        return 0;
    }
    // A complete email is already in the tail; keep only a small guard for
    // a partial second address.
    if filters.email.is_match(raw_text) {
        return raw_text.len().min(16);
    }
    match filters.email_partial_suffix.find(raw_text) {
        Some(m) => (raw_text.len() - m.start()).min(256),
        None => 0,
    }
}

/// Length to retain for partial phone-number detection (explicit `+` form).
pub fn phone_suffix_len(filters: &Filters, raw_text: &str) -> usize {
    match filters.phone_partial_suffix.find(raw_text) {
        Some(m) => (raw_text.len() - m.start()).min(64),
        None => 0,
    }
}

/// Length to retain for partial emoticon detection, so `:` followed later
/// by `)` is stripped as one unit rather than half-emitted.
pub fn emoticon_suffix_len(filters: &Filters, text: &str) -> usize {
    match filters.emoticon_partial_suffix.find(text) {
        Some(m) => text.len() - m.start(),
        None => 0,
    }
}

/// Compute how much of the sanitized text is stable vs tail to buffer.
///
/// Returns `(stable_len, tail_len)` in bytes over `sanitized`, snapped to
/// char boundaries, with `stable_len + tail_len == sanitized.len()`.
pub fn compute_stable_and_tail(filters: &Filters, raw_tail: &str, sanitized: &str, max_tail: usize) -> (usize, usize) {
    if sanitized.is_empty() {
        return (0, 0);
    }

    let unstable = unstable_suffix_len(sanitized);
    let entity_guard = html_entity_suffix_len(filters, sanitized);
    let tag_guard = html_tag_suffix_len(raw_tail);
    let email_guard = email_suffix_len(filters, raw_tail);
    let phone_guard = phone_suffix_len(filters, raw_tail);
    let emoticon_guard = emoticon_suffix_len(filters, raw_tail);

    let mut tail_len = unstable
        .max(entity_guard)
        .max(tag_guard)
        .max(email_guard)
        .max(phone_guard)
        .max(emoticon_guard)
        .min(sanitized.len());

    // Bound the retained tail to avoid unbounded buffering.
    tail_len = tail_len.min(max_tail);

    let mut stable_len = sanitized.len() - tail_len;
    while stable_len > 0 && !sanitized.is_char_boundary(stable_len) {
        stable_len -= 1;
    }
    (stable_len, sanitized.len() - stable_len)
}
