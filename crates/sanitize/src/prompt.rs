//! One-shot sanitization for inbound client strings.
//!
//! Applied to every externally supplied string (utterance, chat prompt,
//! history contents) before it can reach an engine prompt:
//! NFKC normalization, control and bidi-override stripping, escaped-quote
//! removal, trimming, and a hard size cap.

use unicode_normalization::UnicodeNormalization;

use bn_domain::{Error, Result};

use crate::filters::Filters;

/// Sanitize one user-provided string.
///
/// Errors carry the `validation_error` wire code and a human-readable
/// message naming `field`.
pub fn sanitize_prompt(
    filters: &Filters,
    field: &str,
    raw: Option<&str>,
    max_chars: usize,
) -> Result<String> {
    let raw = raw.ok_or_else(|| {
        Error::validation("validation_error", format!("{field} is required"))
    })?;

    let text: String = raw.nfkc().collect();
    let text = filters.ctrl_chars.replace_all(&text, "");
    let text = filters.bidi_chars.replace_all(&text, "");
    let text = filters.escaped_quote.replace_all(&text, "");

    let text = text.trim();
    if text.is_empty() {
        return Err(Error::validation(
            "validation_error",
            format!("{field} is empty after sanitization"),
        ));
    }
    if text.chars().count() > max_chars {
        return Err(Error::validation(
            "validation_error",
            format!("{field} exceeds {max_chars} characters"),
        ));
    }
    Ok(text.to_string())
}
