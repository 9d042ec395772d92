//! Email and phone number verbalization.
//!
//! Converts contact details into spoken form so downstream TTS never reads
//! raw addresses:
//!
//! - `me@example.com` → `me at example dot com`
//! - `+1 234` → `plus one two three four`
//!
//! Phone detection only accepts the explicit international form (leading
//! `+`) with a plausible digit count.

use crate::filters::{Filters, DIGIT_WORDS};

const PHONE_MIN_DIGITS: usize = 7;
const PHONE_MAX_DIGITS: usize = 15;

/// Convert one email address to spoken form.
pub fn verbalize_email(email: &str) -> String {
    email.replace('@', " at ").replace('.', " dot ")
}

/// Find and verbalize all email addresses in `text`.
pub fn verbalize_emails(filters: &Filters, text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    filters
        .email
        .replace_all(text, |caps: &regex::Captures<'_>| verbalize_email(&caps[0]))
        .into_owned()
}

/// Convert a single phone character to spoken form; anything that is not a
/// digit or `+` is dropped.
fn verbalize_phone_char(c: char) -> Option<&'static str> {
    if c == '+' {
        return Some("plus");
    }
    c.to_digit(10).map(|d| DIGIT_WORDS[d as usize])
}

/// Convert one raw phone match to spoken form.
pub fn verbalize_phone_number(raw: &str) -> String {
    raw.chars()
        .filter_map(verbalize_phone_char)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Find and verbalize international-format phone numbers.
///
/// Matches are filtered by digit count so `+1 2` or a stray plus sign in
/// math stays untouched.
pub fn verbalize_phone_numbers(filters: &Filters, text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut out = String::with_capacity(text.len());
    let mut last_end = 0;
    for m in filters.phone.find_iter(text) {
        let digits = m.as_str().chars().filter(|c| c.is_ascii_digit()).count();
        if !(PHONE_MIN_DIGITS..=PHONE_MAX_DIGITS).contains(&digits) {
            continue;
        }
        out.push_str(&text[last_end..m.start()]);
        out.push_str(&verbalize_phone_number(m.as_str()));
        last_end = m.end();
    }
    out.push_str(&text[last_end..]);
    out
}
