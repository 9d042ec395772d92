//! Screenshot phrase fast-path.
//!
//! Deterministic regex matching over the latest user utterance that
//! short-circuits the classifier model for well-known phrasings. Priority:
//! reject patterns, then the "take N screenshots" quantity rule, then
//! trigger phrases (including common typos). Anything else is a miss and
//! goes to the model.

use regex::{Regex, RegexBuilder};

use super::ToolDecision;

/// Quantities of "take N screenshots" that mean a single capture.
const SINGULAR_QUANTITIES: &[&str] = &["one", "1", "once", "a"];

const REJECT_PATTERNS: &[&str] = &[
    r"^look\s+twice(?:\s+at\s+this)?[.!?]*$",
    r"^look\s+thrice(?:\s+at\s+this)?[.!?]*$",
    r"^look\s+multiple\s+times[.!?]*$",
    r"^check\s+twice(?:\s+at\s+this)?[.!?]*$",
    r"^check\s+thrice(?:\s+at\s+this)?[.!?]*$",
    r"^check\s+multiple\s+times[.!?]*$",
];

const TRIGGER_PATTERNS: &[&str] = &[
    r"^take\s+screenshots?[.!?]*$",
    r"^screenshot\s+this[.!?]*$",
    // Common typos seen in production traffic.
    r"^sceenshot\s+this[.!?]*$",
    r"^lok\s+at\s+this[.!?]*$",
    r"^lock\s+at\s+this[.!?]*$",
    r"^tkae\s+a\s+look[.!?]*$",
    r"^teak\s+a\s+look[.!?]*$",
];

/// The outcome of running the prefilter.
#[derive(Debug, Clone, PartialEq)]
pub enum PrefilterOutcome {
    /// A pattern matched; skip the classifier model.
    Hit(ToolDecision),
    /// Nothing matched; consult the classifier.
    Miss,
}

/// Compiled screenshot patterns, built once at startup.
pub struct ScreenshotFilter {
    reject: Vec<Regex>,
    take_n: Regex,
    triggers: Vec<Regex>,
}

impl ScreenshotFilter {
    pub fn new() -> Self {
        let compile = |p: &str| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .expect("screenshot pattern compiles")
        };
        Self {
            reject: REJECT_PATTERNS.iter().map(|p| compile(p)).collect(),
            take_n: compile(r"^take\s+(\w+)\s+screenshots?[.!?]*$"),
            triggers: TRIGGER_PATTERNS.iter().map(|p| compile(p)).collect(),
        }
    }

    /// Match the (trimmed) user utterance against the pattern families.
    pub fn evaluate(&self, utterance: &str) -> PrefilterOutcome {
        let text = utterance.trim();

        if self.reject.iter().any(|p| p.is_match(text)) {
            return PrefilterOutcome::Hit(ToolDecision::none());
        }

        if let Some(caps) = self.take_n.captures(text) {
            let quantity = caps[1].to_lowercase();
            if SINGULAR_QUANTITIES.contains(&quantity.as_str()) {
                return PrefilterOutcome::Hit(ToolDecision::screenshot());
            }
            // Any other quantity (two, three, multiple...) is a refusal.
            return PrefilterOutcome::Hit(ToolDecision::none());
        }

        if self.triggers.iter().any(|p| p.is_match(text)) {
            return PrefilterOutcome::Hit(ToolDecision::screenshot());
        }

        PrefilterOutcome::Miss
    }
}

impl Default for ScreenshotFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bn_domain::frame::ToolStatus;

    fn filter() -> ScreenshotFilter {
        ScreenshotFilter::new()
    }

    fn hit_status(outcome: PrefilterOutcome) -> ToolStatus {
        match outcome {
            PrefilterOutcome::Hit(d) => d.status,
            PrefilterOutcome::Miss => panic!("expected hit"),
        }
    }

    #[test]
    fn reject_phrases_force_no() {
        let f = filter();
        for text in [
            "look twice",
            "Look twice at this",
            "check thrice at this!",
            "check multiple times",
            "LOOK MULTIPLE TIMES.",
        ] {
            assert_eq!(hit_status(f.evaluate(text)), ToolStatus::No, "{text}");
        }
    }

    #[test]
    fn take_singular_quantities_trigger() {
        let f = filter();
        for text in [
            "take one screenshot",
            "take 1 screenshot",
            "take a screenshot",
            "Take once screenshot!",
        ] {
            assert_eq!(hit_status(f.evaluate(text)), ToolStatus::Yes, "{text}");
        }
    }

    #[test]
    fn take_plural_quantities_reject() {
        let f = filter();
        for text in [
            "take 3 screenshots",
            "take two screenshots",
            "take multiple screenshots",
            "take five screenshots!!",
        ] {
            assert_eq!(hit_status(f.evaluate(text)), ToolStatus::No, "{text}");
        }
    }

    #[test]
    fn trigger_phrases_and_typos() {
        let f = filter();
        for text in [
            "take screenshot",
            "screenshot this",
            "sceenshot this",
            "lok at this",
            "lock at this",
            "tkae a look",
            "teak a look?",
        ] {
            assert_eq!(hit_status(f.evaluate(text)), ToolStatus::Yes, "{text}");
        }
    }

    #[test]
    fn reject_wins_over_trigger_family() {
        // "look twice at this" also resembles a visual command; the reject
        // family is checked first.
        let f = filter();
        assert_eq!(hit_status(f.evaluate("look twice at this")), ToolStatus::No);
    }

    #[test]
    fn unmatched_phrases_miss() {
        let f = filter();
        for text in [
            "what do you think about aliens?",
            "look at this",
            "this dress is perfect",
            "take a screenshot of my heart metaphorically speaking",
        ] {
            assert_eq!(f.evaluate(text), PrefilterOutcome::Miss, "{text}");
        }
    }

    #[test]
    fn whitespace_is_trimmed_before_matching() {
        let f = filter();
        assert_eq!(hit_status(f.evaluate("  screenshot this  ")), ToolStatus::Yes);
    }
}
