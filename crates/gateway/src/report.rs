//! Error classification reporting with per-class deduplication.
//!
//! Every caught error is mapped to its stable category label (see
//! [`bn_domain::Error::classify`]) and logged at error level at most once
//! per class per window; repeats inside the window drop to debug so a
//! failing engine cannot flood the log shipper.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use bn_domain::Error;

const DEDUPE_WINDOW: Duration = Duration::from_secs(10);

pub struct ErrorReporter {
    window: Duration,
    last_report: Mutex<HashMap<&'static str, Instant>>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::with_window(DEDUPE_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            last_report: Mutex::new(HashMap::new()),
        }
    }

    /// Log the error, deduplicated per class.
    pub fn report(&self, err: &Error, context: &str) {
        let class = err.classify();
        if self.should_report(class, Instant::now()) {
            tracing::error!(class, context, error = %err, "turn error");
        } else {
            tracing::debug!(class, context, error = %err, "turn error (deduplicated)");
        }
    }

    fn should_report(&self, class: &'static str, now: Instant) -> bool {
        let mut last = self.last_report.lock();
        match last.get(class) {
            Some(at) if now.duration_since(*at) < self.window => false,
            _ => {
                last.insert(class, now);
                true
            }
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}
