//! Debounce ledger for repeated announcements.
//!
//! Maps exact message text to the instant it last passed the check. The
//! check-and-record step runs under one lock so two near-simultaneous
//! identical messages cannot both pass.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::DEFAULT_DEBOUNCE_WINDOW;

#[derive(Debug)]
pub struct DebounceLedger {
    window: Duration,
    last_spoken: Mutex<HashMap<String, Instant>>,
}

impl Default for DebounceLedger {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_WINDOW)
    }
}

impl DebounceLedger {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_spoken: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns `true` if `text` may be spoken at `now`, recording `now` as
    /// its latest timestamp. Returns `false`, leaving the ledger untouched,
    /// when the same text passed less than one window ago.
    pub fn check_and_record(&self, text: &str, now: Instant) -> bool {
        let mut ledger = self
            .last_spoken
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(&last) = ledger.get(text) {
            if now.saturating_duration_since(last) < self.window {
                return false;
            }
        }
        ledger.insert(text.to_string(), now);
        true
    }

    /// [`check_and_record`](Self::check_and_record) against the current time.
    pub fn admit(&self, text: &str) -> bool {
        self.check_and_record(text, Instant::now())
    }

    pub fn len(&self) -> usize {
        self.last_spoken
            .lock()
            .map(|ledger| ledger.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
