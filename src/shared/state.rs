//! Runtime state of a scanning session

use serde::Serialize;
use std::collections::VecDeque;

use crate::analysis::debouncer::DetectionState;

/// A card the session saved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentScan {
    /// Canonical card code
    pub full_code: String,
    /// Scanned in alt-art mode
    pub is_alt_art: bool,
    /// Collection entry created for it
    pub entry_id: String,
}

/// Runtime state that is not persisted
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeState {
    /// Mirror of the debouncer's visible state
    pub detection: DetectionState,
    /// Whether a scan loop is feeding the session
    pub is_scanning: bool,
    /// Last save failure (if any)
    pub last_error: Option<String>,
    /// Saves that went through
    pub saved_count: u64,
    /// Saves that failed
    pub failed_count: u64,
    /// Most recent saves, newest first
    pub recent: VecDeque<RecentScan>,
    #[serde(skip)]
    recent_limit: usize,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new(5)
    }
}

impl RuntimeState {
    /// Create an empty state keeping at most `recent_limit` recent scans
    pub fn new(recent_limit: usize) -> Self {
        Self {
            detection: DetectionState::default(),
            is_scanning: false,
            last_error: None,
            saved_count: 0,
            failed_count: 0,
            recent: VecDeque::new(),
            recent_limit,
        }
    }

    /// Record a successful save
    pub fn record_saved(&mut self, scan: RecentScan) {
        self.saved_count += 1;
        self.clear_error();
        self.recent.push_front(scan);
        self.recent.truncate(self.recent_limit);
    }

    /// Record a failed save
    pub fn record_failed(&mut self, error: impl Into<String>) {
        self.failed_count += 1;
        self.set_error(error);
    }

    /// Clear any error state
    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Set an error message
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(code: &str) -> RecentScan {
        RecentScan {
            full_code: code.to_string(),
            is_alt_art: false,
            entry_id: format!("entry-{}", code),
        }
    }

    #[test]
    fn test_recent_scans_are_bounded_newest_first() {
        let mut state = RuntimeState::new(2);
        state.record_saved(scan("OP01-001"));
        state.record_saved(scan("OP01-002"));
        state.record_saved(scan("OP01-003"));

        let codes: Vec<&str> = state.recent.iter().map(|s| s.full_code.as_str()).collect();
        assert_eq!(codes, vec!["OP01-003", "OP01-002"]);
        assert_eq!(state.saved_count, 3);
    }

    #[test]
    fn test_failure_sets_error_until_next_success() {
        let mut state = RuntimeState::default();
        state.record_failed("card OP01-001 (Normal) is not in the catalog");
        assert_eq!(state.failed_count, 1);
        assert!(state.last_error.is_some());

        state.record_saved(scan("OP01-001"));
        assert!(state.last_error.is_none());
    }
}
