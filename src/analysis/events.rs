//! Scan events
//!
//! Emitted by a scanning session as detection state changes and saves
//! complete. UI layers subscribe and render from these.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::time::Instant;

use crate::analysis::debouncer::DetectionState;

/// Things a scanning session reports
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// Visible detection state changed
    StateChanged(DetectionState),
    /// A code reached the confirmation threshold and a save was dispatched
    Confirmed {
        full_code: String,
        is_alt_art: bool,
    },
    /// The collection store recorded the card
    SaveSucceeded {
        full_code: String,
        entry_id: String,
    },
    /// The save did not go through
    SaveFailed {
        full_code: String,
        reason: String,
    },
    /// The success display for a code was cleared
    DisplayCleared {
        full_code: String,
    },
}

/// A timestamped scan event
#[derive(Debug, Clone)]
pub struct TimestampedEvent {
    /// The event
    pub event: ScanEvent,
    /// When it occurred
    pub timestamp: Instant,
}

/// Event emitter for broadcasting scan events
#[derive(Debug, Default)]
pub struct EventEmitter {
    subscribers: Mutex<Vec<Sender<TimestampedEvent>>>,
}

impl EventEmitter {
    /// Create a new event emitter
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Receiver<TimestampedEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Emit an event to all subscribers, dropping the ones that went away
    pub fn emit(&self, event: ScanEvent) {
        let stamped = TimestampedEvent {
            event,
            timestamp: Instant::now(),
        };
        self.subscribers
            .lock()
            .retain(|tx| tx.send(stamped.clone()).is_ok());
    }

    /// Number of live subscribers
    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
