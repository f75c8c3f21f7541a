//! Analysis Engine
//!
//! Turns per-frame recognition results into confirmed detections and the
//! events a UI renders from.

pub mod debouncer;
pub mod events;

pub use debouncer::{Confirmation, DebounceConfig, DetectionDebouncer, DetectionState, Transition};
pub use events::{EventEmitter, ScanEvent, TimestampedEvent};
