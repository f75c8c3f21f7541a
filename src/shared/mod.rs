//! Shared state and messaging between the scan loop, session and workers
//!
//! This module provides the runtime state a UI renders from and the
//! message types that cross thread boundaries.

pub mod state;
pub mod messages;

pub use state::{RecentScan, RuntimeState};
pub use messages::{DisplayTimerCommand, LoopCommand, SaveRequest};
