//! Detection debouncer
//!
//! Turns a stream of per-frame OCR samples into rare "this card is confirmed"
//! events. A code has to be read on `confirmation_threshold` consecutive
//! processed samples before it confirms, and once confirmed it is ignored for
//! `cooldown_ms` so a card still sitting in front of the camera is saved once.
//!
//! Transitions are synchronous and take the current time as an argument.
//! Scheduling the post-save clear and dispatching the save belong to the
//! session.

use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::ScannerSettings;
use crate::vision::card_code;

/// Timing and threshold settings for one debouncer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    /// Consecutive reads required before a code confirms (at least 1)
    pub confirmation_threshold: u32,
    /// Minimum time between processed samples
    pub throttle_ms: u64,
    /// Time a saved code is ignored for
    pub cooldown_ms: u64,
    /// Time the last saved code stays visible
    pub success_display_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self::from(&ScannerSettings::default())
    }
}

impl From<&ScannerSettings> for DebounceConfig {
    fn from(settings: &ScannerSettings) -> Self {
        Self {
            confirmation_threshold: settings.confirmation_threshold.max(1),
            throttle_ms: settings.throttle_ms,
            cooldown_ms: settings.cooldown_ms,
            success_display_ms: settings.success_display_ms,
        }
    }
}

/// UI-facing detection state for one scanning session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetectionState {
    /// A candidate code is accumulating confirmations
    pub is_detecting: bool,
    /// Code currently being confirmed
    pub current_code: Option<String>,
    /// Consecutive qualifying reads of `current_code`
    pub confirmation_count: u32,
    /// Code most recently confirmed, shown until the display timer clears it
    pub last_saved_code: Option<String>,
}

/// A code that reached the confirmation threshold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    /// Canonical code, e.g. `OP05-060`
    pub full_code: String,
    /// Scanned in alt-art mode
    pub is_alt_art: bool,
    /// Generation the confirmation happened in. The display clear for this
    /// confirmation only applies while the generation is unchanged.
    pub generation: u64,
    /// Session time of the confirmation
    pub at_ms: u64,
}

/// Outcome of processing one sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Arrived before the throttle interval elapsed; nothing changed
    Throttled,
    /// No valid code in the sample. `was_detecting` tells whether the
    /// visible state changed.
    NoCode { was_detecting: bool },
    /// Code is still cooling down after a save; nothing changed
    CoolingDown { full_code: String },
    /// Code read again, not yet confirmed
    Accumulating { full_code: String, count: u32 },
    /// Code reached the threshold
    Confirmed(Confirmation),
}

impl Transition {
    /// Whether this transition changed the visible state
    pub fn changes_state(&self) -> bool {
        match self {
            Transition::Throttled | Transition::CoolingDown { .. } => false,
            Transition::NoCode { was_detecting } => *was_detecting,
            Transition::Accumulating { .. } | Transition::Confirmed(_) => true,
        }
    }
}

/// Consecutive-read and cooldown tracker for one scanning session
#[derive(Debug)]
pub struct DetectionDebouncer {
    config: DebounceConfig,
    state: DetectionState,
    consecutive: HashMap<String, u32>,
    last_saved_at: HashMap<String, u64>,
    last_processed_at: Option<u64>,
    generation: u64,
}

impl DetectionDebouncer {
    /// Create a debouncer in the idle state
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            config: DebounceConfig {
                confirmation_threshold: config.confirmation_threshold.max(1),
                ..config
            },
            state: DetectionState::default(),
            consecutive: HashMap::new(),
            last_saved_at: HashMap::new(),
            last_processed_at: None,
            generation: 0,
        }
    }

    #[cfg(test)]
    pub fn config(&self) -> &DebounceConfig {
        &self.config
    }

    pub fn state(&self) -> &DetectionState {
        &self.state
    }

    /// Bumped on every confirmation and reset
    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Process one OCR sample taken at session time `now_ms`
    pub fn process(&mut self, text: &str, is_alt_art: bool, now_ms: u64) -> Transition {
        if let Some(last) = self.last_processed_at {
            if now_ms.saturating_sub(last) < self.config.throttle_ms {
                return Transition::Throttled;
            }
        }
        self.last_processed_at = Some(now_ms);

        let Some(code) = card_code::parse_valid(text) else {
            // Losing the code on one frame ends the streak.
            self.consecutive.clear();
            let was_detecting = self.state.is_detecting;
            if was_detecting {
                self.state.is_detecting = false;
                self.state.current_code = None;
                self.state.confirmation_count = 0;
            }
            return Transition::NoCode { was_detecting };
        };
        let full_code = code.full_code().to_string();

        if self.is_cooling_down(&full_code, now_ms) {
            return Transition::CoolingDown { full_code };
        }

        let count = self.consecutive.get(&full_code).copied().unwrap_or(0) + 1;
        self.consecutive.retain(|key, _| key == &full_code);
        self.consecutive.insert(full_code.clone(), count);
        debug!("Detected {} ({}/{})", full_code, count, self.config.confirmation_threshold);

        if count >= self.config.confirmation_threshold {
            self.consecutive.clear();
            self.last_saved_at.insert(full_code.clone(), now_ms);
            self.generation += 1;

            self.state = DetectionState {
                is_detecting: true,
                current_code: Some(full_code.clone()),
                confirmation_count: 0,
                last_saved_code: Some(full_code.clone()),
            };

            info!("Confirmed {} (alt art: {})", full_code, is_alt_art);
            return Transition::Confirmed(Confirmation {
                full_code,
                is_alt_art,
                generation: self.generation,
                at_ms: now_ms,
            });
        }

        self.state.is_detecting = true;
        self.state.current_code = Some(full_code.clone());
        self.state.confirmation_count = count;

        Transition::Accumulating { full_code, count }
    }

    /// Clear the success display for `confirmation`.
    ///
    /// No-op when a reset or a newer confirmation happened since. Detection
    /// fields are only cleared if no other code has started accumulating.
    /// Returns whether anything changed.
    pub fn clear_saved(&mut self, confirmation: &Confirmation) -> bool {
        if confirmation.generation != self.generation {
            return false;
        }
        if self.state.last_saved_code.as_deref() != Some(confirmation.full_code.as_str()) {
            return false;
        }

        self.state.last_saved_code = None;
        if self.state.current_code.as_deref() == Some(confirmation.full_code.as_str()) {
            self.state.is_detecting = false;
            self.state.current_code = None;
            self.state.confirmation_count = 0;
        }
        true
    }

    /// Forget the cooldown for a code so it can be confirmed again right away
    pub fn release_cooldown(&mut self, full_code: &str) -> bool {
        self.last_saved_at.remove(full_code).is_some()
    }

    /// Drop all tracking and return to idle
    pub fn reset(&mut self) {
        self.consecutive.clear();
        self.last_saved_at.clear();
        self.last_processed_at = None;
        self.state = DetectionState::default();
        self.generation += 1;
    }

    fn is_cooling_down(&self, full_code: &str, now_ms: u64) -> bool {
        self.last_saved_at
            .get(full_code)
            .is_some_and(|saved| now_ms.saturating_sub(*saved) < self.config.cooldown_ms)
    }
}
