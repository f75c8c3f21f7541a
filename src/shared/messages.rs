//! Message types passed between the scan loop, the session and its workers

use crate::analysis::debouncer::Confirmation;

/// Commands accepted by a running scan loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCommand {
    /// Stop after the current tick
    Stop,
    /// Drop the session's detection state
    Reset,
    /// Switch alt-art mode for subsequent samples
    SetAltArt(bool),
}

impl LoopCommand {
    /// Console help for `from_console`
    pub const CONSOLE_HELP: &'static str = "r = reset, a = toggle alt art, q = stop";

    /// Map a console line to a command. `a` toggles relative to the
    /// current alt-art mode.
    pub fn from_console(line: &str, is_alt_art: bool) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "r" | "reset" => Some(LoopCommand::Reset),
            "a" | "alt" => Some(LoopCommand::SetAltArt(!is_alt_art)),
            "q" | "quit" | "stop" => Some(LoopCommand::Stop),
            _ => None,
        }
    }
}

/// A confirmed card handed to the save worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    /// Canonical card code
    pub full_code: String,
    /// Scanned in alt-art mode
    pub is_alt_art: bool,
}

impl From<&Confirmation> for SaveRequest {
    fn from(confirmation: &Confirmation) -> Self {
        Self {
            full_code: confirmation.full_code.clone(),
            is_alt_art: confirmation.is_alt_art,
        }
    }
}

/// Commands for the success-display timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayTimerCommand {
    /// Clear the display for this confirmation once the display time is up.
    /// Replaces any pending clear.
    Schedule(Confirmation),
    /// Drop the pending clear
    Cancel,
}
