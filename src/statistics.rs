//! Diagnostic counters published by the hook host.
//!
//! The counters are increment-only on the producer side and read without
//! synchronization here, so a snapshot is approximate. Nothing in the crate
//! makes control decisions from them.

use crate::shared::{HOOK_FAILED, HOOK_INSTALLED, SharedBlock};
use std::fmt;

#[cfg(feature = "recorder")]
use serde::{Deserialize, Serialize};

/// State of the native hook as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "recorder", derive(Serialize, Deserialize))]
pub enum HookStatus {
    /// The host has not reported yet.
    Pending,
    /// The hook is installed.
    Installed,
    /// Installation failed; keys are observed by nobody and never suppressed.
    Failed,
}

impl HookStatus {
    fn from_raw(raw: u32) -> Self {
        match raw {
            HOOK_INSTALLED => HookStatus::Installed,
            HOOK_FAILED => HookStatus::Failed,
            _ => HookStatus::Pending,
        }
    }
}

/// Point-in-time copy of the channel diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "recorder", derive(Serialize, Deserialize))]
pub struct CaptureStatistics {
    /// Key presses seen by the hook.
    pub keys_seen: u32,
    /// Presses of relevant keypad keys (including auto-repeat).
    pub numpad_seen: u32,
    /// Presses consumed by the hook.
    pub suppressed: u32,
    /// Ring entries lost to overflow.
    pub dropped: u32,
    /// Entries waiting to be polled.
    pub pending: u32,
    /// Hook installation state.
    pub hook: HookStatus,
}

impl CaptureStatistics {
    /// Read the counters from a block.
    pub fn snapshot(block: &SharedBlock) -> Self {
        Self {
            keys_seen: block.keys_seen(),
            numpad_seen: block.numpad_seen(),
            suppressed: block.suppressed(),
            dropped: block.dropped(),
            pending: block.pending(),
            hook: HookStatus::from_raw(block.hook_state()),
        }
    }

    /// Fraction of relevant presses that were suppressed.
    pub fn suppression_ratio(&self) -> f64 {
        if self.numpad_seen == 0 {
            0.0
        } else {
            self.suppressed as f64 / self.numpad_seen as f64
        }
    }
}

impl fmt::Display for CaptureStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hook {:?}: {} keys, {} numpad, {} suppressed, {} dropped, {} pending",
            self.hook, self.keys_seen, self.numpad_seen, self.suppressed, self.dropped, self.pending
        )
    }
}
