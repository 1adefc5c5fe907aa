//! Event types crossing the capture channel.

use crate::keypad::NavKey;

#[cfg(feature = "recorder")]
use serde::{Deserialize, Serialize};

/// A raw keyboard event as seen by the low-level hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyStroke {
    /// Hardware scan code.
    pub scan_code: u32,
    /// Virtual key code.
    pub vk_code: u32,
    /// The key belongs to the extended set (dedicated arrows, Insert, ...).
    pub extended: bool,
    /// The event was generated by software rather than a keyboard.
    pub injected: bool,
    /// Key release rather than press.
    pub key_up: bool,
}

impl KeyStroke {
    /// A physical key press.
    pub fn press(scan_code: u32) -> Self {
        Self {
            scan_code,
            ..Self::default()
        }
    }

    /// A physical key release.
    pub fn release(scan_code: u32) -> Self {
        Self {
            scan_code,
            key_up: true,
            ..Self::default()
        }
    }

    /// Set the virtual key code.
    pub fn with_vk(mut self, vk_code: u32) -> Self {
        self.vk_code = vk_code;
        self
    }

    /// Mark the stroke as extended.
    pub fn extended(mut self) -> Self {
        self.extended = true;
        self
    }

    /// Mark the stroke as injected.
    pub fn injected(mut self) -> Self {
        self.injected = true;
        self
    }
}

/// What the hook does with an intercepted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Hand the event to the next hook and the foreground application.
    Forward,
    /// Consume the event.
    Suppress,
}

/// Domain-level notification raised by the input detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "recorder", derive(Serialize, Deserialize))]
pub enum Notification {
    /// Num Lock changed; `off` is the new state.
    NumLockChanged { off: bool },
    /// A grid key was pressed.
    GridActivate { row: u8, col: u8 },
    /// The Back key was pressed.
    NavigateBack,
}

impl From<NavKey> for Notification {
    fn from(key: NavKey) -> Self {
        match key {
            NavKey::Cell { row, col } => Notification::GridActivate { row, col },
            NavKey::Back => Notification::NavigateBack,
        }
    }
}

/// Receiver of detector notifications.
///
/// `passthrough` is the channel's passthrough flag sampled when the poll
/// started.
pub trait NotificationHandler {
    fn handle_notification(&mut self, notification: &Notification, passthrough: bool);
}

impl<F> NotificationHandler for F
where
    F: FnMut(&Notification, bool),
{
    fn handle_notification(&mut self, notification: &Notification, passthrough: bool) {
        self(notification, passthrough);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypad::SC_NUMPAD4;

    #[test]
    fn test_navkey_into_notification() {
        assert_eq!(
            Notification::from(NavKey::Cell { row: 1, col: 2 }),
            Notification::GridActivate { row: 1, col: 2 }
        );
        assert_eq!(Notification::from(NavKey::Back), Notification::NavigateBack);
    }

    #[test]
    fn test_stroke_builders() {
        let stroke = KeyStroke::release(SC_NUMPAD4).extended().injected();
        assert!(stroke.key_up && stroke.extended && stroke.injected);
        assert_eq!(stroke.scan_code, SC_NUMPAD4);
        assert!(!KeyStroke::press(SC_NUMPAD4).key_up);
    }
}
