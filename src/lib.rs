//! # deckpad
//!
//! Global numpad capture for a keypad-driven deck.
//!
//! While Num Lock is off, the nine digit keys of the numeric keypad drive a
//! 3×3 grid and `0` goes back one folder. The keys are swallowed system-wide
//! so the focused application never sees them, and the deck shows or hides
//! itself as Num Lock toggles.
//!
//! ## Architecture
//!
//! - A separate **hook host** process (`deckpad-host`) installs the low-level
//!   keyboard hook. Keeping it out of the UI process means a busy UI thread
//!   can never delay system-wide keyboard input.
//! - The host publishes keypad presses and Num Lock transitions into a
//!   lock-free single-producer/single-consumer ring in named shared memory
//!   (see [`shared`]).
//! - The [`InputDetector`] polls that ring from the UI timer and raises
//!   [`Notification`]s.
//! - The [`VisibilityPolicy`] turns notifications into window and navigation
//!   calls on a [`DeckShell`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use deckpad::{CaptureConfig, DeckShell, InputDetector, SystemNumLock, VisibilityPolicy};
//!
//! struct Shell;
//!
//! impl DeckShell for Shell {
//!     fn show_window(&mut self) {}
//!     fn hide_window(&mut self) {}
//!     fn activate_cell(&mut self, row: u8, col: u8) {
//!         println!("cell {row},{col}");
//!     }
//!     fn navigate_back(&mut self) {}
//!     fn sync_foreground_folder(&mut self) {}
//! }
//!
//! let config = CaptureConfig::default();
//! let interval = config.poll_interval;
//! let mut detector = InputDetector::start(config);
//! let mut policy = VisibilityPolicy::new(Shell, SystemNumLock);
//!
//! loop {
//!     detector.poll(&mut policy);
//!     std::thread::sleep(interval);
//! }
//! ```
//!
//! Modal editors that need real digits wrap themselves in
//! [`InputDetector::passthrough_scope`].

pub mod channel;
pub mod config;
pub mod detector;
pub mod error;
pub mod event;
pub mod foreground;
pub mod hook;
pub mod keypad;
pub mod policy;
#[cfg(feature = "recorder")]
pub mod recorder;
pub mod shared;
pub mod state;
pub mod statistics;

mod platform;

// Re-exports
pub use channel::{Delivery, DetectorHandle, detector_channel, spawn_poller};
pub use config::CaptureConfig;
pub use detector::{
    CaptureStatus, HostLauncher, HostProcess, InputDetector, PassthroughGuard, ProcessLauncher,
    query_numlock_off,
};
pub use error::{Error, Result};
pub use event::{KeyStroke, Notification, NotificationHandler, Verdict};
pub use foreground::{AppFolderMap, foreground_executable};
pub use hook::{ExitReason, HookHost, HostArgs, run_host, suppression_decision};
pub use keypad::NavKey;
pub use policy::{DeckShell, NumLockSource, SystemNumLock, Visibility, VisibilityPolicy};
#[cfg(feature = "recorder")]
pub use recorder::{NotificationRecorder, RecordedNotification, Recording};
pub use shared::{RingEntry, SharedBlock, SharedChannel};
pub use statistics::{CaptureStatistics, HookStatus};

#[cfg(feature = "tokio")]
pub use channel::detector_async_channel;
