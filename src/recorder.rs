//! Notification recording and replay.
//!
//! Wrap any handler in a [`NotificationRecorder`] to capture what the detector
//! delivered, with timestamps, and save it as JSON. A saved [`Recording`] can
//! be replayed into a handler later, which is how navigation bugs reported
//! from the field are reproduced against the policy.
//!
//! # Example
//!
//! ```no_run
//! use deckpad::recorder::{NotificationRecorder, Recording};
//! use deckpad::{CaptureConfig, InputDetector, Notification};
//!
//! let mut detector = InputDetector::start(CaptureConfig::default());
//! let mut recorder = NotificationRecorder::new(|n: &Notification, _: bool| println!("{:?}", n));
//!
//! detector.poll(&mut recorder);
//!
//! let (_, recording) = recorder.finish();
//! recording.save("session.json").unwrap();
//!
//! let recording = Recording::load("session.json").unwrap();
//! recording.replay(&mut |n: &Notification, _: bool| println!("replayed {:?}", n));
//! ```

use crate::error::{Error, Result};
use crate::event::{Notification, NotificationHandler};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant, SystemTime};

/// A notification with the time elapsed since recording started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedNotification {
    pub elapsed: Duration,
    pub notification: Notification,
    pub passthrough: bool,
}

/// A sequence of recorded notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub notifications: Vec<RecordedNotification>,
    /// When the recording was created.
    pub created_at: SystemTime,
    pub description: Option<String>,
}

impl Recording {
    /// Create a new empty recording.
    pub fn new() -> Self {
        Self {
            notifications: Vec::new(),
            created_at: SystemTime::now(),
            description: None,
        }
    }

    /// Set a description for this recording.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Time of the last notification.
    pub fn duration(&self) -> Duration {
        self.notifications
            .last()
            .map(|n| n.elapsed)
            .unwrap_or(Duration::ZERO)
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    /// Save the recording to a file (JSON format).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Other(format!("Failed to serialize recording: {}", e)))?;
        std::fs::write(path, json)
            .map_err(|e| Error::Other(format!("Failed to write recording file: {}", e)))?;
        Ok(())
    }

    /// Load a recording from a file (JSON format).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Other(format!("Failed to read recording file: {}", e)))?;
        serde_json::from_str(&json)
            .map_err(|e| Error::Other(format!("Failed to deserialize recording: {}", e)))
    }

    /// Deliver every notification to `handler` immediately, in order.
    pub fn replay<H: NotificationHandler + ?Sized>(&self, handler: &mut H) {
        for recorded in &self.notifications {
            handler.handle_notification(&recorded.notification, recorded.passthrough);
        }
    }

    /// Deliver the notifications with their original spacing, scaled by
    /// `speed` (2.0 replays twice as fast).
    pub fn replay_timed<H: NotificationHandler + ?Sized>(
        &self,
        handler: &mut H,
        speed: f64,
    ) -> Result<()> {
        if speed <= 0.0 {
            return Err(Error::Other("Replay speed must be positive".into()));
        }

        let start = Instant::now();
        for recorded in &self.notifications {
            let target = Duration::from_secs_f64(recorded.elapsed.as_secs_f64() / speed);
            let elapsed = start.elapsed();
            if target > elapsed {
                std::thread::sleep(target - elapsed);
            }
            handler.handle_notification(&recorded.notification, recorded.passthrough);
        }
        Ok(())
    }
}

impl Default for Recording {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler that records every notification before passing it on.
pub struct NotificationRecorder<H> {
    inner: H,
    start: Instant,
    recording: Recording,
}

impl<H: NotificationHandler> NotificationRecorder<H> {
    /// Start recording in front of `inner`.
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            start: Instant::now(),
            recording: Recording::new(),
        }
    }

    /// What has been recorded so far.
    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    /// Stop recording; returns the wrapped handler and the recording.
    pub fn finish(self) -> (H, Recording) {
        (self.inner, self.recording)
    }
}

impl<H: NotificationHandler> NotificationHandler for NotificationRecorder<H> {
    fn handle_notification(&mut self, notification: &Notification, passthrough: bool) {
        self.recording.notifications.push(RecordedNotification {
            elapsed: self.start.elapsed(),
            notification: *notification,
            passthrough,
        });
        self.inner.handle_notification(notification, passthrough);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{DeckShell, Visibility, VisibilityPolicy};

    #[derive(Default)]
    struct CountingShell {
        shown: u32,
        hidden: u32,
        cells: Vec<(u8, u8)>,
        backs: u32,
    }

    impl DeckShell for CountingShell {
        fn show_window(&mut self) {
            self.shown += 1;
        }

        fn hide_window(&mut self) {
            self.hidden += 1;
        }

        fn activate_cell(&mut self, row: u8, col: u8) {
            self.cells.push((row, col));
        }

        fn navigate_back(&mut self) {
            self.backs += 1;
        }

        fn sync_foreground_folder(&mut self) {}
    }

    #[test]
    fn test_recording_new() {
        let recording = Recording::new().with_description("empty");
        assert!(recording.is_empty());
        assert_eq!(recording.duration(), Duration::ZERO);
        assert_eq!(recording.description.as_deref(), Some("empty"));
    }

    #[test]
    fn test_recorder_tees_to_inner_handler() {
        let mut seen = 0;
        let mut recorder = NotificationRecorder::new(|_: &Notification, _: bool| seen += 1);
        recorder.handle_notification(&Notification::NavigateBack, false);
        recorder.handle_notification(&Notification::GridActivate { row: 0, col: 0 }, true);

        let (_, recording) = recorder.finish();
        assert_eq!(seen, 2);
        assert_eq!(recording.len(), 2);
        assert!(recording.notifications[1].passthrough);
    }

    #[test]
    fn test_save_load_replay_into_policy() {
        let mut recorder = NotificationRecorder::new(|_: &Notification, _: bool| {});
        for (notification, passthrough) in [
            (Notification::GridActivate { row: 1, col: 0 }, false),
            (Notification::GridActivate { row: 1, col: 1 }, true),
            (Notification::NavigateBack, false),
            (Notification::NumLockChanged { off: false }, false),
            (Notification::GridActivate { row: 2, col: 2 }, false),
        ] {
            recorder.handle_notification(&notification, passthrough);
        }
        let (_, recording) = recorder.finish();

        let path = std::env::temp_dir().join(format!(
            "deckpad_test_recording_{}.json",
            std::process::id()
        ));
        recording.save(&path).unwrap();
        let loaded = Recording::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.notifications, recording.notifications);

        let mut policy = VisibilityPolicy::new(CountingShell::default(), || true);
        loaded.replay(&mut policy);

        // The OS query keeps saying "off" but the ON edge still hides.
        assert_eq!(policy.visibility(), Visibility::Hidden);
        let shell = policy.shell();
        assert_eq!(shell.cells, vec![(1, 0)]);
        assert_eq!(shell.backs, 1);
        assert_eq!((shell.shown, shell.hidden), (1, 1));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let path = std::env::temp_dir().join(format!(
            "deckpad_test_garbage_{}.json",
            std::process::id()
        ));
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(Recording::load(&path), Err(Error::Other(_))));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_replay_timed_rejects_bad_speed() {
        let recording = Recording::new();
        let mut sink = |_: &Notification, _: bool| {};
        assert!(recording.replay_timed(&mut sink, 0.0).is_err());
        assert!(recording.replay_timed(&mut sink, 4.0).is_ok());
    }
}
