//! Visibility and navigation policy.
//!
//! Turns detector notifications into calls on the application shell: the deck
//! is shown while Num Lock is off and hidden while it is on, and grid keys
//! drive folder navigation only while the deck is visible and nobody has
//! asked for passthrough.

use crate::detector::query_numlock_off;
use crate::event::{Notification, NotificationHandler};
use log::{debug, info};

/// Window and folder-navigation surface driven by the policy.
pub trait DeckShell {
    fn show_window(&mut self);

    fn hide_window(&mut self);

    /// Activate the grid cell at `row`, `col` (row 0 is the top row).
    fn activate_cell(&mut self, row: u8, col: u8);

    /// Go up one folder. A no-op at the root.
    fn navigate_back(&mut self);

    /// Jump to the folder mapped to the foreground application, if any.
    fn sync_foreground_folder(&mut self);
}

/// Source of truth for the Num Lock state.
pub trait NumLockSource {
    /// `true` when Num Lock is off.
    fn numlock_off(&self) -> bool;
}

/// Asks the OS directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNumLock;

impl NumLockSource for SystemNumLock {
    fn numlock_off(&self) -> bool {
        query_numlock_off()
    }
}

impl<F> NumLockSource for F
where
    F: Fn() -> bool,
{
    fn numlock_off(&self) -> bool {
        self()
    }
}

/// Whether the deck window is on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Drives a [`DeckShell`] from detector notifications.
pub struct VisibilityPolicy<S: DeckShell, P: NumLockSource = SystemNumLock> {
    shell: S,
    numlock: P,
    visibility: Visibility,
}

impl<S: DeckShell, P: NumLockSource> VisibilityPolicy<S, P> {
    /// Create the policy and apply the initial visibility.
    ///
    /// With Num Lock off the deck is shown and synced to the foreground
    /// application. With Num Lock on the policy starts hidden and leaves the
    /// shell alone.
    pub fn new(mut shell: S, numlock: P) -> Self {
        let visibility = if numlock.numlock_off() {
            shell.show_window();
            shell.sync_foreground_folder();
            Visibility::Visible
        } else {
            Visibility::Hidden
        };
        info!("deck starts {:?}", visibility);

        Self {
            shell,
            numlock,
            visibility,
        }
    }

    /// Current visibility.
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    pub fn shell_mut(&mut self) -> &mut S {
        &mut self.shell
    }

    pub fn into_parts(self) -> (S, P) {
        (self.shell, self.numlock)
    }

    /// Apply one notification.
    pub fn handle(&mut self, notification: &Notification, passthrough: bool) {
        match *notification {
            Notification::NumLockChanged { off } => self.on_numlock(off),
            Notification::GridActivate { row, col } => {
                if self.navigation_enabled(passthrough) {
                    self.shell.activate_cell(row, col);
                } else {
                    debug!("ignoring cell ({}, {})", row, col);
                }
            }
            Notification::NavigateBack => {
                if self.navigation_enabled(passthrough) {
                    self.shell.navigate_back();
                } else {
                    debug!("ignoring back");
                }
            }
        }
    }

    fn navigation_enabled(&self, passthrough: bool) -> bool {
        self.visibility == Visibility::Visible && !passthrough
    }

    fn on_numlock(&mut self, off: bool) {
        match (self.visibility, off) {
            (Visibility::Visible, false) => {
                self.shell.hide_window();
                self.visibility = Visibility::Hidden;
                debug!("num lock on; deck hidden");
            }
            (Visibility::Hidden, true) => {
                // An edge can be stale by the time it is polled; trust the OS.
                if self.numlock.numlock_off() {
                    self.shell.show_window();
                    self.shell.sync_foreground_folder();
                    self.visibility = Visibility::Visible;
                    debug!("num lock off; deck shown");
                } else {
                    debug!("stale num lock edge ignored");
                }
            }
            _ => {}
        }
    }
}

impl<S: DeckShell, P: NumLockSource> NotificationHandler for VisibilityPolicy<S, P> {
    fn handle_notification(&mut self, notification: &Notification, passthrough: bool) {
        self.handle(notification, passthrough);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Show,
        Hide,
        Cell(u8, u8),
        Back,
        Sync,
    }

    #[derive(Default)]
    struct RecordingShell {
        calls: Vec<Call>,
    }

    impl DeckShell for RecordingShell {
        fn show_window(&mut self) {
            self.calls.push(Call::Show);
        }

        fn hide_window(&mut self) {
            self.calls.push(Call::Hide);
        }

        fn activate_cell(&mut self, row: u8, col: u8) {
            self.calls.push(Call::Cell(row, col));
        }

        fn navigate_back(&mut self) {
            self.calls.push(Call::Back);
        }

        fn sync_foreground_folder(&mut self) {
            self.calls.push(Call::Sync);
        }
    }

    fn policy(off: bool) -> (VisibilityPolicy<RecordingShell, impl Fn() -> bool>, Rc<Cell<bool>>) {
        let state = Rc::new(Cell::new(off));
        let os_state = state.clone();
        let policy = VisibilityPolicy::new(RecordingShell::default(), move || os_state.get());
        (policy, state)
    }

    #[test]
    fn test_initial_state_follows_os() {
        let (visible, _) = policy(true);
        assert_eq!(visible.visibility(), Visibility::Visible);
        assert_eq!(visible.shell().calls, vec![Call::Show, Call::Sync]);

        let (hidden, _) = policy(false);
        assert_eq!(hidden.visibility(), Visibility::Hidden);
        assert!(hidden.shell().calls.is_empty());
    }

    #[test]
    fn test_numlock_toggles_visibility() {
        let (mut policy, state) = policy(true);
        policy.shell_mut().calls.clear();

        state.set(false);
        policy.handle(&Notification::NumLockChanged { off: false }, false);
        assert_eq!(policy.visibility(), Visibility::Hidden);

        state.set(true);
        policy.handle(&Notification::NumLockChanged { off: true }, false);
        assert_eq!(policy.visibility(), Visibility::Visible);

        assert_eq!(policy.shell().calls, vec![Call::Hide, Call::Show, Call::Sync]);
    }

    #[test]
    fn test_stale_off_edge_is_reverified() {
        let (mut policy, state) = policy(false);

        // OFF then ON again before the poll: the OFF edge arrives while the
        // OS already reports ON.
        state.set(false);
        policy.handle(&Notification::NumLockChanged { off: true }, false);
        policy.handle(&Notification::NumLockChanged { off: false }, false);

        assert_eq!(policy.visibility(), Visibility::Hidden);
        assert!(policy.shell().calls.is_empty());
    }

    #[test]
    fn test_repeated_edges_do_not_repeat_calls() {
        let (mut policy, _) = policy(true);
        policy.handle(&Notification::NumLockChanged { off: true }, false);
        policy.handle(&Notification::NumLockChanged { off: true }, false);
        assert_eq!(policy.shell().calls, vec![Call::Show, Call::Sync]);
    }

    #[test]
    fn test_navigation_gated_on_visibility_and_passthrough() {
        let (mut policy, state) = policy(true);
        policy.shell_mut().calls.clear();

        policy.handle(&Notification::GridActivate { row: 1, col: 0 }, false);
        policy.handle(&Notification::NavigateBack, false);
        policy.handle(&Notification::GridActivate { row: 1, col: 1 }, true);
        policy.handle(&Notification::NavigateBack, true);
        assert_eq!(policy.shell().calls, vec![Call::Cell(1, 0), Call::Back]);

        state.set(false);
        policy.handle(&Notification::NumLockChanged { off: false }, false);
        policy.shell_mut().calls.clear();
        policy.handle(&Notification::GridActivate { row: 0, col: 2 }, false);
        policy.handle(&Notification::NavigateBack, false);
        assert!(policy.shell().calls.is_empty());
    }

    #[test]
    fn test_policy_as_notification_handler() {
        fn feed<H: NotificationHandler + ?Sized>(handler: &mut H) {
            handler.handle_notification(&Notification::GridActivate { row: 2, col: 2 }, false);
            handler.handle_notification(&Notification::GridActivate { row: 0, col: 1 }, true);
            handler.handle_notification(&Notification::NumLockChanged { off: false }, false);
        }

        let (mut policy, state) = policy(true);
        state.set(false);
        feed(&mut policy);

        assert_eq!(policy.visibility(), Visibility::Hidden);
        assert_eq!(
            policy.shell().calls,
            vec![Call::Show, Call::Sync, Call::Cell(2, 2), Call::Hide]
        );
    }

    #[test]
    fn test_into_parts_returns_shell() {
        let (mut policy, _) = policy(true);
        policy.handle(&Notification::GridActivate { row: 0, col: 0 }, false);
        let (shell, numlock) = policy.into_parts();
        assert!(numlock());
        assert_eq!(shell.calls.last(), Some(&Call::Cell(0, 0)));
    }
}
