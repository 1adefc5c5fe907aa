//! Hook host: classification, suppression and publication of keypad events.
//!
//! The platform layer owns the native hook and the message loop; everything
//! that decides what happens to a key lives in [`HookHost`] so it can run
//! against an in-process block in tests.

use crate::error::{Error, Result};
use crate::event::{KeyStroke, Verdict};
use crate::keypad::{NavKey, VK_NUMLOCK};
use crate::platform;
use crate::shared::{RingEntry, SharedBlock};
use crate::state::{KeyLatch, MASK_NUMLOCK, key_mask};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// First positional argument selecting the hook-host entry point.
pub const HOOK_HOST_SELECTOR: &str = "--hook-host";

/// How often the host checks the `running` flag and its parent.
pub const LIVENESS_INTERVAL: Duration = Duration::from_millis(200);

/// Decide whether a relevant key is consumed.
///
/// Keys are suppressed only while Num Lock is off and nobody asked for
/// passthrough.
#[inline]
pub fn suppression_decision(numlock_off: bool, passthrough: bool) -> bool {
    numlock_off && !passthrough
}

/// Outcome of a liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Keep pumping messages.
    Continue,
    /// Tear down and exit.
    Exit(ExitReason),
}

/// Why the host left its message loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The detector cleared the `running` flag.
    ShutdownRequested,
    /// The parent process is gone.
    ParentExited,
}

/// Parsed hook-host command line: `<selector> <parent-pid>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostArgs {
    /// Process id of the application that owns the channel.
    pub parent_pid: u32,
}

impl HostArgs {
    /// Parse the positional arguments (program name already stripped).
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args = args.into_iter();

        match args.next() {
            Some(selector) if selector.as_ref() == HOOK_HOST_SELECTOR => {}
            Some(other) => {
                return Err(Error::InvalidArguments(format!(
                    "unknown entry point {:?}",
                    other.as_ref()
                )));
            }
            None => return Err(Error::InvalidArguments("missing entry point".into())),
        }

        let pid = args
            .next()
            .ok_or_else(|| Error::InvalidArguments("missing parent pid".into()))?;
        let parent_pid = pid
            .as_ref()
            .parse::<u32>()
            .map_err(|e| Error::InvalidArguments(format!("parent pid {:?}: {}", pid.as_ref(), e)))?;
        if parent_pid == 0 {
            return Err(Error::InvalidArguments("parent pid must be non-zero".into()));
        }

        if let Some(extra) = args.next() {
            return Err(Error::InvalidArguments(format!(
                "unexpected argument {:?}",
                extra.as_ref()
            )));
        }

        Ok(Self { parent_pid })
    }
}

/// Producer side of the capture channel.
pub struct HookHost<B: Deref<Target = SharedBlock>> {
    channel: B,
    latch: KeyLatch,
    stopped: AtomicBool,
}

impl<B: Deref<Target = SharedBlock>> HookHost<B> {
    /// Create a host publishing into `channel`.
    pub fn new(channel: B) -> Self {
        Self {
            channel,
            latch: KeyLatch::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// The block this host publishes into.
    pub fn channel(&self) -> &SharedBlock {
        &self.channel
    }

    /// Align the channel with the Num Lock state read from the OS.
    ///
    /// Publishes an edge when it disagrees with the consumer's snapshot.
    pub fn sync_numlock(&self, off: bool) -> bool {
        self.channel.publish_numlock(off)
    }

    /// Record whether the native hook could be installed.
    pub fn record_hook_installed(&self, installed: bool) {
        self.channel.set_hook_installed(installed);
    }

    /// Classify one intercepted event, publish it if relevant, and decide
    /// whether it is consumed.
    pub fn on_key(&self, stroke: &KeyStroke) -> Verdict {
        if self.stopped.load(Ordering::Acquire) {
            return Verdict::Forward;
        }

        let block = &*self.channel;
        if !stroke.key_up {
            block.note_key_seen();
        }

        if stroke.vk_code == VK_NUMLOCK {
            self.track_numlock(stroke);
            return Verdict::Forward;
        }

        if stroke.injected || stroke.extended {
            return Verdict::Forward;
        }

        let Some(key) = NavKey::from_scan_code(stroke.scan_code) else {
            return Verdict::Forward;
        };

        // One read of each flag: the published entry records the exact
        // state that decided the verdict.
        let numlock_off = block.numlock_off();
        let passthrough = block.passthrough();
        let suppress = suppression_decision(numlock_off, passthrough);

        let mask = key_mask(key.index());
        if stroke.key_up {
            self.latch.release(mask);
        } else {
            block.note_numpad_seen();
            if self.latch.press(mask) {
                block.push_entry(RingEntry {
                    scan_code: key.scan_code(),
                    numlock_off,
                    passthrough,
                    edge_seq: block.edge_seq(),
                });
            }
        }

        if suppress {
            if !stroke.key_up {
                block.note_suppressed();
            }
            Verdict::Suppress
        } else {
            Verdict::Forward
        }
    }

    fn track_numlock(&self, stroke: &KeyStroke) {
        if stroke.key_up {
            self.latch.release(MASK_NUMLOCK);
        } else if self.latch.press(MASK_NUMLOCK) {
            // The OS toggles on the press that we are looking at now.
            let off = !self.channel.numlock_off();
            self.channel.publish_numlock(off);
        }
    }

    /// Periodic check of the stop flag and the parent process.
    pub fn check_liveness(&self, parent_alive: bool) -> Liveness {
        if !self.channel.running() {
            Liveness::Exit(ExitReason::ShutdownRequested)
        } else if !parent_alive {
            Liveness::Exit(ExitReason::ParentExited)
        } else {
            Liveness::Continue
        }
    }

    /// Stop publishing. Every later event is forwarded untouched.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.latch.reset();
    }

    /// Check whether [`stop`](Self::stop) was called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Run the hook host until the detector stops it or the parent dies
/// (blocking).
///
/// Fails without installing anything when the parent is already gone or the
/// channel cannot be opened.
pub fn run_host(args: &HostArgs) -> Result<ExitReason> {
    platform::run_hook_host(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypad::*;
    use crate::shared::SharedChannel;

    fn host(numlock_off: bool) -> (HookHost<SharedChannel>, SharedChannel) {
        let channel = SharedChannel::new_in_process();
        channel.initialize(numlock_off);
        (HookHost::new(channel.clone()), channel)
    }

    fn drained(channel: &SharedChannel) -> Vec<u32> {
        let mut codes = Vec::new();
        channel.drain(|entry| codes.push(entry.scan_code));
        codes
    }

    fn entries(channel: &SharedChannel) -> Vec<RingEntry> {
        let mut entries = Vec::new();
        channel.drain(|entry| entries.push(entry));
        entries
    }

    #[test]
    fn test_suppression_table() {
        assert!(suppression_decision(true, false));
        assert!(!suppression_decision(true, true));
        assert!(!suppression_decision(false, false));
        assert!(!suppression_decision(false, true));
    }

    #[test]
    fn test_middle_row_keys_are_suppressed_and_published() {
        let (host, channel) = host(true);

        assert_eq!(host.on_key(&KeyStroke::press(SC_NUMPAD4)), Verdict::Suppress);
        assert_eq!(host.on_key(&KeyStroke::release(SC_NUMPAD4)), Verdict::Suppress);
        assert_eq!(host.on_key(&KeyStroke::press(SC_NUMPAD5)), Verdict::Suppress);
        assert_eq!(host.on_key(&KeyStroke::release(SC_NUMPAD5)), Verdict::Suppress);

        assert_eq!(drained(&channel), vec![SC_NUMPAD4, SC_NUMPAD5]);
        assert_eq!(channel.suppressed(), 2);
        assert_eq!(channel.numpad_seen(), 2);
    }

    #[test]
    fn test_passthrough_and_numlock_on_forward_but_still_publish() {
        let (host, channel) = host(true);
        channel.set_passthrough(true);
        assert_eq!(host.on_key(&KeyStroke::press(SC_NUMPAD8)), Verdict::Forward);
        host.on_key(&KeyStroke::release(SC_NUMPAD8));

        channel.set_passthrough(false);
        channel.sync_numlock(false);
        assert_eq!(host.on_key(&KeyStroke::press(SC_NUMPAD0)), Verdict::Forward);

        assert_eq!(drained(&channel), vec![SC_NUMPAD8, SC_NUMPAD0]);
        assert_eq!(channel.suppressed(), 0);
    }

    #[test]
    fn test_irrelevant_extended_and_injected_keys_are_untouched() {
        let (host, channel) = host(true);

        // Letter A, the dedicated Home key, and a macro-injected Numpad 7.
        assert_eq!(host.on_key(&KeyStroke::press(0x1E)), Verdict::Forward);
        assert_eq!(
            host.on_key(&KeyStroke::press(SC_NUMPAD7).extended()),
            Verdict::Forward
        );
        assert_eq!(
            host.on_key(&KeyStroke::press(SC_NUMPAD7).injected()),
            Verdict::Forward
        );

        assert!(drained(&channel).is_empty());
        assert_eq!(channel.keys_seen(), 3);
        assert_eq!(channel.numpad_seen(), 0);
    }

    #[test]
    fn test_auto_repeat_publishes_once() {
        let (host, channel) = host(true);
        for _ in 0..5 {
            assert_eq!(host.on_key(&KeyStroke::press(SC_NUMPAD9)), Verdict::Suppress);
        }
        host.on_key(&KeyStroke::release(SC_NUMPAD9));
        host.on_key(&KeyStroke::press(SC_NUMPAD9));

        assert_eq!(drained(&channel), vec![SC_NUMPAD9, SC_NUMPAD9]);
    }

    #[test]
    fn test_numlock_key_publishes_edges() {
        let (host, channel) = host(true);
        let numlock = KeyStroke::press(0x45).with_vk(VK_NUMLOCK);
        let numlock_up = KeyStroke::release(0x45).with_vk(VK_NUMLOCK);

        // Off -> on, with a held repeat that must not toggle again.
        assert_eq!(host.on_key(&numlock), Verdict::Forward);
        host.on_key(&numlock);
        host.on_key(&numlock_up);
        assert!(!channel.numlock_off());

        // On -> off.
        host.on_key(&numlock);
        host.on_key(&numlock_up);
        assert!(channel.numlock_off());

        let edges = channel.take_numlock_edges().unwrap();
        assert_eq!(edges.states().collect::<Vec<_>>(), vec![false, true]);
        assert!(drained(&channel).is_empty());
    }

    #[test]
    fn test_sync_numlock_only_raises_on_disagreement() {
        let (host, channel) = host(true);
        assert!(!host.sync_numlock(true));
        assert!(host.sync_numlock(false));
        assert_eq!(
            channel.take_numlock_edges().map(|e| e.last_off),
            Some(false)
        );
    }

    #[test]
    fn test_liveness() {
        let (host, channel) = host(true);
        assert_eq!(host.check_liveness(true), Liveness::Continue);
        assert_eq!(
            host.check_liveness(false),
            Liveness::Exit(ExitReason::ParentExited)
        );

        channel.request_stop();
        assert_eq!(
            host.check_liveness(true),
            Liveness::Exit(ExitReason::ShutdownRequested)
        );
    }

    #[test]
    fn test_no_writes_after_stop() {
        let (host, channel) = host(true);
        host.on_key(&KeyStroke::press(SC_NUMPAD1));

        channel.request_stop();
        assert!(matches!(host.check_liveness(true), Liveness::Exit(_)));
        host.stop();

        let write = channel.write_counter();
        assert_eq!(host.on_key(&KeyStroke::press(SC_NUMPAD2)), Verdict::Forward);
        assert_eq!(host.on_key(&KeyStroke::press(SC_NUMPAD3)), Verdict::Forward);
        assert_eq!(channel.write_counter(), write);
        assert!(host.is_stopped());
    }

    #[test]
    fn test_hook_install_state() {
        let (host, channel) = host(true);
        assert_eq!(channel.hook_state(), crate::shared::HOOK_PENDING);
        host.record_hook_installed(false);
        assert_eq!(channel.hook_state(), crate::shared::HOOK_FAILED);
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(
            HostArgs::parse(["--hook-host", "4242"]).unwrap(),
            HostArgs { parent_pid: 4242 }
        );

        for bad in [
            vec![],
            vec!["--hook-host"],
            vec!["--hook-host", "abc"],
            vec!["--hook-host", "0"],
            vec!["--hook-host", "12", "extra"],
            vec!["--other", "12"],
        ] {
            assert!(
                matches!(HostArgs::parse(bad.clone()), Err(Error::InvalidArguments(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_entries_record_the_deciding_state() {
        let (host, channel) = host(false);
        let numlock = KeyStroke::press(0x45).with_vk(VK_NUMLOCK);
        let numlock_up = KeyStroke::release(0x45).with_vk(VK_NUMLOCK);

        // Num Lock on: the digit goes to the focused application.
        assert_eq!(host.on_key(&KeyStroke::press(SC_NUMPAD5)), Verdict::Forward);
        host.on_key(&numlock);
        host.on_key(&numlock_up);
        assert_eq!(host.on_key(&KeyStroke::press(SC_NUMPAD6)), Verdict::Suppress);
        channel.set_passthrough(true);
        assert_eq!(host.on_key(&KeyStroke::press(SC_NUMPAD4)), Verdict::Forward);

        let entries = entries(&channel);
        assert_eq!(
            entries
                .iter()
                .map(|e| (e.scan_code, e.was_suppressed(), e.edge_seq))
                .collect::<Vec<_>>(),
            vec![(SC_NUMPAD5, false, 0), (SC_NUMPAD6, true, 1), (SC_NUMPAD4, false, 1)]
        );
        assert!(entries[2].numlock_off && entries[2].passthrough);
    }
}
