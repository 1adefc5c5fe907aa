//! Input detector: the consumer side of the capture channel.
//!
//! The detector creates the shared block, launches the hook host, and turns
//! ring entries and Num Lock edges into [`Notification`]s. [`poll`] never
//! blocks; it is meant to run from the application's UI timer so every
//! notification is serialized with UI state changes.
//!
//! Capture is an enhancement. When the block cannot be created or the host
//! cannot be launched the detector stays inert: polls deliver nothing and
//! every control call is a no-op.
//!
//! [`poll`]: InputDetector::poll

use crate::config::CaptureConfig;
use crate::error::{Error, Result};
use crate::event::{Notification, NotificationHandler};
use crate::hook::HOOK_HOST_SELECTOR;
use crate::keypad::NavKey;
use crate::platform;
use crate::shared::{HOOK_FAILED, RingEntry, SHM_NAME, SharedChannel};
use crate::statistics::CaptureStatistics;
use log::{debug, error, info, trace, warn};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Query the OS for the current Num Lock state, independent of the channel.
///
/// Returns `true` when Num Lock is off. Where the state cannot be read the
/// answer is `true`, which keeps the deck visible for pointer use.
pub fn query_numlock_off() -> bool {
    platform::numlock_off().unwrap_or(true)
}

/// A running hook host process.
pub trait HostProcess: Send {
    /// OS process id.
    fn id(&self) -> u32;

    /// Check (without blocking) whether the process has exited.
    fn has_exited(&mut self) -> bool;

    /// Kill the process and reap it.
    fn terminate(&mut self) -> std::io::Result<()>;
}

impl HostProcess for Child {
    fn id(&self) -> u32 {
        Child::id(self)
    }

    fn has_exited(&mut self) -> bool {
        !matches!(self.try_wait(), Ok(None))
    }

    fn terminate(&mut self) -> std::io::Result<()> {
        self.kill()?;
        self.wait().map(|_| ())
    }
}

/// Starts hook host processes.
pub trait HostLauncher: Send {
    fn launch(&mut self) -> Result<Box<dyn HostProcess>>;
}

impl<F> HostLauncher for F
where
    F: FnMut() -> Result<Box<dyn HostProcess>> + Send,
{
    fn launch(&mut self) -> Result<Box<dyn HostProcess>> {
        self()
    }
}

/// Launches the `deckpad-host` executable as a child process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    executable: PathBuf,
}

impl ProcessLauncher {
    /// Launch a specific executable.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Launch the executable named by the configuration.
    pub fn from_config(config: &CaptureConfig) -> Result<Self> {
        Ok(Self::new(config.resolve_host_executable()?))
    }

    /// The executable that will be launched.
    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

impl HostLauncher for ProcessLauncher {
    fn launch(&mut self) -> Result<Box<dyn HostProcess>> {
        let mut command = Command::new(&self.executable);
        command
            .arg(HOOK_HOST_SELECTOR)
            .arg(std::process::id().to_string())
            .stdin(Stdio::null());

        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let child = command
            .spawn()
            .map_err(|e| Error::SpawnFailed(format!("{}: {}", self.executable.display(), e)))?;
        Ok(Box::new(child))
    }
}

/// Whether capture is working.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureStatus {
    /// Channel mapped and host running.
    Active,
    /// Capture could not be set up; numpad features are inert.
    Unavailable(String),
    /// The host kept exiting and the respawn budget is spent.
    HostExited,
    /// [`InputDetector::shutdown`] has run.
    Stopped,
}

/// Consumer side of the capture channel.
pub struct InputDetector {
    config: CaptureConfig,
    channel: Option<SharedChannel>,
    launcher: Option<Box<dyn HostLauncher>>,
    host: Option<Box<dyn HostProcess>>,
    status: CaptureStatus,
    restarts: u32,
    last_health_check: Instant,
    hook_failure_reported: bool,
}

impl InputDetector {
    /// Create the named channel and launch the hook host.
    ///
    /// Never fails: on any error the returned detector is inert and
    /// [`status`](Self::status) says why.
    pub fn start(config: CaptureConfig) -> Self {
        // The section may outlive a previous session (its host is still
        // winding down); `with_launcher` re-stamps it either way.
        let channel = match SharedChannel::create(SHM_NAME) {
            Ok(channel) => channel,
            Err(e) => {
                warn!("numpad capture unavailable: {}", e);
                return Self::inert(config, e.to_string());
            }
        };

        let launcher = match ProcessLauncher::from_config(&config) {
            Ok(launcher) => launcher,
            Err(e) => {
                warn!("numpad capture unavailable: {}", e);
                return Self::inert(config, e.to_string());
            }
        };

        match Self::with_launcher(config.clone(), channel, launcher) {
            Ok(detector) => detector,
            Err(e) => {
                warn!("numpad capture unavailable: {}", e);
                Self::inert(config, e.to_string())
            }
        }
    }

    /// Start a session on `channel` and launch a host through `launcher`.
    ///
    /// The block is always re-initialized: state left behind by an earlier
    /// session (a cleared `running` flag, passthrough left on, unread keys or
    /// Num Lock transitions) never carries over.
    pub fn with_launcher(
        config: CaptureConfig,
        channel: SharedChannel,
        launcher: impl HostLauncher + 'static,
    ) -> Result<Self> {
        channel.initialize(query_numlock_off());
        let mut detector = Self::with_channel(config, channel);
        let mut launcher: Box<dyn HostLauncher> = Box::new(launcher);
        let host = launcher.launch()?;
        info!("hook host started (pid {})", host.id());
        detector.host = Some(host);
        detector.launcher = Some(launcher);
        Ok(detector)
    }

    /// Attach to a channel whose session is managed elsewhere, without
    /// launching a host. Stamps the block only if nobody has yet.
    pub fn with_channel(config: CaptureConfig, channel: SharedChannel) -> Self {
        if !channel.is_compatible() {
            channel.initialize(query_numlock_off());
        }
        Self {
            config,
            channel: Some(channel),
            launcher: None,
            host: None,
            status: CaptureStatus::Active,
            restarts: 0,
            last_health_check: Instant::now(),
            hook_failure_reported: false,
        }
    }

    /// A detector that captures nothing.
    pub fn inert(config: CaptureConfig, reason: impl Into<String>) -> Self {
        Self {
            config,
            channel: None,
            launcher: None,
            host: None,
            status: CaptureStatus::Unavailable(reason.into()),
            restarts: 0,
            last_health_check: Instant::now(),
            hook_failure_reported: false,
        }
    }

    /// Current capture status.
    pub fn status(&self) -> &CaptureStatus {
        &self.status
    }

    /// Check whether notifications can arrive.
    pub fn is_available(&self) -> bool {
        self.channel.is_some() && self.status == CaptureStatus::Active
    }

    /// The mapped channel, while capture is set up.
    pub fn channel(&self) -> Option<&SharedChannel> {
        self.channel.as_ref()
    }

    /// The configuration this detector runs with.
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Synchronous OS query of Num Lock; see [`query_numlock_off`].
    pub fn query_numlock_off(&self) -> bool {
        query_numlock_off()
    }

    /// Drain the channel and deliver notifications to `handler`.
    ///
    /// Key presses and Num Lock transitions are delivered in the order they
    /// were captured. A key captured after a transition this poll has not
    /// seen yet stays in the ring for the next poll.
    ///
    /// Keys captured while Num Lock was on are dropped here: the focused
    /// application already received them as digits. Keys forwarded because of
    /// passthrough are delivered with `passthrough = true`.
    ///
    /// A press captured just before Num Lock was turned on is delivered
    /// before the ON transition. A policy that has already hidden the deck
    /// (polling lagged behind both) ignores it.
    ///
    /// Returns the number of notifications delivered.
    pub fn poll<H: NotificationHandler + ?Sized>(&mut self, handler: &mut H) -> usize {
        let Some(channel) = self.channel.as_ref() else {
            return 0;
        };

        let passthrough = channel.passthrough();
        let mut delivered = 0;
        let mut transitions = channel
            .take_numlock_edges()
            .into_iter()
            .flat_map(|edges| edges.transitions())
            .peekable();
        let horizon = channel.acknowledged_edges();

        channel.drain_while(|entry| {
            if entry.captured_after(horizon.wrapping_add(1)) {
                return false;
            }
            while let Some(&(counter, off)) = transitions.peek() {
                if !entry.captured_after(counter) {
                    break;
                }
                deliver_numlock(handler, off, passthrough, &mut delivered);
                transitions.next();
            }
            deliver_entry(handler, entry, passthrough, &mut delivered);
            true
        });

        for (_, off) in transitions {
            deliver_numlock(handler, off, passthrough, &mut delivered);
        }

        self.check_health();
        delivered
    }

    fn check_health(&mut self) {
        if self.last_health_check.elapsed() < self.config.health_check_interval {
            return;
        }
        self.last_health_check = Instant::now();

        if let Some(channel) = &self.channel {
            if !self.hook_failure_reported && channel.hook_state() == HOOK_FAILED {
                self.hook_failure_reported = true;
                error!("hook host could not install the keyboard hook; numpad keys will not be suppressed");
            }
        }

        let exited = match self.host.as_mut() {
            Some(host) => host.has_exited(),
            None => return,
        };
        if !exited {
            return;
        }
        self.host = None;

        if self.restarts >= self.config.max_host_restarts {
            error!(
                "hook host exited and the restart budget ({}) is spent; numpad capture disabled",
                self.config.max_host_restarts
            );
            self.status = CaptureStatus::HostExited;
            return;
        }

        self.restarts += 1;
        warn!(
            "hook host exited unexpectedly; restarting ({}/{})",
            self.restarts, self.config.max_host_restarts
        );

        if let Some(channel) = &self.channel {
            channel.mark_running();
        }
        let Some(launcher) = self.launcher.as_mut() else {
            self.status = CaptureStatus::HostExited;
            return;
        };
        match launcher.launch() {
            Ok(host) => {
                info!("hook host restarted (pid {})", host.id());
                self.host = Some(host);
            }
            Err(e) => {
                error!("failed to restart hook host: {}", e);
                self.status = CaptureStatus::HostExited;
            }
        }
    }

    /// Turn passthrough on or off.
    ///
    /// Prefer [`passthrough_scope`](Self::passthrough_scope), which cannot
    /// leave suppression disabled on an early return.
    pub fn set_passthrough(&self, enabled: bool) {
        if let Some(channel) = &self.channel {
            channel.set_passthrough(enabled);
            debug!("passthrough {}", if enabled { "on" } else { "off" });
        }
    }

    /// Current passthrough flag (`false` when capture is unavailable).
    pub fn passthrough(&self) -> bool {
        self.channel.as_ref().is_some_and(|c| c.passthrough())
    }

    /// Enable passthrough until the returned guard drops.
    pub fn passthrough_scope(&self) -> PassthroughGuard {
        let channel = self.channel.clone();
        let previous = channel.as_ref().is_some_and(|c| c.passthrough());
        if let Some(channel) = &channel {
            channel.set_passthrough(true);
            debug!("passthrough scope entered");
        }
        PassthroughGuard { channel, previous }
    }

    /// Diagnostic counters, while capture is set up.
    pub fn statistics(&self) -> Option<CaptureStatistics> {
        self.channel.as_deref().map(CaptureStatistics::snapshot)
    }

    /// Stop the host and release the channel.
    ///
    /// Clears `running`, waits up to the configured grace period for the host
    /// to leave on its own, then kills it. Safe to call repeatedly and after
    /// the host already exited.
    pub fn shutdown(&mut self) {
        if self.status == CaptureStatus::Stopped {
            return;
        }

        if let Some(channel) = &self.channel {
            channel.request_stop();
        }

        if let Some(mut host) = self.host.take() {
            let grace = self.config.shutdown_grace;
            if wait_for_exit(host.as_mut(), grace) {
                debug!("hook host {} exited", host.id());
            } else {
                warn!(
                    "hook host {} still running after {:?}; terminating",
                    host.id(),
                    grace
                );
                if let Err(e) = host.terminate() {
                    warn!("failed to terminate hook host: {}", e);
                }
            }
        }

        self.launcher = None;
        if self.channel.take().is_some() {
            info!("numpad capture stopped");
        }
        self.status = CaptureStatus::Stopped;
    }
}

impl Drop for InputDetector {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn deliver_numlock<H: NotificationHandler + ?Sized>(
    handler: &mut H,
    off: bool,
    passthrough: bool,
    delivered: &mut usize,
) {
    debug!("num lock changed (off = {})", off);
    handler.handle_notification(&Notification::NumLockChanged { off }, passthrough);
    *delivered += 1;
}

fn deliver_entry<H: NotificationHandler + ?Sized>(
    handler: &mut H,
    entry: RingEntry,
    passthrough: bool,
    delivered: &mut usize,
) {
    let Some(key) = NavKey::from_scan_code(entry.scan_code) else {
        trace!("discarding unrecognized scan code {:#x}", entry.scan_code);
        return;
    };
    if !entry.numlock_off {
        trace!("skipping {:?}: captured with num lock on", key);
        return;
    }
    handler.handle_notification(&Notification::from(key), passthrough || entry.passthrough);
    *delivered += 1;
}

fn wait_for_exit(host: &mut dyn HostProcess, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        if host.has_exited() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Keeps passthrough on while alive; restores the previous value on drop.
#[must_use = "passthrough is restored as soon as the guard is dropped"]
pub struct PassthroughGuard {
    channel: Option<SharedChannel>,
    previous: bool,
}

impl Drop for PassthroughGuard {
    fn drop(&mut self) {
        if let Some(channel) = &self.channel {
            channel.set_passthrough(self.previous);
            debug!("passthrough scope left");
        }
    }
}
