//! Capture configuration.

use std::path::PathBuf;
use std::time::Duration;

#[cfg(feature = "recorder")]
use serde::{Deserialize, Serialize};

/// File name of the hook host binary.
pub const HOST_BINARY: &str = "deckpad-host";

/// Tunables for the input detector.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "recorder", derive(Serialize, Deserialize))]
pub struct CaptureConfig {
    /// Interval between polls of the channel (about 60 Hz by default).
    pub poll_interval: Duration,
    /// How long the host gets to exit on its own after `running` is cleared.
    pub shutdown_grace: Duration,
    /// Minimum spacing of host health checks.
    pub health_check_interval: Duration,
    /// How many times an unexpectedly exited host is respawned.
    pub max_host_restarts: u32,
    /// Explicit path to the host executable. Defaults to
    /// `deckpad-host` next to the current executable.
    pub host_executable: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(16),
            shutdown_grace: Duration::from_millis(500),
            health_check_interval: Duration::from_secs(1),
            max_host_restarts: 3,
            host_executable: None,
        }
    }
}

impl CaptureConfig {
    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the shutdown grace period.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Set the health check interval.
    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    /// Set the respawn budget.
    pub fn with_max_host_restarts(mut self, restarts: u32) -> Self {
        self.max_host_restarts = restarts;
        self
    }

    /// Use a specific host executable.
    pub fn with_host_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.host_executable = Some(path.into());
        self
    }

    /// Resolve the host executable path.
    pub fn resolve_host_executable(&self) -> std::io::Result<PathBuf> {
        if let Some(path) = &self.host_executable {
            return Ok(path.clone());
        }
        let mut path = std::env::current_exe()?;
        path.pop();
        path.push(format!("{}{}", HOST_BINARY, std::env::consts::EXE_SUFFIX));
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(16));
        assert!(config.shutdown_grace > Duration::ZERO);
        assert!(config.host_executable.is_none());
    }

    #[test]
    fn test_host_executable_resolution() {
        let explicit = CaptureConfig::default().with_host_executable("/opt/deck/host");
        assert_eq!(
            explicit.resolve_host_executable().unwrap(),
            PathBuf::from("/opt/deck/host")
        );

        let default = CaptureConfig::default().resolve_host_executable().unwrap();
        let name = default.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(HOST_BINARY));
    }
}
