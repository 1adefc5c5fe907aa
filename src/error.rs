//! Error types for the capture channel.

use thiserror::Error;

/// Result type alias for deckpad operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while setting up or running the capture channel.
#[derive(Debug, Error)]
pub enum Error {
    /// The named shared block could not be created, opened or validated.
    #[error("capture channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// The low-level keyboard hook could not be installed.
    #[error("failed to install keyboard hook: {0}")]
    HookInstallFailed(String),

    /// The hook host process could not be launched.
    #[error("failed to spawn hook host: {0}")]
    SpawnFailed(String),

    /// The hook host was started with a missing or malformed argument.
    #[error("invalid host arguments: {0}")]
    InvalidArguments(String),

    /// The parent process id does not refer to a live process.
    #[error("parent process {0} is not running")]
    ParentUnavailable(u32),

    /// The capture channel is not running.
    #[error("capture is not running")]
    NotRunning,

    /// Platform-specific error.
    #[error("platform error: {0}")]
    Platform(String),

    /// Thread-related error.
    #[error("thread error: {0}")]
    ThreadError(String),

    /// The requested feature is not supported on this platform.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// I/O error from process management.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Other errors.
    #[error("{0}")]
    Other(String),
}
