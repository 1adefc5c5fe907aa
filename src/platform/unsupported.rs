//! Inert platform layer for targets without a global keyboard hook.

use crate::error::{Error, Result};
use crate::hook::{ExitReason, HostArgs};

/// Uninhabited: no named mapping can exist on this platform.
pub enum MappedView {}

pub fn create_mapping(name: &str) -> Result<MappedView> {
    Err(Error::NotSupported(format!(
        "named shared memory {name} requires Windows"
    )))
}

pub fn open_mapping(name: &str) -> Result<MappedView> {
    create_mapping(name)
}

/// Num Lock state cannot be queried here.
pub fn numlock_off() -> Option<bool> {
    None
}

pub fn foreground_executable() -> Option<String> {
    None
}

pub fn run_hook_host(_args: &HostArgs) -> Result<ExitReason> {
    Err(Error::NotSupported(
        "low-level keyboard hooks require Windows".into(),
    ))
}
