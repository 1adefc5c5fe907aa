//! Platform-specific implementations.
//!
//! The capture channel is a Win32 mechanism. Other targets get an inert
//! implementation so the rest of the crate (and its tests) still builds and
//! the detector degrades to "capture unavailable".

#[cfg(target_os = "windows")]
mod windows;
#[cfg(target_os = "windows")]
pub use windows::*;

#[cfg(not(target_os = "windows"))]
mod unsupported;
#[cfg(not(target_os = "windows"))]
pub use unsupported::*;
