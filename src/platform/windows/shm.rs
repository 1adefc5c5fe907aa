//! Named shared-memory section holding the [`SharedBlock`].

use crate::error::{Error, Result};
use crate::shared::SharedBlock;
use log::{debug, warn};
use std::mem::size_of;
use windows::Win32::Foundation::{
    CloseHandle, ERROR_ALREADY_EXISTS, GetLastError, HANDLE, INVALID_HANDLE_VALUE,
};
use windows::Win32::System::Memory::{
    CreateFileMappingW, FILE_MAP_ALL_ACCESS, MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile,
    OpenFileMappingW, PAGE_READWRITE, UnmapViewOfFile,
};
use windows::core::PCWSTR;

/// A mapped view of the channel section.
pub struct MappedView {
    ptr: *mut SharedBlock,
    handle: HANDLE,
}

// SAFETY: the view is owned by this type and unmapped exactly once in Drop.
// Every field of SharedBlock is an atomic, so shared references are sound
// from any thread.
unsafe impl Send for MappedView {}
unsafe impl Sync for MappedView {}

impl MappedView {
    pub fn block(&self) -> &SharedBlock {
        // SAFETY: the view is page aligned, at least size_of::<SharedBlock>()
        // long, stays mapped while self lives, and all-zero bytes are a valid
        // SharedBlock.
        unsafe { &*self.ptr }
    }
}

impl Drop for MappedView {
    fn drop(&mut self) {
        unsafe {
            let _ = UnmapViewOfFile(MEMORY_MAPPED_VIEW_ADDRESS {
                Value: self.ptr as *mut _,
            });
            let _ = CloseHandle(self.handle);
        }
    }
}

fn to_wide(name: &str) -> Vec<u16> {
    name.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Create the pagefile-backed section, or attach to it if it already exists.
pub fn create_mapping(name: &str) -> Result<MappedView> {
    let wide = to_wide(name);
    let size = size_of::<SharedBlock>();

    debug!("creating shared section {} ({} bytes)", name, size);

    let handle = unsafe {
        CreateFileMappingW(
            INVALID_HANDLE_VALUE,
            None,
            PAGE_READWRITE,
            0,
            size as u32,
            PCWSTR(wide.as_ptr()),
        )
    }
    .map_err(|e| Error::ChannelUnavailable(format!("CreateFileMappingW({}): {}", name, e)))?;

    if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
        warn!(
            "shared section {} already exists; another instance may be capturing",
            name
        );
    }

    map_view(handle, name)
}

/// Attach to a section some other process created. Never creates.
pub fn open_mapping(name: &str) -> Result<MappedView> {
    let wide = to_wide(name);

    let handle = unsafe { OpenFileMappingW(FILE_MAP_ALL_ACCESS.0, false, PCWSTR(wide.as_ptr())) }
        .map_err(|e| Error::ChannelUnavailable(format!("OpenFileMappingW({}): {}", name, e)))?;

    map_view(handle, name)
}

fn map_view(handle: HANDLE, name: &str) -> Result<MappedView> {
    if handle.is_invalid() {
        return Err(Error::ChannelUnavailable(format!(
            "{} returned an invalid handle",
            name
        )));
    }

    let view = unsafe { MapViewOfFile(handle, FILE_MAP_ALL_ACCESS, 0, 0, size_of::<SharedBlock>()) };
    if view.Value.is_null() {
        let _ = unsafe { CloseHandle(handle) };
        return Err(Error::ChannelUnavailable(format!(
            "MapViewOfFile({}) failed",
            name
        )));
    }

    Ok(MappedView {
        ptr: view.Value as *mut SharedBlock,
        handle,
    })
}
