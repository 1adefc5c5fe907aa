//! Key-state, process and foreground-window queries.

use crate::error::{Error, Result};
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_TIMEOUT};
use windows::Win32::System::Threading::{
    OpenProcess, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_SYNCHRONIZE,
    QueryFullProcessImageNameW, WaitForSingleObject,
};
use windows::Win32::UI::Input::KeyboardAndMouse::{GetKeyState, VK_NUMLOCK};
use windows::Win32::UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowThreadProcessId};
use windows::core::PWSTR;

const MAX_IMAGE_PATH: usize = 1024;

/// Num Lock toggle state straight from the OS. `Some(true)` when off.
pub fn numlock_off() -> Option<bool> {
    let state = unsafe { GetKeyState(VK_NUMLOCK.0 as i32) };
    Some(state & 1 == 0)
}

/// Executable name of the process owning the foreground window, ignoring
/// this process.
pub fn foreground_executable() -> Option<String> {
    let hwnd = unsafe { GetForegroundWindow() };
    if hwnd.is_invalid() {
        return None;
    }

    let mut pid = 0u32;
    unsafe { GetWindowThreadProcessId(hwnd, Some(&mut pid)) };
    if pid == 0 || pid == std::process::id() {
        return None;
    }

    let process = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) }.ok()?;
    let mut buf = [0u16; MAX_IMAGE_PATH];
    let mut len = buf.len() as u32;
    let queried = unsafe {
        QueryFullProcessImageNameW(process, PROCESS_NAME_WIN32, PWSTR(buf.as_mut_ptr()), &mut len)
    };
    let _ = unsafe { CloseHandle(process) };
    queried.ok()?;

    let path = String::from_utf16_lossy(&buf[..len as usize]);
    path.rsplit(['\\', '/']).next().map(str::to_owned)
}

/// Synchronization handle on the parent process.
///
/// Holding the handle pins the process object, so a recycled pid can never
/// be mistaken for the parent.
pub(crate) struct ParentProcess {
    handle: HANDLE,
}

impl ParentProcess {
    pub(crate) fn open(pid: u32) -> Result<Self> {
        let handle = unsafe { OpenProcess(PROCESS_SYNCHRONIZE, false, pid) }
            .map_err(|_| Error::ParentUnavailable(pid))?;
        Ok(Self { handle })
    }

    pub(crate) fn is_alive(&self) -> bool {
        unsafe { WaitForSingleObject(self.handle, 0) == WAIT_TIMEOUT }
    }
}

impl Drop for ParentProcess {
    fn drop(&mut self) {
        let _ = unsafe { CloseHandle(self.handle) };
    }
}
