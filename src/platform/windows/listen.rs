//! Hook host message loop using SetWindowsHookEx(WH_KEYBOARD_LL).

use super::system::{ParentProcess, numlock_off};
use crate::error::{Error, Result};
use crate::event::{KeyStroke, Verdict};
use crate::hook::{ExitReason, HookHost, HostArgs, LIVENESS_INTERVAL, Liveness};
use crate::shared::{SHM_NAME, SharedChannel};
use log::{debug, error, info, warn};
use std::sync::Mutex;
use windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, GetMessageW, HC_ACTION, HHOOK, KBDLLHOOKSTRUCT, KillTimer, LLKHF_EXTENDED,
    LLKHF_INJECTED, MSG, SetTimer, SetWindowsHookExW, UnhookWindowsHookEx, WH_KEYBOARD_LL,
    WM_KEYUP, WM_SYSKEYUP, WM_TIMER,
};

// Wrapper for HHOOK to make it Send + Sync
#[derive(Clone, Copy)]
struct SendableHHOOK(HHOOK);

// SAFETY: HHOOK is an opaque handle owned by the OS; it is only passed back
// to CallNextHookEx/UnhookWindowsHookEx.
unsafe impl Send for SendableHHOOK {}
unsafe impl Sync for SendableHHOOK {}

/// Producer state reachable from the hook callback.
static HOST: Mutex<Option<HookHost<SharedChannel>>> = Mutex::new(None);

/// Installed keyboard hook.
static KEYBOARD_HOOK: Mutex<Option<SendableHHOOK>> = Mutex::new(None);

fn with_host<R>(f: impl FnOnce(&HookHost<SharedChannel>) -> R) -> Option<R> {
    HOST.lock().ok().and_then(|guard| guard.as_ref().map(f))
}

/// Build a KeyStroke from KBDLLHOOKSTRUCT
unsafe fn read_stroke(wparam: WPARAM, lparam: LPARAM) -> KeyStroke {
    let kb = unsafe { *(lparam.0 as *const KBDLLHOOKSTRUCT) };
    let msg = wparam.0 as u32;
    KeyStroke {
        scan_code: kb.scanCode,
        vk_code: kb.vkCode,
        extended: kb.flags.0 & LLKHF_EXTENDED.0 != 0,
        injected: kb.flags.0 & LLKHF_INJECTED.0 != 0,
        key_up: matches!(msg, WM_KEYUP | WM_SYSKEYUP),
    }
}

/// Keyboard hook callback
unsafe extern "system" fn keyboard_callback(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code == HC_ACTION as i32 {
        let stroke = unsafe { read_stroke(wparam, lparam) };
        if with_host(|host| host.on_key(&stroke)) == Some(Verdict::Suppress) {
            return LRESULT(1);
        }
    }

    let hook = KEYBOARD_HOOK.lock().ok().and_then(|g| g.map(|h| h.0));
    unsafe { CallNextHookEx(hook, code, wparam, lparam) }
}

fn install_hook() -> Result<()> {
    let hook = unsafe {
        SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_callback), None, 0)
            .map_err(|e| Error::HookInstallFailed(e.to_string()))?
    };
    let mut kh = KEYBOARD_HOOK
        .lock()
        .map_err(|_| Error::ThreadError("mutex poisoned".into()))?;
    *kh = Some(SendableHHOOK(hook));
    Ok(())
}

fn teardown(timer: usize) {
    with_host(|host| host.stop());

    unsafe {
        if let Ok(mut kh) = KEYBOARD_HOOK.lock() {
            if let Some(hook) = kh.take() {
                let _ = UnhookWindowsHookEx(hook.0);
            }
        }
        if timer != 0 {
            let _ = KillTimer(None, timer);
        }
    }

    // Dropping the host unmaps the section.
    if let Ok(mut host) = HOST.lock() {
        host.take();
    }
}

/// Run the hook host (blocking).
pub fn run_hook_host(args: &HostArgs) -> Result<ExitReason> {
    let parent = ParentProcess::open(args.parent_pid)?;
    let channel = SharedChannel::open(SHM_NAME)?;
    let host = HookHost::new(channel);

    if let Some(off) = numlock_off() {
        if host.sync_numlock(off) {
            debug!("num lock snapshot corrected at startup (off = {})", off);
        }
    }

    {
        let mut slot = HOST
            .lock()
            .map_err(|_| Error::ThreadError("mutex poisoned".into()))?;
        *slot = Some(host);
    }

    match install_hook() {
        Ok(()) => {
            with_host(|host| host.record_hook_installed(true));
            info!("keyboard hook installed (parent pid {})", args.parent_pid);
        }
        Err(e) => {
            // Keep running so the detector can see the failure.
            with_host(|host| host.record_hook_installed(false));
            error!("{}; continuing without suppression", e);
        }
    }

    let timer = unsafe { SetTimer(None, 0, LIVENESS_INTERVAL.as_millis() as u32, None) };
    if timer == 0 {
        teardown(timer);
        return Err(Error::Platform("SetTimer failed for liveness check".into()));
    }

    let mut msg = MSG::default();
    let reason = loop {
        let ret = unsafe { GetMessageW(&mut msg, None, 0, 0) };
        if ret.0 <= 0 {
            warn!("message loop ended unexpectedly");
            break ExitReason::ShutdownRequested;
        }

        if msg.message == WM_TIMER {
            let liveness = with_host(|host| host.check_liveness(parent.is_alive()))
                .unwrap_or(Liveness::Exit(ExitReason::ShutdownRequested));
            if let Liveness::Exit(reason) = liveness {
                break reason;
            }
        }
    };

    teardown(timer);
    info!("hook host exiting: {:?}", reason);
    Ok(reason)
}
