//! Windows platform implementation
//!
//! Window enumeration and foreground control through Win32, synthetic input
//! through `SendInput`, process names through `sysinfo`.

pub mod input;

use crate::errors::AutomationError;
use crate::platforms::{capture_primary_monitor, InputDeviceConfig, PlatformWindowService};
use crate::screenshot::ScreenshotResult;
use crate::types::{describe_chord, Key};
use crate::window::WindowHandle;
use std::process::Command;
use sysinfo::{ProcessesToUpdate, System};
use tracing::debug;
use windows::core::BOOL;
use windows::Win32::Foundation::{HWND, LPARAM};
use windows::Win32::System::Threading::{AttachThreadInput, GetCurrentThreadId};
use windows::Win32::UI::WindowsAndMessaging::{
    BringWindowToTop, EnumWindows, GetForegroundWindow, GetWindowTextLengthW, GetWindowTextW,
    GetWindowThreadProcessId, IsIconic, IsWindowVisible, SetForegroundWindow, ShowWindow,
    SW_RESTORE, SW_SHOW,
};

pub struct WindowsService {
    config: InputDeviceConfig,
}

impl WindowsService {
    pub fn new(config: InputDeviceConfig) -> Self {
        Self { config }
    }

    /// Fail-safe check before an input primitive.
    fn guard(&self) -> Result<(), AutomationError> {
        self.config.check_fail_safe(input::cursor_position()?)
    }

    fn settle(&self) {
        std::thread::sleep(self.config.pause());
    }
}

unsafe extern "system" fn collect_hwnd(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let hwnds = &mut *(lparam.0 as *mut Vec<isize>);
    hwnds.push(hwnd.0 as isize);
    BOOL(1)
}

fn window_title(hwnd: HWND) -> String {
    unsafe {
        let len = GetWindowTextLengthW(hwnd);
        if len <= 0 {
            return String::new();
        }
        let mut buf = vec![0u16; len as usize + 1];
        let copied = GetWindowTextW(hwnd, &mut buf);
        String::from_utf16_lossy(&buf[..copied.max(0) as usize])
    }
}

fn window_pid(hwnd: HWND) -> u32 {
    let mut pid: u32 = 0;
    unsafe {
        GetWindowThreadProcessId(hwnd, Some(&mut pid));
    }
    pid
}

fn process_name(system: &System, pid: u32) -> String {
    system
        .process(sysinfo::Pid::from_u32(pid))
        .map(|p| {
            let name = p.name().to_string_lossy().to_string();
            match name.to_lowercase().strip_suffix(".exe") {
                Some(stem) => name[..stem.len()].to_string(),
                None => name,
            }
        })
        .unwrap_or_default()
}

fn describe(system: &System, hwnd: HWND) -> WindowHandle {
    let pid = window_pid(hwnd);
    WindowHandle {
        process_name: process_name(system, pid),
        window_title: window_title(hwnd),
        process_id: pid,
        native_handle: Some(hwnd.0 as isize),
    }
}

fn process_snapshot() -> System {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    system
}

impl PlatformWindowService for WindowsService {
    fn list_windows(&self) -> Result<Vec<WindowHandle>, AutomationError> {
        let mut hwnds: Vec<isize> = Vec::new();
        unsafe {
            EnumWindows(
                Some(collect_hwnd),
                LPARAM(&mut hwnds as *mut Vec<isize> as isize),
            )
        }
        .map_err(|e| AutomationError::Platform(format!("EnumWindows failed: {e}")))?;

        let system = process_snapshot();
        let windows = hwnds
            .into_iter()
            .map(|raw| HWND(raw as *mut _))
            .filter(|hwnd| unsafe { IsWindowVisible(*hwnd) }.as_bool())
            .map(|hwnd| describe(&system, hwnd))
            .filter(|w| !w.window_title.trim().is_empty())
            .collect::<Vec<_>>();
        debug!("Enumerated {} visible titled windows", windows.len());
        Ok(windows)
    }

    fn foreground_window(&self) -> Result<Option<WindowHandle>, AutomationError> {
        let hwnd = unsafe { GetForegroundWindow() };
        if hwnd.0.is_null() {
            return Ok(None);
        }
        Ok(Some(describe(&process_snapshot(), hwnd)))
    }

    fn bring_to_front(&self, window: &WindowHandle) -> Result<(), AutomationError> {
        let raw = window.native_handle.ok_or_else(|| {
            AutomationError::Platform(format!(
                "Window '{}' has no native handle",
                window.window_title
            ))
        })?;

        unsafe {
            let hwnd = HWND(raw as *mut _);
            let foreground = GetForegroundWindow();

            if IsIconic(hwnd).as_bool() {
                let _ = ShowWindow(hwnd, SW_RESTORE);
                debug!("bring_to_front: restored minimized window");
            }

            // Attach to the foreground and target threads so SetForegroundWindow is permitted
            let current_thread = GetCurrentThreadId();
            let target_thread = GetWindowThreadProcessId(hwnd, None);
            let foreground_thread = GetWindowThreadProcessId(foreground, None);

            let attached_foreground = foreground_thread != 0
                && foreground_thread != current_thread
                && AttachThreadInput(current_thread, foreground_thread, true).as_bool();
            let attached_target = target_thread != 0
                && target_thread != current_thread
                && target_thread != foreground_thread
                && AttachThreadInput(current_thread, target_thread, true).as_bool();

            let _ = BringWindowToTop(hwnd);
            let _ = ShowWindow(hwnd, SW_SHOW);
            let accepted = SetForegroundWindow(hwnd).as_bool();

            if attached_target {
                let _ = AttachThreadInput(current_thread, target_thread, false);
            }
            if attached_foreground {
                let _ = AttachThreadInput(current_thread, foreground_thread, false);
            }

            debug!(
                "bring_to_front: hwnd={}, SetForegroundWindow returned {}",
                raw, accepted
            );
            if !accepted {
                return Err(AutomationError::Platform(format!(
                    "SetForegroundWindow refused '{}'",
                    window.window_title
                )));
            }
        }
        Ok(())
    }

    fn capture_screen(&self) -> Result<ScreenshotResult, AutomationError> {
        capture_primary_monitor()
    }

    fn screen_size(&self) -> Result<(u32, u32), AutomationError> {
        Ok(input::screen_size())
    }

    fn cursor_position(&self) -> Result<(i32, i32), AutomationError> {
        input::cursor_position()
    }

    fn press_keys(&self, keys: &[Key]) -> Result<(), AutomationError> {
        self.guard()?;
        debug!("Pressing {}", describe_chord(keys));
        input::send_key_chord(keys)?;
        self.settle();
        Ok(())
    }

    fn click(&self, x: i32, y: i32) -> Result<(), AutomationError> {
        self.guard()?;
        input::send_left_click(x, y)?;
        self.settle();
        Ok(())
    }

    fn launch_remote_session(&self, address: &str) -> Result<(), AutomationError> {
        Command::new("mstsc")
            .arg(format!("/v:{address}"))
            .spawn()
            .map_err(|e| AutomationError::Platform(format!("Failed to start mstsc: {e}")))?;
        Ok(())
    }

    fn input_config(&self) -> &InputDeviceConfig {
        &self.config
    }
}
