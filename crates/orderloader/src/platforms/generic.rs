//! Fallback service for non-Windows hosts.
//!
//! Window listing and capture work through `xcap`. Synthetic input and
//! foreground control are not available and report `UnsupportedPlatform`.

use crate::errors::AutomationError;
use crate::platforms::{
    capture_primary_monitor, primary_monitor, InputDeviceConfig, PlatformWindowService,
};
use crate::screenshot::ScreenshotResult;
use crate::types::Key;
use crate::window::WindowHandle;
use std::process::Command;
use tracing::debug;

pub struct GenericService {
    config: InputDeviceConfig,
}

impl GenericService {
    pub fn new(config: InputDeviceConfig) -> Self {
        Self { config }
    }
}

fn describe(window: &xcap::Window) -> WindowHandle {
    WindowHandle {
        process_name: window.app_name().unwrap_or_default(),
        window_title: window.title().unwrap_or_default(),
        process_id: window.pid().unwrap_or_default(),
        native_handle: window.id().ok().map(|id| id as isize),
    }
}

fn all_windows() -> Result<Vec<xcap::Window>, AutomationError> {
    xcap::Window::all()
        .map_err(|e| AutomationError::Platform(format!("Failed to get windows: {e}")))
}

fn unsupported(what: &str) -> AutomationError {
    AutomationError::UnsupportedPlatform(format!(
        "{what} is only implemented on Windows"
    ))
}

impl PlatformWindowService for GenericService {
    fn list_windows(&self) -> Result<Vec<WindowHandle>, AutomationError> {
        let windows = all_windows()?
            .iter()
            .filter(|w| !w.is_minimized().unwrap_or(false))
            .map(describe)
            .filter(|w| !w.window_title.trim().is_empty())
            .collect::<Vec<_>>();
        debug!("Enumerated {} titled windows", windows.len());
        Ok(windows)
    }

    fn foreground_window(&self) -> Result<Option<WindowHandle>, AutomationError> {
        Ok(all_windows()?
            .iter()
            .find(|w| w.is_focused().unwrap_or(false))
            .map(describe))
    }

    fn bring_to_front(&self, _window: &WindowHandle) -> Result<(), AutomationError> {
        Err(unsupported("Foreground assignment"))
    }

    fn capture_screen(&self) -> Result<ScreenshotResult, AutomationError> {
        capture_primary_monitor()
    }

    fn screen_size(&self) -> Result<(u32, u32), AutomationError> {
        let monitor = primary_monitor()?;
        let width = monitor
            .width()
            .map_err(|e| AutomationError::Platform(format!("Failed to get monitor width: {e}")))?;
        let height = monitor
            .height()
            .map_err(|e| AutomationError::Platform(format!("Failed to get monitor height: {e}")))?;
        Ok((width, height))
    }

    fn cursor_position(&self) -> Result<(i32, i32), AutomationError> {
        Err(unsupported("Cursor tracking"))
    }

    fn press_keys(&self, _keys: &[Key]) -> Result<(), AutomationError> {
        Err(unsupported("Keyboard input"))
    }

    fn click(&self, _x: i32, _y: i32) -> Result<(), AutomationError> {
        Err(unsupported("Mouse input"))
    }

    fn launch_remote_session(&self, address: &str) -> Result<(), AutomationError> {
        Command::new("xfreerdp")
            .arg(format!("/v:{address}"))
            .spawn()
            .map_err(|e| AutomationError::Platform(format!("Failed to start xfreerdp: {e}")))?;
        Ok(())
    }

    fn input_config(&self) -> &InputDeviceConfig {
        &self.config
    }
}
