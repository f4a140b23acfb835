//! OS automation facade.
//!
//! Everything that touches native window APIs, synthetic input or screen
//! pixels goes through [`PlatformWindowService`]. Core logic never shells out
//! or calls OS APIs directly, so tests drive it with an in-memory service.

use crate::errors::AutomationError;
use crate::screenshot::ScreenshotResult;
use crate::types::Key;
use crate::window::WindowHandle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Input device settings handed to the platform service at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputDeviceConfig {
    /// Abort when the pointer sits in the top-left corner before an input primitive
    pub fail_safe: bool,
    /// Size in pixels of the reserved corner
    pub fail_safe_margin: u32,
    /// Pause after every injected input primitive
    pub pause_between_actions_ms: u64,
}

impl Default for InputDeviceConfig {
    fn default() -> Self {
        Self {
            fail_safe: true,
            fail_safe_margin: 5,
            pause_between_actions_ms: 500,
        }
    }
}

impl InputDeviceConfig {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_between_actions_ms)
    }

    /// Check the pointer position against the reserved corner.
    ///
    /// Only takes effect at the next input primitive, never mid-call.
    pub fn check_fail_safe(&self, cursor: (i32, i32)) -> Result<(), AutomationError> {
        if !self.fail_safe {
            return Ok(());
        }
        let margin = self.fail_safe_margin as i32;
        if cursor.0 <= margin && cursor.1 <= margin {
            return Err(AutomationError::FailSafe(format!(
                "pointer at ({}, {}) is inside the reserved top-left corner",
                cursor.0, cursor.1
            )));
        }
        Ok(())
    }
}

/// The common trait that all platform-specific services must implement
pub trait PlatformWindowService: Send + Sync {
    /// Top-level windows that can take the foreground, in OS enumeration order
    fn list_windows(&self) -> Result<Vec<WindowHandle>, AutomationError>;

    /// The window that currently owns keyboard focus
    fn foreground_window(&self) -> Result<Option<WindowHandle>, AutomationError>;

    /// Direct OS-level foreground assignment
    fn bring_to_front(&self, window: &WindowHandle) -> Result<(), AutomationError>;

    /// Capture the primary monitor
    fn capture_screen(&self) -> Result<ScreenshotResult, AutomationError>;

    fn screen_size(&self) -> Result<(u32, u32), AutomationError>;

    fn cursor_position(&self) -> Result<(i32, i32), AutomationError>;

    /// Press every key in order, then release them in reverse order
    fn press_keys(&self, keys: &[Key]) -> Result<(), AutomationError>;

    /// Left click at absolute screen coordinates
    fn click(&self, x: i32, y: i32) -> Result<(), AutomationError>;

    /// Start a new remote-desktop client connected to `address`
    fn launch_remote_session(&self, address: &str) -> Result<(), AutomationError>;

    fn input_config(&self) -> &InputDeviceConfig;
}

/// Capture the primary monitor with xcap. Shared by every platform service.
pub(crate) fn capture_primary_monitor() -> Result<ScreenshotResult, AutomationError> {
    let image = primary_monitor()?
        .capture_image()
        .map_err(|e| AutomationError::Platform(format!("Failed to capture screen: {e}")))?;
    Ok(ScreenshotResult::from_rgba(image))
}

pub(crate) fn primary_monitor() -> Result<xcap::Monitor, AutomationError> {
    let monitors = xcap::Monitor::all()
        .map_err(|e| AutomationError::Platform(format!("Failed to get monitors: {e}")))?;
    for monitor in monitors {
        match monitor.is_primary() {
            Ok(true) => return Ok(monitor),
            Ok(false) => continue,
            Err(e) => {
                return Err(AutomationError::Platform(format!(
                    "Error checking monitor primary status: {e}"
                )));
            }
        }
    }
    Err(AutomationError::Platform(
        "Could not find primary monitor".to_string(),
    ))
}

#[cfg(not(target_os = "windows"))]
pub mod generic;
#[cfg(target_os = "windows")]
pub mod windows;

/// Create the appropriate service for the current platform
pub fn create_service(
    config: InputDeviceConfig,
) -> Result<Arc<dyn PlatformWindowService>, AutomationError> {
    #[cfg(target_os = "windows")]
    {
        Ok(Arc::new(windows::WindowsService::new(config)))
    }
    #[cfg(not(target_os = "windows"))]
    {
        Ok(Arc::new(generic::GenericService::new(config)))
    }
}
