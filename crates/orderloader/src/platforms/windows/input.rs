//! Synthetic mouse and keyboard input for Windows
//!
//! Low-level SendInput wrappers used by the Windows platform service.

use crate::errors::AutomationError;
use crate::types::Key;
use tracing::debug;
use windows::Win32::Foundation::POINT;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, VkKeyScanW, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT,
    KEYBD_EVENT_FLAGS, KEYEVENTF_KEYUP, MOUSEEVENTF_ABSOLUTE, MOUSE_EVENT_FLAGS, MOUSEEVENTF_LEFTDOWN,
    MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MOVE, MOUSEINPUT, VIRTUAL_KEY, VK_CONTROL, VK_DOWN,
    VK_ESCAPE, VK_LEFT, VK_LWIN, VK_MENU, VK_RETURN, VK_RIGHT, VK_SHIFT, VK_SPACE, VK_TAB,
    VK_UP,
};
use windows::Win32::UI::WindowsAndMessaging::{
    GetCursorPos, GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN,
};

fn send(inputs: &[INPUT]) -> Result<(), AutomationError> {
    let sent = unsafe { SendInput(inputs, std::mem::size_of::<INPUT>() as i32) };
    if sent as usize != inputs.len() {
        return Err(AutomationError::Platform(format!(
            "SendInput injected {sent} of {} events",
            inputs.len()
        )));
    }
    Ok(())
}

fn mouse_input(dx: i32, dy: i32, flags: MOUSE_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx,
                dy,
                mouseData: 0,
                dwFlags: MOUSEEVENTF_ABSOLUTE | flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

/// Send a left click at absolute screen coordinates.
pub fn send_left_click(x: i32, y: i32) -> Result<(), AutomationError> {
    let (screen_width, screen_height) = screen_size();
    if screen_width == 0 || screen_height == 0 {
        return Err(AutomationError::Platform(
            "GetSystemMetrics reported an empty screen".to_string(),
        ));
    }

    // Normalized coordinates (0-65535 range)
    let abs_x = ((x as f64 * 65535.0) / screen_width as f64) as i32;
    let abs_y = ((y as f64 * 65535.0) / screen_height as f64) as i32;

    send(&[mouse_input(abs_x, abs_y, MOUSEEVENTF_MOVE)])?;
    send(&[mouse_input(abs_x, abs_y, MOUSEEVENTF_LEFTDOWN)])?;
    send(&[mouse_input(abs_x, abs_y, MOUSEEVENTF_LEFTUP)])?;
    debug!("Clicked at ({}, {})", x, y);
    Ok(())
}

fn virtual_key(key: Key) -> Result<VIRTUAL_KEY, AutomationError> {
    Ok(match key {
        Key::Alt => VK_MENU,
        Key::Ctrl => VK_CONTROL,
        Key::Shift => VK_SHIFT,
        Key::Win => VK_LWIN,
        Key::Tab => VK_TAB,
        Key::Up => VK_UP,
        Key::Down => VK_DOWN,
        Key::Left => VK_LEFT,
        Key::Right => VK_RIGHT,
        Key::Space => VK_SPACE,
        Key::Enter => VK_RETURN,
        Key::Escape => VK_ESCAPE,
        Key::Char(c) => {
            let mut buf = [0u16; 2];
            let encoded = c.encode_utf16(&mut buf);
            if encoded.len() != 1 {
                return Err(AutomationError::Platform(format!(
                    "Character {c:?} has no single virtual key"
                )));
            }
            let scan = unsafe { VkKeyScanW(encoded[0]) };
            if scan == -1 {
                return Err(AutomationError::Platform(format!(
                    "Character {c:?} is not on the active keyboard layout"
                )));
            }
            VIRTUAL_KEY((scan as u16) & 0xff)
        }
    })
}

fn key_input(vk: VIRTUAL_KEY, flags: KEYBD_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: vk,
                wScan: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

/// Press every key in order, then release in reverse order.
pub fn send_key_chord(keys: &[Key]) -> Result<(), AutomationError> {
    let vks = keys
        .iter()
        .map(|k| virtual_key(*k))
        .collect::<Result<Vec<_>, _>>()?;

    let mut inputs: Vec<INPUT> = vks
        .iter()
        .map(|vk| key_input(*vk, KEYBD_EVENT_FLAGS(0)))
        .collect();
    inputs.extend(vks.iter().rev().map(|vk| key_input(*vk, KEYEVENTF_KEYUP)));
    send(&inputs)
}

pub fn cursor_position() -> Result<(i32, i32), AutomationError> {
    let mut pos = POINT { x: 0, y: 0 };
    unsafe { GetCursorPos(&mut pos) }
        .map_err(|e| AutomationError::Platform(format!("GetCursorPos failed: {e}")))?;
    Ok((pos.x, pos.y))
}

pub fn screen_size() -> (u32, u32) {
    unsafe {
        (
            GetSystemMetrics(SM_CXSCREEN).max(0) as u32,
            GetSystemMetrics(SM_CYSCREEN).max(0) as u32,
        )
    }
}
