//! Shared fixtures: an in-memory platform service and synthetic templates.
#![allow(dead_code)]

use image::{DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use orderloader::config::TemplateEntry;
use orderloader::navigation::{NavigationReport, NavigationState, Navigator};
use orderloader::{
    AutomationError, Config, InputDeviceConfig, Key, PlatformWindowService, ScreenshotResult,
    WindowHandle,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

pub const SCREEN_W: u32 = 320;
pub const SCREEN_H: u32 = 200;
pub const TEMPLATE_SIDE: u32 = 32;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// Records every input primitive and serves a fixed screen.
pub struct MockService {
    pub windows: Mutex<Vec<WindowHandle>>,
    pub foreground: Mutex<Option<WindowHandle>>,
    pub screen: Mutex<RgbaImage>,
    pub keys: Mutex<Vec<Vec<Key>>>,
    pub clicks: Mutex<Vec<(i32, i32)>>,
    pub launches: Mutex<Vec<String>>,
    pub cursor: Mutex<(i32, i32)>,
    /// Whether `bring_to_front` actually changes the foreground
    pub honor_bring_to_front: bool,
    pub config: InputDeviceConfig,
}

impl Default for MockService {
    fn default() -> Self {
        Self {
            windows: Mutex::new(Vec::new()),
            foreground: Mutex::new(None),
            screen: Mutex::new(RgbaImage::from_pixel(
                SCREEN_W,
                SCREEN_H,
                Rgba([128, 128, 128, 255]),
            )),
            keys: Mutex::new(Vec::new()),
            clicks: Mutex::new(Vec::new()),
            launches: Mutex::new(Vec::new()),
            cursor: Mutex::new((SCREEN_W as i32 / 2, SCREEN_H as i32 / 2)),
            honor_bring_to_front: true,
            config: InputDeviceConfig {
                pause_between_actions_ms: 0,
                ..InputDeviceConfig::default()
            },
        }
    }
}

impl MockService {
    pub fn with_window(self, window: WindowHandle) -> Self {
        self.windows.lock().unwrap().push(window);
        self
    }

    pub fn set_foreground(&self, window: Option<WindowHandle>) {
        *self.foreground.lock().unwrap() = window;
    }

    /// Draw `template` with its top-left corner at (x, y).
    pub fn paste(&self, template: &GrayImage, x: u32, y: u32) {
        let mut screen = self.screen.lock().unwrap();
        for (tx, ty, px) in template.enumerate_pixels() {
            let v = px.0[0];
            screen.put_pixel(x + tx, y + ty, Rgba([v, v, v, 255]));
        }
    }

    /// The screen as the locator sees it.
    pub fn capture_screen_gray(&self) -> GrayImage {
        DynamicImage::ImageRgba8(self.screen.lock().unwrap().clone()).to_luma8()
    }

    pub fn key_log(&self) -> Vec<Vec<Key>> {
        self.keys.lock().unwrap().clone()
    }

    pub fn click_log(&self) -> Vec<(i32, i32)> {
        self.clicks.lock().unwrap().clone()
    }

    fn guard(&self) -> Result<(), AutomationError> {
        self.config.check_fail_safe(*self.cursor.lock().unwrap())
    }
}

impl PlatformWindowService for MockService {
    fn list_windows(&self) -> Result<Vec<WindowHandle>, AutomationError> {
        Ok(self.windows.lock().unwrap().clone())
    }

    fn foreground_window(&self) -> Result<Option<WindowHandle>, AutomationError> {
        Ok(self.foreground.lock().unwrap().clone())
    }

    fn bring_to_front(&self, window: &WindowHandle) -> Result<(), AutomationError> {
        if !self.honor_bring_to_front {
            return Err(AutomationError::Platform(
                "SetForegroundWindow refused".to_string(),
            ));
        }
        self.set_foreground(Some(window.clone()));
        Ok(())
    }

    fn capture_screen(&self) -> Result<ScreenshotResult, AutomationError> {
        Ok(ScreenshotResult::from_rgba(self.screen.lock().unwrap().clone()))
    }

    fn screen_size(&self) -> Result<(u32, u32), AutomationError> {
        Ok((SCREEN_W, SCREEN_H))
    }

    fn cursor_position(&self) -> Result<(i32, i32), AutomationError> {
        Ok(*self.cursor.lock().unwrap())
    }

    fn press_keys(&self, keys: &[Key]) -> Result<(), AutomationError> {
        self.guard()?;
        self.keys.lock().unwrap().push(keys.to_vec());
        Ok(())
    }

    fn click(&self, x: i32, y: i32) -> Result<(), AutomationError> {
        self.guard()?;
        self.clicks.lock().unwrap().push((x, y));
        Ok(())
    }

    /// The new client takes the foreground as soon as it starts.
    fn launch_remote_session(&self, address: &str) -> Result<(), AutomationError> {
        self.launches.lock().unwrap().push(address.to_string());
        let client = self
            .windows
            .lock()
            .unwrap()
            .iter()
            .find(|w| w.window_title.contains(address))
            .cloned();
        if client.is_some() {
            self.set_foreground(client);
        }
        Ok(())
    }

    fn input_config(&self) -> &InputDeviceConfig {
        &self.config
    }
}

pub fn remote_window() -> WindowHandle {
    WindowHandle {
        process_name: "mstsc".to_string(),
        window_title: "20.96.6.64 - Conexión a Escritorio remoto".to_string(),
        process_id: 4242,
        native_handle: Some(0x1000),
    }
}

pub fn other_window() -> WindowHandle {
    WindowHandle {
        process_name: "explorer".to_string(),
        window_title: "Downloads".to_string(),
        process_id: 77,
        native_handle: Some(0x2000),
    }
}

/// Deterministic blocky texture. Different seeds give uncorrelated images.
pub fn pattern(seed: u32) -> GrayImage {
    GrayImage::from_fn(TEMPLATE_SIDE, TEMPLATE_SIDE, |x, y| {
        let mut h = seed
            .wrapping_mul(0x9E37_79B9)
            .wrapping_add((x / 4).wrapping_mul(0x85EB_CA6B))
            .wrapping_add((y / 4).wrapping_mul(0xC2B2_AE35));
        h ^= h >> 15;
        h = h.wrapping_mul(0x2C1B_3C6D);
        h ^= h >> 12;
        Luma([(h % 256) as u8])
    })
}

/// Writes `image` as `<root>/<name>.png`.
pub fn write_template(root: &Path, name: &str, image: &GrayImage) {
    image.save(root.join(format!("{name}.png"))).unwrap();
}

/// Config whose template catalog points at `root`, with one entry per name.
pub fn config_with_templates(root: &Path, names: &[&str]) -> Config {
    let mut config = Config::default();
    config.templates.root = root.to_path_buf();
    config.templates.entries = names
        .iter()
        .map(|name| {
            (
                name.to_string(),
                TemplateEntry {
                    path: format!("{name}.png").into(),
                    confidence: None,
                    required: true,
                },
            )
        })
        .collect::<BTreeMap<_, _>>();
    config
}

pub fn valid_order(order_id: &str) -> Value {
    json!({
        "orderId": order_id,
        "documentDate": "2024-05-01",
        "buyer": {"taxId": "900123456", "name": "ACME"},
        "items": [
            {"description": "Widget", "code": "W-1", "quantity": 2, "unitPrice": 9.5}
        ],
        "totalValue": 19.0
    })
}

pub fn write_order(dir: &Path, name: &str, value: &Value) {
    std::fs::write(dir.join(name), serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

/// Navigator that replays scripted results, then keeps succeeding.
#[derive(Default)]
pub struct ScriptedNavigator {
    pub script: Vec<Result<NavigationReport, AutomationError>>,
    pub calls: usize,
    /// Reported by `last_retries` after a scripted error
    pub error_retries: u32,
    last: u32,
}

impl ScriptedNavigator {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn with_script(script: Vec<Result<NavigationReport, AutomationError>>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }
}

pub fn reached_form() -> NavigationReport {
    NavigationReport {
        final_state: NavigationState::OrderFormOpen,
        unconfirmed: Vec::new(),
        retries: 0,
    }
}

pub fn reached_form_after(retries: u32) -> NavigationReport {
    NavigationReport {
        retries,
        ..reached_form()
    }
}

impl Navigator for ScriptedNavigator {
    fn navigate(&mut self) -> Result<NavigationReport, AutomationError> {
        self.calls += 1;
        let result = if self.script.is_empty() {
            Ok(reached_form())
        } else {
            self.script.remove(0)
        };
        self.last = match &result {
            Ok(report) => report.retries,
            Err(_) => self.error_retries,
        };
        result
    }

    fn last_retries(&self) -> u32 {
        self.last
    }
}
