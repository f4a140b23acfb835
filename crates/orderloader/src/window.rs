//! Finding the remote-desktop window and bringing it to the foreground.
//!
//! Activation runs an ordered list of [`ActivationStrategy`] trait objects
//! and stops at the first one that verifiably puts the target in front.
//! A strategy that errors is logged and skipped; only fatal errors (the
//! fail-safe) abort the chain.

use crate::config::{ActivationConfig, Config, RemoteConfig};
use crate::errors::AutomationError;
use crate::platforms::PlatformWindowService;
use crate::retry::{Retry, Sleeper};
use crate::types::{describe_chord, Key};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// A top-level window as reported by the platform service. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WindowHandle {
    pub process_name: String,
    pub window_title: String,
    pub process_id: u32,
    /// Opaque OS handle (HWND on Windows)
    pub native_handle: Option<isize>,
}

impl WindowHandle {
    /// Foreground identity: same process, or this title contains the target's title.
    pub fn is_same_window(&self, target: &WindowHandle) -> bool {
        if self.process_id != 0 && self.process_id == target.process_id {
            return true;
        }
        !target.window_title.is_empty() && self.window_title.contains(&target.window_title)
    }
}

fn normalize_process_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    lower
        .strip_suffix(".exe")
        .map(str::to_string)
        .unwrap_or(lower)
}

/// What a strategy may touch while it runs.
pub struct ActivationContext<'a> {
    pub service: &'a dyn PlatformWindowService,
    pub activation: &'a ActivationConfig,
    pub remote: &'a RemoteConfig,
    pub sleeper: &'a dyn Sleeper,
}

impl ActivationContext<'_> {
    /// Whether `target` currently owns the foreground. Lookup errors count as no.
    pub fn is_foreground(&self, target: &WindowHandle) -> bool {
        match self.service.foreground_window() {
            Ok(Some(current)) => current.is_same_window(target),
            Ok(None) => false,
            Err(e) => {
                debug!("Foreground lookup failed: {}", e);
                false
            }
        }
    }

    pub fn wait_ms(&self, ms: u64) {
        self.sleeper.sleep(Duration::from_millis(ms));
    }
}

pub trait ActivationStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(true)` once the target is verified in the foreground.
    fn attempt(
        &self,
        ctx: &ActivationContext<'_>,
        target: &WindowHandle,
    ) -> Result<bool, AutomationError>;
}

/// Repeated Alt+Tab, checking the foreground after each press.
pub struct AltTabCycle;

impl ActivationStrategy for AltTabCycle {
    fn name(&self) -> &str {
        "alt-tab cycle"
    }

    fn attempt(
        &self,
        ctx: &ActivationContext<'_>,
        target: &WindowHandle,
    ) -> Result<bool, AutomationError> {
        for i in 0..ctx.activation.alt_tab_attempts {
            ctx.service.press_keys(&[Key::Alt, Key::Tab])?;
            ctx.wait_ms(ctx.activation.alt_tab_delay_ms);
            if ctx.is_foreground(target) {
                info!("Window activated with Alt+Tab on press {}", i + 1);
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Direct OS foreground assignment.
pub struct ForegroundHandle;

impl ActivationStrategy for ForegroundHandle {
    fn name(&self) -> &str {
        "foreground handle"
    }

    fn attempt(
        &self,
        ctx: &ActivationContext<'_>,
        target: &WindowHandle,
    ) -> Result<bool, AutomationError> {
        ctx.service.bring_to_front(target)?;
        ctx.wait_ms(ctx.activation.foreground_settle_ms);
        Ok(ctx.is_foreground(target))
    }
}

/// Win+Tab overlay, then clicks at the center, quarter-left and quarter-right.
pub struct TaskSwitcherClick;

impl TaskSwitcherClick {
    pub fn click_points(width: u32, height: u32) -> [(i32, i32); 3] {
        let (w, h) = (width as i32, height as i32);
        [(w / 2, h / 2), (w / 4, h / 2), (3 * w / 4, h / 2)]
    }
}

impl ActivationStrategy for TaskSwitcherClick {
    fn name(&self) -> &str {
        "task switcher click"
    }

    fn attempt(
        &self,
        ctx: &ActivationContext<'_>,
        target: &WindowHandle,
    ) -> Result<bool, AutomationError> {
        ctx.service.press_keys(&[Key::Win, Key::Tab])?;
        ctx.wait_ms(ctx.activation.task_switcher_delay_ms);

        let (width, height) = ctx.service.screen_size()?;
        for (x, y) in Self::click_points(width, height) {
            ctx.service.click(x, y)?;
            ctx.wait_ms(ctx.activation.click_delay_ms);
            if ctx.is_foreground(target) {
                info!("Window activated by clicking ({}, {})", x, y);
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Opens a fresh connection to the configured address and polls for it.
/// Only applies when the target title names that address.
pub struct NewRemoteConnection;

impl ActivationStrategy for NewRemoteConnection {
    fn name(&self) -> &str {
        "new remote connection"
    }

    fn attempt(
        &self,
        ctx: &ActivationContext<'_>,
        target: &WindowHandle,
    ) -> Result<bool, AutomationError> {
        let address = ctx.remote.address.as_str();
        if address.is_empty() || !target.window_title.contains(address) {
            debug!(
                "Skipping new connection: '{}' does not name {}",
                target.window_title, address
            );
            return Ok(false);
        }

        ctx.service.launch_remote_session(address)?;
        let poll = ctx.activation.new_connection_poll_ms.max(1);
        let mut waited = 0;
        while waited < ctx.activation.new_connection_timeout_ms {
            ctx.wait_ms(poll);
            waited += poll;
            if ctx.is_foreground(target) {
                info!("New connection to {} is in the foreground", address);
                return Ok(true);
            }
        }
        Ok(false)
    }
}

pub fn default_strategies() -> Vec<Box<dyn ActivationStrategy>> {
    vec![
        Box::new(AltTabCycle),
        Box::new(ForegroundHandle),
        Box::new(TaskSwitcherClick),
        Box::new(NewRemoteConnection),
    ]
}

pub struct WindowActivationManager {
    service: Arc<dyn PlatformWindowService>,
    remote: RemoteConfig,
    activation: ActivationConfig,
    maximize_keys: Vec<Key>,
    maximize_fallback: Vec<Vec<Key>>,
    maximize_settle: Duration,
    strategies: Vec<Box<dyn ActivationStrategy>>,
    sleeper: Arc<dyn Sleeper>,
    retry: Retry,
}

impl WindowActivationManager {
    pub fn new(
        service: Arc<dyn PlatformWindowService>,
        config: &Config,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            service,
            remote: config.remote.clone(),
            activation: config.activation.clone(),
            maximize_keys: config.navigation.maximize_keys.clone(),
            maximize_fallback: config.navigation.maximize_fallback.clone(),
            maximize_settle: Duration::from_millis(config.navigation.maximize_settle_ms),
            strategies: default_strategies(),
            retry: Retry::new(config.retry.policy(), sleeper.clone()),
            sleeper,
        }
    }

    /// Replace the strategy chain.
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn ActivationStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Retries spent in `find_with_retry` since the last call.
    pub fn take_retries(&self) -> u32 {
        self.retry.take_retries()
    }

    fn is_candidate(&self, window: &WindowHandle, keywords: &[String]) -> bool {
        let process = normalize_process_name(&window.process_name);
        if self
            .remote
            .process_names
            .iter()
            .any(|p| normalize_process_name(p) == process)
        {
            return true;
        }
        let title = window.window_title.to_lowercase();
        keywords
            .iter()
            .filter(|k| !k.is_empty())
            .any(|k| title.contains(&k.to_lowercase()))
    }

    /// First window owned by a known client process or whose title carries a keyword.
    pub fn find(&self) -> Result<Option<WindowHandle>, AutomationError> {
        let keywords = self.remote.keywords();
        let found = self
            .service
            .list_windows()?
            .into_iter()
            .find(|w| self.is_candidate(w, &keywords));
        match &found {
            Some(w) => info!(
                "Found remote window '{}' ({}, pid {})",
                w.window_title, w.process_name, w.process_id
            ),
            None => debug!("No remote window among open windows"),
        }
        Ok(found)
    }

    pub fn find_with_retry(&self) -> Result<WindowHandle, AutomationError> {
        self.retry.run("find remote window", || {
            self.find()?.ok_or_else(|| {
                AutomationError::NotFound(format!(
                    "No remote-desktop window for {}",
                    self.remote.address
                ))
            })
        })
    }

    /// Try each strategy in order until one verifies the foreground.
    ///
    /// Returns `Ok(false)` when every strategy has been tried. Only fatal
    /// errors are returned as `Err`.
    #[instrument(skip(self), fields(title = %target.window_title))]
    pub fn activate(&self, target: &WindowHandle) -> Result<bool, AutomationError> {
        let ctx = ActivationContext {
            service: self.service.as_ref(),
            activation: &self.activation,
            remote: &self.remote,
            sleeper: self.sleeper.as_ref(),
        };

        for (i, strategy) in self.strategies.iter().enumerate() {
            info!(
                "Activation strategy {}/{}: {}",
                i + 1,
                self.strategies.len(),
                strategy.name()
            );
            match strategy.attempt(&ctx, target) {
                Ok(true) => {
                    info!("Window activated with {}", strategy.name());
                    return Ok(true);
                }
                Ok(false) => debug!("{} did not activate the window", strategy.name()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("{} failed: {}", strategy.name(), e),
            }
        }
        warn!("Every activation strategy was exhausted");
        Ok(false)
    }

    /// Maximize the foreground window. Failure is logged, not returned,
    /// unless the fail-safe fired.
    pub fn maximize(&self) -> Result<bool, AutomationError> {
        match self.service.press_keys(&self.maximize_keys) {
            Ok(()) => {
                self.sleeper.sleep(self.maximize_settle);
                info!("Window maximized with {}", describe_chord(&self.maximize_keys));
                return Ok(true);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!(
                "Maximize with {} failed: {}",
                describe_chord(&self.maximize_keys),
                e
            ),
        }

        for chord in &self.maximize_fallback {
            if let Err(e) = self.service.press_keys(chord) {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!("Maximize fallback {} failed: {}", describe_chord(chord), e);
                return Ok(false);
            }
            self.sleeper.sleep(self.maximize_settle / 2);
        }
        info!("Window maximized through the window menu");
        Ok(true)
    }
}
