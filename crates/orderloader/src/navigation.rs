//! The menu walk from a disconnected desktop to the sales order form.
//!
//! Each forward transition performs input and then looks for a confirming
//! template. Steps flagged `strict` abort the run when nothing confirms;
//! the others log the miss, record it in the [`NavigationReport`] and
//! advance anyway.

use crate::config::{Config, NavigationConfig, RemoteConfig};
use crate::errors::AutomationError;
use crate::locator::{ElementLocator, LocateOptions, TemplateCatalog};
use crate::platforms::PlatformWindowService;
use crate::retry::{Retry, Sleeper};
use crate::types::{describe_chord, Key};
use crate::window::{ActivationStrategy, WindowActivationManager};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NavigationState {
    #[default]
    Disconnected,
    RemoteActive,
    AppVisible,
    ModulesOpen,
    SalesOpen,
    OrderFormOpen,
    Failed,
}

impl NavigationState {
    pub const SEQUENCE: [NavigationState; 6] = [
        NavigationState::Disconnected,
        NavigationState::RemoteActive,
        NavigationState::AppVisible,
        NavigationState::ModulesOpen,
        NavigationState::SalesOpen,
        NavigationState::OrderFormOpen,
    ];

    pub fn next(self) -> Option<NavigationState> {
        let idx = Self::SEQUENCE.iter().position(|s| *s == self)?;
        Self::SEQUENCE.get(idx + 1).copied()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, NavigationState::OrderFormOpen | NavigationState::Failed)
    }

    /// Exactly one step forward, or into Failed from any non-terminal state.
    pub fn can_transition_to(self, to: NavigationState) -> bool {
        if to == NavigationState::Failed {
            return !self.is_terminal();
        }
        self.next() == Some(to)
    }

    /// States whose confirmation can never be skipped.
    pub fn is_hard_gate(self) -> bool {
        matches!(
            self,
            NavigationState::RemoteActive | NavigationState::AppVisible
        )
    }
}

/// One menu transition: click a candidate (or press keys), then confirm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationStep {
    pub target: NavigationState,
    /// Templates to click, first one found wins
    pub click: Vec<String>,
    /// Pressed when no click candidate is on screen
    pub fallback_keys: Vec<Key>,
    /// Any one of these on screen confirms the target state
    pub confirm: Vec<String>,
    /// Empty means each template's own confidence
    pub thresholds: Vec<f32>,
    pub settle_ms: u64,
    pub strict: bool,
}

impl Default for NavigationStep {
    fn default() -> Self {
        Self {
            target: NavigationState::ModulesOpen,
            click: Vec::new(),
            fallback_keys: Vec::new(),
            confirm: Vec::new(),
            thresholds: Vec::new(),
            settle_ms: 2_000,
            strict: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct NavigationReport {
    pub final_state: NavigationState,
    /// Soft-gated states entered without a confirming match
    pub unconfirmed: Vec<NavigationState>,
    pub retries: u32,
}

impl NavigationReport {
    pub fn is_complete(&self) -> bool {
        self.final_state == NavigationState::OrderFormOpen
    }
}

/// Anything that can take the GUI to the order form.
pub trait Navigator {
    fn navigate(&mut self) -> Result<NavigationReport, AutomationError>;

    /// Retries spent by the most recent `navigate`, whether it succeeded or not.
    fn last_retries(&self) -> u32 {
        0
    }
}

pub struct NavigationEngine {
    service: Arc<dyn PlatformWindowService>,
    windows: WindowActivationManager,
    locator: ElementLocator,
    navigation: NavigationConfig,
    remote: RemoteConfig,
    connection: Retry,
    sleeper: Arc<dyn Sleeper>,
    state: NavigationState,
    unconfirmed: Vec<NavigationState>,
    last_retries: u32,
}

impl NavigationEngine {
    pub fn new(
        service: Arc<dyn PlatformWindowService>,
        config: &Config,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let catalog = TemplateCatalog::from_config(&config.templates, config.recognition.confidence);
        let locator = ElementLocator::new(service.clone(), catalog, sleeper.clone())
            .set_default_timeout(Duration::from_millis(config.recognition.timeout_ms))
            .set_poll_interval(Duration::from_millis(config.recognition.poll_interval_ms));
        let windows = WindowActivationManager::new(service.clone(), config, sleeper.clone());

        Self {
            service,
            windows,
            locator,
            navigation: config.navigation.clone(),
            remote: config.remote.clone(),
            connection: Retry::new(config.remote.connection_policy(), sleeper.clone()),
            sleeper,
            state: NavigationState::Disconnected,
            unconfirmed: Vec::new(),
            last_retries: 0,
        }
    }

    pub fn with_strategies(mut self, strategies: Vec<Box<dyn ActivationStrategy>>) -> Self {
        self.windows = self.windows.with_strategies(strategies);
        self
    }

    pub fn locator(&self) -> &ElementLocator {
        &self.locator
    }

    pub fn windows(&self) -> &WindowActivationManager {
        &self.windows
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    fn transition(&mut self, to: NavigationState) -> Result<(), AutomationError> {
        if !self.state.can_transition_to(to) {
            return Err(AutomationError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        info!("Navigation: {:?} -> {:?}", self.state, to);
        self.state = to;
        Ok(())
    }

    fn options(thresholds: &[f32]) -> LocateOptions {
        LocateOptions::new().thresholds(thresholds)
    }

    /// Drops optional templates that have no asset. Required or unknown names
    /// are kept so the locator reports them.
    fn available(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter(|name| {
                let optional = self
                    .locator
                    .catalog()
                    .get(name)
                    .map(|t| !t.required)
                    .unwrap_or(false);
                if optional && !self.locator.has_template(name) {
                    debug!("Skipping optional template '{}' without an asset", name);
                    return false;
                }
                true
            })
            .cloned()
            .collect()
    }

    fn connect_once(&self) -> Result<(), AutomationError> {
        let window = self.windows.find_with_retry()?;
        if !self.windows.activate(&window)? {
            return Err(AutomationError::Activation(format!(
                "Could not bring '{}' to the foreground",
                window.window_title
            )));
        }
        let options = Self::options(&self.remote.verification_thresholds)
            .timeout(Duration::from_millis(self.remote.verification_timeout_ms));
        self.locator
            .wait_for(&self.navigation.remote_template, &options)?;
        info!("Remote desktop {} activated and verified", self.remote.address);
        Ok(())
    }

    /// Outer connection loop: find, activate, verify, with a fixed delay between attempts.
    #[instrument(skip(self))]
    pub fn connect(&mut self) -> Result<(), AutomationError> {
        self.connection.run("connect to remote desktop", || self.connect_once())?;
        self.transition(NavigationState::RemoteActive)
    }

    /// Verify the application is on screen, then maximize and settle.
    #[instrument(skip(self))]
    pub fn show_application(&mut self) -> Result<(), AutomationError> {
        let options = Self::options(&self.navigation.app_thresholds);
        let mut seen = None;
        for name in self.available(&self.navigation.app_templates) {
            if self.locator.locate(&name, &options)?.is_some() {
                seen = Some(name);
                break;
            }
        }
        let Some(name) = seen else {
            return Err(AutomationError::NotFound(
                "Application is not visible in the remote session".to_string(),
            ));
        };
        info!("Application visible ('{}')", name);

        if !self.windows.maximize()? {
            warn!("Could not maximize the remote window, continuing");
        }
        self.sleeper
            .sleep(Duration::from_millis(self.navigation.stabilize_ms));
        self.transition(NavigationState::AppVisible)
    }

    /// Perform one menu step. A step into a hard-gated state is strict
    /// whatever its own flag says.
    #[instrument(skip(self, step), fields(target = ?step.target))]
    pub fn run_step(&mut self, step: &NavigationStep) -> Result<(), AutomationError> {
        if self.state.next() != Some(step.target) {
            return Err(AutomationError::InvalidTransition {
                from: self.state,
                to: step.target,
            });
        }
        let options = Self::options(&step.thresholds);
        let strict = step.strict || step.target.is_hard_gate();

        let mut acted = false;
        for name in self.available(&step.click) {
            if self.locator.click(&name, &options)?.is_some() {
                acted = true;
                break;
            }
        }
        if !acted && !step.fallback_keys.is_empty() {
            warn!(
                "No clickable candidate for {:?}, pressing {}",
                step.target,
                describe_chord(&step.fallback_keys)
            );
            self.service.press_keys(&step.fallback_keys)?;
            acted = true;
        }
        if !acted {
            if strict {
                return Err(AutomationError::NotFound(format!(
                    "Nothing to click for {:?}",
                    step.target
                )));
            }
            warn!("Nothing to click for {:?}", step.target);
        }
        self.sleeper.sleep(Duration::from_millis(step.settle_ms));

        let mut confirmed = false;
        for name in self.available(&step.confirm) {
            if self.locator.locate(&name, &options)?.is_some() {
                info!("{:?} confirmed by '{}'", step.target, name);
                confirmed = true;
                break;
            }
        }
        if !confirmed {
            if strict {
                return Err(AutomationError::NotFound(format!(
                    "{:?} not confirmed on screen",
                    step.target
                )));
            }
            warn!("{:?} not detected on screen, continuing", step.target);
            self.unconfirmed.push(step.target);
        }
        self.transition(step.target)
    }

    fn walk(&mut self) -> Result<(), AutomationError> {
        self.connect()?;
        self.show_application()?;
        let steps = self.navigation.steps.clone();
        for step in &steps {
            self.run_step(step)?;
        }
        Ok(())
    }
}

impl Navigator for NavigationEngine {
    #[instrument(skip(self))]
    fn navigate(&mut self) -> Result<NavigationReport, AutomationError> {
        self.state = NavigationState::Disconnected;
        self.unconfirmed.clear();

        let outcome = self.walk();
        let retries = self.connection.take_retries() + self.windows.take_retries();
        self.last_retries = retries;
        match outcome {
            Ok(()) => {
                info!("Navigation reached {:?}", self.state);
                Ok(NavigationReport {
                    final_state: self.state,
                    unconfirmed: self.unconfirmed.clone(),
                    retries,
                })
            }
            Err(e) => {
                error!("Navigation failed at {:?}: {}", self.state, e);
                self.state = NavigationState::Failed;
                Err(e)
            }
        }
    }

    fn last_retries(&self) -> u32 {
        self.last_retries
    }
}

/// Walks the state sequence without touching the GUI.
#[derive(Debug, Default)]
pub struct DryRunNavigator;

impl Navigator for DryRunNavigator {
    fn navigate(&mut self) -> Result<NavigationReport, AutomationError> {
        info!("Dry run: skipping GUI navigation");
        let mut state = NavigationState::Disconnected;
        let mut unconfirmed = Vec::new();
        while let Some(next) = state.next() {
            unconfirmed.push(next);
            state = next;
        }
        Ok(NavigationReport {
            final_state: state,
            unconfirmed,
            retries: 0,
        })
    }
}
