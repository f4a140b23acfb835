//! Runtime configuration.
//!
//! Every field has a default, so an empty `{}` file (or no file at all) gives
//! a working setup. A JSON file overrides any subset of fields.

use crate::errors::AutomationError;
use crate::navigation::{NavigationState, NavigationStep};
use crate::platforms::InputDeviceConfig;
use crate::retry::RetryPolicy;
use crate::types::Key;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Path of the JSON config file
pub const CONFIG_ENV: &str = "ORDERLOADER_CONFIG";
/// Overrides `queue.root`
pub const QUEUE_DIR_ENV: &str = "ORDERLOADER_QUEUE_DIR";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub recognition: RecognitionConfig,
    pub remote: RemoteConfig,
    pub activation: ActivationConfig,
    pub input: InputDeviceConfig,
    pub retry: RetryConfig,
    pub queue: QueueConfig,
    pub templates: TemplateConfig,
    pub navigation: NavigationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Confidence floor used when a template has no override
    pub confidence: f32,
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            confidence: 0.8,
            timeout_ms: 10_000,
            poll_interval_ms: 500,
        }
    }
}

/// The remote-desktop window and the outer connection loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub window_title: String,
    /// Host or IP of the remote session. Also used as a title keyword.
    pub address: String,
    /// Process names of the remote-desktop client, without extension
    pub process_names: Vec<String>,
    pub title_keywords: Vec<String>,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub verification_timeout_ms: u64,
    pub verification_thresholds: Vec<f32>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            window_title: "20.96.6.64 - Conexión a Escritorio remoto".to_string(),
            address: "20.96.6.64".to_string(),
            process_names: vec!["mstsc".to_string()],
            title_keywords: vec![
                "Conexión".to_string(),
                "Remote".to_string(),
                "remoto".to_string(),
            ],
            max_attempts: 3,
            retry_delay_ms: 5_000,
            verification_timeout_ms: 5_000,
            verification_thresholds: vec![0.8, 0.7, 0.6],
        }
    }
}

impl RemoteConfig {
    /// Title keywords plus the remote address.
    pub fn keywords(&self) -> Vec<String> {
        let mut keywords = self.title_keywords.clone();
        if !self.address.is_empty() && !keywords.contains(&self.address) {
            keywords.push(self.address.clone());
        }
        keywords
    }

    pub fn connection_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_attempts, Duration::from_millis(self.retry_delay_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationConfig {
    pub alt_tab_attempts: u32,
    pub alt_tab_delay_ms: u64,
    /// Wait after a direct foreground assignment before verifying
    pub foreground_settle_ms: u64,
    pub task_switcher_delay_ms: u64,
    pub click_delay_ms: u64,
    pub new_connection_timeout_ms: u64,
    pub new_connection_poll_ms: u64,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            alt_tab_attempts: 10,
            alt_tab_delay_ms: 300,
            foreground_settle_ms: 2_000,
            task_switcher_delay_ms: 1_000,
            click_delay_ms: 500,
            new_connection_timeout_ms: 3_000,
            new_connection_poll_ms: 500,
        }
    }
}

/// Single-call retries with exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 5_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Holds `pending/`, `completed/` and `backups/`
    pub root: PathBuf,
    pub backup_enabled: bool,
    pub compress_backups: bool,
    pub max_backups: usize,
    /// Relative paths resolve against `root`
    pub metrics_file: PathBuf,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("queues"),
            backup_enabled: true,
            compress_backups: false,
            max_backups: 100,
            metrics_file: PathBuf::from("metrics.json"),
        }
    }
}

impl QueueConfig {
    pub fn metrics_path(&self) -> PathBuf {
        if self.metrics_file.is_absolute() {
            self.metrics_file.clone()
        } else {
            self.root.join(&self.metrics_file)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateEntry {
    /// Relative to the template root
    pub path: PathBuf,
    /// Overrides `recognition.confidence`
    pub confidence: Option<f32>,
    /// Checked at startup; optional entries are skipped when absent
    pub required: bool,
}

impl Default for TemplateEntry {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            confidence: None,
            required: true,
        }
    }
}

fn entry(path: &str, required: bool) -> TemplateEntry {
    TemplateEntry {
        path: PathBuf::from(path),
        confidence: None,
        required,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub root: PathBuf,
    /// Logical name to asset
    pub entries: BTreeMap<String, TemplateEntry>,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        let entries = [
            ("remote_desktop", entry("core/remote_desktop.png", true)),
            ("app_desktop", entry("core/sap_desktop.png", true)),
            ("app_icon", entry("sap/sap_icon.png", false)),
            ("app_main_interface", entry("sap/sap_main_interface.png", false)),
            ("modules_button", entry("sap/sap_modulos_menu_button.png", true)),
            ("modules_menu", entry("sap/sap_modulos_menu.png", true)),
            ("sales_button", entry("sap/sap_ventas_menu_button.png", false)),
            (
                "sales_customers_menu",
                entry("sap/sap_ventas_clientes_menu.png", false),
            ),
            ("sales_order_menu", entry("sap/sap_ventas_order_menu.png", true)),
            (
                "sales_order_button",
                entry("sap/sap_ventas_order_button.png", true),
            ),
            (
                "sales_order_form",
                entry("sap/sap_orden_de_ventas_template.png", true),
            ),
        ]
        .into_iter()
        .map(|(name, e)| (name.to_string(), e))
        .collect();

        Self {
            root: PathBuf::from("assets/images"),
            entries,
        }
    }
}

/// The fixed menu walk and the keys used around it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub remote_template: String,
    /// Tried in order, first match confirms the application is visible
    pub app_templates: Vec<String>,
    pub app_thresholds: Vec<f32>,
    pub maximize_keys: Vec<Key>,
    /// Window menu, then its maximize entry
    pub maximize_fallback: Vec<Vec<Key>>,
    pub maximize_settle_ms: u64,
    /// Wait after AppVisible before the first menu step
    pub stabilize_ms: u64,
    /// Menu steps after AppVisible, in order
    pub steps: Vec<NavigationStep>,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            remote_template: "remote_desktop".to_string(),
            app_templates: names(&[
                "app_desktop",
                "app_icon",
                "app_main_interface",
                "modules_button",
            ]),
            app_thresholds: vec![0.8, 0.7, 0.6, 0.5],
            maximize_keys: vec![Key::Win, Key::Up],
            maximize_fallback: vec![vec![Key::Alt, Key::Space], vec![Key::Char('x')]],
            maximize_settle_ms: 1_000,
            stabilize_ms: 3_000,
            steps: vec![
                NavigationStep {
                    target: NavigationState::ModulesOpen,
                    click: names(&["modules_button"]),
                    fallback_keys: vec![Key::Alt, Key::Char('m')],
                    confirm: names(&["modules_menu"]),
                    thresholds: Vec::new(),
                    settle_ms: 2_000,
                    strict: false,
                },
                NavigationStep {
                    target: NavigationState::SalesOpen,
                    click: names(&["sales_button", "sales_customers_menu"]),
                    fallback_keys: vec![Key::Char('v')],
                    confirm: names(&["sales_order_menu", "sales_customers_menu"]),
                    thresholds: Vec::new(),
                    settle_ms: 2_000,
                    strict: false,
                },
                NavigationStep {
                    target: NavigationState::OrderFormOpen,
                    click: names(&[
                        "sales_order_button",
                        "sales_order_menu",
                        "sales_customers_menu",
                    ]),
                    fallback_keys: Vec::new(),
                    confirm: names(&[
                        "sales_order_form",
                        "sales_order_menu",
                        "sales_customers_menu",
                        "sales_order_button",
                    ]),
                    thresholds: vec![0.8, 0.7, 0.6, 0.5],
                    settle_ms: 3_000,
                    strict: false,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive used when RUST_LOG is unset
    pub level: String,
    /// Defaults to the platform data directory
    pub directory: Option<PathBuf>,
    pub file_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_name: "orderloader.log".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn resolve_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .map(|d| d.join("orderloader").join("logs"))
                .unwrap_or_else(|| PathBuf::from("logs"))
        })
    }
}

impl Config {
    pub fn from_json_str(raw: &str) -> Result<Self, AutomationError> {
        let config: Config = serde_json::from_str(raw)
            .map_err(|e| AutomationError::Configuration(format!("Invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, AutomationError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AutomationError::Configuration(format!(
                "Cannot read config file {}: {e}",
                path.display()
            ))
        })?;
        debug!("Loaded config from {}", path.display());
        Self::from_json_str(&raw)
    }

    /// Explicit path first, then `ORDERLOADER_CONFIG`, then defaults.
    /// `ORDERLOADER_QUEUE_DIR` is applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, AutomationError> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(from_env) {
            Some(p) => Self::from_file(&p)?,
            None => {
                info!("No config file given, using defaults");
                Config::default()
            }
        };
        if let Some(dir) = std::env::var_os(QUEUE_DIR_ENV) {
            config.queue.root = PathBuf::from(dir);
        }
        Ok(config)
    }

    /// Rejects thresholds outside (0, 1] and menu steps that skip or repeat a state.
    pub fn validate(&self) -> Result<(), AutomationError> {
        let check = |what: &str, value: f32| {
            if value > 0.0 && value <= 1.0 {
                Ok(())
            } else {
                Err(AutomationError::Configuration(format!(
                    "{what} must be in (0, 1], got {value}"
                )))
            }
        };

        check("recognition.confidence", self.recognition.confidence)?;
        for t in &self.remote.verification_thresholds {
            check("remote.verification_thresholds", *t)?;
        }
        for t in &self.navigation.app_thresholds {
            check("navigation.app_thresholds", *t)?;
        }
        for (name, e) in &self.templates.entries {
            if let Some(c) = e.confidence {
                check(&format!("templates.entries.{name}.confidence"), c)?;
            }
        }

        let mut state = NavigationState::AppVisible;
        for (i, step) in self.navigation.steps.iter().enumerate() {
            for t in &step.thresholds {
                check(&format!("navigation.steps[{i}].thresholds"), *t)?;
            }
            if step.target.is_hard_gate() {
                return Err(AutomationError::Configuration(format!(
                    "navigation.steps[{i}] targets {:?}, which is entered by the connection phase",
                    step.target
                )));
            }
            if !state.can_transition_to(step.target) || step.target == NavigationState::Failed {
                return Err(AutomationError::Configuration(format!(
                    "navigation.steps[{i}] targets {:?} after {:?}",
                    step.target, state
                )));
            }
            state = step.target;
        }
        if state != NavigationState::OrderFormOpen {
            return Err(AutomationError::Configuration(format!(
                "navigation.steps must end at OrderFormOpen, ends at {state:?}"
            )));
        }

        if self.remote.max_attempts == 0 || self.retry.max_attempts == 0 {
            return Err(AutomationError::Configuration(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
