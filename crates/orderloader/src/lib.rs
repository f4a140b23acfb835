//! Screen-scraping automation for a GUI-only application behind a remote desktop
//!
//! The crate finds and activates the remote-desktop window, walks a fixed menu
//! path by matching reference images against screen captures, and feeds a
//! FIFO file queue of order documents through that walk.

pub mod config;
pub mod errors;
pub mod locator;
pub mod logging;
pub mod matcher;
pub mod navigation;
pub mod platforms;
pub mod queue;
pub mod retry;
pub mod screenshot;
pub mod types;
pub mod window;

pub use config::Config;
pub use errors::AutomationError;
pub use locator::{ElementLocator, LocateOptions, MatchResult, ReferenceTemplate, TemplateCatalog};
pub use navigation::{
    DryRunNavigator, NavigationEngine, NavigationReport, NavigationState, NavigationStep,
    Navigator,
};
pub use platforms::{create_service, InputDeviceConfig, PlatformWindowService};
pub use queue::{
    BackupManager, MetricsSession, OrderDocument, QueueItem, QueueProcessor, QueueStatus,
    QueueStore, ValidationError,
};
pub use retry::{RecordingSleeper, Retry, RetryContext, RetryPolicy, Sleeper, ThreadSleeper};
pub use screenshot::ScreenshotResult;
pub use types::{Key, Region};
pub use window::{ActivationStrategy, WindowActivationManager, WindowHandle};
