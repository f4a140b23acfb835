use tracing::{debug, info, instrument};

use crate::config::TemplateConfig;
use crate::errors::AutomationError;
use crate::matcher::{best_match_with_floor, DEFAULT_FLOOR};
use crate::platforms::PlatformWindowService;
use crate::retry::Sleeper;
use crate::types::Region;
use image::GrayImage;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const DEFAULT_CONFIDENCE: f32 = 0.8;
pub const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A named reference bitmap.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTemplate {
    pub name: String,
    /// Absolute or relative to the working directory
    pub path: PathBuf,
    pub confidence: f32,
    pub required: bool,
}

/// Logical template names resolved against a root directory.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    root: PathBuf,
    templates: BTreeMap<String, ReferenceTemplate>,
}

impl TemplateCatalog {
    pub fn from_config(config: &TemplateConfig, default_confidence: f32) -> Self {
        let templates = config
            .entries
            .iter()
            .map(|(name, entry)| {
                let template = ReferenceTemplate {
                    name: name.clone(),
                    path: config.root.join(&entry.path),
                    confidence: entry.confidence.unwrap_or(default_confidence),
                    required: entry.required,
                };
                (name.clone(), template)
            })
            .collect();
        Self {
            root: config.root.clone(),
            templates,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, name: &str) -> Result<&ReferenceTemplate, AutomationError> {
        self.templates.get(name).ok_or_else(|| {
            AutomationError::Configuration(format!("Unknown template '{name}'"))
        })
    }

    pub fn exists(&self, name: &str) -> bool {
        self.templates
            .get(name)
            .map(|t| t.path.is_file())
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferenceTemplate> {
        self.templates.values()
    }

    /// Required templates whose asset file is absent.
    pub fn missing(&self) -> Vec<ReferenceTemplate> {
        self.templates
            .values()
            .filter(|t| t.required && !t.path.is_file())
            .cloned()
            .collect()
    }
}

/// Center of an accepted match in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub x: i32,
    pub y: i32,
    pub confidence: f32,
    /// The threshold tier that accepted the match
    pub threshold: f32,
}

/// Per-call overrides for a locate or wait.
#[derive(Debug, Clone, Default)]
pub struct LocateOptions {
    confidence: Option<f32>,
    thresholds: Vec<f32>,
    region: Option<Region>,
    timeout: Option<Duration>,
    poll_interval: Option<Duration>,
}

impl LocateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single confidence floor. Ignored when fallback thresholds are set.
    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Fallback thresholds. Always tried highest first.
    pub fn thresholds(mut self, thresholds: &[f32]) -> Self {
        self.thresholds = thresholds.to_vec();
        self
    }

    pub fn within(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Thresholds in the order they are tried.
    pub fn tiers(&self, template_confidence: f32) -> Vec<f32> {
        let mut tiers = if self.thresholds.is_empty() {
            vec![self.confidence.unwrap_or(template_confidence)]
        } else {
            self.thresholds.clone()
        };
        tiers.sort_by(|a, b| b.total_cmp(a));
        tiers.dedup();
        tiers
    }
}

/// Finds reference templates on the screen.
pub struct ElementLocator {
    service: Arc<dyn PlatformWindowService>,
    catalog: TemplateCatalog,
    cache: Mutex<HashMap<String, Arc<GrayImage>>>,
    sleeper: Arc<dyn Sleeper>,
    timeout: Duration,
    poll_interval: Duration,
}

impl ElementLocator {
    pub fn new(
        service: Arc<dyn PlatformWindowService>,
        catalog: TemplateCatalog,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            service,
            catalog,
            cache: Mutex::new(HashMap::new()),
            sleeper,
            timeout: DEFAULT_LOCATOR_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn set_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.catalog.exists(name)
    }

    pub fn missing_templates(&self) -> Vec<ReferenceTemplate> {
        self.catalog.missing()
    }

    fn load(&self, template: &ReferenceTemplate) -> Result<Arc<GrayImage>, AutomationError> {
        if let Some(img) = self
            .cache
            .lock()
            .ok()
            .and_then(|c| c.get(&template.name).cloned())
        {
            return Ok(img);
        }
        if !template.path.is_file() {
            return Err(AutomationError::Configuration(format!(
                "Template asset missing: {}",
                template.path.display()
            )));
        }
        let img = Arc::new(image::open(&template.path)?.to_luma8());
        debug!(
            "Loaded template '{}' ({}x{})",
            template.name,
            img.width(),
            img.height()
        );
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(template.name.clone(), img.clone());
        }
        Ok(img)
    }

    /// One capture, every threshold tier tried against it.
    pub fn locate(
        &self,
        name: &str,
        options: &LocateOptions,
    ) -> Result<Option<MatchResult>, AutomationError> {
        let template = self.catalog.get(name)?;
        let needle = self.load(template)?;

        let capture = self.service.capture_screen()?;
        let capture = match options.region {
            Some(region) => match capture.crop(region) {
                Some(cropped) => cropped,
                None => {
                    debug!("Search region {:?} is outside the screen", region);
                    return Ok(None);
                }
            },
            None => capture,
        };
        let haystack = capture.to_gray().ok_or_else(|| {
            AutomationError::Platform("Capture buffer does not match its dimensions".to_string())
        })?;

        let tiers = options.tiers(template.confidence);
        let floor = tiers.last().copied().unwrap_or(DEFAULT_FLOOR);
        let Some(best) = best_match_with_floor(&haystack, &needle, floor) else {
            debug!("Template '{}' is larger than the search area", name);
            return Ok(None);
        };

        for tier in tiers {
            if best.score >= tier {
                let result = MatchResult {
                    x: (capture.origin.0 + best.x + needle.width() / 2) as i32,
                    y: (capture.origin.1 + best.y + needle.height() / 2) as i32,
                    confidence: best.score,
                    threshold: tier,
                };
                info!(
                    "Found '{}' at ({}, {}) with confidence {:.3} (threshold {})",
                    name, result.x, result.y, result.confidence, tier
                );
                return Ok(Some(result));
            }
        }
        debug!("'{}' not on screen, best score {:.3}", name, best.score);
        Ok(None)
    }

    /// Re-capture on the poll interval until found or timed out.
    #[instrument(skip(self, options))]
    pub fn wait_for(
        &self,
        name: &str,
        options: &LocateOptions,
    ) -> Result<MatchResult, AutomationError> {
        let timeout = options.timeout.unwrap_or(self.timeout);
        let poll = options.poll_interval.unwrap_or(self.poll_interval);
        let start = Instant::now();
        let mut slept = Duration::ZERO;

        loop {
            if let Some(found) = self.locate(name, options)? {
                return Ok(found);
            }
            if start.elapsed().max(slept) >= timeout {
                return Err(AutomationError::NotFound(format!(
                    "Template '{name}' not found within {timeout:?}"
                )));
            }
            self.sleeper.sleep(poll);
            slept += poll;
        }
    }

    /// Locate, then click the match center.
    pub fn click(
        &self,
        name: &str,
        options: &LocateOptions,
    ) -> Result<Option<MatchResult>, AutomationError> {
        let Some(found) = self.locate(name, options)? else {
            return Ok(None);
        };
        self.service.click(found.x, found.y)?;
        info!("Clicked '{}'", name);
        Ok(Some(found))
    }
}
