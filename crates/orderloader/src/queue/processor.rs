use crate::errors::AutomationError;
use crate::navigation::{NavigationReport, Navigator};
use crate::queue::{
    BackupManager, ItemState, MetricsSession, OrderDocument, QueueItem, QueueStore,
    ValidationError,
};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Navigated and moved to `completed/`
    Completed { destination: PathBuf },
    /// Dry run: the document is valid and was left in place
    Validated,
    /// Schema violation, left in `pending/`
    Rejected(ValidationError),
    /// Unreadable document or failed navigation, left in `pending/`
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct FileResult {
    pub item: QueueItem,
    pub outcome: Outcome,
    pub duration: Duration,
    pub report: Option<NavigationReport>,
}

impl FileResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Completed { .. } | Outcome::Validated)
    }
}

#[derive(Debug, Clone)]
pub struct PassSummary {
    pub results: Vec<FileResult>,
    pub metrics: MetricsSession,
}

impl PassSummary {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

/// Drives every pending document through a [`Navigator`].
pub struct QueueProcessor<N: Navigator> {
    store: QueueStore,
    navigator: N,
    backups: Option<BackupManager>,
    metrics_path: Option<PathBuf>,
    dry_run: bool,
}

impl<N: Navigator> QueueProcessor<N> {
    pub fn new(store: QueueStore, navigator: N) -> Self {
        Self {
            store,
            navigator,
            backups: None,
            metrics_path: None,
            dry_run: false,
        }
    }

    pub fn with_backups(mut self, backups: BackupManager) -> Self {
        self.backups = Some(backups);
        self
    }

    pub fn with_metrics_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.metrics_path = Some(path.into());
        self
    }

    /// Validate and navigate, but never back up or relocate.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    fn load(path: &Path) -> Result<OrderDocument, Outcome> {
        OrderDocument::load(path).map_err(|e| match e {
            AutomationError::Validation(v) => Outcome::Rejected(v),
            other => Outcome::Failed(other.to_string()),
        })
    }

    /// One document. Only fatal errors escape; everything else becomes an `Outcome`.
    /// `retries` is set only when the navigator actually ran for this document.
    fn process_one(
        &mut self,
        mut item: QueueItem,
        retries: &mut u32,
    ) -> Result<(QueueItem, Outcome, Option<NavigationReport>), AutomationError> {
        item.state = ItemState::Processing;
        let name = item.file_name();

        let document = match Self::load(&item.path) {
            Ok(doc) => doc,
            Err(outcome) => {
                match &outcome {
                    Outcome::Rejected(v) => error!("Validation failed for {}: {}", name, v),
                    _ => error!("Could not read {}: {:?}", name, outcome),
                }
                item.state = ItemState::RetainedOnFailure;
                return Ok((item, outcome, None));
            }
        };
        info!(
            "Processing order {} ({} items) from {}",
            document.order_id,
            document.items.len(),
            name
        );

        if !self.dry_run {
            if let Some(backups) = &self.backups {
                if let Err(e) = backups.snapshot(&item.path) {
                    error!("Backup of {} failed: {}", name, e);
                    item.state = ItemState::RetainedOnFailure;
                    return Ok((item, Outcome::Failed(format!("backup failed: {e}")), None));
                }
            }
        }

        let navigated = self.navigator.navigate();
        *retries = match &navigated {
            Ok(report) => report.retries,
            Err(_) => self.navigator.last_retries(),
        };
        let report = match navigated {
            Ok(report) if report.is_complete() => report,
            Ok(report) => {
                let msg = format!("navigation stopped at {:?}", report.final_state);
                error!("{} for {}", msg, name);
                item.state = ItemState::RetainedOnFailure;
                return Ok((item, Outcome::Failed(msg), Some(report)));
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!("Navigation failed for {}: {}", name, e);
                item.state = ItemState::RetainedOnFailure;
                return Ok((item, Outcome::Failed(e.to_string()), None));
            }
        };
        if !report.unconfirmed.is_empty() {
            warn!(
                "{} reached the order form with unconfirmed steps: {:?}",
                name, report.unconfirmed
            );
        }

        if self.dry_run {
            item.state = ItemState::Pending;
            return Ok((item, Outcome::Validated, Some(report)));
        }

        match self.store.move_to_completed(&item.path) {
            Ok(destination) => {
                item.state = ItemState::Completed;
                Ok((item, Outcome::Completed { destination }, Some(report)))
            }
            Err(e) => {
                error!("Could not move {} to completed: {}", name, e);
                item.state = ItemState::RetainedOnFailure;
                Ok((item, Outcome::Failed(e.to_string()), Some(report)))
            }
        }
    }

    /// Close the session, persist it and prune old backups.
    fn finish(&self, metrics: &mut MetricsSession) -> Result<(), AutomationError> {
        metrics.finish();
        if let Some(path) = &self.metrics_path {
            if !self.dry_run {
                metrics.persist(path)?;
            }
        }
        if let Some(backups) = &self.backups {
            if let Err(e) = backups.prune() {
                warn!("Backup pruning failed: {}", e);
            }
        }
        Ok(())
    }

    /// Process every document pending at the start of the pass, oldest first.
    ///
    /// A fatal error (fail-safe, configuration) stops the pass after the
    /// metrics for the documents already handled are written.
    #[instrument(skip(self))]
    pub fn process_pass(&mut self) -> Result<PassSummary, AutomationError> {
        let snapshot = self.store.pending()?;
        let mut metrics = MetricsSession::start();
        let mut results = Vec::with_capacity(snapshot.len());

        if snapshot.is_empty() {
            info!("No pending documents");
        } else {
            info!("Processing {} pending documents", snapshot.len());
        }

        for item in snapshot {
            let name = item.file_name();
            let started = Instant::now();
            let mut retries = 0;
            let step = self.process_one(item, &mut retries);
            let duration = started.elapsed();

            let (item, outcome, report) = match step {
                Ok(done) => done,
                Err(e) => {
                    error!("Stopping the pass at {}: {}", name, e);
                    metrics.record_failure(&name, duration, retries, e.to_string());
                    if let Err(persist) = self.finish(&mut metrics) {
                        error!("Could not write metrics for the aborted pass: {}", persist);
                    }
                    return Err(e);
                }
            };

            match &outcome {
                Outcome::Completed { .. } | Outcome::Validated => {
                    let unconfirmed = report
                        .as_ref()
                        .map(|r| r.unconfirmed.clone())
                        .unwrap_or_default();
                    metrics.record_success(&name, duration, retries, unconfirmed);
                    info!("{} processed in {:?}", name, duration);
                }
                Outcome::Rejected(v) => {
                    metrics.record_failure(&name, duration, retries, v.to_string())
                }
                Outcome::Failed(msg) => {
                    metrics.record_failure(&name, duration, retries, msg.clone())
                }
            }
            results.push(FileResult {
                item,
                outcome,
                duration,
                report,
            });
        }

        self.finish(&mut metrics)?;
        info!(
            "Pass finished: {} succeeded, {} failed",
            metrics.success_count, metrics.failure_count
        );
        Ok(PassSummary { results, metrics })
    }
}
