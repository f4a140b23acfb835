use crate::errors::AutomationError;
use crate::navigation::NavigationState;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDuration {
    pub file: String,
    pub success: bool,
    pub duration_ms: u64,
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Soft-gated states that were not confirmed on screen
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unconfirmed: Vec<NavigationState>,
}

/// Counters for one processing session. Written once at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSession {
    pub start_time: DateTime<Local>,
    pub end_time: Option<DateTime<Local>>,
    pub total_processed: u32,
    pub success_count: u32,
    pub failure_count: u32,
    pub retry_count: u32,
    pub per_file_durations: Vec<FileDuration>,
}

impl Default for MetricsSession {
    fn default() -> Self {
        Self::start()
    }
}

impl MetricsSession {
    pub fn start() -> Self {
        Self {
            start_time: Local::now(),
            end_time: None,
            total_processed: 0,
            success_count: 0,
            failure_count: 0,
            retry_count: 0,
            per_file_durations: Vec::new(),
        }
    }

    pub fn record_success(
        &mut self,
        file: &str,
        duration: Duration,
        retries: u32,
        unconfirmed: Vec<NavigationState>,
    ) {
        self.total_processed += 1;
        self.success_count += 1;
        self.retry_count += retries;
        self.per_file_durations.push(FileDuration {
            file: file.to_string(),
            success: true,
            duration_ms: duration.as_millis() as u64,
            retries,
            error: None,
            unconfirmed,
        });
    }

    pub fn record_failure(&mut self, file: &str, duration: Duration, retries: u32, error: String) {
        self.total_processed += 1;
        self.failure_count += 1;
        self.retry_count += retries;
        self.per_file_durations.push(FileDuration {
            file: file.to_string(),
            success: false,
            duration_ms: duration.as_millis() as u64,
            retries,
            error: Some(error),
            unconfirmed: Vec::new(),
        });
    }

    pub fn finish(&mut self) {
        self.end_time = Some(Local::now());
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_processed == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.total_processed as f64
    }

    /// Overwrite `path` with this session as pretty JSON.
    pub fn persist(&self, path: &Path) -> Result<(), AutomationError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        info!("Metrics written to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, AutomationError> {
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let mut first = MetricsSession::start();
        first.record_failure("a.json", Duration::from_millis(5), 2, "boom".into());
        first.finish();
        first.persist(&path).unwrap();

        let mut second = MetricsSession::start();
        second.record_success(
            "b.json",
            Duration::from_millis(1500),
            1,
            vec![NavigationState::SalesOpen],
        );
        second.finish();
        second.persist(&path).unwrap();

        let loaded = MetricsSession::load(&path).unwrap();
        assert_eq!(loaded.total_processed, 1);
        assert_eq!(loaded.success_count, 1);
        assert_eq!(loaded.retry_count, 1);
        assert_eq!(loaded.per_file_durations[0].duration_ms, 1500);
        assert!(loaded.end_time.is_some());
        assert_eq!(loaded.success_rate(), 1.0);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"successCount\""));
        assert!(raw.contains("\"perFileDurations\""));
    }
}
