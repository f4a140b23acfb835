//! Filesystem queue: `pending/`, `completed/` and `backups/` under one root.
//!
//! Pending documents are served oldest first. A document leaves `pending/`
//! only when it is moved to `completed/`; failures stay where they are.

pub mod backup;
pub mod document;
pub mod metrics;
pub mod processor;

pub use backup::BackupManager;
pub use document::{validate, Buyer, OrderDocument, OrderItem, Scalar, ValidationError};
pub use metrics::{FileDuration, MetricsSession};
pub use processor::{FileResult, Outcome, PassSummary, QueueProcessor};

use crate::errors::AutomationError;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

pub const PENDING_DIR: &str = "pending";
pub const COMPLETED_DIR: &str = "completed";
pub const BACKUPS_DIR: &str = "backups";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ItemState {
    Pending,
    Processing,
    Completed,
    RetainedOnFailure,
}

/// A pending document as discovered at the start of a pass.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub path: PathBuf,
    /// Creation time, or modification time where the filesystem lacks it
    pub created: SystemTime,
    pub state: ItemState,
}

impl QueueItem {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub completed: usize,
    pub total_processed: usize,
}

fn created_at(meta: &fs::Metadata) -> SystemTime {
    meta.created()
        .or_else(|_| meta.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Oldest first, ties broken by file name.
pub fn fifo_sort(items: &mut [QueueItem]) {
    items.sort_by(|a, b| {
        a.created
            .cmp(&b.created)
            .then_with(|| a.file_name().cmp(&b.file_name()))
    });
}

fn is_document(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false)
}

fn count_files(dir: &Path, filter: impl Fn(&Path) -> bool) -> Result<usize, AutomationError> {
    if !dir.exists() {
        return Ok(0);
    }
    Ok(fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| filter(&e.path()))
        .count())
}

#[derive(Debug, Clone)]
pub struct QueueStore {
    root: PathBuf,
    pending: PathBuf,
    completed: PathBuf,
    backups: PathBuf,
}

impl QueueStore {
    /// Open the queue at `root`, creating its directories.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, AutomationError> {
        let root = root.into();
        let store = Self {
            pending: root.join(PENDING_DIR),
            completed: root.join(COMPLETED_DIR),
            backups: root.join(BACKUPS_DIR),
            root,
        };
        for dir in [&store.pending, &store.completed, &store.backups] {
            fs::create_dir_all(dir).map_err(|e| {
                AutomationError::Configuration(format!(
                    "Cannot create queue directory {}: {e}",
                    dir.display()
                ))
            })?;
        }
        debug!("Queue directories ready under {}", store.root.display());
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pending_dir(&self) -> &Path {
        &self.pending
    }

    pub fn completed_dir(&self) -> &Path {
        &self.completed
    }

    pub fn backups_dir(&self) -> &Path {
        &self.backups
    }

    /// Pending `*.json` documents in FIFO order.
    pub fn pending(&self) -> Result<Vec<QueueItem>, AutomationError> {
        let mut items = Vec::new();
        for entry in fs::read_dir(&self.pending)? {
            let path = entry?.path();
            if !is_document(&path) {
                continue;
            }
            let meta = fs::metadata(&path)?;
            items.push(QueueItem {
                created: created_at(&meta),
                path,
                state: ItemState::Pending,
            });
        }
        fifo_sort(&mut items);
        Ok(items)
    }

    pub fn has_pending(&self) -> Result<bool, AutomationError> {
        Ok(!self.pending()?.is_empty())
    }

    /// First free name in `completed/`: the original, then `name_1.ext`, `name_2.ext`, ...
    pub fn completed_destination(&self, file_name: &str) -> PathBuf {
        let original = self.completed.join(file_name);
        if !original.exists() {
            return original;
        }
        let path = Path::new(file_name);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let mut n = 1;
        loop {
            let candidate = self.completed.join(format!("{stem}_{n}{ext}"));
            if !candidate.exists() {
                return candidate;
            }
            n += 1;
        }
    }

    /// Move a document into `completed/` without overwriting anything there.
    pub fn move_to_completed(&self, source: &Path) -> Result<PathBuf, AutomationError> {
        if !source.is_file() {
            return Err(AutomationError::NotFound(format!(
                "Queue file {} no longer exists",
                source.display()
            )));
        }
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                AutomationError::Configuration(format!("{} has no file name", source.display()))
            })?;
        let destination = self.completed_destination(&file_name);

        if fs::rename(source, &destination).is_err() {
            // Different filesystem
            fs::copy(source, &destination)?;
            fs::remove_file(source)?;
        }
        info!(
            "Moved {} to completed as {}",
            file_name,
            destination
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        );
        Ok(destination)
    }

    pub fn status(&self) -> Result<QueueStatus, AutomationError> {
        let pending = count_files(&self.pending, is_document)?;
        let completed = count_files(&self.completed, |p| p.is_file())?;
        Ok(QueueStatus {
            pending,
            completed,
            total_processed: completed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn item(name: &str, secs: u64) -> QueueItem {
        QueueItem {
            path: PathBuf::from(name),
            created: SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
            state: ItemState::Pending,
        }
    }

    #[test]
    fn test_fifo_sort_by_time_then_name() {
        let mut items = vec![item("c.json", 1), item("b.json", 2), item("a.json", 2)];
        fifo_sort(&mut items);
        let names: Vec<_> = items.iter().map(|i| i.file_name()).collect();
        assert_eq!(names, vec!["c.json", "a.json", "b.json"]);
    }

    #[test]
    fn test_only_json_is_pending() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueStore::open(dir.path()).unwrap();
        fs::write(store.pending_dir().join("order.json"), "{}").unwrap();
        fs::write(store.pending_dir().join(".gitkeep"), "").unwrap();
        fs::write(store.pending_dir().join("notes.txt"), "x").unwrap();

        let pending = store.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].file_name(), "order.json");
        assert_eq!(store.status().unwrap().pending, 1);
    }

    #[test]
    fn test_collision_safe_move() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueStore::open(dir.path()).unwrap();
        fs::write(store.completed_dir().join("order.json"), "old").unwrap();
        fs::write(store.completed_dir().join("order_1.json"), "older").unwrap();

        let source = store.pending_dir().join("order.json");
        fs::write(&source, "new").unwrap();
        let dest = store.move_to_completed(&source).unwrap();

        assert_eq!(dest, store.completed_dir().join("order_2.json"));
        assert_eq!(fs::read_to_string(&dest).unwrap(), "new");
        assert_eq!(
            fs::read_to_string(store.completed_dir().join("order.json")).unwrap(),
            "old"
        );
        assert!(!source.exists());
    }

    #[test]
    fn test_move_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueStore::open(dir.path()).unwrap();
        let err = store
            .move_to_completed(&store.pending_dir().join("ghost.json"))
            .unwrap_err();
        assert!(matches!(err, AutomationError::NotFound(_)));
    }
}
