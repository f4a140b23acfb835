use crate::errors::AutomationError;
use chrono::Local;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Timestamped copies of documents taken before they are processed.
#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
    compress: bool,
    max_backups: usize,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>, compress: bool, max_backups: usize) -> Self {
        Self {
            dir: dir.into(),
            compress,
            max_backups,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn target_for(&self, source: &Path) -> PathBuf {
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());
        let stamp = Local::now().format("%Y%m%d_%H%M%S_%3f");
        let suffix = if self.compress { ".gz" } else { "" };

        let mut candidate = self.dir.join(format!("{stamp}_{file_name}{suffix}"));
        let mut n = 1;
        while candidate.exists() {
            candidate = self
                .dir
                .join(format!("{stamp}_{n}_{file_name}{suffix}"));
            n += 1;
        }
        candidate
    }

    /// Copy `source` into the backup directory, gzip-compressed if configured.
    pub fn snapshot(&self, source: &Path) -> Result<PathBuf, AutomationError> {
        fs::create_dir_all(&self.dir)?;
        let target = self.target_for(source);
        if self.compress {
            let mut input = File::open(source)?;
            let mut encoder = GzEncoder::new(File::create(&target)?, Compression::default());
            io::copy(&mut input, &mut encoder)?;
            encoder.finish()?;
        } else {
            fs::copy(source, &target)?;
        }
        debug!("Backed up {} to {}", source.display(), target.display());
        Ok(target)
    }

    /// Backup files, oldest first.
    pub fn list(&self) -> Result<Vec<PathBuf>, AutomationError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect::<Vec<_>>();
        // Names start with a sortable timestamp
        files.sort();
        Ok(files)
    }

    /// Delete the oldest backups beyond `max_backups`. Returns how many were removed.
    pub fn prune(&self) -> Result<usize, AutomationError> {
        let files = self.list()?;
        if files.len() <= self.max_backups {
            return Ok(0);
        }
        let excess = files.len() - self.max_backups;
        let mut removed = 0;
        for path in files.into_iter().take(excess) {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Could not prune backup {}: {}", path.display(), e),
            }
        }
        info!("Pruned {} old backups", removed);
        Ok(removed)
    }
}
