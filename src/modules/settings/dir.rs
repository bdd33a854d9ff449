// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use chrono::NaiveDateTime;
use tracing::warn;

use crate::modules::context::Initialize;
use crate::modules::settings::SETTINGS;
use crate::{
    modules::error::{code::ErrorCode, EngineResult},
    raise_error,
};
use std::path::PathBuf;
use std::sync::LazyLock;

pub const META_FILE: &str = "meta.db";
pub const TASK_FILE: &str = "tasks.db";
const LOG_DIR: &str = "logs";

pub static DATA_DIR_MANAGER: LazyLock<DataDirManager> =
    LazyLock::new(|| DataDirManager::new(PathBuf::from(&SETTINGS.root_dir)));

#[derive(Debug)]
pub struct DataDirManager {
    pub root_dir: PathBuf,
    pub meta_db: PathBuf,
    pub task_db: PathBuf,
    pub log_dir: PathBuf,
}

impl Initialize for DataDirManager {
    async fn initialize() -> EngineResult<()> {
        std::fs::create_dir_all(&DATA_DIR_MANAGER.root_dir)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        std::fs::create_dir_all(&DATA_DIR_MANAGER.log_dir)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        std::fs::create_dir_all(&SETTINGS.attachment_dir)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        std::fs::create_dir_all(&SETTINGS.dropbox_dir)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Ok(())
    }
}

impl DataDirManager {
    pub fn new(root_dir: PathBuf) -> Self {
        Self {
            meta_db: root_dir.join(META_FILE),
            task_db: root_dir.join(TASK_FILE),
            log_dir: root_dir.join(LOG_DIR),
            root_dir,
        }
    }

    /// Finds the most recent `<prefix>.<timestamp>.snapshot` file under `root_dir`,
    /// used to seed an in-memory database on startup.
    pub fn find_latest_snapshot_for(&self, db_prefix: &str) -> Option<PathBuf> {
        let pattern = format!("{}.*.snapshot", db_prefix);
        let pattern_path = self.root_dir.join(&pattern);
        let pattern_str = pattern_path.to_str()?;

        let mut dated_files: Vec<(NaiveDateTime, PathBuf)> = glob::glob(pattern_str)
            .ok()?
            .filter_map(Result::ok)
            .filter_map(|path| {
                let filename = path.file_name()?.to_str()?;
                let timestamp_str = filename
                    .strip_prefix(&format!("{}.", db_prefix))?
                    .strip_suffix(".snapshot")?;
                NaiveDateTime::parse_from_str(timestamp_str, "%Y-%m-%d-%H-%M")
                    .ok()
                    .map(|dt| (dt, path))
            })
            .collect();

        if dated_files.is_empty() {
            warn!("no snapshot files found for '{}'", db_prefix);
        }
        dated_files.sort_by(|a, b| b.0.cmp(&a.0));
        dated_files.into_iter().next().map(|(_, path)| path)
    }

    /// Returns the oldest snapshot for `db_prefix` plus the total count, used by the
    /// periodic snapshot task to decide whether retention pruning is needed.
    pub fn find_oldest_snapshot_for(&self, db_prefix: &str) -> Option<SnapshotScanResult> {
        let pattern = format!("{}.*.snapshot", db_prefix);
        let pattern_path = self.root_dir.join(&pattern);
        let pattern_str = pattern_path.to_str()?;

        let mut dated_files: Vec<(NaiveDateTime, PathBuf)> = glob::glob(pattern_str)
            .ok()?
            .filter_map(Result::ok)
            .filter_map(|path| {
                let filename = path.file_name()?.to_str()?;
                let timestamp_str = filename
                    .strip_prefix(&format!("{}.", db_prefix))?
                    .strip_suffix(".snapshot")?;
                NaiveDateTime::parse_from_str(timestamp_str, "%Y-%m-%d-%H-%M")
                    .ok()
                    .map(|dt| (dt, path))
            })
            .collect();

        let total = dated_files.len();
        dated_files.sort_by(|a, b| a.0.cmp(&b.0));
        let oldest = dated_files.into_iter().next().map(|(_, path)| path);
        Some(SnapshotScanResult { path: oldest, total })
    }
}

pub struct SnapshotScanResult {
    pub path: Option<PathBuf>,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::path::Path;
    use tempfile::tempdir;

    fn create_test_snapshot(dir: &Path, db_prefix: &str, timestamp: &str) {
        let filename = format!("{}.{}.snapshot", db_prefix, timestamp);
        File::create(dir.join(filename)).unwrap();
    }

    #[test]
    fn test_find_latest_snapshot_with_valid_files() {
        let temp_dir = tempdir().unwrap();
        let manager = DataDirManager::new(temp_dir.path().to_path_buf());

        create_test_snapshot(temp_dir.path(), "meta.db", "2025-07-03-16-44");
        create_test_snapshot(temp_dir.path(), "meta.db", "2025-07-03-17-04");

        let latest = manager.find_latest_snapshot_for("meta.db").unwrap();
        assert!(latest.ends_with("meta.db.2025-07-03-17-04.snapshot"));
    }

    #[test]
    fn test_find_latest_snapshot_with_empty_dir() {
        let temp_dir = tempdir().unwrap();
        let manager = DataDirManager::new(temp_dir.path().to_path_buf());

        assert!(manager.find_latest_snapshot_for("meta.db").is_none());
    }
}
