//! Batch target directory layout.
//!
//! ```text
//! <target>/
//!   list/        service definitions (*.yaml, *.yml)
//!   data/        working copies, replica containers, artifacts
//!   data/history previous run's data/ when rebuilding
//!   logs/        batch summary logs and the notification outbox
//!   TO_DELETE/   per-service diagnostic logs, removed after the batch
//! ```

use std::io;
use std::path::{Path, PathBuf};

const LIST_DIR: &str = "list";
const DATA_DIR: &str = "data";
const HISTORY_DIR: &str = "history";
const LOG_DIR: &str = "logs";
const TEMP_DIR: &str = "TO_DELETE";
const OUTBOX_DIR: &str = "outbox";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchWorkspace {
    root: PathBuf,
}

fn reset_dir(dir: &Path) -> io::Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)?;
    }
    std::fs::create_dir_all(dir)
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

impl BatchWorkspace {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn list_dir(&self) -> PathBuf {
        self.root.join(LIST_DIR)
    }

    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    #[must_use]
    pub fn history_dir(&self) -> PathBuf {
        self.data_dir().join(HISTORY_DIR)
    }

    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.root.join(LOG_DIR)
    }

    #[must_use]
    pub fn outbox_dir(&self) -> PathBuf {
        self.log_dir().join(OUTBOX_DIR)
    }

    #[must_use]
    pub fn temp_dir(&self) -> PathBuf {
        self.root.join(TEMP_DIR)
    }

    /// Default portal label: the target's parent directory name.
    #[must_use]
    pub fn portal_label(&self) -> String {
        self.root
            .parent()
            .and_then(dir_name)
            .unwrap_or_default()
    }

    /// Default folder label: the target directory name.
    #[must_use]
    pub fn folder_label(&self) -> String {
        dir_name(&self.root).unwrap_or_default()
    }

    /// Create the layout and reset the temp directory. When `rebuild` is set,
    /// the previous run's data is rotated into `data/history`.
    ///
    /// # Errors
    ///
    /// Returns any I/O error hit while creating or moving directories.
    pub fn prepare(&self, rebuild: bool) -> io::Result<()> {
        std::fs::create_dir_all(self.list_dir())?;
        std::fs::create_dir_all(self.data_dir())?;
        std::fs::create_dir_all(self.log_dir())?;
        reset_dir(&self.temp_dir())?;
        if rebuild {
            self.rotate_history()?;
        }
        Ok(())
    }

    fn rotate_history(&self) -> io::Result<()> {
        let history = self.history_dir();
        reset_dir(&history)?;
        for entry in std::fs::read_dir(self.data_dir())? {
            let entry = entry?;
            if entry.file_name() == HISTORY_DIR {
                continue;
            }
            std::fs::rename(entry.path(), history.join(entry.file_name()))?;
        }
        tracing::info!(history = %history.display(), "Rotated previous data into history");
        Ok(())
    }

    /// Service definition files in `list/`, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if `list/` cannot be read.
    pub fn service_definitions(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(self.list_dir())? {
            let path = entry?.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
            if is_yaml && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Remove the temp directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be removed.
    pub fn cleanup(&self) -> io::Result<()> {
        let temp = self.temp_dir();
        if temp.exists() {
            std::fs::remove_dir_all(temp)?;
        }
        Ok(())
    }
}
