pub mod check;
pub mod run;

use std::path::{Path, PathBuf};

/// Deployment file name looked up in the target when `--config` is absent.
pub const DEFAULT_CONFIG: &str = "portalsync.yaml";

/// Deployment file for `target`.
pub fn config_path(target: &Path, config: Option<PathBuf>) -> PathBuf {
    config.unwrap_or_else(|| target.join(DEFAULT_CONFIG))
}
