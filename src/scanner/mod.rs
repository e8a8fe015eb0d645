//! Record file discovery.
//!
//! Lists the run record files directly inside a results directory. The
//! listing is lazy and unordered; callers must not depend on its order.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Configuration for record discovery.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Extension (without dot) a record file name must end in.
    pub extension: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extension: "json".to_string(),
        }
    }
}

impl From<&crate::config::AggregateConfig> for ScanConfig {
    fn from(config: &crate::config::AggregateConfig) -> Self {
        Self {
            extension: config.extension.trim_start_matches('.').to_string(),
        }
    }
}

/// Scanner over one results directory.
pub struct RecordScanner {
    config: ScanConfig,
    root: PathBuf,
}

impl RecordScanner {
    /// Create a new scanner.
    pub fn new(root: PathBuf, config: ScanConfig) -> Self {
        Self { config, root }
    }

    /// Lazily yield every matching file directly inside the root.
    ///
    /// Subdirectories are not descended into.
    pub fn files(&self) -> impl Iterator<Item = Result<PathBuf>> + '_ {
        WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && self.matches(entry.path()) {
                        Some(Ok(entry.into_path()))
                    } else {
                        debug!("Ignoring {}", entry.path().display());
                        None
                    }
                }
                Err(e) => Some(Err(e).with_context(|| {
                    format!("Failed to list directory: {}", self.root.display())
                })),
            })
    }

    /// Check if a file name carries the record extension.
    pub fn matches(&self, path: &Path) -> bool {
        let suffix = format!(".{}", self.config.extension);
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|name| name.ends_with(&suffix))
            .unwrap_or(false)
    }
}
