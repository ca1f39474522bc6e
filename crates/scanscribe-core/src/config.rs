/// Scan configuration.
///
/// `ScanOptions` is what the front end hands to [`crate::scanner::start_scan`].
/// It can be deserialised from a JSON file and then overridden from the
/// command line.
use crate::error::ScanError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Options for one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Directory to scan.
    pub root: PathBuf,

    /// File the streamed scan is written to.
    pub output: PathBuf,

    /// Include dot-prefixed entries.
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Collect `Owner` / `UserRights` attributes.
    #[serde(default = "default_true")]
    pub collect_security: bool,

    /// Maximum records buffered per sink before the producer blocks.
    /// `None` keeps the queues unbounded.
    #[serde(default)]
    pub queue_capacity: Option<usize>,
}

fn default_true() -> bool {
    true
}

impl ScanOptions {
    /// Options with defaults for everything but the two paths.
    pub fn new(root: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output: output.into(),
            include_hidden: true,
            collect_security: true,
            queue_capacity: None,
        }
    }

    /// Load options from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ScanError> {
        let text = std::fs::read_to_string(path).map_err(|e| ScanError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| ScanError::InvalidConfig {
            message: format!("{}: {e}", path.display()),
        })
    }

    /// Reject options that cannot produce a scan.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.root.as_os_str().is_empty() {
            return Err(invalid("root path cannot be empty"));
        }
        if self.output.as_os_str().is_empty() {
            return Err(invalid("output path cannot be empty"));
        }
        if self.queue_capacity == Some(0) {
            return Err(invalid("queue capacity must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> ScanError {
    ScanError::InvalidConfig {
        message: message.to_owned(),
    }
}
