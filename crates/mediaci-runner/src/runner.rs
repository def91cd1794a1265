//! Runner configuration and output types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Output line from command execution.
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub content: String,
    pub line_number: u32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Configuration for command execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Directory every command workdir is resolved against.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    /// Kill commands running longer than this.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: Option<u64>,
    /// Lines of output kept in the step log. Older lines are dropped.
    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize,
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_timeout_seconds() -> Option<u64> {
    Some(3600 * 3)
}

fn default_max_log_lines() -> usize {
    10_000
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            timeout_seconds: default_timeout_seconds(),
            max_log_lines: default_max_log_lines(),
        }
    }
}

impl RunnerConfig {
    pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = root_dir.into();
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: Option<u64>) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}
