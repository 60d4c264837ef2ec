//! Configuration loading and management.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure.
///
/// Loaded from an optional JSON settings file; every field has a default so
/// a missing file or empty object yields a runnable configuration. CLI flags
/// override file values (see [`crate::cli::Cli::apply_to`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the worker binary (assembler + pipeline simulator).
    #[serde(alias = "workerPath")]
    pub worker_path: PathBuf,

    /// Extra arguments passed to every worker process.
    #[serde(alias = "workerArgs")]
    pub worker_args: Vec<String>,

    /// Address the HTTP listener binds to.
    #[serde(alias = "listenAddr")]
    pub listen_addr: String,

    /// Upper bound on the wait for one worker response.
    #[serde(alias = "responseTimeoutMs")]
    pub response_timeout_ms: u64,

    /// Grace window after the first diagnostic-stream line, letting
    /// multi-line assembler errors accumulate before they are reported.
    #[serde(alias = "diagnosticGraceMs")]
    pub diagnostic_grace_ms: u64,

    /// Sessions idle longer than this are evicted and their worker killed.
    #[serde(alias = "sessionTtlMs")]
    pub session_ttl_ms: u64,

    /// Interval between eviction sweeps.
    #[serde(alias = "sweepIntervalMs")]
    pub sweep_interval_ms: u64,

    /// Maximum number of live sessions; 0 means unlimited.
    #[serde(alias = "maxSessions")]
    pub max_sessions: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_path: PathBuf::from("./riscv-sim"),
            worker_args: Vec::new(),
            listen_addr: "127.0.0.1:3000".to_string(),
            response_timeout_ms: 5_000,
            diagnostic_grace_ms: 50,
            session_ttl_ms: 15 * 60 * 1_000,
            sweep_interval_ms: 30 * 1_000,
            max_sessions: 64,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, or defaults if `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path).map_err(|err| {
            Error::config(format!("cannot read {}: {err}", path.display()))
        })?;
        serde_json::from_str(&content)
            .map_err(|err| Error::config(format!("invalid {}: {err}", path.display())))
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn diagnostic_grace(&self) -> Duration {
        Duration::from_millis(self.diagnostic_grace_ms)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_millis(self.session_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}
