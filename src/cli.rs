//! CLI argument parsing using Clap.

use crate::config::Config;
use clap::Parser;
use std::path::PathBuf;

/// rvsimd - RISC-V simulator session gateway
#[derive(Parser, Debug)]
#[command(name = "rvsimd")]
#[command(version, about, long_about = None)]
#[command(after_help = "Examples:
  rvsimd --worker ./riscv-sim                 Serve on the default address
  rvsimd --listen 0.0.0.0:3000                Expose to the network
  rvsimd --config settings.json               Load settings from a file
  rvsimd --timeout-ms 2000 --max-sessions 16  Tighten limits
")]
pub struct Cli {
    /// Path to a JSON settings file
    #[arg(long, env = "RVSIMD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "RVSIMD_LISTEN")]
    pub listen: Option<String>,

    /// Path to the worker binary (assembler + simulator)
    #[arg(long, env = "RVSIMD_WORKER")]
    pub worker: Option<PathBuf>,

    /// Extra argument passed to every worker (can use multiple times)
    #[arg(long, action = clap::ArgAction::Append, allow_hyphen_values = true)]
    pub worker_arg: Vec<String>,

    /// Upper bound on the wait for one worker response, in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Evict sessions idle longer than this, in milliseconds
    #[arg(long)]
    pub session_ttl_ms: Option<u64>,

    /// Interval between eviction sweeps, in milliseconds
    #[arg(long)]
    pub sweep_interval_ms: Option<u64>,

    /// Maximum number of live sessions (0 = unlimited)
    #[arg(long)]
    pub max_sessions: Option<usize>,
}

impl Cli {
    /// Overlay CLI flags onto a loaded configuration.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(listen) = &self.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(worker) = &self.worker {
            config.worker_path = worker.clone();
        }
        if !self.worker_arg.is_empty() {
            config.worker_args = self.worker_arg.clone();
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.response_timeout_ms = timeout_ms;
        }
        if let Some(ttl) = self.session_ttl_ms {
            config.session_ttl_ms = ttl;
        }
        if let Some(sweep) = self.sweep_interval_ms {
            config.sweep_interval_ms = sweep;
        }
        if let Some(max) = self.max_sessions {
            config.max_sessions = max;
        }
    }
}
