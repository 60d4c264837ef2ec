//! Shared test harness: a fake worker speaking the real line protocol.
//!
//! The fake is a small shell script reading command-name + payload line
//! pairs from stdin and answering with one JSON object per line, exactly
//! like the real assembler/simulator. Each received command name is
//! appended to a log file so tests can audit the exact worker exchanges
//! (cascade order, rejected toggles never reaching the worker, and so on).

#![allow(dead_code)]

use rvsimd::{Config, Dispatcher};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Default behavior: stateful clock-cycle counter, per-process identity in
/// the register map (so tests can tell two workers apart), canned machine
/// code, and an assembler diagnostic when the source contains `bad`.
pub const DEFAULT_BEHAVIOR: &str = r#"
cycles=0
while IFS= read -r cmd; do
    IFS= read -r payload || payload='{}'
    if [ -n "$LOG" ]; then printf '%s\n' "$cmd" >> "$LOG"; fi
    case "$cmd" in
        assemble)
            case "$payload" in
                *bad*) printf 'line 1: unknown opcode `bad`\n' >&2 ;;
                *)
                    cycles=0
                    printf '{"machine_code":[{"pc":"0x0","machineCode":"0x00100293"},{"pc":"0x4","machineCode":"0x00200313"},{"pc":"0x8","machineCode":"0x006283b3"}],"data_segment":{"0x10000000":"0x0"}}\n'
                    ;;
            esac
            ;;
        step)
            cycles=$((cycles+1))
            printf '{"data_segment":{},"stack":{},"registers":{"worker":"%s"},"clock_cycles":%s,"comment":"stepped","pipeline_status":{"fetch":"0x4"},"data_forward_path":null,"RA":"0x0","RB":"0x0","RY":"0x0","RZ":"0x0","RM":"0x0"}\n' "$$" "$cycles"
            ;;
        run)
            cycles=$((cycles+10))
            printf '{"data_segment":{},"stack":{},"registers":{"worker":"%s","x7":"0x3"},"clock_cycles":%s,"comment":"ran to completion","pipeline_status":{},"data_forward_path":null,"RA":"0x0","RB":"0x0","RY":"0x0","RZ":"0x0","RM":"0x0","stats":{"instructions":3,"hazards":1,"bubbles":1,"mispredictions":0}}\n' "$$" "$cycles"
            ;;
        pipeline|data_forward|branch_prediction)
            printf '{"data_segment":{},"stack":{},"registers":{"worker":"%s"},"clock_cycles":%s,"comment":"toggled %s","pipeline_status":{},"data_forward_path":null,"RA":"0x0","RB":"0x0","RY":"0x0","RZ":"0x0","RM":"0x0"}\n' "$$" "$cycles" "$cmd"
            ;;
    esac
done
"#;

/// Like the default but `step` kills the process.
pub const CRASH_ON_STEP: &str = r#"
while IFS= read -r cmd; do
    IFS= read -r payload || payload='{}'
    if [ -n "$LOG" ]; then printf '%s\n' "$cmd" >> "$LOG"; fi
    case "$cmd" in
        assemble)
            printf '{"machine_code":[{"pc":"0x0","machineCode":"0x00100293"}],"data_segment":{}}\n'
            ;;
        step) exit 3 ;;
        pipeline|data_forward|branch_prediction)
            printf '{"data_segment":{},"stack":{},"registers":{},"clock_cycles":0,"comment":"toggled","pipeline_status":{},"data_forward_path":null,"RA":"0x0","RB":"0x0","RY":"0x0","RZ":"0x0","RM":"0x0"}\n'
            ;;
    esac
done
"#;

/// Like the default but `step` never answers.
pub const SILENT_STEP: &str = r#"
while IFS= read -r cmd; do
    IFS= read -r payload || payload='{}'
    case "$cmd" in
        assemble)
            printf '{"machine_code":[{"pc":"0x0","machineCode":"0x00100293"}],"data_segment":{}}\n'
            ;;
        step) : ;;
        run)
            printf '{"data_segment":{},"stack":{},"registers":{},"clock_cycles":40,"comment":"ran","pipeline_status":{},"data_forward_path":null,"RA":"0x0","RB":"0x0","RY":"0x0","RZ":"0x0","RM":"0x0","stats":{"instructions":1,"hazards":0,"bubbles":0,"mispredictions":0}}\n'
            ;;
    esac
done
"#;

/// Like the default but `step` prints something that is not JSON.
pub const GARBAGE_STEP: &str = r#"
while IFS= read -r cmd; do
    IFS= read -r payload || payload='{}'
    case "$cmd" in
        assemble)
            printf '{"machine_code":[{"pc":"0x0","machineCode":"0x00100293"}],"data_segment":{}}\n'
            ;;
        step) printf 'not json at all\n' ;;
        run)
            printf '{"data_segment":{},"stack":{},"registers":{},"clock_cycles":40,"comment":"ran","pipeline_status":{},"data_forward_path":null,"RA":"0x0","RB":"0x0","RY":"0x0","RZ":"0x0","RM":"0x0"}\n'
            ;;
    esac
done
"#;

pub struct FakeWorker {
    _dir: TempDir,
    pub script: PathBuf,
    pub log: PathBuf,
}

impl FakeWorker {
    pub fn install() -> Self {
        Self::with_behavior(DEFAULT_BEHAVIOR)
    }

    pub fn with_behavior(body: &str) -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        let script = dir.path().join("worker.sh");
        let log = dir.path().join("commands.log");
        fs::write(&script, format!("#!/bin/sh\nLOG=\"$1\"\n{body}")).expect("write script");
        let mut perms = fs::metadata(&script).expect("stat script").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script, perms).expect("chmod script");
        Self {
            _dir: dir,
            script,
            log,
        }
    }

    /// Configuration pointing at this fake, with test-friendly timings.
    pub fn config(&self) -> Config {
        Config {
            worker_path: self.script.clone(),
            worker_args: vec![self.log.display().to_string()],
            response_timeout_ms: 2_000,
            diagnostic_grace_ms: 50,
            session_ttl_ms: 60_000,
            sweep_interval_ms: 60_000,
            ..Config::default()
        }
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher_with(self.config())
    }

    pub fn dispatcher_with(&self, config: Config) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(Arc::new(config)))
    }

    /// Every command name any worker spawned from this fake has received,
    /// in order.
    pub fn logged_commands(&self) -> Vec<String> {
        match fs::read_to_string(&self.log) {
            Ok(content) => content.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }
}

pub const PROGRAM: &str = "addi x5,x0,1\naddi x6,x0,2\nadd x7,x5,x6";
