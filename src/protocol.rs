//! Command/response codec for the worker line protocol.
//!
//! A command is transmitted as two lines on the worker's stdin: a bare
//! command-name line followed by one line holding a JSON payload object.
//! Only `assemble` has a non-empty payload. The worker replies with exactly
//! one JSON object on one line of its stdout; arbitrary text on stderr
//! signals failure (assembler diagnostics travel that way).

use crate::error::{Error, Result};
use crate::features::Feature;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A single line-protocol exchange with the worker.
#[derive(Debug, Clone)]
pub enum Command<'a> {
    /// Assemble source text, resetting simulator-visible state.
    Assemble { input_code: &'a str },
    /// Advance the simulation by one clock cycle (or one instruction when
    /// pipelining is off).
    Step,
    /// Run the program to completion.
    Run,
    /// Flip one feature toggle.
    Toggle(Feature),
}

impl Command<'_> {
    /// Command-name line.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Assemble { .. } => "assemble",
            Self::Step => "step",
            Self::Run => "run",
            Self::Toggle(feature) => feature.wire_name(),
        }
    }

    /// Payload line. Commands other than `assemble` carry no payload beyond
    /// the name line but still send an empty object so the framing stays
    /// two lines per command.
    pub fn payload(&self) -> Value {
        match self {
            Self::Assemble { input_code } => json!({ "input_code": input_code }),
            _ => json!({}),
        }
    }

    /// Encode to the two-line wire form (both lines newline-terminated).
    pub fn encode(&self) -> Result<String> {
        let payload = serde_json::to_string(&self.payload())?;
        Ok(format!("{}\n{}\n", self.wire_name(), payload))
    }
}

/// One `{pc, machineCode}` pair from the assembled instruction list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssembledInstruction {
    pub pc: String,
    #[serde(rename = "machineCode")]
    pub machine_code: String,
}

/// Result of an `assemble` command.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AssembleResponse {
    #[serde(default)]
    pub machine_code: Vec<AssembledInstruction>,
    #[serde(default)]
    pub data_segment: Map<String, Value>,
}

/// Aggregate statistics reported by `run`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RunStats {
    pub instructions: u64,
    pub hazards: u64,
    pub bubbles: u64,
    pub mispredictions: u64,
}

/// Simulator state snapshot returned by `step`, `run`, and every toggle.
///
/// `RA`/`RB`/`RY`/`RZ`/`RM` are the inter-stage pipeline latches; the worker
/// reports them upper-case, clients receive them lower-case.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecSnapshot {
    #[serde(default)]
    pub data_segment: Map<String, Value>,
    #[serde(default)]
    pub stack: Map<String, Value>,
    #[serde(default)]
    pub registers: Map<String, Value>,
    #[serde(default)]
    pub clock_cycles: u64,
    #[serde(default)]
    pub comment: String,
    /// Stage label → program counter currently occupying that stage.
    #[serde(default)]
    pub pipeline_status: Map<String, Value>,
    #[serde(default)]
    pub data_forward_path: Value,
    #[serde(rename = "ra", alias = "RA", default)]
    pub ra: Value,
    #[serde(rename = "rb", alias = "RB", default)]
    pub rb: Value,
    #[serde(rename = "ry", alias = "RY", default)]
    pub ry: Value,
    #[serde(rename = "rz", alias = "RZ", default)]
    pub rz: Value,
    #[serde(rename = "rm", alias = "RM", default)]
    pub rm: Value,
    /// Present on `run` responses only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<RunStats>,
}

/// Decode an `assemble` reply.
pub fn decode_assemble(value: Value) -> Result<AssembleResponse> {
    let raw = value.to_string();
    serde_json::from_value(value).map_err(|_| Error::protocol(raw))
}

/// Decode a `step`/`run`/toggle reply.
pub fn decode_snapshot(value: Value) -> Result<ExecSnapshot> {
    let raw = value.to_string();
    serde_json::from_value(value).map_err(|_| Error::protocol(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_encodes_two_lines_with_escaped_source() {
        let cmd = Command::Assemble {
            input_code: "addi x5,x0,1\naddi x6,x0,2",
        };
        let wire = cmd.encode().unwrap();
        let mut lines = wire.lines();
        assert_eq!(lines.next(), Some("assemble"));
        let payload: Value = serde_json::from_str(lines.next().unwrap()).unwrap();
        // The embedded newline must be escaped into the single payload line.
        assert_eq!(payload["input_code"], "addi x5,x0,1\naddi x6,x0,2");
        assert_eq!(lines.next(), None);
        assert!(wire.ends_with('\n'));
    }

    #[test]
    fn non_assemble_commands_carry_empty_payload() {
        for (cmd, name) in [
            (Command::Step, "step"),
            (Command::Run, "run"),
            (Command::Toggle(Feature::Pipeline), "pipeline"),
            (Command::Toggle(Feature::DataForwarding), "data_forward"),
            (Command::Toggle(Feature::BranchPrediction), "branch_prediction"),
        ] {
            assert_eq!(cmd.encode().unwrap(), format!("{name}\n{{}}\n"));
        }
    }

    #[test]
    fn decode_assemble_reply() {
        let reply = json!({
            "machine_code": [
                {"pc": "0x0", "machineCode": "0x00100293"},
                {"pc": "0x4", "machineCode": "0x00200313"},
            ],
            "data_segment": {"0x10000000": "0x5"},
        });
        let decoded = decode_assemble(reply).unwrap();
        assert_eq!(decoded.machine_code.len(), 2);
        assert_eq!(decoded.machine_code[0].pc, "0x0");
        assert_eq!(decoded.data_segment["0x10000000"], "0x5");
    }

    #[test]
    fn decode_snapshot_maps_latches_to_lowercase() {
        let reply = json!({
            "data_segment": {},
            "stack": {},
            "registers": {"x7": "0x3"},
            "clock_cycles": 12,
            "comment": "add executed",
            "pipeline_status": {"execute": "0x8"},
            "data_forward_path": null,
            "RA": "0x1",
            "RB": "0x2",
            "RY": "0x3",
            "RZ": "0x3",
            "RM": "0x0",
        });
        let snap = decode_snapshot(reply).unwrap();
        assert_eq!(snap.clock_cycles, 12);
        assert_eq!(snap.ra, json!("0x1"));
        assert_eq!(snap.rm, json!("0x0"));

        let out = serde_json::to_value(&snap).unwrap();
        assert_eq!(out["ra"], "0x1");
        assert!(out.get("RA").is_none());
        assert!(out.get("stats").is_none());
    }

    #[test]
    fn decode_run_snapshot_keeps_stats() {
        let reply = json!({
            "registers": {},
            "clock_cycles": 40,
            "stats": {"instructions": 9, "hazards": 2, "bubbles": 2, "mispredictions": 1},
        });
        let snap = decode_snapshot(reply).unwrap();
        let stats = snap.stats.unwrap();
        assert_eq!(stats.instructions, 9);
        assert_eq!(stats.mispredictions, 1);
    }

    #[test]
    fn decode_failure_carries_raw_text() {
        let err = decode_assemble(json!("definitely not an object")).unwrap_err();
        match err {
            Error::Protocol { raw } => assert!(raw.contains("definitely not an object")),
            other => panic!("expected protocol error, got {other:?}"),
        }
    }
}
