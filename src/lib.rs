//! rvsimd - RISC-V simulator session gateway
//!
//! Exposes a stateful assemble/step/run simulation service over a stateless
//! HTTP/JSON boundary by multiplexing concurrent client sessions onto
//! independent long-lived worker processes. The worker (the actual
//! assembler and cycle-level pipeline simulator) is an external program
//! spoken to over a two-line command protocol on stdin/stdout; everything
//! in this crate is the orchestration around it: session lifecycle, strict
//! per-session command serialization, response correlation, and the
//! pipeline → forwarding → branch-prediction feature dependency chain.

#![forbid(unsafe_code)]
#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod features;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod worker;

pub use config::Config;
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
