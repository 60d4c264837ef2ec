//! Command dispatcher: top-level entry point, one operation per command.
//!
//! Every operation follows the same template: resolve the session
//! (create-if-absent only for `assemble`, lookup-or-fail for everything
//! else), take the session's exclusive command lock, validate, issue the
//! command, decode the reply. The lock is mandatory: the worker has a
//! single untagged output stream, so two in-flight commands on one session
//! would interleave and decode garbage. Commands queue on the fair mutex
//! and execute strictly in arrival order.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::features::{Feature, FeatureState};
use crate::protocol::{
    decode_assemble, decode_snapshot, AssembleResponse, Command, ExecSnapshot,
};
use crate::registry::SessionRegistry;
use crate::session::SessionInner;
use crate::worker::WorkerHandle;
use serde_json::Value;
use std::sync::Arc;

/// Result of an `assemble`: the session id to echo back plus the decoded
/// worker reply.
#[derive(Debug)]
pub struct AssembleOutcome {
    pub id: String,
    pub response: AssembleResponse,
}

pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
    config: Arc<Config>,
}

impl Dispatcher {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            registry: SessionRegistry::new(Arc::clone(&config)),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub async fn session_count(&self) -> usize {
        self.registry.len().await
    }

    /// Assemble source text. Creates a session (and worker) when `id` is
    /// absent or unknown; on a known session the worker resets its
    /// simulator-visible state but the recorded feature flags survive. A
    /// session whose worker died gets a fresh worker and all-false flags.
    pub async fn assemble(&self, id: Option<&str>, code: &str) -> Result<AssembleOutcome> {
        let (session, is_new) = self.registry.get_or_create(id).await?;
        session.touch(self.registry.epoch());
        let mut inner = session.lock().await;

        if !is_new && inner.worker.is_dead() {
            tracing::info!(session = %session.id, "respawning dead worker for re-assemble");
            inner.worker = WorkerHandle::spawn(&self.config)?;
            inner.features = FeatureState::default();
            inner.suspect = false;
        }

        let value = self
            .issue(&mut inner, &Command::Assemble { input_code: code })
            .await?;
        session.touch(self.registry.epoch());
        Ok(AssembleOutcome {
            id: session.id.clone(),
            response: decode_assemble(value)?,
        })
    }

    /// Advance the simulation by one step.
    pub async fn step(&self, id: &str) -> Result<ExecSnapshot> {
        self.exec(id, Command::Step).await
    }

    /// Run the program to completion.
    pub async fn run(&self, id: &str) -> Result<ExecSnapshot> {
        self.exec(id, Command::Run).await
    }

    pub async fn set_pipeline(&self, id: &str, enabled: bool) -> Result<ExecSnapshot> {
        self.toggle(id, Feature::Pipeline, enabled).await
    }

    pub async fn set_data_forwarding(&self, id: &str, enabled: bool) -> Result<ExecSnapshot> {
        self.toggle(id, Feature::DataForwarding, enabled).await
    }

    pub async fn set_branch_prediction(&self, id: &str, enabled: bool) -> Result<ExecSnapshot> {
        self.toggle(id, Feature::BranchPrediction, enabled).await
    }

    /// Destroy the session and kill its worker.
    pub async fn reset(&self, id: &str) -> Result<()> {
        self.registry.destroy(id).await
    }

    async fn exec(&self, id: &str, command: Command<'_>) -> Result<ExecSnapshot> {
        let session = self.registry.lookup(id).await?;
        session.touch(self.registry.epoch());
        let mut inner = session.lock().await;
        ensure_live(&mut inner)?;
        let value = self.issue(&mut inner, &command).await?;
        session.touch(self.registry.epoch());
        decode_snapshot(value)
    }

    async fn toggle(&self, id: &str, feature: Feature, enabled: bool) -> Result<ExecSnapshot> {
        let session = self.registry.lookup(id).await?;
        session.touch(self.registry.epoch());
        let mut inner = session.lock().await;
        ensure_live(&mut inner)?;

        // Validated against the lattice before any worker contact; a
        // disable may first flip dependent features off, one worker command
        // each, before the requested flip itself.
        let cascade = inner.features.plan(feature, enabled)?;
        for step in cascade {
            self.issue(&mut inner, &Command::Toggle(step)).await?;
            inner.features = inner.features.apply_flip(step);
        }
        let value = self.issue(&mut inner, &Command::Toggle(feature)).await?;
        inner.features = inner.features.apply_flip(feature);
        session.touch(self.registry.epoch());

        decode_snapshot(value)
    }

    /// Issue one command on the locked session, recording timeout suspicion.
    async fn issue(&self, inner: &mut SessionInner, command: &Command<'_>) -> Result<Value> {
        let result = inner
            .worker
            .request(
                command,
                self.config.response_timeout(),
                self.config.diagnostic_grace(),
            )
            .await;
        if matches!(result, Err(Error::WorkerTimeout(_))) {
            inner.suspect = true;
        }
        result
    }
}

/// Revalidate a session before use. A suspect session (previous command
/// timed out) is trusted again only if its worker is still running; a dead
/// worker means the caller must re-assemble.
fn ensure_live(inner: &mut SessionInner) -> Result<()> {
    if inner.worker.is_dead() {
        return Err(Error::crashed(
            "worker process is not running; re-assemble to start a fresh one",
        ));
    }
    if inner.suspect {
        tracing::debug!("suspect session revalidated; worker still running");
        inner.suspect = false;
    }
    Ok(())
}
