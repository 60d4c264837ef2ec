//! Session registry: id → session, with TTL eviction.
//!
//! The map lock is held only for map mutation, never across worker I/O;
//! per-session work happens under the session's own command lock, so
//! requests for unrelated sessions never contend.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::worker::WorkerHandle;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

/// Emitted when the sweep removes an idle session. Observable in tests.
#[derive(Debug, Clone)]
pub struct EvictionEvent {
    pub session_id: String,
    pub idle_ms: u64,
}

pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    config: Arc<Config>,
    epoch: Instant,
    evictions: broadcast::Sender<EvictionEvent>,
}

impl SessionRegistry {
    pub fn new(config: Arc<Config>) -> Arc<Self> {
        let (evictions, _) = broadcast::channel(64);
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            config,
            epoch: Instant::now(),
            evictions,
        })
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    /// Resolve or create a session. Absent or unknown ids allocate a fresh
    /// identifier and spawn a new worker; a known id returns the existing
    /// session untouched.
    pub async fn get_or_create(&self, id: Option<&str>) -> Result<(Arc<Session>, bool)> {
        if let Some(id) = id {
            if let Some(session) = self.sessions.lock().await.get(id) {
                return Ok((Arc::clone(session), false));
            }
        }

        // Fast path: do not bother spawning into a registry that is
        // already full.
        {
            let sessions = self.sessions.lock().await;
            if self.config.max_sessions > 0 && sessions.len() >= self.config.max_sessions {
                return Err(Error::RegistryFull(sessions.len()));
            }
        }

        // The spawn happens outside the map lock, so the cap must be
        // re-checked in the same critical section as the insert; concurrent
        // creators would otherwise all pass the fast-path check against a
        // small map and overshoot the cap.
        let worker = WorkerHandle::spawn(&self.config)?;
        let id = Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(id.clone(), worker, self.epoch.elapsed()));
        let overflow = {
            let mut sessions = self.sessions.lock().await;
            if self.config.max_sessions > 0 && sessions.len() >= self.config.max_sessions {
                Some(sessions.len())
            } else {
                sessions.insert(id.clone(), Arc::clone(&session));
                None
            }
        };
        if let Some(live) = overflow {
            // Lost the race to another creator; the fresh worker must not
            // be left running.
            session.lock().await.worker.kill().await;
            tracing::debug!(session = %id, "session cap reached; discarding fresh worker");
            return Err(Error::RegistryFull(live));
        }
        tracing::info!(session = %id, "created session");
        Ok((session, true))
    }

    /// Look up an existing session; never creates implicitly.
    pub async fn lookup(&self, id: &str) -> Result<Arc<Session>> {
        self.sessions
            .lock()
            .await
            .get(id)
            .map(Arc::clone)
            .ok_or_else(|| Error::session_not_found(id))
    }

    /// Remove a session and kill its worker.
    pub async fn destroy(&self, id: &str) -> Result<()> {
        let session = self
            .sessions
            .lock()
            .await
            .remove(id)
            .ok_or_else(|| Error::session_not_found(id))?;
        let inner = session.lock().await;
        inner.worker.kill().await;
        tracing::info!(session = %id, "destroyed session");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Subscribe to eviction events.
    pub fn subscribe_evictions(&self) -> broadcast::Receiver<EvictionEvent> {
        self.evictions.subscribe()
    }

    /// Start the background eviction sweep. Sessions idle past the
    /// configured TTL get their worker killed and their slot freed.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(registry.config.sweep_interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                registry.sweep_once().await;
            }
        })
    }

    /// One eviction pass. Public so tests can drive it deterministically.
    pub async fn sweep_once(&self) {
        let ttl = self.config.session_ttl();
        let candidates: Vec<(String, Arc<Session>)> = {
            let sessions = self.sessions.lock().await;
            sessions
                .iter()
                .filter(|(_, s)| s.idle(self.epoch) > ttl)
                .map(|(id, s)| (id.clone(), Arc::clone(s)))
                .collect()
        };

        for (id, session) in candidates {
            // A session busy with a command is in use; skip it this pass.
            let Ok(inner) = session.try_lock() else {
                continue;
            };
            // Re-check idleness under the command lock: a command may have
            // finished between the snapshot and now.
            if session.idle(self.epoch) <= ttl {
                continue;
            }
            inner.worker.kill().await;
            drop(inner);
            self.sessions.lock().await.remove(&id);
            let idle_ms = session.idle(self.epoch).as_millis() as u64;
            tracing::info!(session = %id, idle_ms, "evicted idle session");
            let _ = self.evictions.send(EvictionEvent {
                session_id: id,
                idle_ms,
            });
        }
    }
}
