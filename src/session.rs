//! Per-client session state.

use crate::features::FeatureState;
use crate::worker::WorkerHandle;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// State guarded by the session's command lock.
pub struct SessionInner {
    /// The worker process backing this session. Replaced wholesale when a
    /// dead worker is respawned on re-assemble.
    pub worker: WorkerHandle,
    /// Recorded feature-toggle state, kept in lockstep with the worker.
    pub features: FeatureState,
    /// Set when a command timed out; the next command revalidates the
    /// worker instead of trusting it.
    pub suspect: bool,
}

/// A client-visible session: one worker process plus feature-toggle state.
///
/// All command execution happens under `inner`'s lock, which is a fair
/// (FIFO) mutex, so commands on one session are applied to the worker in
/// arrival order and never interleave on its untagged output stream.
pub struct Session {
    pub id: String,
    inner: Mutex<SessionInner>,
    /// Milliseconds since the registry epoch at last use; read lock-free by
    /// the eviction sweep.
    last_used_ms: AtomicU64,
}

impl Session {
    pub fn new(id: String, worker: WorkerHandle, epoch_elapsed: Duration) -> Self {
        Self {
            id,
            inner: Mutex::new(SessionInner {
                worker,
                features: FeatureState::default(),
                suspect: false,
            }),
            last_used_ms: AtomicU64::new(epoch_elapsed.as_millis() as u64),
        }
    }

    /// Acquire the exclusive command lock.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, SessionInner> {
        self.inner.lock().await
    }

    /// Non-blocking lock attempt, used by the eviction sweep to skip
    /// sessions that are mid-command.
    pub fn try_lock(
        &self,
    ) -> std::result::Result<tokio::sync::MutexGuard<'_, SessionInner>, tokio::sync::TryLockError>
    {
        self.inner.try_lock()
    }

    /// Record activity, deferring eviction.
    pub fn touch(&self, epoch: Instant) {
        self.last_used_ms
            .store(epoch.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    /// How long this session has been idle.
    pub fn idle(&self, epoch: Instant) -> Duration {
        let now = epoch.elapsed().as_millis() as u64;
        let last = self.last_used_ms.load(Ordering::Relaxed);
        Duration::from_millis(now.saturating_sub(last))
    }
}
