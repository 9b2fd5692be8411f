//! Service registry -- the live monitor tasks, keyed by service.
//!
//! All map mutations happen under one async mutex. Joins happen after the
//! entry has been removed and the lock released, so a slow task never
//! blocks other registry operations.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use loglens_core::metrics as m;
use loglens_core::types::ServiceKey;

use crate::error::AgentError;
use crate::monitor::{MonitorContext, MonitorSpec, MonitorTask};

/// Result of [`ServiceRegistry::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

struct LiveTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct RegistryState {
    created: HashSet<ServiceKey>,
    live: HashMap<ServiceKey, LiveTask>,
}

/// Owns every live monitor task.
pub struct ServiceRegistry {
    ctx: MonitorContext,
    stop_timeout: Duration,
    state: Mutex<RegistryState>,
}

impl ServiceRegistry {
    pub fn new(ctx: MonitorContext) -> Self {
        let stop_timeout = ctx.config.stop_timeout;
        Self {
            ctx,
            stop_timeout,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Records a logical entry for an enabled service.
    ///
    /// Returns `true` the first time a key is seen.
    pub async fn create(&self, key: &ServiceKey) -> bool {
        let created = self.state.lock().await.created.insert(key.clone());
        if created {
            info!(service = %key, "service created");
        }
        created
    }

    /// Spawns a monitor task unless one is already live for the key.
    pub async fn start(&self, spec: MonitorSpec) -> StartOutcome {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.live.get(&spec.key) {
            if !existing.handle.is_finished() {
                return StartOutcome::AlreadyRunning;
            }
            warn!(service = %spec.key, "previous monitor task ended unexpectedly, restarting");
            state.live.remove(&spec.key);
        }

        let key = spec.key.clone();
        let cancel = CancellationToken::new();
        let task = MonitorTask::new(spec, self.ctx.clone(), cancel.clone());
        let handle = tokio::spawn(task.run());

        state.created.insert(key.clone());
        state.live.insert(key.clone(), LiveTask { cancel, handle });
        metrics::gauge!(m::ACTIVE_SERVICES).set(state.live.len() as f64);
        info!(service = %key, "service started");

        StartOutcome::Started
    }

    /// Stops the task for `key`; a key without a live task is a no-op.
    ///
    /// Returns whether a task was stopped.
    pub async fn stop(&self, key: &ServiceKey) -> bool {
        let live = {
            let mut state = self.state.lock().await;
            let live = state.live.remove(key);
            metrics::gauge!(m::ACTIVE_SERVICES).set(state.live.len() as f64);
            live
        };

        let Some(live) = live else {
            return false;
        };

        live.cancel.cancel();
        let deadline = Instant::now() + self.stop_timeout;
        join_until(key, live.handle, deadline).await;
        info!(service = %key, "service stopped");
        true
    }

    /// Stops the task and clears its checkpoint so a re-enabled service
    /// starts from the latest position.
    pub async fn delete(&self, key: &ServiceKey) -> Result<(), AgentError> {
        let stopped = self.stop(key).await;
        let known = self.state.lock().await.created.remove(key);
        let cleared = self.ctx.store.clear_checkpoint(key).await?;

        if stopped || known || cleared {
            info!(service = %key, checkpoint_cleared = cleared, "service deleted");
        }
        Ok(())
    }

    /// Stops every live task under one shared join deadline.
    ///
    /// Returns the number of tasks that were live.
    pub async fn stop_all(&self) -> usize {
        let drained: Vec<(ServiceKey, LiveTask)> = {
            let mut state = self.state.lock().await;
            let drained = state.live.drain().collect();
            metrics::gauge!(m::ACTIVE_SERVICES).set(0.0);
            drained
        };

        if drained.is_empty() {
            return 0;
        }

        for (_, live) in &drained {
            live.cancel.cancel();
        }
        info!(count = drained.len(), "stop signal sent to all services");

        let count = drained.len();
        let deadline = Instant::now() + self.stop_timeout;
        for (key, live) in drained {
            join_until(&key, live.handle, deadline).await;
        }
        count
    }

    pub async fn is_running(&self, key: &ServiceKey) -> bool {
        self.state
            .lock()
            .await
            .live
            .get(key)
            .is_some_and(|live| !live.handle.is_finished())
    }

    pub async fn live_count(&self) -> usize {
        self.state.lock().await.live.len()
    }

    pub async fn live_keys(&self) -> Vec<ServiceKey> {
        let mut keys: Vec<_> = self.state.lock().await.live.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Waits for a task until `deadline`, aborting it if it is still running.
async fn join_until(key: &ServiceKey, mut handle: JoinHandle<()>, deadline: Instant) {
    match tokio::time::timeout_at(deadline, &mut handle).await {
        Ok(Ok(())) => debug!(service = %key, "monitor task joined"),
        Ok(Err(e)) => warn!(service = %key, error = %e, "monitor task ended abnormally"),
        Err(_) => {
            warn!(service = %key, "monitor task did not stop in time, aborting");
            handle.abort();
        }
    }
}
