//! Reconciliation loop -- aligns live tasks with the persisted desired state.
//!
//! Every cycle walks saved paths × assigned templates and drives the
//! [`ServiceRegistry`] toward each pair's button state. [`Reconciler::autostart`]
//! is the one-shot pass run at process start.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use loglens_core::types::{ButtonState, ProcessingMode, ServiceKey};

use crate::error::AgentError;
use crate::monitor::{MonitorSpec, TaskMode};
use crate::registry::{ServiceRegistry, StartOutcome};
use crate::store::StateStore;
use crate::template::TemplateCatalog;

/// Counts of actions taken by one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub started: usize,
    pub stopped: usize,
    pub deleted: usize,
    pub skipped: usize,
}

/// One (path, template) pair derived from the saved configuration.
struct Pair {
    path: String,
    template: String,
    key: ServiceKey,
}

/// Drives the registry from the persisted configuration.
pub struct Reconciler {
    registry: Arc<ServiceRegistry>,
    store: Arc<StateStore>,
    catalog: Arc<TemplateCatalog>,
}

impl Reconciler {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        store: Arc<StateStore>,
        catalog: Arc<TemplateCatalog>,
    ) -> Self {
        Self {
            registry,
            store,
            catalog,
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Runs one pass.
    ///
    /// Only a failure to read the configuration documents is an error;
    /// problems with individual services are logged and counted as skipped.
    pub async fn reconcile_once(&self) -> Result<ReconcileReport, AgentError> {
        self.reload_templates().await;

        let states = self.store.button_states().await?;
        let pairs = self.pairs().await?;
        let mut report = ReconcileReport::default();

        for pair in &pairs {
            let desired = states
                .get(&pair.key.document_key())
                .copied()
                .unwrap_or_default();

            if !desired.enabled {
                let was_running = self.registry.is_running(&pair.key).await;
                match self.registry.delete(&pair.key).await {
                    Ok(()) if was_running => report.deleted += 1,
                    Ok(()) => {}
                    Err(e) => {
                        warn!(service = %pair.key, error = %e, "cannot delete service, skipping");
                        report.skipped += 1;
                    }
                }
                continue;
            }

            self.registry.create(&pair.key).await;

            if desired.started {
                match self.ensure_started(pair).await {
                    Ok(true) => report.started += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(service = %pair.key, error = %e, "cannot start service, skipping");
                        report.skipped += 1;
                    }
                }
            } else if self.registry.stop(&pair.key).await {
                report.stopped += 1;
            }
        }

        if report != ReconcileReport::default() {
            debug!(?report, "reconciliation pass applied changes");
        }
        Ok(report)
    }

    /// Starts every service whose persisted state is enabled and started.
    ///
    /// Returns the number of services started. State entries that no
    /// longer resolve to a saved path and template are logged and skipped.
    pub async fn autostart(&self) -> Result<usize, AgentError> {
        self.reload_templates().await;

        let states = self.store.button_states().await?;
        let pairs = self.pairs().await?;
        let mut resolved = HashSet::new();
        let mut started = 0;

        for pair in &pairs {
            let doc_key = pair.key.document_key();
            let Some(state) = states.get(&doc_key) else {
                continue;
            };
            resolved.insert(doc_key);
            if !state.is_active() {
                continue;
            }

            self.registry.create(&pair.key).await;
            match self.ensure_started(pair).await {
                Ok(true) => started += 1,
                Ok(false) => {}
                Err(e) => warn!(service = %pair.key, error = %e, "autostart skipped service"),
            }
        }

        log_unresolved(&states, &resolved);
        info!(count = started, "autostart restored services");
        Ok(started)
    }

    /// Runs passes every `interval` until `cancel` fires.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = interval.as_millis() as u64, "reconciliation loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile_once().await {
                        warn!(error = %e, "reconciliation pass failed");
                    }
                }
            }
        }
        info!("reconciliation loop stopped");
    }

    async fn reload_templates(&self) {
        if let Err(e) = self.catalog.reload().await {
            warn!(
                dir = %self.catalog.dir().display(),
                error = %e,
                "template reload failed, keeping previous templates"
            );
        }
    }

    /// Saved paths × assigned templates, first path winning on a basename clash.
    async fn pairs(&self) -> Result<Vec<Pair>, AgentError> {
        let mut pairs = Vec::new();
        let mut seen = HashSet::new();

        for path in self.store.saved_paths().await? {
            for template in self.store.templates_for(&path).await? {
                let key = ServiceKey::new(&path, template.as_str());
                if !seen.insert(key.clone()) {
                    warn!(service = %key, path = %path, "another saved path has the same basename, skipping");
                    continue;
                }
                pairs.push(Pair {
                    path: path.clone(),
                    template,
                    key,
                });
            }
        }
        Ok(pairs)
    }

    /// Starts the pair unless it is already live; `Ok(true)` when spawned.
    async fn ensure_started(&self, pair: &Pair) -> Result<bool, AgentError> {
        if self.registry.is_running(&pair.key).await {
            return Ok(false);
        }

        let association = self.store.association(&pair.template).await?;
        let mode = TaskMode::resolve(
            ProcessingMode::from_association(association),
            &pair.template,
            self.catalog.get(&pair.template).await,
        )?;

        let spec = MonitorSpec {
            key: pair.key.clone(),
            path: PathBuf::from(&pair.path),
            mode,
        };
        Ok(self.registry.start(spec).await == StartOutcome::Started)
    }
}

fn log_unresolved(states: &BTreeMap<String, ButtonState>, resolved: &HashSet<String>) {
    for (doc_key, state) in states {
        if state.is_active() && !resolved.contains(doc_key) {
            warn!(service = %doc_key, "saved service no longer matches a saved path, skipping");
        }
    }
}
