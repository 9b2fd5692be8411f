//! Monitor task -- one live (source, template) service.
//!
//! A task tails its source from the persisted checkpoint, classifies and
//! transforms new records, forwards them and records progress. It runs
//! until its cancellation token fires. Errors never end the task: each
//! poll cycle logs its error and sleeps until the next one.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use loglens_core::metrics as m;
use loglens_core::types::{Checkpoint, ModelAssociation, ProcessingMode, ServiceKey, SourceKind};

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::forwarder::Forwarder;
use crate::source::evtx::latest_position;
use crate::source::{EventLogReader, TextReader, detect_kind};
use crate::store::StateStore;
use crate::template::{Template, classifier};
use crate::transform::{TransformOutcome, Transformer};

/// Shared collaborators handed to every monitor task.
#[derive(Clone)]
pub struct MonitorContext {
    pub config: Arc<AgentConfig>,
    pub store: Arc<StateStore>,
    pub transformer: Arc<Transformer>,
    pub forwarder: Arc<Forwarder>,
    pub event_reader: Arc<dyn EventLogReader>,
}

/// What a task does with each record, fixed when the task starts.
#[derive(Debug, Clone)]
pub enum TaskMode {
    /// Forward raw records unchanged
    Passthrough,
    /// Classify against the template, transform through the model, forward
    Transform {
        template: Arc<Template>,
        model: ModelAssociation,
    },
}

impl TaskMode {
    /// Pairs a resolved processing mode with its template.
    ///
    /// Transformation needs a loaded template; passthrough does not.
    pub fn resolve(
        mode: ProcessingMode,
        template_name: &str,
        template: Option<Arc<Template>>,
    ) -> Result<Self, AgentError> {
        match (mode, template) {
            (ProcessingMode::Passthrough, _) => Ok(Self::Passthrough),
            (ProcessingMode::Transform(model), Some(template)) => {
                Ok(Self::Transform { template, model })
            }
            (ProcessingMode::Transform(_), None) => Err(AgentError::TemplateValidation {
                name: template_name.to_owned(),
                reason: "template is not loaded".to_owned(),
            }),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::Passthrough)
    }
}

/// Everything needed to start one service.
#[derive(Debug, Clone)]
pub struct MonitorSpec {
    pub key: ServiceKey,
    pub path: PathBuf,
    pub mode: TaskMode,
}

/// One running service.
pub struct MonitorTask {
    spec: MonitorSpec,
    ctx: MonitorContext,
    cancel: CancellationToken,
}

impl MonitorTask {
    pub fn new(spec: MonitorSpec, ctx: MonitorContext, cancel: CancellationToken) -> Self {
        Self { spec, ctx, cancel }
    }

    fn key(&self) -> &ServiceKey {
        &self.spec.key
    }

    fn path(&self) -> &Path {
        &self.spec.path
    }

    /// Runs until cancelled.
    pub async fn run(self) {
        info!(
            service = %self.key(),
            path = %self.path().display(),
            passthrough = self.spec.mode.is_passthrough(),
            "monitor task started"
        );

        let kind = loop {
            if self.cancel.is_cancelled() {
                info!(service = %self.key(), "monitor task stopped");
                return;
            }
            match detect_kind(self.path()).await {
                Ok(kind) => break kind,
                Err(e) => {
                    warn!(service = %self.key(), error = %e, "cannot open source, retrying");
                    metrics::counter!(m::SOURCE_ERRORS_TOTAL, m::LABEL_SOURCE_KIND => "unknown")
                        .increment(1);
                    if self.pause(self.ctx.config.text_poll_interval).await {
                        info!(service = %self.key(), "monitor task stopped");
                        return;
                    }
                }
            }
        };

        debug!(service = %self.key(), kind = %kind, "source kind detected");
        match kind {
            SourceKind::Text => self.run_text().await,
            SourceKind::StructuredLog => self.run_structured().await,
        }

        info!(service = %self.key(), "monitor task stopped");
    }

    /// Sleeps for `period`; returns `true` when cancelled first.
    async fn pause(&self, period: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(period) => false,
        }
    }

    // --- text sources ---

    async fn run_text(&self) {
        let reader = TextReader::new(self.path(), self.ctx.config.max_lines_per_read);
        let mut offset = match self.ctx.store.checkpoint(self.key()).await {
            Ok(Some(Checkpoint::Text { offset })) => Some(offset),
            Ok(Some(other)) => {
                warn!(service = %self.key(), checkpoint = ?other, "checkpoint kind mismatch, starting at end of file");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(service = %self.key(), error = %e, "cannot load checkpoint, starting at end of file");
                None
            }
        };

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            if let Err(e) = self.text_cycle(&reader, &mut offset).await {
                warn!(service = %self.key(), error = %e, "text poll failed");
                metrics::counter!(m::SOURCE_ERRORS_TOTAL, m::LABEL_SOURCE_KIND => "text")
                    .increment(1);
            }
            if self.pause(self.ctx.config.text_poll_interval).await {
                break;
            }
        }
    }

    async fn text_cycle(
        &self,
        reader: &TextReader,
        offset: &mut Option<u64>,
    ) -> Result<(), AgentError> {
        let start = match *offset {
            Some(start) => start,
            None => {
                let end = reader.end_offset().await?;
                // the in-memory anchor holds even when persisting it fails
                *offset = Some(end);
                self.ctx
                    .store
                    .save_checkpoint(self.key(), Checkpoint::Text { offset: end })
                    .await?;
                debug!(service = %self.key(), offset = end, "text checkpoint initialized at end of file");
                return Ok(());
            }
        };

        let batch = reader.read_from(start).await?;
        if batch.rotated {
            info!(
                service = %self.key(),
                previous_offset = start,
                "source shrank below checkpoint, reading from start"
            );
        }
        metrics::counter!(m::RECORDS_READ_TOTAL, m::LABEL_SOURCE_KIND => "text")
            .increment(batch.lines.len() as u64);

        let mut position = if batch.rotated { 0 } else { start };
        let mut interrupted = false;
        for line in &batch.lines {
            if self.cancel.is_cancelled() {
                interrupted = true;
                break;
            }
            self.process(&line.text).await;
            position = line.end_offset;
        }
        if !interrupted {
            position = batch.next_offset;
        }

        *offset = Some(position);
        if position != start {
            self.ctx
                .store
                .save_checkpoint(self.key(), Checkpoint::Text { offset: position })
                .await?;
        }
        Ok(())
    }

    // --- structured-log sources ---

    async fn run_structured(&self) {
        let mut position = match self.ctx.store.checkpoint(self.key()).await {
            Ok(Some(Checkpoint::EventLog {
                last_id,
                last_timestamp,
            })) => Some((last_id, last_timestamp)),
            Ok(Some(other)) => {
                warn!(service = %self.key(), checkpoint = ?other, "checkpoint kind mismatch, starting at latest record");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(service = %self.key(), error = %e, "cannot load checkpoint, starting at latest record");
                None
            }
        };

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            if let Err(e) = self.structured_cycle(&mut position).await {
                warn!(service = %self.key(), error = %e, "event log poll failed");
                metrics::counter!(m::SOURCE_ERRORS_TOTAL, m::LABEL_SOURCE_KIND => "structured-log")
                    .increment(1);
            }
            if self.pause(self.ctx.config.evtx_poll_interval).await {
                break;
            }
        }
    }

    async fn structured_cycle(
        &self,
        position: &mut Option<(u64, Option<DateTime<Utc>>)>,
    ) -> Result<(), AgentError> {
        let records = self
            .ctx
            .event_reader
            .tail(self.path(), self.ctx.config.evtx_tail_limit)
            .await?;

        let Some((mut last_id, mut last_timestamp)) = *position else {
            let initial = latest_position(&records);
            if let Checkpoint::EventLog {
                last_id,
                last_timestamp,
            } = initial
            {
                *position = Some((last_id, last_timestamp));
            }
            self.ctx.store.save_checkpoint(self.key(), initial).await?;
            debug!(
                service = %self.key(),
                window = records.len(),
                "event log checkpoint initialized at latest record"
            );
            return Ok(());
        };

        let fresh: Vec<_> = records
            .iter()
            .filter(|r| r.is_after(last_id, last_timestamp))
            .collect();
        metrics::counter!(m::RECORDS_READ_TOTAL, m::LABEL_SOURCE_KIND => "structured-log")
            .increment(fresh.len() as u64);

        for record in fresh {
            if self.cancel.is_cancelled() {
                break;
            }
            self.process(&record.xml).await;

            if record.is_after(last_id, last_timestamp) {
                last_id = record.id;
                last_timestamp = record.timestamp;
                *position = Some((last_id, last_timestamp));
                self.ctx
                    .store
                    .save_checkpoint(self.key(), record.checkpoint())
                    .await?;
            }
        }
        Ok(())
    }

    // --- record processing ---

    async fn process(&self, record: &str) {
        let payload = match &self.spec.mode {
            TaskMode::Passthrough => record.to_owned(),
            TaskMode::Transform { template, model } => {
                if !classifier::matches(record, template) {
                    trace!(service = %self.key(), "record rejected by template");
                    metrics::counter!(m::RECORDS_REJECTED_TOTAL).increment(1);
                    return;
                }

                let result = self.ctx.transformer.transform(record, template, model).await;
                match result.outcome {
                    TransformOutcome::Payload(payload) => payload,
                    failure => {
                        warn!(
                            service = %self.key(),
                            outcome = %failure,
                            elapsed_ms = result.duration.as_millis() as u64,
                            "transformation failed"
                        );
                        if !self.ctx.config.forward_transform_failures {
                            return;
                        }
                        failure.into_line()
                    }
                }
            }
        };

        self.deliver(&payload).await;
    }

    async fn deliver(&self, payload: &str) {
        let source = &self.key().source;
        let config = match self.ctx.store.forwarder_for(source).await {
            Ok(config) => config,
            Err(e) => {
                warn!(service = %self.key(), error = %e, "cannot resolve forwarder config, payload dropped");
                return;
            }
        };

        self.ctx.forwarder.forward(payload, &config).await;

        if let Err(e) = self.ctx.store.increment_counter(source).await {
            warn!(service = %self.key(), error = %e, "cannot update counter");
        }
    }
}
