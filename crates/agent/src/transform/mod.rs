//! Record transformation through the inference capability.
//!
//! [`Transformer::transform`] never fails: a timeout or backend error is
//! folded into a sentinel [`TransformOutcome`] so the monitor task can
//! decide whether to forward or drop it.

pub mod format;
pub mod inference;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use loglens_core::metrics as m;
use loglens_core::types::ModelAssociation;

use crate::template::{OutputFormat, Template};

pub use format::{json_to_syslog, repair_json_object, restore_json_braces};
pub use inference::{
    Completion, DisabledBackend, InferenceBackend, InferenceRequest, LlamaServerBackend,
};

/// Sentinel forwarded for a transformation that exceeded its time limit.
pub const TIMEOUT_SENTINEL: &str = "TIMEOUT";

/// Prefix of the sentinel forwarded for a failed transformation.
pub const LLM_ERROR_SENTINEL: &str = "LLMERROR";

/// Result of one transformation.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    /// Converted payload ready to forward
    Payload(String),
    /// The hard time limit elapsed first
    Timeout,
    /// The backend failed; carries diagnostic text
    LlmError(String),
}

impl TransformOutcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Payload(_))
    }

    /// Line forwarded for this outcome.
    pub fn into_line(self) -> String {
        match self {
            Self::Payload(payload) => payload,
            Self::Timeout => TIMEOUT_SENTINEL.to_owned(),
            Self::LlmError(reason) => format!("{LLM_ERROR_SENTINEL}: {reason}"),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Payload(_) => "ok",
            Self::Timeout => "timeout",
            Self::LlmError(_) => "llm_error",
        }
    }
}

impl fmt::Display for TransformOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Payload(payload) => write!(f, "{payload}"),
            Self::Timeout => write!(f, "{TIMEOUT_SENTINEL}"),
            Self::LlmError(reason) => write!(f, "{LLM_ERROR_SENTINEL}: {reason}"),
        }
    }
}

/// Outcome plus the wall-clock time spent.
#[derive(Debug, Clone)]
pub struct TransformResult {
    pub outcome: TransformOutcome,
    pub duration: Duration,
}

/// Builds prompts, calls the backend under a hard timeout, converts output.
pub struct Transformer {
    backend: Arc<dyn InferenceBackend>,
    timeout: Duration,
    hostname: String,
}

impl Transformer {
    pub fn new(backend: Arc<dyn InferenceBackend>, timeout: Duration, hostname: String) -> Self {
        Self {
            backend,
            timeout,
            hostname,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Transforms one accepted record.
    pub async fn transform(
        &self,
        record: &str,
        template: &Template,
        model: &ModelAssociation,
    ) -> TransformResult {
        let request = build_request(record, template, model);
        let started = Instant::now();

        let outcome = match tokio::time::timeout(self.timeout, self.backend.infer(&request)).await
        {
            Err(_) => TransformOutcome::Timeout,
            Ok(Err(e)) => TransformOutcome::LlmError(e.to_string()),
            Ok(Ok(completion)) => {
                tracing::trace!(
                    template = %template.name,
                    latency_ms = completion.elapsed.as_millis() as u64,
                    "completion received"
                );
                TransformOutcome::Payload(self.convert(&completion.text, template.output_format))
            }
        };

        let duration = started.elapsed();
        metrics::histogram!(m::TRANSFORM_DURATION_SECONDS).record(duration.as_secs_f64());
        if outcome.is_failure() {
            metrics::counter!(m::TRANSFORM_FAILURES_TOTAL, m::LABEL_OUTCOME => outcome.label())
                .increment(1);
        }

        TransformResult { outcome, duration }
    }

    fn convert(&self, text: &str, format: OutputFormat) -> String {
        match format {
            OutputFormat::Json => restore_json_braces(text),
            OutputFormat::Syslog => match repair_json_object(text) {
                Some(json) => json_to_syslog(&json, &self.hostname),
                None => text.to_owned(),
            },
            OutputFormat::Cef | OutputFormat::Raw => text.trim().to_owned(),
        }
    }
}

/// Association sampling values take precedence over the template's.
fn build_request(record: &str, template: &Template, model: &ModelAssociation) -> InferenceRequest {
    let params = &template.model_params;
    InferenceRequest {
        model: model.model.clone(),
        prompt: template.build_prompt(record),
        stop: template.stop_sequences(),
        temperature: model.temperature.or(params.temperature),
        top_p: model.top_p.or(params.top_p),
        top_k: model.top_k.or(params.top_k),
        max_tokens: template.max_tokens(),
    }
}
