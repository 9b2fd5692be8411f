//! Inference capability
//!
//! The engine treats inference as `infer(prompt, params) -> (text, latency)`.
//! [`InferenceBackend`] is the seam; [`LlamaServerBackend`] talks to a
//! llama.cpp HTTP server and [`DisabledBackend`] refuses every request.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use loglens_core::pipeline::BoxFuture;

use crate::error::AgentError;

/// One completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    /// Model identifier from the template association
    pub model: String,
    pub prompt: String,
    pub stop: Vec<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub max_tokens: u32,
}

/// Completion text and the time the backend took to produce it.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub elapsed: Duration,
}

/// Inference capability used by the transformer.
///
/// Implementations must be cancel-safe: the transformer drops the
/// returned future when its timeout elapses.
pub trait InferenceBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    fn infer<'a>(
        &'a self,
        request: &'a InferenceRequest,
    ) -> BoxFuture<'a, Result<Completion, AgentError>>;
}

/// Backend used when inference is turned off; every request fails.
pub struct DisabledBackend;

impl InferenceBackend for DisabledBackend {
    fn name(&self) -> &str {
        "disabled"
    }

    fn infer<'a>(
        &'a self,
        _request: &'a InferenceRequest,
    ) -> BoxFuture<'a, Result<Completion, AgentError>> {
        Box::pin(async { Err(AgentError::Inference("inference backend disabled".to_owned())) })
    }
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    prompt: &'a str,
    n_predict: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    stop: &'a [String],
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    content: String,
}

/// llama.cpp server client (`POST {endpoint}/completion`).
pub struct LlamaServerBackend {
    client: reqwest::Client,
    url: String,
}

impl LlamaServerBackend {
    /// Builds a client for `endpoint` with a per-request timeout.
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AgentError::Inference(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            url: format!("{}/completion", endpoint.trim_end_matches('/')),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn complete(&self, request: &InferenceRequest) -> Result<Completion, AgentError> {
        let body = CompletionBody {
            prompt: &request.prompt,
            n_predict: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            top_k: request.top_k,
            stop: &request.stop,
            stream: false,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Inference(format!("request to {} failed: {e}", self.url)))?
            .error_for_status()
            .map_err(|e| AgentError::Inference(format!("server returned error: {e}")))?;

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Inference(format!("invalid completion response: {e}")))?;

        Ok(Completion {
            text: parsed.content,
            elapsed: started.elapsed(),
        })
    }
}

impl InferenceBackend for LlamaServerBackend {
    fn name(&self) -> &str {
        "llama_server"
    }

    fn infer<'a>(
        &'a self,
        request: &'a InferenceRequest,
    ) -> BoxFuture<'a, Result<Completion, AgentError>> {
        Box::pin(self.complete(request))
    }
}
