//! Ollama adapter: single-shot generation via `/api/generate`.
//!
//! ```json
//! {"model":"llama2","response":"{...}","done":true,"eval_count":42,"eval_duration":830000000}
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::llm::error::LlmError;
use crate::llm::provider::{Completion, CompletionMetrics, ModelService, PromptSettings, SamplingParams};
use crate::utils::http::{ensure_success, request_with_retry, RetryPolicy};

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    system: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    total_duration: Option<u64>,
    eval_count: Option<u64>,
    eval_duration: Option<u64>,
}

impl GenerateResponse {
    fn metrics(&self) -> CompletionMetrics {
        let tokens_per_second = match (self.eval_count, self.eval_duration) {
            (Some(count), Some(ns)) if ns > 0 => Some(count as f64 / (ns as f64 / 1e9)),
            _ => None,
        };
        CompletionMetrics {
            total_duration_ms: self.total_duration.map(|ns| ns as f64 / 1e6),
            eval_count: self.eval_count,
            tokens_per_second,
        }
    }
}

/// Response from `GET /api/tags`.
#[derive(Debug, Deserialize)]
pub struct OllamaTagsResponse {
    #[serde(default)]
    pub models: Vec<OllamaModelInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub modified_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

pub struct OllamaService {
    client: Client,
    base_url: String,
    model: String,
    params: SamplingParams,
    settings: PromptSettings,
    retry: RetryPolicy,
}

pub(crate) fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

impl OllamaService {
    pub fn new(
        base_url: String,
        model: String,
        params: SamplingParams,
        settings: PromptSettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client: build_client(settings.timeout),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            params,
            settings,
            retry,
        }
    }

    /// Swap the HTTP client, e.g. for one that bypasses system proxies.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn options(&self) -> Option<serde_json::Value> {
        let p = &self.params;
        let mut opts = serde_json::Map::new();
        if let Some(t) = p.temperature {
            opts.insert("temperature".into(), serde_json::json!(t));
        }
        if let Some(n) = p.max_tokens {
            opts.insert("num_predict".into(), serde_json::json!(n));
        }
        if let Some(k) = p.top_k {
            opts.insert("top_k".into(), serde_json::json!(k));
        }
        if let Some(tp) = p.top_p {
            opts.insert("top_p".into(), serde_json::json!(tp));
        }
        if let Some(r) = p.repeat_penalty {
            opts.insert("repeat_penalty".into(), serde_json::json!(r));
        }
        if let Some(s) = &p.stop {
            opts.insert("stop".into(), serde_json::json!(s));
        }
        (!opts.is_empty()).then(|| serde_json::Value::Object(opts))
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}{}", self.base_url, path);
        let client = self.client.clone();
        let response = request_with_retry(
            move || {
                let client = client.clone();
                let url = url.clone();
                async move { client.get(&url).send().await }
            },
            self.retry,
        )
        .await?;
        ensure_success(response).await
    }

    /// Models installed on the server.
    pub async fn list_models(&self) -> Result<Vec<OllamaModelInfo>, LlmError> {
        let tags: OllamaTagsResponse = self
            .get("/api/tags")
            .await?
            .json()
            .await
            .map_err(|e| LlmError::MalformedCompletion(format!("bad /api/tags body: {e}")))?;
        Ok(tags.models)
    }

    /// Server reachable and configured model installed. Returns the server version.
    pub async fn check_ready(&self) -> Result<String, LlmError> {
        let version: VersionResponse = self
            .get("/api/version")
            .await?
            .json()
            .await
            .map_err(|e| LlmError::MalformedCompletion(format!("bad /api/version body: {e}")))?;
        let models = self.list_models().await?;
        let installed = models.iter().any(|m| {
            m.name == self.model || m.name.split(':').next() == Some(self.model.as_str())
        });
        if !installed {
            return Err(LlmError::Status {
                status: 404,
                body: format!("model {} is not installed", self.model),
            });
        }
        Ok(version.version)
    }
}

#[async_trait]
impl ModelService for OllamaService {
    async fn complete(&self, system: &str, prompt: &str) -> Result<Completion, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            system: system.to_string(),
            stream: false,
            options: self.options(),
        };
        let client = self.client.clone();

        let response = request_with_retry(
            move || {
                let client = client.clone();
                let url = url.clone();
                let body = body.clone();
                async move { client.post(&url).json(&body).send().await }
            },
            self.retry,
        )
        .await?;
        let raw: serde_json::Value = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::MalformedCompletion(format!("bad Ollama body: {e}")))?;
        let parsed: GenerateResponse = serde_json::from_value(raw.clone())
            .map_err(|e| LlmError::MalformedCompletion(format!("bad Ollama body: {e}")))?;

        if parsed.response.trim().is_empty() {
            return Err(LlmError::EmptyCompletion);
        }
        let metrics = parsed.metrics();
        if let Some(tps) = metrics.tokens_per_second {
            tracing::debug!(tokens_per_second = tps, eval_count = ?metrics.eval_count, "ollama generation stats");
        }
        Ok(Completion {
            text: parsed.response.clone(),
            raw,
            metrics: Some(metrics),
        })
    }

    fn id(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn settings(&self) -> &PromptSettings {
        &self.settings
    }
}
