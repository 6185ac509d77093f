//! OpenAI chat-completions adapter. Also serves `other` backends that speak
//! the same protocol behind a custom `api_base`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::error::LlmError;
use crate::llm::ollama::build_client;
use crate::llm::provider::{Completion, ModelService, PromptSettings, SamplingParams};
use crate::utils::http::{ensure_success, request_with_retry, RetryPolicy};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// Shape check for OpenAI secret keys.
pub fn looks_like_api_key(key: &str) -> bool {
    key.starts_with("sk-") && key.len() >= 20
}

pub struct OpenAIService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    provider_id: String,
    params: SamplingParams,
    settings: PromptSettings,
    retry: RetryPolicy,
}

impl OpenAIService {
    pub fn new(
        api_key: Option<String>,
        base_url: String,
        model: String,
        params: SamplingParams,
        settings: PromptSettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client: build_client(settings.timeout),
            api_key: api_key.filter(|k| !k.is_empty()),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            provider_id: "openai".to_string(),
            params,
            settings,
            retry,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.provider_id = id.into();
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Model ids the key can use, sorted. Doubles as a key check: a rejected
    /// key comes back as a 401 status error.
    pub async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let url = format!("{}/models", self.base_url);
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let response = request_with_retry(
            move || {
                let mut req = client.get(&url);
                if let Some(key) = &api_key {
                    req = req.bearer_auth(key);
                }
                req.send()
            },
            self.retry,
        )
        .await?;
        let list: ModelList = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::MalformedCompletion(format!("bad /models body: {e}")))?;
        let mut ids: Vec<String> = list.data.into_iter().map(|m| m.id).collect();
        ids.sort();
        Ok(ids)
    }

    fn request(&self, system: &str, prompt: &str) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(prompt));
        ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            stream: false,
            temperature: self.params.temperature,
            max_tokens: self.params.max_tokens,
            top_p: self.params.top_p,
            stop: self.params.stop.clone(),
        }
    }
}

#[async_trait]
impl ModelService for OpenAIService {
    async fn complete(&self, system: &str, prompt: &str) -> Result<Completion, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request(system, prompt);
        let client = self.client.clone();
        let api_key = self.api_key.clone();

        let response = request_with_retry(
            move || {
                let client = client.clone();
                let url = url.clone();
                let body = body.clone();
                let api_key = api_key.clone();
                async move {
                    let mut req = client.post(&url).json(&body);
                    if let Some(key) = api_key {
                        req = req.bearer_auth(key);
                    }
                    req.send().await
                }
            },
            self.retry,
        )
        .await?;

        let raw: Value = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::MalformedCompletion(format!("bad chat completion body: {e}")))?;

        let text = raw["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::MalformedCompletion("no choices[0].message.content".into()))?;
        if text.trim().is_empty() {
            return Err(LlmError::EmptyCompletion);
        }
        if let Some(usage) = raw.get("usage") {
            tracing::debug!(backend = %self.provider_id, %usage, "completion usage");
        }
        Ok(Completion {
            text,
            raw,
            metrics: None,
        })
    }

    fn id(&self) -> &str {
        &self.provider_id
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn settings(&self) -> &PromptSettings {
        &self.settings
    }
}
