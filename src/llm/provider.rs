//! Model service trait: common interface for all LLM backends.
//!
//! Adapters only implement `complete`, a single prompt-in/text-out exchange.
//! Prompt assembly, the timeout, reply validation and the fallback path live
//! in the provided `get_response`, so every backend degrades the same way.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::ai::context::Turn;
use crate::ai::emotion::{Action, EmotionRules, EmotionState};
use crate::ai::prompts::TurnPrompt;
use crate::ai::reply::{parse_reply, ChatReply};
use crate::ai::vocabulary::VocabularyConstraints;
use crate::config::SystemConfig;
use crate::llm::error::LlmError;

pub const CONFUSED_TEXT: &str = "对不起，我现在有点困惑";
pub const UNAVAILABLE_TEXT: &str = "抱歉，服务暂时不可用";

// ── Settings shared by every adapter ───────────────────

#[derive(Debug, Clone)]
pub struct PromptSettings {
    pub system_prompt: String,
    pub history_window: usize,
    pub timeout: Duration,
    pub rules: EmotionRules,
}

impl PromptSettings {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            system_prompt: config.system_prompt.clone(),
            history_window: config.model.history_window,
            timeout: Duration::from_secs(config.model.timeout_secs),
            rules: config.emotion.rules.clone(),
        }
    }
}

/// Sampling parameters passed to the backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplingParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub repeat_penalty: Option<f32>,
    pub stop: Option<Vec<String>>,
}

impl From<&crate::llm::llm_config::ModelConfig> for SamplingParams {
    fn from(cfg: &crate::llm::llm_config::ModelConfig) -> Self {
        Self {
            temperature: Some(cfg.temperature),
            max_tokens: Some(cfg.num_predict),
            top_p: Some(cfg.top_p),
            top_k: Some(cfg.top_k),
            repeat_penalty: Some(cfg.repeat_penalty),
            stop: (!cfg.stop_sequences.is_empty()).then(|| cfg.stop_sequences.clone()),
        }
    }
}

// ── Completion / response ──────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompletionMetrics {
    pub total_duration_ms: Option<f64>,
    pub eval_count: Option<u64>,
    pub tokens_per_second: Option<f64>,
}

/// Raw backend answer before validation.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub raw: Value,
    pub metrics: Option<CompletionMetrics>,
}

/// What `get_response` hands back. `error` is the error marker: when set,
/// `reply` is an apology that echoes the caller's current emotion.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub reply: ChatReply,
    pub raw: Option<Value>,
    pub error: Option<LlmError>,
    pub metrics: Option<CompletionMetrics>,
    pub elapsed: Duration,
}

impl ModelResponse {
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    pub fn degraded(error: LlmError, emotion: &EmotionState, elapsed: Duration) -> Self {
        let text = if error.is_transport() {
            UNAVAILABLE_TEXT
        } else {
            CONFUSED_TEXT
        };
        Self {
            reply: ChatReply::holding(text, Action::ShakeHead, emotion),
            raw: None,
            error: Some(error),
            metrics: None,
            elapsed,
        }
    }
}

// ── Trait ──────────────────────────────────────────────

#[async_trait]
pub trait ModelService: Send + Sync {
    /// One request/response exchange with the backend.
    async fn complete(&self, system: &str, prompt: &str) -> Result<Completion, LlmError>;

    /// Backend identifier ("ollama", "openai", "other").
    fn id(&self) -> &str;

    fn model_name(&self) -> &str;

    fn settings(&self) -> &PromptSettings;

    /// Build the turn prompt, ask the backend, validate the reply. Never fails:
    /// problems come back as a degraded response.
    async fn get_response(
        &self,
        user_input: &str,
        context: &[Turn],
        emotion: &EmotionState,
        vocabulary_constraints: &VocabularyConstraints,
    ) -> ModelResponse {
        let started = Instant::now();
        match respond(self, user_input, context, emotion, vocabulary_constraints).await {
            Ok((reply, payload, metrics)) => {
                tracing::info!(
                    backend = self.id(),
                    model = self.model_name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    emotion = %reply.emotion_type,
                    action = %reply.action,
                    "model reply accepted"
                );
                ModelResponse {
                    reply,
                    raw: Some(payload),
                    error: None,
                    metrics,
                    elapsed: started.elapsed(),
                }
            }
            Err(error) => {
                tracing::warn!(
                    backend = self.id(),
                    model = self.model_name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    %error,
                    "model reply degraded"
                );
                ModelResponse::degraded(error, emotion, started.elapsed())
            }
        }
    }
}

async fn respond<S: ModelService + ?Sized>(
    service: &S,
    user_input: &str,
    context: &[Turn],
    emotion: &EmotionState,
    vocabulary: &VocabularyConstraints,
) -> Result<(ChatReply, Value, Option<CompletionMetrics>), LlmError> {
    if user_input.trim().is_empty() {
        return Err(LlmError::EmptyInput);
    }
    let settings = service.settings();
    let start = context.len().saturating_sub(settings.history_window);
    let prompt = TurnPrompt {
        user_input,
        history: &context[start..],
        emotion,
        vocabulary,
        rules: Some(&settings.rules),
    }
    .render();
    tracing::debug!(backend = service.id(), prompt_chars = prompt.chars().count(), "sending prompt");

    let completion = tokio::time::timeout(
        settings.timeout,
        service.complete(&settings.system_prompt, &prompt),
    )
    .await
    .map_err(|_| LlmError::Timeout(settings.timeout))??;

    let (reply, payload) = parse_reply(&completion.text).map_err(|e| {
        tracing::debug!(raw = %completion.text, "completion failed validation");
        e
    })?;
    Ok((reply, payload, completion.metrics))
}
