//! Model backend configuration: the `model` group of the system config.

use crate::config;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Ollama,
    #[serde(rename = "openai")]
    OpenAI,
    /// Any OpenAI-compatible endpoint reached through `api_base`.
    Other,
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelType::Ollama => "ollama",
            ModelType::OpenAI => "openai",
            ModelType::Other => "other",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_type")]
    pub model_type: ModelType,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,
    /// Base URL. Defaults per backend when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,
    /// Maximum tokens to generate.
    #[serde(default = "default_num_predict")]
    pub num_predict: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,

    /// Number of most recent turns embedded in each prompt.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_model_type() -> ModelType {
    ModelType::Ollama
}
fn default_model_name() -> String {
    "llama2".to_string()
}
fn default_api_key_env() -> Option<String> {
    Some("OPENAI_API_KEY".to_string())
}
fn default_temperature() -> f32 {
    0.7
}
fn default_top_k() -> u32 {
    40
}
fn default_top_p() -> f32 {
    0.9
}
fn default_repeat_penalty() -> f32 {
    1.1
}
fn default_num_predict() -> u32 {
    256
}
fn default_history_window() -> usize {
    10
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_type: default_model_type(),
            model_name: default_model_name(),
            api_key: None,
            api_key_env: default_api_key_env(),
            api_base: None,
            temperature: default_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            repeat_penalty: default_repeat_penalty(),
            num_predict: default_num_predict(),
            stop_sequences: Vec::new(),
            history_window: default_history_window(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

pub const OLLAMA_DEFAULT_BASE: &str = "http://localhost:11434";
pub const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com/v1";

impl ModelConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        config::resolve_api_key(&self.api_key, &self.api_key_env)
    }

    /// Base URL the adapter should talk to. `other` endpoints get `/v1`
    /// appended unless already present.
    pub fn base_url(&self) -> Option<String> {
        let configured = self
            .api_base
            .as_deref()
            .map(|s| s.trim().trim_end_matches('/'))
            .filter(|s| !s.is_empty());
        match self.model_type {
            ModelType::Ollama => Some(configured.unwrap_or(OLLAMA_DEFAULT_BASE).to_string()),
            ModelType::OpenAI => Some(configured.unwrap_or(OPENAI_DEFAULT_BASE).to_string()),
            ModelType::Other => configured.map(|base| {
                if base.ends_with("/v1") {
                    base.to_string()
                } else {
                    format!("{base}/v1")
                }
            }),
        }
    }

    /// The API key is never echoed back to clients.
    pub fn redacted(&self) -> Self {
        Self {
            api_key: self.api_key.as_ref().map(|_| config::REDACTED_KEY.to_string()),
            ..self.clone()
        }
    }

    /// Collect human-readable problems with this group.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.model_name.trim().is_empty() {
            problems.push("model.model_name must not be empty".to_string());
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            problems.push(format!("model.temperature {} is outside [0, 1]", self.temperature));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            problems.push(format!("model.top_p {} is outside (0, 1]", self.top_p));
        }
        if self.history_window == 0 {
            problems.push("model.history_window must be positive".to_string());
        }
        if self.timeout_secs == 0 {
            problems.push("model.timeout_secs must be positive".to_string());
        }
        match self.model_type {
            ModelType::OpenAI if self.resolve_api_key().is_none() => problems.push(format!(
                "model_type openai needs model.api_key or the {} environment variable",
                self.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY")
            )),
            ModelType::Other if self.base_url().is_none() => {
                problems.push("model_type other needs model.api_base".to_string())
            }
            _ => {}
        }
        problems
    }
}
