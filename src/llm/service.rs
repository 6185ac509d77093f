//! Model handle: shared server state holding the active backend.

use crate::config::{ConfigError, SystemConfig};
use crate::llm::llm_config::ModelType;
use crate::llm::ollama::OllamaService;
use crate::llm::openai::OpenAIService;
use crate::llm::provider::{ModelService, PromptSettings, SamplingParams};
use crate::utils::http::RetryPolicy;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Holds the active backend; swapped atomically when the config changes.
/// In-flight turns keep the `Arc` they started with.
#[derive(Clone)]
pub struct ModelHandle {
    service: Arc<RwLock<Arc<dyn ModelService>>>,
}

impl ModelHandle {
    pub fn new(service: Arc<dyn ModelService>) -> Self {
        Self {
            service: Arc::new(RwLock::new(service)),
        }
    }

    pub fn from_config(config: &SystemConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(build_model_service(config)?))
    }

    pub async fn current(&self) -> Arc<dyn ModelService> {
        self.service.read().await.clone()
    }

    pub async fn swap(&self, service: Arc<dyn ModelService>) {
        tracing::info!(backend = service.id(), model = service.model_name(), "model service swapped");
        *self.service.write().await = service;
    }
}

/// Factory: build the backend named by `model.model_type`.
pub fn build_model_service(config: &SystemConfig) -> Result<Arc<dyn ModelService>, ConfigError> {
    let model = &config.model;
    let params = SamplingParams::from(model);
    let settings = PromptSettings::from_config(config);
    let retry = RetryPolicy::with_retries(model.max_retries);
    let base_url = model
        .base_url()
        .ok_or_else(|| ConfigError::Invalid(vec!["model_type other needs model.api_base".into()]))?;

    let service: Arc<dyn ModelService> = match model.model_type {
        ModelType::Ollama => Arc::new(OllamaService::new(
            base_url,
            model.model_name.clone(),
            params,
            settings,
            retry,
        )),
        ModelType::OpenAI => {
            let key = model
                .resolve_api_key()
                .ok_or_else(|| ConfigError::MissingApiKey(model.api_key_env.clone().unwrap_or_default()))?;
            Arc::new(OpenAIService::new(
                Some(key),
                base_url,
                model.model_name.clone(),
                params,
                settings,
                retry,
            ))
        }
        ModelType::Other => Arc::new(
            OpenAIService::new(
                model.resolve_api_key(),
                base_url,
                model.model_name.clone(),
                params,
                settings,
                retry,
            )
            .with_id("other"),
        ),
    };
    Ok(service)
}
