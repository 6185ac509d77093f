pub mod error;
pub mod llm_config;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod service;

pub use error::LlmError;
pub use llm_config::{ModelConfig, ModelType};
pub use provider::{Completion, ModelResponse, ModelService, PromptSettings, SamplingParams};
pub use service::{build_model_service, ModelHandle};
