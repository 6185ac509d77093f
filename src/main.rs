use anyhow::Context;
use std::net::SocketAddr;
use std::path::PathBuf;

use emotion_dialogue::config::{ConfigStore, SystemConfig, DEFAULT_CONFIG_PATH};
use emotion_dialogue::llm::llm_config::ModelType;
use emotion_dialogue::llm::ollama::OllamaService;
use emotion_dialogue::llm::provider::{PromptSettings, SamplingParams};
use emotion_dialogue::llm::service::build_model_service;
use emotion_dialogue::logging::{self, LogRing};
use emotion_dialogue::server::{self, AppState};
use emotion_dialogue::utils::http::RetryPolicy;

const DEFAULT_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_STATIC_DIR: &str = "static";

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Warn early when the Ollama server is down or the model is missing.
/// The server still starts; turns fall back until the backend comes up.
async fn check_ollama(config: &SystemConfig) {
    let Some(base) = config.model.base_url() else {
        return;
    };
    let ollama = OllamaService::new(
        base.clone(),
        config.model.model_name.clone(),
        SamplingParams::default(),
        PromptSettings::from_config(config),
        RetryPolicy::with_retries(0),
    );
    match ollama.check_ready().await {
        Ok(version) => tracing::info!(%version, %base, model = %config.model.model_name, "ollama ready"),
        Err(e) => tracing::warn!(error = %e, %base, "ollama not ready; replies will fall back until it is"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let logs = LogRing::default();
    logging::init(logs.clone());

    let config_path = PathBuf::from(env_or("DIALOGUE_CONFIG", DEFAULT_CONFIG_PATH));
    let addr: SocketAddr = env_or("DIALOGUE_ADDR", DEFAULT_ADDR)
        .parse()
        .context("DIALOGUE_ADDR is not a socket address")?;
    let static_dir = PathBuf::from(env_or("DIALOGUE_STATIC_DIR", DEFAULT_STATIC_DIR));

    let config = SystemConfig::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    tracing::info!(
        path = %config_path.display(),
        model_type = %config.model.model_type,
        model = %config.model.model_name,
        "config loaded"
    );

    let model = build_model_service(&config).context("building model service")?;
    if config.model.model_type == ModelType::Ollama {
        check_ollama(&config).await;
    }

    let state = AppState::new(ConfigStore::new(config, config_path), model, logs, static_dir);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
        tracing::info!("shutdown requested");
    };
    server::serve(state, addr, shutdown).await.context("serving")?;
    Ok(())
}
