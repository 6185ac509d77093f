//! System configuration: the five config groups, JSON persistence helpers and
//! API key resolution.

use crate::ai::emotion::EmotionConfig;
use crate::ai::prompts::DEFAULT_SYSTEM_PROMPT;
use crate::ai::context::MIN_CONTEXT_TURNS;
use crate::ai::safety::SafetyConfig;
use crate::ai::session::SessionConfig;
use crate::ai::vocabulary::{VocabularyConstraints, VocabularyError};
use crate::llm::llm_config::ModelConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.json";

/// Placeholder the API returns instead of a stored key. Posting it back keeps
/// the stored key.
pub const REDACTED_KEY: &str = "********";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
    #[error("no API key configured: set model.api_key or ${0}")]
    MissingApiKey(String),
    #[error(transparent)]
    Vocabulary(#[from] VocabularyError),
}

// ── Generic JSON helpers ───────────────────────────────

/// Load any Serde config type. A missing file yields `T::default()`; a file
/// that exists but cannot be read or parsed is an error.
pub fn load_json_config<T: DeserializeOwned + Default>(path: &Path, label: &str) -> Result<T, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let config = serde_json::from_str::<T>(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
            tracing::info!(label, path = %path.display(), "loaded config");
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(label, path = %path.display(), "no config file, using defaults");
            Ok(T::default())
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Save any Serde config type as pretty JSON, creating parent directories.
pub fn save_json_config<T: Serialize>(path: &Path, config: &T, label: &str) -> Result<(), ConfigError> {
    let io_err = |source: std::io::Error| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json).map_err(io_err)?;
    tracing::info!(label, path = %path.display(), "saved config");
    Ok(())
}

/// Resolve an API key: check the direct `api_key` field first,
/// then fall back to reading the environment variable named in `api_key_env`.
pub fn resolve_api_key(api_key: &Option<String>, api_key_env: &Option<String>) -> Option<String> {
    if let Some(key) = api_key.as_deref().filter(|k| !k.is_empty() && *k != REDACTED_KEY) {
        return Some(key.to_string());
    }
    api_key_env
        .as_deref()
        .and_then(|var| std::env::var(var).ok())
        .filter(|key| !key.is_empty())
}

// ── System config ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub emotion: EmotionConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub vocabulary: VocabularyConstraints,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            emotion: EmotionConfig::default(),
            safety: SafetyConfig::default(),
            vocabulary: VocabularyConstraints::default(),
            session: SessionConfig::default(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl SystemConfig {
    /// Every problem found, or `Ok` when the config is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = self.model.problems();

        if self.emotion.history_size == 0 {
            problems.push("emotion.history_size must be positive".into());
        }
        if self.vocabulary.emotion_words(self.emotion.default_emotion).is_empty() {
            problems.push(format!(
                "emotion.default_emotion {} has no entry in vocabulary.emotions",
                self.emotion.default_emotion
            ));
        }
        let distance = self.safety.min_obstacle_distance;
        if !(distance.is_finite() && distance > 0.0) {
            problems.push(format!("safety.min_obstacle_distance {distance} must be positive"));
        }
        if self.vocabulary.emotions.values().all(Vec::is_empty) {
            problems.push("vocabulary.emotions must not be empty".into());
        }
        if self.vocabulary.actions.is_empty() {
            problems.push("vocabulary.actions must not be empty".into());
        }
        if self.vocabulary.responses.values().all(Vec::is_empty) {
            problems.push("vocabulary.responses must not be empty".into());
        }
        if self.session.max_sessions == 0 {
            problems.push("session.max_sessions must be positive".into());
        }
        let floor = self.model.history_window.max(MIN_CONTEXT_TURNS);
        if self.session.max_context_turns < floor {
            problems.push(format!(
                "session.max_context_turns {} must be at least {floor} (model.history_window)",
                self.session.max_context_turns
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    /// Copy safe to hand to clients.
    pub fn redacted(&self) -> Self {
        Self {
            model: self.model.redacted(),
            ..self.clone()
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config: SystemConfig = load_json_config(path, "Config")?;
        config.vocabulary.normalize();
        config.validate()?;
        Ok(config)
    }
}

// ── Shared store ───────────────────────────────────────

/// Running config plus the file it persists to. Readers take an `Arc`
/// snapshot, so a turn sees one consistent config even across an update.
#[derive(Clone)]
pub struct ConfigStore {
    current: Arc<RwLock<Arc<SystemConfig>>>,
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(config: SystemConfig, path: PathBuf) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn snapshot(&self) -> Arc<SystemConfig> {
        self.current.read().await.clone()
    }

    /// Fill in what a client could not have sent back (redacted key),
    /// normalize and validate. Does not touch the running config.
    pub async fn prepare(&self, mut candidate: SystemConfig) -> Result<SystemConfig, ConfigError> {
        if candidate.model.api_key.as_deref() == Some(REDACTED_KEY) {
            candidate.model.api_key = self.current.read().await.model.api_key.clone();
        }
        candidate.vocabulary.normalize();
        candidate.validate()?;
        Ok(candidate)
    }

    /// Persist then publish a prepared config.
    pub async fn commit(&self, config: SystemConfig) -> Result<Arc<SystemConfig>, ConfigError> {
        let mut guard = self.current.write().await;
        save_json_config(&self.path, &config, "Config")?;
        let config = Arc::new(config);
        *guard = config.clone();
        Ok(config)
    }
}
