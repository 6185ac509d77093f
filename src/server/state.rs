//! Shared server state and the operations both HTTP and WebSocket clients use.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::ai::emotion::EmotionSnapshot;
use crate::ai::reply::ChatReply;
use crate::ai::scene::{SceneSnapshot, SceneTelemetry};
use crate::ai::session::{normalize_session_id, DialogueSession, SessionRegistry, SessionStatus, TurnStatus};
use crate::config::{ConfigError, ConfigStore, SystemConfig};
use crate::llm::provider::ModelService;
use crate::llm::service::{build_model_service, ModelHandle};
use crate::logging::LogRing;

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(alias = "text")]
    pub message: String,
    /// Client clock in milliseconds, echoed into logs only.
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub scene_info: Option<SceneTelemetry>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub turn_id: Uuid,
    pub success: bool,
    pub status: TurnStatus,
    pub response: ChatReply,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub session_id: String,
    pub response_time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub model_type: String,
    pub model_name: String,
    pub status: SessionStatus,
    pub last_error: Option<String>,
    pub last_response_time_ms: Option<u64>,
    pub turn_count: usize,
    pub sessions: usize,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub session_id: String,
    pub emotion: EmotionSnapshot,
    pub scene: SceneSnapshot,
    pub system: SystemInfo,
    pub recent_turns: Vec<crate::ai::context::Turn>,
}

/// Pushed to every WebSocket client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Turn(ChatResponse),
    ConfigUpdated { model_type: String, model_name: String },
}

#[derive(Clone)]
pub struct AppState {
    pub config: ConfigStore,
    pub models: ModelHandle,
    pub sessions: SessionRegistry,
    pub logs: LogRing,
    pub events: broadcast::Sender<ServerEvent>,
    pub static_dir: PathBuf,
    config_writes: Arc<Mutex<()>>,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        config: ConfigStore,
        model: Arc<dyn ModelService>,
        logs: LogRing,
        static_dir: PathBuf,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            config,
            models: ModelHandle::new(model),
            sessions: SessionRegistry::new(),
            logs,
            events,
            static_dir,
            config_writes: Arc::new(Mutex::new(())),
            started_at: Instant::now(),
        }
    }

    /// Run one turn for the request's session and broadcast the result.
    pub async fn chat(&self, request: ChatRequest) -> ChatResponse {
        let session_id = normalize_session_id(request.session_id.as_deref());
        let config = self.config.snapshot().await;
        let model = self.models.current().await;
        let slot = self.sessions.get_or_create(&session_id, &config).await;

        tracing::info!(
            session = %session_id,
            chars = request.message.chars().count(),
            client_ts = ?request.timestamp,
            "chat request"
        );
        let outcome = slot
            .run_turn(model, config, request.message, request.scene_info)
            .await;

        let response = ChatResponse {
            turn_id: outcome.id,
            success: outcome.is_success(),
            status: outcome.status,
            response: outcome.reply,
            error: outcome.error,
            session_id,
            response_time_ms: outcome.elapsed.as_millis() as u64,
        };
        // No subscribers is fine.
        let _ = self.events.send(ServerEvent::Turn(response.clone()));
        response
    }

    pub async fn status(&self, session_id: Option<&str>) -> StatusReport {
        let session_id = normalize_session_id(session_id);
        let config = self.config.snapshot().await;
        let view = match self.sessions.get(&session_id).await {
            Some(slot) => slot.view(),
            None => DialogueSession::new(session_id.clone(), &config).snapshot(),
        };
        StatusReport {
            session_id,
            emotion: view.emotion,
            scene: view.scene,
            system: SystemInfo {
                model_type: config.model.model_type.to_string(),
                model_name: config.model.model_name.clone(),
                status: view.status,
                last_error: view.last_error,
                last_response_time_ms: view.last_response_ms,
                turn_count: view.turn_count,
                sessions: self.sessions.len().await,
                uptime_secs: self.started_at.elapsed().as_secs(),
            },
            recent_turns: view.recent_turns,
        }
    }

    /// Replace the whole config. See [`AppState::update_config`].
    pub async fn apply_config(&self, candidate: SystemConfig) -> Result<Arc<SystemConfig>, ConfigError> {
        self.update_config(|config| {
            *config = candidate;
            Ok(())
        })
        .await
    }

    /// Edit the running config, validate, build the new backend, persist,
    /// then publish. Writers are serialized so each edit starts from the
    /// previous one's result. Nothing changes unless every step succeeds up
    /// to the save.
    pub async fn update_config<F>(&self, edit: F) -> Result<Arc<SystemConfig>, ConfigError>
    where
        F: FnOnce(&mut SystemConfig) -> Result<(), ConfigError>,
    {
        let _writer = self.config_writes.lock().await;
        let mut candidate = (*self.config.snapshot().await).clone();
        edit(&mut candidate)?;
        let prepared = self.config.prepare(candidate).await?;
        let service = build_model_service(&prepared)?;
        let committed = self.config.commit(prepared).await?;
        self.models.swap(service).await;
        let _ = self.events.send(ServerEvent::ConfigUpdated {
            model_type: committed.model.model_type.to_string(),
            model_name: committed.model.model_name.clone(),
        });
        Ok(committed)
    }
}
