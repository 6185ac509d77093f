//! Dialogue orchestration: one `DialogueSession` per conversation, kept in a
//! `SessionRegistry`.
//!
//! A session's mutex is held for the whole turn, model call included, so turns
//! on one session run strictly one after another while separate sessions
//! proceed independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use uuid::Uuid;

use crate::ai::context::{ConversationContext, Turn};
use crate::ai::emotion::{Action, Dials, EmotionSnapshot, EmotionState};
use crate::ai::reply::ChatReply;
use crate::ai::safety::REJECTION_TEXT;
use crate::ai::scene::{SafetyVerdict, SceneSnapshot, SceneTelemetry};
use crate::config::SystemConfig;
use crate::llm::provider::{ModelService, CONFUSED_TEXT, UNAVAILABLE_TEXT};

pub const DEFAULT_SESSION: &str = "default";
const RECENT_TURNS: usize = 20;

/// Memory bounds for the session registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sessions kept at once; the least recently used idle one is evicted.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Turns retained per session. Must cover `model.history_window`.
    #[serde(default = "default_max_context_turns")]
    pub max_context_turns: usize,
}

fn default_max_sessions() -> usize {
    256
}

fn default_max_context_turns() -> usize {
    20
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            max_context_turns: default_max_context_turns(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Processing,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Success,
    Error,
    Rejected,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Correlates the turn's log lines with the response sent to the client.
    pub id: Uuid,
    pub status: TurnStatus,
    pub reply: ChatReply,
    /// Error marker: set for failed and rejected turns.
    pub error: Option<String>,
    pub raw: Option<Value>,
    pub elapsed: Duration,
}

impl TurnOutcome {
    pub fn is_success(&self) -> bool {
        self.status == TurnStatus::Success
    }
}

/// Read-only view of a session for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub status: SessionStatus,
    pub emotion: EmotionSnapshot,
    pub scene: SceneSnapshot,
    pub turn_count: usize,
    pub recent_turns: Vec<Turn>,
    pub last_error: Option<String>,
    pub last_response_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}

pub struct DialogueSession {
    id: String,
    context: ConversationContext,
    emotion: EmotionState,
    scene: SceneSnapshot,
    status: SessionStatus,
    last_error: Option<String>,
    last_response_time: Option<Duration>,
    created_at: DateTime<Utc>,
}

impl DialogueSession {
    pub fn new(id: impl Into<String>, config: &SystemConfig) -> Self {
        Self {
            id: id.into(),
            context: ConversationContext::with_capacity(config.session.max_context_turns),
            emotion: EmotionState::from_config(&config.emotion),
            scene: SceneSnapshot::default(),
            status: SessionStatus::Idle,
            last_error: None,
            last_response_time: None,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn emotion(&self) -> &EmotionState {
        &self.emotion
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Run one user turn end to end.
    ///
    /// On success the emotion state takes the reply's values and both turns are
    /// logged. On failure only the user turn is logged and the emotion state is
    /// left as it was. Rejected or empty input touches neither.
    pub async fn process_turn(
        &mut self,
        service: &dyn ModelService,
        config: &SystemConfig,
        user_text: &str,
        scene_info: Option<SceneTelemetry>,
    ) -> TurnOutcome {
        let turn_id = Uuid::new_v4();
        let user_text = user_text.trim();
        if user_text.is_empty() {
            return TurnOutcome {
                id: turn_id,
                status: TurnStatus::Error,
                reply: ChatReply::holding(CONFUSED_TEXT, Action::ShakeHead, &self.emotion),
                error: Some("user input is empty".into()),
                raw: None,
                elapsed: Duration::ZERO,
            };
        }

        if let Err(violation) = config.safety.check(user_text, scene_info.as_ref()) {
            self.scene.record(scene_info, SafetyVerdict::Unsafe);
            tracing::info!(session = %self.id, turn = %turn_id, %violation, "turn rejected by safety check");
            return TurnOutcome {
                id: turn_id,
                status: TurnStatus::Rejected,
                reply: ChatReply::holding(REJECTION_TEXT, Action::ShakeHead, &self.emotion),
                error: Some(violation.to_string()),
                raw: None,
                elapsed: Duration::ZERO,
            };
        }
        let verdict = if config.safety.enable_safety_check {
            SafetyVerdict::Safe
        } else {
            SafetyVerdict::Unchecked
        };
        self.scene.record(scene_info, verdict);

        self.status = SessionStatus::Processing;
        let history = self.context.window(service.settings().history_window).to_vec();
        self.context.push(Turn::user(user_text));

        let response = service
            .get_response(user_text, &history, &self.emotion, &config.vocabulary)
            .await;
        self.last_response_time = Some(response.elapsed);

        match response.error {
            None => {
                let reply = response.reply;
                self.emotion.apply(reply.emotion_type, reply.action, reply.dials());
                self.context.push(Turn::assistant(reply.text.clone()));
                self.status = SessionStatus::Idle;
                self.last_error = None;
                tracing::debug!(session = %self.id, turn = %turn_id, turns = self.context.total(), "turn complete");
                TurnOutcome {
                    id: turn_id,
                    status: TurnStatus::Success,
                    reply,
                    error: None,
                    raw: response.raw,
                    elapsed: response.elapsed,
                }
            }
            Some(error) => {
                tracing::warn!(session = %self.id, turn = %turn_id, %error, "turn failed, fallback reply sent");
                self.status = SessionStatus::Error;
                self.last_error = Some(error.to_string());
                TurnOutcome {
                    id: turn_id,
                    status: TurnStatus::Error,
                    reply: response.reply,
                    error: Some(error.to_string()),
                    raw: None,
                    elapsed: response.elapsed,
                }
            }
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            status: self.status,
            emotion: self.emotion.snapshot(),
            scene: self.scene.clone(),
            turn_count: self.context.total(),
            recent_turns: self.context.window(RECENT_TURNS).to_vec(),
            last_error: self.last_error.clone(),
            last_response_ms: self.last_response_time.map(|d| d.as_millis() as u64),
            created_at: self.created_at,
        }
    }
}

// ── Registry ───────────────────────────────────────────

/// A session plus a published view that stays readable while a turn holds
/// the session lock.
pub struct SessionSlot {
    session: Mutex<DialogueSession>,
    view: watch::Sender<SessionSnapshot>,
    last_used: AtomicU64,
}

impl SessionSlot {
    fn new(session: DialogueSession, tick: u64) -> Self {
        let (view, _) = watch::channel(session.snapshot());
        Self {
            session: Mutex::new(session),
            view,
            last_used: AtomicU64::new(tick),
        }
    }

    /// Run one turn on a spawned task and wait for it. The turn completes and
    /// its final state is published even if the caller stops waiting.
    pub async fn run_turn(
        self: &Arc<Self>,
        service: Arc<dyn ModelService>,
        config: Arc<SystemConfig>,
        user_text: String,
        scene_info: Option<SceneTelemetry>,
    ) -> TurnOutcome {
        let slot = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut session = slot.session.lock().await;
            let mut busy = session.snapshot();
            busy.status = SessionStatus::Processing;
            slot.view.send_replace(busy);

            let outcome = session
                .process_turn(service.as_ref(), &config, &user_text, scene_info)
                .await;
            slot.view.send_replace(session.snapshot());
            outcome
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "turn task failed");
                self.aborted_outcome(e.to_string())
            }
        }
    }

    fn aborted_outcome(&self, error: String) -> TurnOutcome {
        let view = self.view();
        let emotion = EmotionState::new(
            view.emotion.emotion_type,
            Dials {
                speech_speed: view.emotion.speech_speed,
                volume: view.emotion.volume,
                pitch: view.emotion.pitch,
            },
        );
        TurnOutcome {
            id: Uuid::new_v4(),
            status: TurnStatus::Error,
            reply: ChatReply::holding(UNAVAILABLE_TEXT, Action::ShakeHead, &emotion),
            error: Some(error),
            raw: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn view(&self) -> SessionSnapshot {
        self.view.borrow().clone()
    }

    /// No turn holds the session right now.
    fn is_idle(&self) -> bool {
        self.session.try_lock().is_ok()
    }
}

/// Sessions by id, bounded by `session.max_sessions`.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<SessionSlot>>>>,
    clock: Arc<AtomicU64>,
}

/// Blank ids map to the default session.
pub fn normalize_session_id(id: Option<&str>) -> String {
    id.map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SESSION)
        .to_string()
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Look up a session without creating it or refreshing its recency.
    pub async fn get(&self, id: &str) -> Option<Arc<SessionSlot>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn get_or_create(&self, id: &str, config: &SystemConfig) -> Arc<SessionSlot> {
        if let Some(slot) = self.get(id).await {
            slot.last_used.store(self.tick(), Ordering::Relaxed);
            return slot;
        }
        let mut sessions = self.sessions.write().await;
        if let Some(slot) = sessions.get(id) {
            slot.last_used.store(self.tick(), Ordering::Relaxed);
            return slot.clone();
        }

        let limit = config.session.max_sessions.max(1);
        while sessions.len() >= limit {
            let oldest = sessions
                .iter()
                .filter(|(_, slot)| slot.is_idle())
                .min_by_key(|(_, slot)| slot.last_used.load(Ordering::Relaxed))
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    sessions.remove(&key);
                    tracing::info!(session = %key, "session evicted");
                }
                None => {
                    tracing::warn!(limit, "every session is busy, registry over its limit");
                    break;
                }
            }
        }

        let slot = Arc::new(SessionSlot::new(DialogueSession::new(id, config), self.tick()));
        sessions.insert(id.to_string(), slot.clone());
        tracing::info!(session = id, "session created");
        slot
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::emotion::{Dials, EmotionKind};
    use crate::ai::prompts::EMPTY_HISTORY;
    use crate::ai::scene::Obstacle;
    use crate::llm::error::LlmError;
    use crate::llm::provider::testing::ScriptedModel;

    const HAPPY: &str =
        r#"{"text":"你好！","emotion_type":"高兴","action":"微笑","speech_speed":7,"volume":6,"pitch":7}"#;
    const SAD: &str =
        r#"{"text":"别难过","emotion_type":"难过","action":"点头","speech_speed":3,"volume":4,"pitch":3}"#;

    fn session() -> (DialogueSession, SystemConfig) {
        let config = SystemConfig::default();
        (DialogueSession::new("t", &config), config)
    }

    #[tokio::test]
    async fn greeting_turn_updates_emotion_and_logs_both_turns() {
        let (mut session, config) = session();
        let model = ScriptedModel::ok(HAPPY);

        let outcome = session.process_turn(&model, &config, "你好", None).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.reply.text, "你好！");
        assert_eq!(session.emotion().kind(), EmotionKind::Happy);
        assert_eq!(session.emotion().dials(), Dials::new(7, 6, 7).unwrap());
        assert_eq!(session.context().len(), 2);
        assert_eq!(session.status(), SessionStatus::Idle);

        let prompt = model.last_prompt().unwrap();
        assert!(prompt.contains("语速: 5\n   - 音量: 5\n   - 音调: 5"), "prompt carries default dials");
        assert!(prompt.contains(&format!("3. 对话历史:\n{EMPTY_HISTORY}\n")), "first turn has empty history");
    }

    #[tokio::test]
    async fn invalid_json_keeps_user_turn_and_emotion() {
        let (mut session, config) = session();
        let model = ScriptedModel::ok("这不是JSON");

        let outcome = session.process_turn(&model, &config, "你好", None).await;

        assert_eq!(outcome.status, TurnStatus::Error);
        assert_eq!(outcome.reply.text, CONFUSED_TEXT);
        assert!(outcome.error.is_some(), "error marker must be set");
        assert_eq!(session.emotion().kind(), EmotionKind::Calm);
        assert_eq!(session.emotion().dials(), Dials::new(5, 5, 5).unwrap());
        assert_eq!(session.context().len(), 1);
        assert_eq!(session.context().last().unwrap().text, "你好");
        assert_eq!(session.status(), SessionStatus::Error);
    }

    #[tokio::test]
    async fn unknown_emotion_label_takes_fallback_path() {
        let (mut session, config) = session();
        let model = ScriptedModel::ok(&HAPPY.replace("高兴", "兴奋"));
        let outcome = session.process_turn(&model, &config, "你好", None).await;
        assert_eq!(outcome.status, TurnStatus::Error);
        assert_eq!(session.emotion().kind(), EmotionKind::Calm);
        assert_eq!(session.context().len(), 1);
    }

    #[tokio::test]
    async fn timeout_is_treated_like_a_backend_error() {
        let (mut session, config) = session();
        let model = ScriptedModel::ok(HAPPY)
            .with_delay(Duration::from_millis(200))
            .with_timeout(Duration::from_millis(20));
        let outcome = session.process_turn(&model, &config, "你好", None).await;
        assert_eq!(outcome.status, TurnStatus::Error);
        assert!(outcome.error.unwrap().contains("no reply within"));
        assert_eq!(session.context().len(), 1);
        assert_eq!(session.emotion().kind(), EmotionKind::Calm);
    }

    #[tokio::test]
    async fn recovery_after_error_clears_status() {
        let (mut session, config) = session();
        let model = ScriptedModel::new(vec![
            Err(LlmError::Network("connection refused".into())),
            Ok(SAD.to_string()),
        ]);

        session.process_turn(&model, &config, "在吗", None).await;
        assert_eq!(session.status(), SessionStatus::Error);

        let outcome = session.process_turn(&model, &config, "我考试没考好", None).await;
        assert!(outcome.is_success());
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.last_error().is_none());
        let texts: Vec<_> = session.context().turns().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["在吗", "我考试没考好", "别难过"]);

        let prompt = model.last_prompt().unwrap();
        assert!(prompt.contains("用户: 在吗\n"), "failed user turn stays in history");
    }

    #[tokio::test]
    async fn later_prompts_embed_earlier_exchange() {
        let (mut session, config) = session();
        let model = ScriptedModel::new(vec![Ok(HAPPY.to_string()), Ok(SAD.to_string())]);
        session.process_turn(&model, &config, "你好", None).await;
        session.process_turn(&model, &config, "我有点难过", None).await;

        let prompt = model.last_prompt().unwrap();
        assert!(prompt.contains("用户: 你好\n机器人: 你好！\n"));
        assert!(prompt.contains("类型: 高兴\n   - 语速: 7"));
        assert_eq!(session.emotion().kind(), EmotionKind::Sad);
        assert_eq!(session.context().len(), 4);
    }

    #[tokio::test]
    async fn unsafe_input_is_rejected_without_calling_backend() {
        let (mut session, config) = session();
        let model = ScriptedModel::ok(HAPPY);

        let outcome = session.process_turn(&model, &config, "去踢那只猫", None).await;
        assert_eq!(outcome.status, TurnStatus::Rejected);
        assert_eq!(outcome.reply.text, REJECTION_TEXT);
        assert_eq!(outcome.reply.action, Action::ShakeHead);

        let scene = SceneTelemetry {
            obstacles: vec![Obstacle { name: Some("墙".into()), distance: Some(0.3) }],
            ..Default::default()
        };
        let outcome = session.process_turn(&model, &config, "往前走", Some(scene)).await;
        assert_eq!(outcome.status, TurnStatus::Rejected);

        assert_eq!(model.call_count(), 0);
        assert!(session.context().is_empty());
        assert_eq!(session.snapshot().scene.safety, SafetyVerdict::Unsafe);
    }

    #[tokio::test]
    async fn empty_input_changes_nothing() {
        let (mut session, config) = session();
        let model = ScriptedModel::ok(HAPPY);
        let outcome = session.process_turn(&model, &config, "   ", None).await;
        assert_eq!(outcome.status, TurnStatus::Error);
        assert_eq!(model.call_count(), 0);
        assert!(session.context().is_empty());
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    fn shared(model: ScriptedModel) -> Arc<dyn ModelService> {
        Arc::new(model)
    }

    #[tokio::test]
    async fn turns_on_one_session_are_serialized() {
        let config = Arc::new(SystemConfig::default());
        let registry = SessionRegistry::new();
        let model = Arc::new(ScriptedModel::ok(HAPPY).with_delay(Duration::from_millis(30)));
        let service: Arc<dyn ModelService> = model.clone();
        let slot = registry.get_or_create("same", &config).await;

        let a = {
            let (slot, service, config) = (slot.clone(), service.clone(), config.clone());
            tokio::spawn(async move { slot.run_turn(service, config, "第一句".into(), None).await })
        };
        let b = {
            let (slot, service, config) = (slot.clone(), service.clone(), config.clone());
            tokio::spawn(async move { slot.run_turn(service, config, "第二句".into(), None).await })
        };
        assert!(a.await.unwrap().is_success());
        assert!(b.await.unwrap().is_success());

        let view = slot.view();
        assert_eq!(view.turn_count, 4);
        let roles: Vec<_> = view.recent_turns.iter().map(|t| t.role).collect();
        use crate::ai::context::Role::*;
        assert_eq!(roles, vec![User, Assistant, User, Assistant], "turns must not interleave");

        let prompts = model.prompts.lock().unwrap().clone();
        assert!(prompts[1].contains("机器人: 你好！"), "second call sees the first exchange");
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let config = Arc::new(SystemConfig::default());
        let registry = SessionRegistry::new();
        let happy = shared(ScriptedModel::ok(HAPPY));
        let sad = shared(ScriptedModel::ok(SAD));

        let one = registry.get_or_create("one", &config).await;
        let two = registry.get_or_create("two", &config).await;
        one.run_turn(happy, config.clone(), "你好".into(), None).await;
        two.run_turn(sad.clone(), config.clone(), "唉".into(), None).await;
        two.run_turn(sad, config.clone(), "唉".into(), None).await;

        assert_eq!(one.view().emotion.emotion_type, EmotionKind::Happy);
        assert_eq!(one.view().turn_count, 2);
        assert_eq!(two.view().emotion.emotion_type, EmotionKind::Sad);
        assert_eq!(two.view().turn_count, 4);
        assert_eq!(registry.ids().await, vec!["one".to_string(), "two".to_string()]);
        assert!(Arc::ptr_eq(&one, &registry.get_or_create("one", &config).await));
    }

    #[tokio::test]
    async fn dropped_request_still_finishes_the_turn() {
        let config = Arc::new(SystemConfig::default());
        let registry = SessionRegistry::new();
        let slot = registry.get_or_create("gone", &config).await;
        let service = shared(ScriptedModel::ok(HAPPY).with_delay(Duration::from_millis(200)));

        let request = {
            let slot = slot.clone();
            tokio::spawn(async move { slot.run_turn(service, config, "你好".into(), None).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(slot.view().status, SessionStatus::Processing);
        request.abort();
        assert!(request.await.unwrap_err().is_cancelled());

        tokio::time::sleep(Duration::from_millis(400)).await;
        let view = slot.view();
        assert_eq!(view.status, SessionStatus::Idle, "turn must not stay in processing");
        assert_eq!(view.turn_count, 2);
        assert_eq!(view.emotion.emotion_type, EmotionKind::Happy);
    }

    #[tokio::test]
    async fn registry_evicts_least_recently_used_session() {
        let mut config = SystemConfig::default();
        config.session.max_sessions = 2;
        let registry = SessionRegistry::new();

        let a = registry.get_or_create("a", &config).await;
        registry.get_or_create("b", &config).await;
        // touching "a" leaves "b" as the oldest
        registry.get_or_create("a", &config).await;
        registry.get_or_create("c", &config).await;

        assert_eq!(registry.len().await, 2);
        assert_eq!(registry.ids().await, vec!["a".to_string(), "c".to_string()]);
        assert!(Arc::ptr_eq(&a, &registry.get("a").await.unwrap()));

        // a recreated session starts fresh and pushes out "a", now the oldest
        let b = registry.get_or_create("b", &config).await;
        assert_eq!(b.view().turn_count, 0);
        assert_eq!(registry.ids().await, vec!["b".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn busy_sessions_are_not_evicted() {
        let mut config = SystemConfig::default();
        config.session.max_sessions = 1;
        let registry = SessionRegistry::new();

        let busy = registry.get_or_create("busy", &config).await;
        let guard = busy.session.lock().await;
        registry.get_or_create("next", &config).await;
        assert_eq!(registry.ids().await, vec!["busy".to_string(), "next".to_string()]);
        drop(guard);

        registry.get_or_create("third", &config).await;
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.ids().await, vec!["third".to_string()]);
    }

    #[tokio::test]
    async fn stored_context_is_capped_but_turns_keep_counting() {
        let mut config = SystemConfig::default();
        config.model.history_window = 4;
        config.session.max_context_turns = 4;
        let mut session = DialogueSession::new("cap", &config);
        let model = ScriptedModel::ok(HAPPY).with_history_window(4);

        for text in ["一", "二", "三", "四"] {
            assert!(session.process_turn(&model, &config, text, None).await.is_success());
        }

        assert_eq!(session.context().len(), 4);
        assert_eq!(session.context().total(), 8);
        assert_eq!(session.snapshot().turn_count, 8);
        let texts: Vec<_> = session.context().turns().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["三", "你好！", "四", "你好！"]);

        let prompt = model.last_prompt().unwrap();
        assert!(prompt.contains("用户: 二\n机器人: 你好！\n用户: 三\n机器人: 你好！\n"));
        assert!(!prompt.contains("用户: 一\n"), "evicted turns leave the prompt");
    }

    proptest::proptest! {
        #[test]
        fn every_valid_reply_is_applied_exactly(
            kind in 0usize..5,
            action in 0usize..5,
            speed in 1i64..=10,
            volume in 1i64..=10,
            pitch in 1i64..=10,
        ) {
            let kind = EmotionKind::ALL[kind];
            let action = Action::ALL[action];
            let reply = serde_json::json!({
                "text": "嗯",
                "emotion_type": kind.label(),
                "action": action.label(),
                "speech_speed": speed,
                "volume": volume,
                "pitch": pitch,
            })
            .to_string();

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let (mut session, config) = session();
            let model = ScriptedModel::ok(&reply);
            let outcome = runtime.block_on(session.process_turn(&model, &config, "你好", None));

            proptest::prop_assert!(outcome.is_success());
            proptest::prop_assert_eq!(outcome.reply.action, action);
            proptest::prop_assert_eq!(session.emotion().kind(), kind);
            proptest::prop_assert_eq!(session.emotion().dials(), Dials::new(speed, volume, pitch).unwrap());
            proptest::prop_assert_eq!(session.emotion().last_action(), Some(action));
            proptest::prop_assert_eq!(session.context().len(), 2);
        }
    }

    #[test]
    fn blank_session_ids_map_to_default() {
        assert_eq!(normalize_session_id(None), DEFAULT_SESSION);
        assert_eq!(normalize_session_id(Some("  ")), DEFAULT_SESSION);
        assert_eq!(normalize_session_id(Some(" kid-1 ")), "kid-1");
    }
}
