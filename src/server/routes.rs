//! HTTP routes. Every JSON error has the shape `{"success": false, "error": "..."}`.

use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::ai::vocabulary::{VocabularyCategory, VocabularyUpdate};
use crate::ai::session::normalize_session_id;
use crate::config::{ConfigError, SystemConfig};
use crate::llm::llm_config::{ModelType, OLLAMA_DEFAULT_BASE, OPENAI_DEFAULT_BASE};
use crate::llm::ollama::OllamaService;
use crate::llm::openai::{looks_like_api_key, OpenAIService};
use crate::llm::provider::{PromptSettings, SamplingParams};
use crate::server::state::{AppState, ChatRequest};
use crate::server::ws;
use crate::utils::http::RetryPolicy;

const MAX_BODY: u64 = 64 * 1024;
const DEFAULT_LOG_LINES: usize = 100;
const MAX_LOG_LINES: usize = 1000;

#[derive(Debug, Default, Deserialize)]
struct SessionQuery {
    session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LogsQuery {
    lines: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct KeyQuery {
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VocabularyKey {
    category: VocabularyCategory,
    key: String,
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn json_body<T: serde::de::DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY).and(warp::body::json())
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    warp::reply::with_status(
        warp::reply::json(&json!({ "success": false, "error": message.into() })),
        status,
    )
    .into_response()
}

/// All routes: the JSON API, the WebSocket endpoint and the static front end.
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let static_dir = state.static_dir.clone();

    let chat = warp::path!("api" / "chat")
        .and(warp::post())
        .and(json_body::<ChatRequest>())
        .and(with_state(state.clone()))
        .and_then(handle_chat);

    let status = warp::path!("api" / "status")
        .and(warp::get())
        .and(warp::query::<SessionQuery>())
        .and(with_state(state.clone()))
        .and_then(handle_status);

    let get_config = warp::path!("api" / "config")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_get_config);

    let post_config = warp::path!("api" / "config")
        .and(warp::post())
        .and(json_body::<SystemConfig>())
        .and(with_state(state.clone()))
        .and_then(handle_post_config);

    let post_vocabulary = warp::path!("api" / "vocabulary")
        .and(warp::post())
        .and(json_body::<VocabularyUpdate>())
        .and(with_state(state.clone()))
        .and_then(handle_update_vocabulary);

    let delete_vocabulary = warp::path!("api" / "vocabulary")
        .and(warp::delete())
        .and(warp::query::<VocabularyKey>())
        .and(with_state(state.clone()))
        .and_then(handle_delete_vocabulary);

    let logs = warp::path!("api" / "logs")
        .and(warp::get())
        .and(warp::query::<LogsQuery>())
        .and(with_state(state.clone()))
        .and_then(handle_logs);

    let ollama_models = warp::path!("api" / "models" / "ollama")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_ollama_models);

    let openai_models = warp::path!("api" / "models" / "openai")
        .and(warp::get())
        .and(warp::query::<KeyQuery>())
        .and(with_state(state.clone()))
        .and_then(handle_openai_models);

    let socket = warp::path!("ws")
        .and(warp::ws())
        .and(warp::query::<SessionQuery>())
        .and(with_state(state))
        .map(|upgrade: warp::ws::Ws, query: SessionQuery, state: AppState| {
            let session_id = normalize_session_id(query.session_id.as_deref());
            let events = state.events.subscribe();
            upgrade.on_upgrade(move |socket| ws::client_connected(socket, state, session_id, events))
        });

    let index = warp::path::end()
        .and(warp::get())
        .and(warp::fs::file(static_dir.join("index.html")));
    let settings = warp::path!("settings")
        .and(warp::get())
        .and(warp::fs::file(static_dir.join("settings.html")));
    let assets = warp::path("static").and(warp::fs::dir(static_dir));

    chat.or(status)
        .or(get_config)
        .or(post_config)
        .or(post_vocabulary)
        .or(delete_vocabulary)
        .or(logs)
        .or(ollama_models)
        .or(openai_models)
        .or(socket)
        .or(index)
        .or(settings)
        .or(assets)
        .recover(handle_rejection)
}

async fn handle_chat(request: ChatRequest, state: AppState) -> Result<Response, Infallible> {
    if request.message.trim().is_empty() {
        return Ok(json_error(StatusCode::BAD_REQUEST, "message must not be empty"));
    }
    let response = state.chat(request).await;
    Ok(warp::reply::json(&response).into_response())
}

async fn handle_status(query: SessionQuery, state: AppState) -> Result<Response, Infallible> {
    let report = state.status(query.session_id.as_deref()).await;
    Ok(warp::reply::json(&report).into_response())
}

async fn handle_get_config(state: AppState) -> Result<Response, Infallible> {
    let config = state.config.snapshot().await;
    Ok(warp::reply::json(&config.redacted()).into_response())
}

async fn handle_post_config(candidate: SystemConfig, state: AppState) -> Result<Response, Infallible> {
    Ok(config_reply(state.apply_config(candidate).await))
}

fn config_reply(result: Result<std::sync::Arc<SystemConfig>, ConfigError>) -> Response {
    match result {
        Ok(config) => {
            warp::reply::json(&json!({ "success": true, "config": config.redacted() })).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "config update rejected");
            json_error(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

async fn handle_update_vocabulary(update: VocabularyUpdate, state: AppState) -> Result<Response, Infallible> {
    let result = state
        .update_config(|config| config.vocabulary.apply_update(update).map_err(Into::into))
        .await;
    Ok(config_reply(result))
}

async fn handle_delete_vocabulary(target: VocabularyKey, state: AppState) -> Result<Response, Infallible> {
    let result = state
        .update_config(|config| {
            let protected = config.emotion.default_emotion;
            config
                .vocabulary
                .remove_entry(target.category, &target.key, protected)
                .map_err(Into::into)
        })
        .await;
    Ok(config_reply(result))
}

async fn handle_logs(query: LogsQuery, state: AppState) -> Result<Response, Infallible> {
    let lines = query.lines.unwrap_or(DEFAULT_LOG_LINES).min(MAX_LOG_LINES);
    Ok(warp::reply::json(&json!({ "logs": state.logs.tail(lines) })).into_response())
}

async fn handle_ollama_models(state: AppState) -> Result<Response, Infallible> {
    let config = state.config.snapshot().await;
    let base = match config.model.model_type {
        ModelType::Ollama => config.model.base_url().unwrap_or_else(|| OLLAMA_DEFAULT_BASE.to_string()),
        _ => OLLAMA_DEFAULT_BASE.to_string(),
    };
    let ollama = OllamaService::new(
        base,
        config.model.model_name.clone(),
        SamplingParams::default(),
        PromptSettings::from_config(&config),
        RetryPolicy::with_retries(0),
    );
    match ollama.list_models().await {
        Ok(models) => Ok(warp::reply::json(&json!({ "success": true, "models": models })).into_response()),
        Err(e) => Ok(json_error(StatusCode::BAD_GATEWAY, e.to_string())),
    }
}

/// Check a key (or the configured one) against the provider's model list.
async fn handle_openai_models(query: KeyQuery, state: AppState) -> Result<Response, Infallible> {
    let config = state.config.snapshot().await;
    let api_key = match query.api_key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()) {
        Some(key) if !looks_like_api_key(&key) => {
            return Ok(json_error(StatusCode::BAD_REQUEST, "invalid API key format"));
        }
        Some(key) => key,
        None => match config.model.resolve_api_key() {
            Some(key) => key,
            None => return Ok(json_error(StatusCode::BAD_REQUEST, "no API key given or configured")),
        },
    };
    let base = match config.model.model_type {
        ModelType::OpenAI | ModelType::Other => config.model.base_url(),
        ModelType::Ollama => None,
    }
    .unwrap_or_else(|| OPENAI_DEFAULT_BASE.to_string());
    let openai = OpenAIService::new(
        Some(api_key),
        base,
        config.model.model_name.clone(),
        SamplingParams::default(),
        PromptSettings::from_config(&config),
        RetryPolicy::with_retries(0),
    );
    match openai.list_models().await {
        Ok(models) => Ok(warp::reply::json(&json!({ "success": true, "models": models })).into_response()),
        Err(e) => Ok(json_error(StatusCode::BAD_GATEWAY, e.to_string())),
    }
}

async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "request body too large".to_string())
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, "expected application/json".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else {
        tracing::error!(rejection = ?err, "unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
    };
    Ok(json_error(status, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::emotion::EmotionKind;
    use crate::config::ConfigStore;
    use crate::llm::provider::testing::ScriptedModel;
    use crate::logging::LogRing;
    use serde_json::Value;
    use std::sync::Arc;

    const HAPPY: &str =
        r#"{"text":"你好！","emotion_type":"高兴","action":"微笑","speech_speed":7,"volume":6,"pitch":7}"#;

    fn test_state(model: ScriptedModel) -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("static")).unwrap();
        std::fs::write(dir.path().join("static/index.html"), "<html>ok</html>").unwrap();
        std::fs::write(dir.path().join("static/settings.html"), "<html>settings</html>").unwrap();
        let store = ConfigStore::new(SystemConfig::default(), dir.path().join("config.json"));
        let state = AppState::new(store, Arc::new(model), LogRing::new(100), dir.path().join("static"));
        (state, dir)
    }

    fn body(resp: &warp::http::Response<warp::hyper::body::Bytes>) -> Value {
        serde_json::from_slice(resp.body()).unwrap()
    }

    #[tokio::test]
    async fn chat_returns_reply_and_updates_status() {
        let (state, _dir) = test_state(ScriptedModel::ok(HAPPY));
        let api = routes(state);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/chat")
            .json(&json!({ "message": "你好", "timestamp": 1700000000000i64 }))
            .reply(&api)
            .await;
        assert_eq!(resp.status(), 200);
        let chat = body(&resp);
        assert_eq!(chat["success"], true);
        assert_eq!(chat["status"], "success");
        assert_eq!(chat["response"]["emotion_type"], "高兴");
        assert_eq!(chat["response"]["speech_speed"], 7);
        assert_eq!(chat["session_id"], "default");

        let resp = warp::test::request().path("/api/status").reply(&api).await;
        let status = body(&resp);
        assert_eq!(status["emotion"]["type"], "高兴");
        assert_eq!(status["emotion"]["volume"], 6);
        assert_eq!(status["system"]["status"], "idle");
        assert_eq!(status["system"]["model_type"], "ollama");
        assert_eq!(status["system"]["turn_count"], 2);
    }

    #[tokio::test]
    async fn chat_failure_is_reported_not_raised() {
        let (state, _dir) = test_state(ScriptedModel::ok("not json"));
        let api = routes(state);
        let resp = warp::test::request()
            .method("POST")
            .path("/api/chat")
            .json(&json!({ "text": "你好" }))
            .reply(&api)
            .await;
        assert_eq!(resp.status(), 200);
        let chat = body(&resp);
        assert_eq!(chat["success"], false);
        assert_eq!(chat["status"], "error");
        assert_eq!(chat["response"]["text"], "对不起，我现在有点困惑");
        assert!(chat["error"].is_string());

        let status = body(&warp::test::request().path("/api/status").reply(&api).await);
        assert_eq!(status["system"]["status"], "error");
        assert_eq!(status["emotion"]["type"], "平静");
    }

    #[tokio::test]
    async fn empty_or_malformed_chat_is_bad_request() {
        let (state, _dir) = test_state(ScriptedModel::ok(HAPPY));
        let api = routes(state);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/chat")
            .json(&json!({ "message": "  " }))
            .reply(&api)
            .await;
        assert_eq!(resp.status(), 400);

        let resp = warp::test::request()
            .method("POST")
            .path("/api/chat")
            .header("content-type", "application/json")
            .body("{\"msg\": 1}")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), 400);
        assert_eq!(body(&resp)["success"], false);
    }

    #[tokio::test]
    async fn sessions_are_addressed_by_id() {
        let (state, _dir) = test_state(ScriptedModel::ok(HAPPY));
        let api = routes(state);
        warp::test::request()
            .method("POST")
            .path("/api/chat")
            .json(&json!({ "message": "你好", "session_id": "kid" }))
            .reply(&api)
            .await;

        let kid = body(&warp::test::request().path("/api/status?session_id=kid").reply(&api).await);
        let default = body(&warp::test::request().path("/api/status").reply(&api).await);
        assert_eq!(kid["emotion"]["type"], "高兴");
        assert_eq!(default["emotion"]["type"], "平静");
        assert_eq!(default["system"]["turn_count"], 0);
    }

    #[tokio::test]
    async fn config_round_trip_redacts_and_validates() {
        let (state, _dir) = test_state(ScriptedModel::ok(HAPPY));
        let api = routes(state.clone());

        let config = body(&warp::test::request().path("/api/config").reply(&api).await);
        assert_eq!(config["model"]["model_type"], "ollama");
        assert_eq!(config["emotion"]["default_emotion"], "平静");

        let mut invalid = config.clone();
        invalid["model"]["temperature"] = json!(3.0);
        let resp = warp::test::request()
            .method("POST")
            .path("/api/config")
            .json(&invalid)
            .reply(&api)
            .await;
        assert_eq!(resp.status(), 400);
        assert!(body(&resp)["error"].as_str().unwrap().contains("temperature"));

        let mut valid = config;
        valid["model"]["model_name"] = json!("qwen2");
        let resp = warp::test::request()
            .method("POST")
            .path("/api/config")
            .json(&valid)
            .reply(&api)
            .await;
        assert_eq!(resp.status(), 200);
        assert_eq!(state.config.snapshot().await.model.model_name, "qwen2");
        assert!(state.config.path().exists(), "config persisted");
        assert_eq!(state.models.current().await.model_name(), "qwen2", "backend hot-swapped");
    }

    #[tokio::test]
    async fn vocabulary_edits_go_through_validation() {
        let (state, _dir) = test_state(ScriptedModel::ok(HAPPY));
        let api = routes(state.clone());

        let resp = warp::test::request()
            .method("POST")
            .path("/api/vocabulary")
            .json(&json!({ "category": "emotions", "key": "高兴", "values": ["欢乐", "愉快"] }))
            .reply(&api)
            .await;
        assert_eq!(resp.status(), 200);
        assert_eq!(
            state.config.snapshot().await.vocabulary.emotion_words(EmotionKind::Happy),
            &["欢乐".to_string(), "愉快".to_string()]
        );

        let resp = warp::test::request()
            .method("DELETE")
            .path("/api/vocabulary?category=emotions&key=calm")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), 400, "default emotion is protected");

        let resp = warp::test::request()
            .method("DELETE")
            .path("/api/vocabulary?category=responses&key=%E5%91%8A%E5%88%AB")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), 200);
        assert!(!state.config.snapshot().await.vocabulary.responses.contains_key("告别"));
    }

    #[tokio::test]
    async fn concurrent_vocabulary_edits_are_all_kept() {
        let (state, _dir) = test_state(ScriptedModel::ok(HAPPY));
        let api = routes(state.clone());

        let requests = (0..8).map(|i| {
            let api = api.clone();
            async move {
                warp::test::request()
                    .method("POST")
                    .path("/api/vocabulary")
                    .json(&json!({ "category": "responses", "key": format!("场景{i}"), "values": [format!("回复{i}")] }))
                    .reply(&api)
                    .await
                    .status()
            }
        });
        let statuses = futures::future::join_all(requests).await;
        assert!(statuses.iter().all(|s| *s == 200), "{statuses:?}");

        let config = state.config.snapshot().await;
        for i in 0..8 {
            assert_eq!(config.vocabulary.responses[&format!("场景{i}")], vec![format!("回复{i}")]);
        }
        let saved = SystemConfig::load(state.config.path()).unwrap();
        assert_eq!(saved.vocabulary, config.vocabulary, "last save holds every edit");
    }

    #[tokio::test]
    async fn openai_models_rejects_malformed_key() {
        let (state, _dir) = test_state(ScriptedModel::ok(HAPPY));
        let api = routes(state);
        let resp = warp::test::request()
            .path("/api/models/openai?api_key=abc")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), 400);
        let reply = body(&resp);
        assert_eq!(reply["success"], false);
        assert_eq!(reply["error"], "invalid API key format");
    }

    #[tokio::test]
    async fn logs_return_tail() {
        let (state, _dir) = test_state(ScriptedModel::ok(HAPPY));
        for i in 0..5 {
            state.logs.push(&format!("line {i}"));
        }
        let api = routes(state);
        let logs = body(&warp::test::request().path("/api/logs?lines=2").reply(&api).await);
        assert_eq!(logs["logs"], json!(["line 3", "line 4"]));
    }

    #[tokio::test]
    async fn index_is_served_and_unknown_paths_are_json_404() {
        let (state, _dir) = test_state(ScriptedModel::ok(HAPPY));
        let api = routes(state);
        let resp = warp::test::request().path("/").reply(&api).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.body().as_ref(), b"<html>ok</html>");

        let resp = warp::test::request().path("/settings").reply(&api).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.body().as_ref(), b"<html>settings</html>");

        let resp = warp::test::request().path("/api/nope").reply(&api).await;
        assert_eq!(resp.status(), 404);
        assert_eq!(body(&resp)["success"], false);
    }
}
