//! Structured reply returned by the model and its validation.
//!
//! Models wrap JSON in markdown fences or chatter around it often enough that
//! the parser first isolates the outermost `{...}` object, then checks every
//! field against the closed sets. Any mismatch is a contract violation.

use crate::ai::emotion::{Action, Dial, Dials, EmotionKind, EmotionState};
use crate::llm::error::LlmError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub text: String,
    pub emotion_type: EmotionKind,
    pub action: Action,
    pub speech_speed: Dial,
    pub volume: Dial,
    pub pitch: Dial,
}

impl ChatReply {
    pub fn dials(&self) -> Dials {
        Dials {
            speech_speed: self.speech_speed,
            volume: self.volume,
            pitch: self.pitch,
        }
    }

    /// Reply that keeps the current emotion and dials, used for apologies and
    /// refusals so the client has nothing new to render.
    pub fn holding(text: impl Into<String>, action: Action, emotion: &EmotionState) -> Self {
        let dials = emotion.dials();
        Self {
            text: text.into(),
            emotion_type: emotion.kind(),
            action,
            speech_speed: dials.speech_speed,
            volume: dials.volume,
            pitch: dials.pitch,
        }
    }
}

/// First complete JSON object in the completion. Fences, prose and stray
/// braces around it are skipped.
fn first_object(raw: &str) -> Option<Map<String, Value>> {
    raw.char_indices()
        .filter(|&(_, c)| c == '{')
        .find_map(|(start, _)| {
            let mut values = serde_json::Deserializer::from_str(&raw[start..]).into_iter::<Value>();
            match values.next() {
                Some(Ok(Value::Object(map))) => Some(map),
                _ => None,
            }
        })
}

fn field<'a>(obj: &'a Map<String, Value>, name: &str) -> Result<&'a Value, LlmError> {
    obj.get(name)
        .ok_or_else(|| LlmError::ContractViolation(format!("missing field `{name}`")))
}

fn string_field<'a>(obj: &'a Map<String, Value>, name: &str) -> Result<&'a str, LlmError> {
    field(obj, name)?
        .as_str()
        .ok_or_else(|| LlmError::ContractViolation(format!("`{name}` must be a string")))
}

fn dial_field(obj: &Map<String, Value>, name: &str) -> Result<Dial, LlmError> {
    let value = field(obj, name)?;
    let number = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| LlmError::ContractViolation(format!("`{name}` must be an integer, got {value}")))?;
    Dial::new(number).map_err(|e| LlmError::ContractViolation(format!("`{name}`: {e}")))
}

/// Parse and validate a raw completion. Returns the reply plus the parsed
/// JSON payload for diagnostics.
pub fn parse_reply(raw: &str) -> Result<(ChatReply, Value), LlmError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(LlmError::EmptyCompletion);
    }
    let map = first_object(raw)
        .ok_or_else(|| LlmError::MalformedCompletion("no JSON object in completion".into()))?;
    let obj = &map;

    let text = string_field(obj, "text")?.trim();
    if text.is_empty() {
        return Err(LlmError::ContractViolation("`text` is empty".into()));
    }
    let emotion_type = string_field(obj, "emotion_type")?
        .parse::<EmotionKind>()
        .map_err(|e| LlmError::ContractViolation(e.to_string()))?;
    let action = string_field(obj, "action")?
        .parse::<Action>()
        .map_err(|e| LlmError::ContractViolation(e.to_string()))?;

    let reply = ChatReply {
        text: text.to_string(),
        emotion_type,
        action,
        speech_speed: dial_field(obj, "speech_speed")?,
        volume: dial_field(obj, "volume")?,
        pitch: dial_field(obj, "pitch")?,
    };
    Ok((reply, Value::Object(map)))
}
