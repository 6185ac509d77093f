//! Emotion model: the closed emotion and action sets, the three delivery
//! dials and the per-session emotion state.
//!
//! Labels travel on the wire in their Chinese form (`平静`, `点头`, ...);
//! the English names are accepted as aliases wherever a label is parsed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Raised when a label is not part of a closed set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {set} label: {value:?}")]
pub struct UnknownLabel {
    pub set: &'static str,
    pub value: String,
}

// ── Emotion kinds ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EmotionKind {
    #[serde(rename = "平静", alias = "calm")]
    Calm,
    #[serde(rename = "高兴", alias = "happy")]
    Happy,
    #[serde(rename = "难过", alias = "sad")]
    Sad,
    #[serde(rename = "生气", alias = "angry")]
    Angry,
    #[serde(rename = "惊讶", alias = "surprised")]
    Surprised,
}

impl EmotionKind {
    pub const ALL: [EmotionKind; 5] = [
        EmotionKind::Calm,
        EmotionKind::Happy,
        EmotionKind::Sad,
        EmotionKind::Angry,
        EmotionKind::Surprised,
    ];

    pub fn label(self) -> &'static str {
        match self {
            EmotionKind::Calm => "平静",
            EmotionKind::Happy => "高兴",
            EmotionKind::Sad => "难过",
            EmotionKind::Angry => "生气",
            EmotionKind::Surprised => "惊讶",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EmotionKind::Calm => "calm",
            EmotionKind::Happy => "happy",
            EmotionKind::Sad => "sad",
            EmotionKind::Angry => "angry",
            EmotionKind::Surprised => "surprised",
        }
    }
}

impl Default for EmotionKind {
    fn default() -> Self {
        EmotionKind::Calm
    }
}

impl fmt::Display for EmotionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EmotionKind {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.label() == s || k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownLabel {
                set: "emotion",
                value: s.to_string(),
            })
    }
}

// ── Actions ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "点头", alias = "nod")]
    Nod,
    #[serde(rename = "摇头", alias = "shake_head")]
    ShakeHead,
    #[serde(rename = "微笑", alias = "smile")]
    Smile,
    #[serde(rename = "皱眉", alias = "frown")]
    Frown,
    #[serde(rename = "挥手", alias = "wave")]
    Wave,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Nod,
        Action::ShakeHead,
        Action::Smile,
        Action::Frown,
        Action::Wave,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Action::Nod => "点头",
            Action::ShakeHead => "摇头",
            Action::Smile => "微笑",
            Action::Frown => "皱眉",
            Action::Wave => "挥手",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Action::Nod => "nod",
            Action::ShakeHead => "shake_head",
            Action::Smile => "smile",
            Action::Frown => "frown",
            Action::Wave => "wave",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Action {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|a| a.label() == s || a.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownLabel {
                set: "action",
                value: s.to_string(),
            })
    }
}

// ── Dials ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("dial value {0} is outside 1..=10")]
pub struct DialOutOfRange(pub i64);

/// Integer delivery parameter in `1..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Dial(u8);

impl Dial {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(value: i64) -> Result<Self, DialOutOfRange> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Ok(Dial(value as u8))
        } else {
            Err(DialOutOfRange(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Dial {
    fn default() -> Self {
        Dial(5)
    }
}

impl TryFrom<i64> for Dial {
    type Error = DialOutOfRange;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Dial::new(value)
    }
}

impl From<Dial> for u8 {
    fn from(dial: Dial) -> u8 {
        dial.0
    }
}

impl fmt::Display for Dial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dials {
    pub speech_speed: Dial,
    pub volume: Dial,
    pub pitch: Dial,
}

impl Dials {
    pub fn new(speech_speed: i64, volume: i64, pitch: i64) -> Result<Self, DialOutOfRange> {
        Ok(Self {
            speech_speed: Dial::new(speech_speed)?,
            volume: Dial::new(volume)?,
            pitch: Dial::new(pitch)?,
        })
    }
}

// ── Config ─────────────────────────────────────────────────

/// Keyword triggers and allowed transitions. Both are surfaced to the model
/// as guidance; the state itself always follows the parsed reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionRules {
    #[serde(default)]
    pub triggers: BTreeMap<EmotionKind, Vec<String>>,
    #[serde(default)]
    pub transitions: BTreeMap<EmotionKind, Vec<EmotionKind>>,
}

impl Default for EmotionRules {
    fn default() -> Self {
        use EmotionKind::*;
        let words = |ws: &[&str]| ws.iter().map(|w| w.to_string()).collect::<Vec<_>>();
        Self {
            triggers: BTreeMap::from([
                (Happy, words(&["表扬", "成功", "帮助"])),
                (Sad, words(&["失败", "道歉", "离别"])),
                (Angry, words(&["批评", "打扰", "不尊重"])),
                (Surprised, words(&["意外", "突然", "特殊"])),
            ]),
            transitions: BTreeMap::from([
                (Calm, vec![Happy, Sad, Angry, Surprised]),
                (Happy, vec![Calm, Surprised]),
                (Sad, vec![Calm, Angry]),
                (Angry, vec![Calm, Sad]),
                (Surprised, vec![Calm, Happy]),
            ]),
        }
    }
}

impl EmotionRules {
    /// Emotions whose trigger keywords occur in `input`, in set order.
    pub fn triggered_by(&self, input: &str) -> Vec<EmotionKind> {
        self.triggers
            .iter()
            .filter(|(_, kws)| kws.iter().any(|kw| !kw.is_empty() && input.contains(kw.as_str())))
            .map(|(kind, _)| *kind)
            .collect()
    }

    pub fn transitions_from(&self, kind: EmotionKind) -> &[EmotionKind] {
        self.transitions
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionConfig {
    #[serde(default)]
    pub default_emotion: EmotionKind,
    #[serde(default)]
    pub default_dials: Dials,
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    #[serde(default)]
    pub rules: EmotionRules,
}

fn default_history_size() -> usize {
    5
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            default_emotion: EmotionKind::Calm,
            default_dials: Dials::default(),
            history_size: default_history_size(),
            rules: EmotionRules::default(),
        }
    }
}

// ── State ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionSample {
    pub emotion_type: EmotionKind,
    pub dials: Dials,
    pub at: DateTime<Utc>,
}

/// Serializable view used by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionSnapshot {
    #[serde(rename = "type")]
    pub emotion_type: EmotionKind,
    pub speech_speed: Dial,
    pub volume: Dial,
    pub pitch: Dial,
    pub action: Option<Action>,
    pub history: Vec<EmotionSample>,
}

#[derive(Debug, Clone)]
pub struct EmotionState {
    kind: EmotionKind,
    dials: Dials,
    last_action: Option<Action>,
    history: VecDeque<EmotionSample>,
    history_size: usize,
}

impl Default for EmotionState {
    fn default() -> Self {
        Self::new(EmotionKind::Calm, Dials::default())
    }
}

impl EmotionState {
    pub fn new(kind: EmotionKind, dials: Dials) -> Self {
        Self {
            kind,
            dials,
            last_action: None,
            history: VecDeque::new(),
            history_size: default_history_size(),
        }
    }

    pub fn from_config(config: &EmotionConfig) -> Self {
        Self {
            history_size: config.history_size.max(1),
            ..Self::new(config.default_emotion, config.default_dials)
        }
    }

    pub fn kind(&self) -> EmotionKind {
        self.kind
    }

    pub fn dials(&self) -> Dials {
        self.dials
    }

    pub fn last_action(&self) -> Option<Action> {
        self.last_action
    }

    pub fn history(&self) -> impl Iterator<Item = &EmotionSample> {
        self.history.iter()
    }

    /// Overwrite the state with a validated reply and record it in the history.
    pub fn apply(&mut self, kind: EmotionKind, action: Action, dials: Dials) {
        self.kind = kind;
        self.dials = dials;
        self.last_action = Some(action);
        self.history.push_back(EmotionSample {
            emotion_type: kind,
            dials,
            at: Utc::now(),
        });
        while self.history.len() > self.history_size {
            self.history.pop_front();
        }
    }

    pub fn snapshot(&self) -> EmotionSnapshot {
        EmotionSnapshot {
            emotion_type: self.kind,
            speech_speed: self.dials.speech_speed,
            volume: self.dials.volume,
            pitch: self.dials.pitch,
            action: self.last_action,
            history: self.history.iter().cloned().collect(),
        }
    }
}
