//! Vocabulary constraints: the words the model is steered toward, grouped by
//! category.

use crate::ai::emotion::{EmotionKind, UnknownLabel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyConstraints {
    #[serde(default)]
    pub emotions: BTreeMap<EmotionKind, Vec<String>>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub responses: BTreeMap<String, Vec<String>>,
}

fn words(ws: &[&str]) -> Vec<String> {
    ws.iter().map(|w| w.to_string()).collect()
}

impl Default for VocabularyConstraints {
    fn default() -> Self {
        use EmotionKind::*;
        Self {
            emotions: BTreeMap::from([
                (Calm, words(&["平静", "安详", "淡定"])),
                (Happy, words(&["开心", "快乐", "兴奋", "喜悦"])),
                (Sad, words(&["伤心", "悲伤", "沮丧", "失落"])),
                (Angry, words(&["愤怒", "恼火", "不满", "烦躁"])),
                (Surprised, words(&["吃惊", "震惊", "意外", "诧异"])),
            ]),
            actions: words(&["点头", "摇头", "微笑", "皱眉", "挥手"]),
            responses: BTreeMap::from([
                ("问候".to_string(), words(&["你好", "早上好", "下午好", "晚上好"])),
                ("告别".to_string(), words(&["再见", "拜拜", "下次见", "回头见"])),
                ("肯定".to_string(), words(&["好的", "没问题", "可以", "当然"])),
                ("否定".to_string(), words(&["抱歉", "不行", "不可以", "恐怕不行"])),
            ]),
        }
    }
}

/// Trim, drop blanks, de-duplicate while keeping first-seen order.
fn clean(list: &mut Vec<String>) {
    let mut seen = Vec::with_capacity(list.len());
    for word in list.drain(..) {
        let word = word.trim().to_string();
        if !word.is_empty() && !seen.contains(&word) {
            seen.push(word);
        }
    }
    *list = seen;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VocabularyCategory {
    Emotions,
    Actions,
    Responses,
}

/// One edit to a category. `key` names the emotion or response group and is
/// ignored for actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyUpdate {
    pub category: VocabularyCategory,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VocabularyError {
    #[error("category {0:?} needs a key")]
    MissingKey(VocabularyCategory),
    #[error(transparent)]
    UnknownEmotion(#[from] UnknownLabel),
    #[error("the default emotion {0} cannot be removed")]
    Protected(EmotionKind),
    #[error("category {0:?} has no removable keys")]
    NotKeyed(VocabularyCategory),
}

impl VocabularyConstraints {
    pub fn apply_update(&mut self, update: VocabularyUpdate) -> Result<(), VocabularyError> {
        let key = update
            .key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());
        match update.category {
            VocabularyCategory::Emotions => {
                let kind = key
                    .ok_or(VocabularyError::MissingKey(update.category))?
                    .parse::<EmotionKind>()?;
                self.emotions.insert(kind, update.values);
            }
            VocabularyCategory::Actions => self.actions = update.values,
            VocabularyCategory::Responses => {
                let key = key.ok_or(VocabularyError::MissingKey(update.category))?;
                self.responses.insert(key.to_string(), update.values);
            }
        }
        self.normalize();
        Ok(())
    }

    /// Remove an emotion or response group. Removing a missing key is a no-op.
    pub fn remove_entry(
        &mut self,
        category: VocabularyCategory,
        key: &str,
        protected: EmotionKind,
    ) -> Result<(), VocabularyError> {
        match category {
            VocabularyCategory::Emotions => {
                let kind = key.parse::<EmotionKind>()?;
                if kind == protected {
                    return Err(VocabularyError::Protected(kind));
                }
                self.emotions.remove(&kind);
            }
            VocabularyCategory::Responses => {
                self.responses.remove(key.trim());
            }
            VocabularyCategory::Actions => return Err(VocabularyError::NotKeyed(category)),
        }
        Ok(())
    }

    pub fn normalize(&mut self) {
        self.emotions.values_mut().for_each(clean);
        clean(&mut self.actions);
        self.responses.values_mut().for_each(clean);
        self.responses.retain(|_, v| !v.is_empty());
    }

    pub fn emotion_words(&self, kind: EmotionKind) -> &[String] {
        self.emotions.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.emotions.values().all(Vec::is_empty)
            && self.actions.is_empty()
            && self.responses.values().all(Vec::is_empty)
    }
}
