//! Pre-flight safety gate. A rejected turn never reaches the model backend.

use crate::ai::scene::SceneTelemetry;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const REJECTION_TEXT: &str = "抱歉，我不能执行这个请求";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "default_true")]
    pub enable_safety_check: bool,
    #[serde(default = "default_min_obstacle_distance")]
    pub min_obstacle_distance: f64,
    #[serde(default = "default_danger_keywords")]
    pub danger_keywords: Vec<String>,
    #[serde(default = "default_content_filters")]
    pub content_filters: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_min_obstacle_distance() -> f64 {
    1.0
}

fn default_danger_keywords() -> Vec<String> {
    ["撞", "跳", "摔", "打", "踢", "伤害", "危险", "破坏", "损坏"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_content_filters() -> Vec<String> {
    ["暴力", "色情", "政治", "宗教", "歧视"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            enable_safety_check: true,
            min_obstacle_distance: default_min_obstacle_distance(),
            danger_keywords: default_danger_keywords(),
            content_filters: default_content_filters(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SafetyViolation {
    #[error("input contains danger keyword {0:?}")]
    DangerKeyword(String),
    #[error("input matches content filter {0:?}")]
    FilteredContent(String),
    #[error("obstacle at {distance}m is closer than {minimum}m")]
    ObstacleTooClose { distance: f64, minimum: f64 },
}

impl SafetyConfig {
    /// First violation found, keywords before filters before obstacles.
    pub fn check(&self, input: &str, scene: Option<&SceneTelemetry>) -> Result<(), SafetyViolation> {
        if !self.enable_safety_check {
            return Ok(());
        }
        let hit = |list: &[String]| {
            list.iter()
                .find(|kw| !kw.is_empty() && input.contains(kw.as_str()))
                .cloned()
        };
        if let Some(kw) = hit(&self.danger_keywords) {
            return Err(SafetyViolation::DangerKeyword(kw));
        }
        if let Some(kw) = hit(&self.content_filters) {
            return Err(SafetyViolation::FilteredContent(kw));
        }
        if let Some(distance) = scene.and_then(SceneTelemetry::nearest_obstacle) {
            if distance < self.min_obstacle_distance {
                return Err(SafetyViolation::ObstacleTooClose {
                    distance,
                    minimum: self.min_obstacle_distance,
                });
            }
        }
        Ok(())
    }
}
