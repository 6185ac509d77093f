//! Scene telemetry attached to a turn and the session's latest view of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Metres from the robot. Missing distance is treated as far away.
    #[serde(default)]
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneTelemetry {
    #[serde(default)]
    pub obstacles: Vec<Obstacle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lighting: Option<String>,
}

impl SceneTelemetry {
    /// Closest obstacle distance, if any obstacle reports one.
    pub fn nearest_obstacle(&self) -> Option<f64> {
        self.obstacles
            .iter()
            .filter_map(|o| o.distance)
            .filter(|d| d.is_finite())
            .reduce(f64::min)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyVerdict {
    Unchecked,
    Safe,
    Unsafe,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneSnapshot {
    pub telemetry: Option<SceneTelemetry>,
    pub safety: SafetyVerdict,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for SceneSnapshot {
    fn default() -> Self {
        Self {
            telemetry: None,
            safety: SafetyVerdict::Unchecked,
            updated_at: None,
        }
    }
}

impl SceneSnapshot {
    pub fn record(&mut self, telemetry: Option<SceneTelemetry>, safety: SafetyVerdict) {
        if telemetry.is_some() {
            self.telemetry = telemetry;
        }
        self.safety = safety;
        self.updated_at = Some(Utc::now());
    }
}
