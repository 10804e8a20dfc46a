//! Core data types shared by the fetch, inference and tool layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One achievement of a game as reported upstream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Achievement {
    /// Stable upstream identifier
    pub api_name: String,

    /// Display name, unique within a game
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub unlocked: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock_time: Option<DateTime<Utc>>,

    /// Global unlock percentage, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rarity_percent: Option<f64>,
}

impl Achievement {
    /// Locked achievement with unknown rarity; the display name doubles as api name
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            api_name: name.clone(),
            name,
            description: description.into(),
            unlocked: false,
            unlock_time: None,
            rarity_percent: None,
        }
    }

    pub fn with_unlocked(mut self, unlocked: bool) -> Self {
        self.unlocked = unlocked;
        self
    }

    pub fn with_rarity(mut self, percent: f64) -> Self {
        self.rarity_percent = Some(percent);
        self
    }

    pub fn with_api_name(mut self, api_name: impl Into<String>) -> Self {
        self.api_name = api_name.into();
        self
    }
}

/// A game known to the local library
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameRecord {
    pub appid: u32,
    pub name: String,

    /// Total playtime in minutes
    #[serde(default, alias = "playtime_forever")]
    pub playtime_forever_minutes: u64,

    /// Playtime during the last two weeks in minutes
    #[serde(default, alias = "playtime_2weeks")]
    pub playtime_two_weeks_minutes: u64,
}

impl GameRecord {
    pub fn new(appid: u32, name: impl Into<String>) -> Self {
        Self {
            appid,
            name: name.into(),
            playtime_forever_minutes: 0,
            playtime_two_weeks_minutes: 0,
        }
    }

    pub fn playtime_hours(&self) -> f64 {
        (self.playtime_forever_minutes as f64 / 60.0 * 10.0).round() / 10.0
    }
}
