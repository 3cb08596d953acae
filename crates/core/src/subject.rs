//! The live entity whose state snapshots capture

use crate::model::FieldValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A single facet of subject state addressable by serializer modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataKey {
    /// Total accumulated experience points
    TotalExperience,
    /// Current game mode, stored as its upper-case name
    GameMode,
    /// Current health
    Health,
    /// Maximum health
    MaxHealth,
    /// Food level
    FoodLevel,
    /// Saturation
    Saturation,
    /// Inventory contents
    Inventory,
}

impl DataKey {
    /// Field name under which this key is stored in a snapshot
    pub const fn field_name(&self) -> &'static str {
        match self {
            DataKey::TotalExperience => "total_experience",
            DataKey::GameMode => "game_mode",
            DataKey::Health => "health",
            DataKey::MaxHealth => "max_health",
            DataKey::FoodLevel => "food_level",
            DataKey::Saturation => "saturation",
            DataKey::Inventory => "inventory",
        }
    }
}

impl fmt::Display for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Game mode of a subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameMode {
    /// Adventure
    Adventure,
    /// Creative
    Creative,
    /// Spectator
    Spectator,
    /// Survival
    Survival,
    /// Anything unrecognized
    #[default]
    NotSet,
}

impl GameMode {
    /// Decode a stored game mode name; unknown names map to `NotSet`
    pub fn from_name(name: &str) -> Self {
        match name {
            "ADVENTURE" => GameMode::Adventure,
            "CREATIVE" => GameMode::Creative,
            "SPECTATOR" => GameMode::Spectator,
            "SURVIVAL" => GameMode::Survival,
            _ => GameMode::NotSet,
        }
    }

    /// Stored name of this game mode
    pub const fn name(&self) -> &'static str {
        match self {
            GameMode::Adventure => "ADVENTURE",
            GameMode::Creative => "CREATIVE",
            GameMode::Spectator => "SPECTATOR",
            GameMode::Survival => "SURVIVAL",
            GameMode::NotSet => "NOT_SET",
        }
    }
}

/// Live state source and sink for serializer modules.
///
/// Implementations use interior mutability: deserialization writes through a
/// shared reference, the same way the hosting server hands out user handles.
pub trait Subject: Send + Sync {
    /// Stable user identity
    fn user_id(&self) -> Uuid;

    /// Human-readable name for log lines
    fn name(&self) -> String;

    /// Current value of a facet, `None` if the subject does not expose it
    fn get(&self, key: DataKey) -> Option<FieldValue>;

    /// Apply a value to a facet; returns false if the subject rejected it
    fn offer(&self, key: DataKey, value: FieldValue) -> bool;
}
