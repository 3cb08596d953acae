//! Built-in serializer modules
//!
//! Each module copies a fixed list of [`DataKey`]s between a subject and a
//! snapshot. Every key of a module is attempted even when an earlier one
//! fails, so a partial failure still captures what it can.

use datasync_core::{DataKey, FieldValue, GameMode, Serializer, Snapshot, Subject};
use std::sync::Arc;

/// Name of the experience module
pub const EXPERIENCE: &str = "datasync:experience";
/// Name of the game mode module
pub const GAME_MODE: &str = "datasync:gameMode";
/// Name of the health module
pub const HEALTH: &str = "datasync:health";
/// Name of the hunger module
pub const HUNGER: &str = "datasync:hunger";
/// Name of the inventory module
pub const INVENTORY: &str = "datasync:inventory";

/// Names of every built-in module, in the order they run
pub const BUILTIN_NAMES: [&str; 5] = [EXPERIENCE, GAME_MODE, HEALTH, HUNGER, INVENTORY];

/// Serializer over a fixed set of data keys
pub struct KeySerializer {
    name: &'static str,
    keys: &'static [DataKey],
}

impl KeySerializer {
    /// Module `name` handling `keys`
    pub const fn new(name: &'static str, keys: &'static [DataKey]) -> Self {
        Self { name, keys }
    }

    fn capture(snapshot: &mut Snapshot, subject: &dyn Subject, key: DataKey) -> bool {
        match subject.get(key) {
            Some(value) => {
                snapshot.set_field(key.field_name(), value);
                true
            }
            None => false,
        }
    }

    fn apply(snapshot: &Snapshot, subject: &dyn Subject, key: DataKey) -> bool {
        let Some(value) = snapshot.field(key.field_name()) else {
            return false;
        };
        subject.offer(key, decode(key, value))
    }
}

/// Normalize a stored value before offering it to a subject
fn decode(key: DataKey, value: &FieldValue) -> FieldValue {
    match key {
        DataKey::GameMode => {
            let mode = value.as_str().map(GameMode::from_name).unwrap_or_default();
            FieldValue::String(mode.name().to_string())
        }
        _ => value.clone(),
    }
}

impl Serializer for KeySerializer {
    fn name(&self) -> &str {
        self.name
    }

    fn serialize(&self, snapshot: &mut Snapshot, subject: &dyn Subject) -> bool {
        self.keys
            .iter()
            .fold(true, |ok, key| Self::capture(snapshot, subject, *key) && ok)
    }

    fn deserialize(&self, snapshot: &Snapshot, subject: &dyn Subject) -> bool {
        self.keys
            .iter()
            .fold(true, |ok, key| Self::apply(snapshot, subject, *key) && ok)
    }
}

/// The five built-in modules in run order
pub fn builtins() -> Vec<Arc<dyn Serializer>> {
    vec![
        Arc::new(KeySerializer::new(EXPERIENCE, &[DataKey::TotalExperience])),
        Arc::new(KeySerializer::new(GAME_MODE, &[DataKey::GameMode])),
        // max health first so restoring health is not clamped by a stale max
        Arc::new(KeySerializer::new(HEALTH, &[DataKey::MaxHealth, DataKey::Health])),
        Arc::new(KeySerializer::new(HUNGER, &[DataKey::FoodLevel, DataKey::Saturation])),
        Arc::new(KeySerializer::new(INVENTORY, &[DataKey::Inventory])),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::MemorySubject;
    use serde_json::json;
    use uuid::Uuid;

    fn hunger() -> KeySerializer {
        KeySerializer::new(HUNGER, &[DataKey::FoodLevel, DataKey::Saturation])
    }

    #[test]
    fn test_builtin_names_match_modules() {
        let names: Vec<_> = builtins().iter().map(|m| m.name().to_string()).collect();
        assert_eq!(names, BUILTIN_NAMES);
    }

    #[test]
    fn test_hunger_attempts_both_keys() {
        // Food level missing, saturation present
        let subject = MemorySubject::new(Uuid::new_v4(), "kim").with(DataKey::Saturation, json!(5.0));
        let mut snapshot = Snapshot::new("Manual");
        assert!(!hunger().serialize(&mut snapshot, &subject));
        assert_eq!(snapshot.field("saturation"), Some(&json!(5.0)));
        assert!(snapshot.field("food_level").is_none());
    }

    #[test]
    fn test_deserialize_missing_field_fails() {
        let subject = MemorySubject::new(Uuid::new_v4(), "kim");
        let mut snapshot = Snapshot::new("Manual");
        snapshot.set_field("food_level", json!(18));
        assert!(!hunger().deserialize(&snapshot, &subject));
        assert_eq!(subject.get(DataKey::FoodLevel), Some(json!(18)));
    }

    #[test]
    fn test_unknown_game_mode_restores_not_set() {
        let module = KeySerializer::new(GAME_MODE, &[DataKey::GameMode]);
        let subject = MemorySubject::new(Uuid::new_v4(), "kim");
        let mut snapshot = Snapshot::new("Manual");
        snapshot.set_field("game_mode", json!("HARDCORE"));
        assert!(module.deserialize(&snapshot, &subject));
        assert_eq!(subject.get(DataKey::GameMode), Some(json!("NOT_SET")));
    }
}
