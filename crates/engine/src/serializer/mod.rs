//! Serialization pipeline
//!
//! Runs the active serializer modules over a subject. The active set is
//! chosen from the configured enabled-names list and can be re-applied at
//! runtime.
//!
//! # Partial failure
//!
//! One failing module never stops the others. On serialize, every active
//! module is recorded in `modules_used` and failures (a `false` return or a
//! panic) are recorded in `modules_failed`. On deserialize, only modules that
//! are active *and* recorded in the snapshot's `modules_used` run.

pub mod modules;
pub mod registry;

pub use registry::SerializerRegistry;

use datasync_core::{Serializer, Snapshot, Subject};
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Active serializer set plus the registry it was loaded from
pub struct SerializerPipeline {
    registry: Mutex<SerializerRegistry>,
    active: RwLock<Arc<Vec<Arc<dyn Serializer>>>>,
}

impl SerializerPipeline {
    /// Pipeline with the given modules enabled
    pub fn new(enabled: &[String]) -> Self {
        let mut registry = SerializerRegistry::new();
        let active = registry.load(enabled);
        Self {
            registry: Mutex::new(registry),
            active: RwLock::new(Arc::new(active)),
        }
    }

    /// Register a host module; takes effect on the next [`apply`](Self::apply)
    pub fn register(&self, serializer: Arc<dyn Serializer>) {
        self.registry.lock().register(serializer);
    }

    /// Re-select the active modules
    pub fn apply(&self, enabled: &[String]) {
        let active = self.registry.lock().load(enabled);
        *self.active.write() = Arc::new(active);
    }

    /// Names of the active modules in run order
    pub fn enabled_names(&self) -> Vec<String> {
        self.active
            .read()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// True if a module with this name is active
    pub fn is_enabled(&self, name: &str) -> bool {
        self.active.read().iter().any(|s| s.name() == name)
    }

    fn current(&self) -> Arc<Vec<Arc<dyn Serializer>>> {
        Arc::clone(&self.active.read())
    }

    /// Capture `subject` into `snapshot`
    ///
    /// Returns false if no module is active or any module failed.
    pub fn serialize(&self, snapshot: &mut Snapshot, subject: &dyn Subject) -> bool {
        let active = self.current();
        if active.is_empty() {
            warn!(target: "datasync::serialize", "No enabled serializers");
            return false;
        }

        let mut success = true;
        for module in active.iter() {
            let name = module.name().to_string();
            snapshot.modules_used.insert(name.clone());
            let ok = catch_unwind(AssertUnwindSafe(|| module.serialize(snapshot, subject)))
                .unwrap_or_else(|_| {
                    warn!(target: "datasync::serialize", module = %name, "Serialization module panicked");
                    false
                });
            if !ok {
                warn!(
                    target: "datasync::serialize",
                    module = %name,
                    user = %subject.name(),
                    "Serialization module failed, all valid data is still uploaded"
                );
                snapshot.modules_failed.insert(name);
                success = false;
            }
        }
        success
    }

    /// Apply `snapshot` onto `subject`
    ///
    /// Returns false if no module is active or any module that ran failed.
    /// Active modules the snapshot did not use are skipped with a warning.
    pub fn deserialize(&self, snapshot: &Snapshot, subject: &dyn Subject) -> bool {
        let active = self.current();
        if active.is_empty() {
            warn!(target: "datasync::serialize", "No enabled deserializers");
            return false;
        }

        let mut success = true;
        let mut unused: Vec<&str> = snapshot.modules_used.iter().map(String::as_str).collect();
        for module in active.iter() {
            let name = module.name();
            let Some(i) = unused.iter().position(|n| *n == name) else {
                warn!(
                    target: "datasync::serialize",
                    module = name,
                    snapshot = %snapshot.id,
                    user = %subject.name(),
                    "Module enabled but not used in snapshot, skipping"
                );
                continue;
            };
            unused.remove(i);

            let ok = catch_unwind(AssertUnwindSafe(|| module.deserialize(snapshot, subject)))
                .unwrap_or(false);
            if !ok {
                warn!(
                    target: "datasync::serialize",
                    module = name,
                    snapshot = %snapshot.id,
                    user = %subject.name(),
                    "Deserialization module failed"
                );
                success = false;
            }
        }

        for name in unused {
            warn!(
                target: "datasync::serialize",
                module = name,
                snapshot = %snapshot.id,
                user = %subject.name(),
                "Module used in snapshot but not enabled, not all data could be restored"
            );
        }
        success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::MemorySubject;
    use datasync_core::DataKey;
    use serde_json::json;
    use uuid::Uuid;

    struct Panicking;

    impl Serializer for Panicking {
        fn name(&self) -> &str {
            "test:panics"
        }
        fn serialize(&self, _: &mut Snapshot, _: &dyn Subject) -> bool {
            panic!("boom")
        }
        fn deserialize(&self, _: &Snapshot, _: &dyn Subject) -> bool {
            panic!("boom")
        }
    }

    fn enabled(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn subject() -> MemorySubject {
        MemorySubject::new(Uuid::new_v4(), "robin")
            .with(DataKey::TotalExperience, json!(300))
            .with(DataKey::Health, json!(20.0))
            .with(DataKey::MaxHealth, json!(20.0))
    }

    #[test]
    fn test_no_modules_fails() {
        let pipeline = SerializerPipeline::new(&[]);
        let mut snapshot = Snapshot::new("Manual");
        assert!(!pipeline.serialize(&mut snapshot, &subject()));
        assert!(snapshot.modules_used.is_empty());
        assert!(!pipeline.deserialize(&snapshot, &subject()));
    }

    #[test]
    fn test_partial_failure_records_module() {
        let pipeline = SerializerPipeline::new(&enabled(&[modules::EXPERIENCE, modules::HUNGER]));
        let mut snapshot = Snapshot::new("Manual");
        assert!(!pipeline.serialize(&mut snapshot, &subject()));
        assert_eq!(snapshot.modules_used.len(), 2);
        assert!(snapshot.modules_failed.contains(modules::HUNGER));
        assert_eq!(snapshot.field("total_experience"), Some(&json!(300)));
    }

    #[test]
    fn test_panicking_module_is_contained() {
        let pipeline = SerializerPipeline::new(&[]);
        pipeline.register(Arc::new(Panicking));
        pipeline.apply(&enabled(&[modules::EXPERIENCE, "test:panics"]));

        let mut snapshot = Snapshot::new("Manual");
        assert!(!pipeline.serialize(&mut snapshot, &subject()));
        assert!(snapshot.modules_failed.contains("test:panics"));
        assert!(!snapshot.modules_failed.contains(modules::EXPERIENCE));
    }

    #[test]
    fn test_deserialize_runs_only_used_modules() {
        let source = subject();
        let writer = SerializerPipeline::new(&enabled(&[modules::EXPERIENCE]));
        let mut snapshot = Snapshot::new("Manual");
        assert!(writer.serialize(&mut snapshot, &source));

        // Health is enabled on the reader but absent from the snapshot
        let reader = SerializerPipeline::new(&enabled(&[modules::EXPERIENCE, modules::HEALTH]));
        let target = MemorySubject::new(Uuid::new_v4(), "robin");
        assert!(reader.deserialize(&snapshot, &target));
        assert_eq!(target.get(DataKey::TotalExperience), Some(json!(300)));
        assert_eq!(target.get(DataKey::Health), None);
    }

    #[test]
    fn test_apply_switches_active_set() {
        let pipeline = SerializerPipeline::new(&enabled(&[modules::EXPERIENCE]));
        assert!(pipeline.is_enabled(modules::EXPERIENCE));
        pipeline.apply(&enabled(&[modules::HEALTH]));
        assert!(!pipeline.is_enabled(modules::EXPERIENCE));
        assert_eq!(pipeline.enabled_names(), vec![modules::HEALTH.to_string()]);
    }
}
