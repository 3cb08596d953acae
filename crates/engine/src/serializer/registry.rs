//! Serializer registry
//!
//! Holds the built-in modules plus any modules registered by the host, and
//! selects the active set from an enabled-names list.

use super::modules;
use datasync_core::{is_valid_module_name, uses_reserved_namespace, Serializer};
use std::sync::Arc;
use tracing::{info, warn};

/// Every known serializer module
pub struct SerializerRegistry {
    builtins: Vec<Arc<dyn Serializer>>,
    externals: Vec<Arc<dyn Serializer>>,
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SerializerRegistry {
    /// Registry containing only the built-in modules
    pub fn new() -> Self {
        Self {
            builtins: modules::builtins(),
            externals: Vec::new(),
        }
    }

    /// Register a host-provided module
    ///
    /// The name is validated when the registry is next loaded.
    pub fn register(&mut self, serializer: Arc<dyn Serializer>) {
        self.externals.push(serializer);
    }

    /// Names of every registered external module
    pub fn external_names(&self) -> Vec<String> {
        self.externals.iter().map(|s| s.name().to_string()).collect()
    }

    /// Drop external modules with an invalid or reserved name
    fn verify_externals(&mut self) {
        self.externals.retain(|serializer| {
            let name = serializer.name();
            let valid = is_valid_module_name(name) && !uses_reserved_namespace(name);
            if !valid {
                warn!(target: "datasync::serialize", module = name, "External serialization module name is invalid, ignoring");
            }
            valid
        });
    }

    /// Select the active modules for an enabled-names list
    ///
    /// Built-ins come first in their fixed order, then external modules in
    /// registration order. Names that match nothing are ignored.
    pub fn load(&mut self, enabled: &[String]) -> Vec<Arc<dyn Serializer>> {
        self.verify_externals();

        let mut remaining: Vec<&str> = enabled.iter().map(String::as_str).collect();
        let mut take = |name: &str| match remaining.iter().position(|n| *n == name) {
            Some(i) => {
                remaining.remove(i);
                true
            }
            None => false,
        };

        let mut active = Vec::new();
        for serializer in self.builtins.iter().chain(self.externals.iter()) {
            if take(serializer.name()) {
                info!(target: "datasync::serialize", module = serializer.name(), "Enabled serialization module");
                active.push(Arc::clone(serializer));
            }
        }
        active
    }
}
