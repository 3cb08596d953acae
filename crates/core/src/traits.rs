//! Serializer capability
//!
//! A serializer module is responsible for one facet of subject state. The
//! pipeline in `datasync-engine` decides which modules run; a module only
//! moves data between a [`Subject`] and a [`Snapshot`].

use crate::model::Snapshot;
use crate::subject::Subject;

/// Namespace reserved for the built-in modules
pub const RESERVED_NAMESPACE: &str = "datasync";

/// Pluggable serializer module
///
/// Thread safety: modules are shared between the sweep task and callers of
/// the user serializer, so they must be `Send + Sync`.
pub trait Serializer: Send + Sync {
    /// Two-part namespaced name, e.g. `"provider:feature"`
    fn name(&self) -> &str;

    /// Copy this module's facet from `subject` into `snapshot`
    ///
    /// Returns false if any part of the facet could not be captured. Parts
    /// that could be captured are still written.
    fn serialize(&self, snapshot: &mut Snapshot, subject: &dyn Subject) -> bool;

    /// Copy this module's facet from `snapshot` back onto `subject`
    fn deserialize(&self, snapshot: &Snapshot, subject: &dyn Subject) -> bool;
}

/// Check the `namespace:feature` shape required of serializer names
pub fn is_valid_module_name(name: &str) -> bool {
    let mut parts = name.split(':');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(ns), Some(feature), None) if !ns.is_empty() && !feature.is_empty()
    )
}

/// True if `name` would collide with the built-in namespace
pub fn uses_reserved_namespace(name: &str) -> bool {
    name.starts_with(RESERVED_NAMESPACE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_module_names() {
        assert!(is_valid_module_name("provider:feature"));
        assert!(is_valid_module_name("datasync:health"));
    }

    #[test]
    fn test_invalid_module_names() {
        assert!(!is_valid_module_name("nofeature"));
        assert!(!is_valid_module_name("a:b:c"));
        assert!(!is_valid_module_name(":feature"));
        assert!(!is_valid_module_name("provider:"));
    }

    #[test]
    fn test_reserved_namespace() {
        assert!(uses_reserved_namespace("datasync:extra"));
        assert!(uses_reserved_namespace("datasyncplus:extra"));
        assert!(!uses_reserved_namespace("economy:balance"));
    }
}
