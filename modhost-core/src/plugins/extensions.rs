//! Extension registry for module-provided capability instances

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use modhost_plugin_api::ExtensionRegistration;

/// An extension instance tagged with the module that registered it
struct RegisteredExtension {
    /// Id of the owning module
    owner: String,
    registration: ExtensionRegistration,
}

/// Registry of all extension instances offered by started modules
///
/// Keyed by capability type. Registration order is preserved within a
/// capability so lookups are deterministic.
#[derive(Default)]
pub struct ExtensionRegistry {
    extensions: RwLock<HashMap<TypeId, Vec<RegisteredExtension>>>,
}

impl ExtensionRegistry {
    /// Create a new empty extension registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance implementing capability `C`
    pub fn register<C: ?Sized + Send + Sync + 'static>(&self, owner: &str, instance: Arc<C>) {
        self.register_raw(owner, ExtensionRegistration::new(instance));
    }

    /// Register an already type-erased extension
    pub fn register_raw(&self, owner: &str, registration: ExtensionRegistration) {
        tracing::debug!(
            owner,
            capability = registration.capability_name(),
            "Registered extension"
        );
        self.extensions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(registration.capability())
            .or_default()
            .push(RegisteredExtension {
                owner: owner.to_string(),
                registration,
            });
    }

    /// All registered instances of capability `C`
    pub fn lookup<C: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<C>> {
        self.collect::<C>(|_| true)
    }

    /// Instances of capability `C` registered by one module
    pub fn lookup_owned<C: ?Sized + Send + Sync + 'static>(&self, owner: &str) -> Vec<Arc<C>> {
        self.collect::<C>(|ext| ext.owner == owner)
    }

    /// Number of extensions currently registered by a module
    pub fn count_owned(&self, owner: &str) -> usize {
        self.extensions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .flatten()
            .filter(|ext| ext.owner == owner)
            .count()
    }

    /// Withdraw every extension a module registered
    ///
    /// Returns the number of extensions removed.
    pub fn on_unload(&self, owner: &str) -> usize {
        let mut extensions = self
            .extensions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        extensions.retain(|_, list| {
            let before = list.len();
            list.retain(|ext| ext.owner != owner);
            removed += before - list.len();
            !list.is_empty()
        });
        if removed > 0 {
            tracing::debug!(owner, removed, "Withdrew extensions");
        }
        removed
    }

    fn collect<C: ?Sized + Send + Sync + 'static>(
        &self,
        filter: impl Fn(&RegisteredExtension) -> bool,
    ) -> Vec<Arc<C>> {
        let extensions = self
            .extensions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        extensions
            .get(&TypeId::of::<C>())
            .map(|list| {
                list.iter()
                    .filter(|ext| filter(ext))
                    .filter_map(|ext| ext.registration.downcast::<C>())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;
    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    struct French;
    impl Greeter for French {
        fn greet(&self) -> String {
            "bonjour".into()
        }
    }

    #[test]
    fn test_lookup_empty() {
        let registry = ExtensionRegistry::new();
        assert!(registry.lookup::<dyn Greeter>().is_empty());
    }

    #[test]
    fn test_lookup_preserves_registration_order() {
        let registry = ExtensionRegistry::new();
        registry.register::<dyn Greeter>("en", Arc::new(English));
        registry.register::<dyn Greeter>("fr", Arc::new(French));

        let greetings: Vec<_> = registry
            .lookup::<dyn Greeter>()
            .iter()
            .map(|g| g.greet())
            .collect();
        assert_eq!(greetings, vec!["hello", "bonjour"]);
    }

    #[test]
    fn test_lookup_owned_filters_by_module() {
        let registry = ExtensionRegistry::new();
        registry.register::<dyn Greeter>("en", Arc::new(English));
        registry.register::<dyn Greeter>("fr", Arc::new(French));

        let owned = registry.lookup_owned::<dyn Greeter>("fr");
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].greet(), "bonjour");
    }

    #[test]
    fn test_capabilities_do_not_mix() {
        let registry = ExtensionRegistry::new();
        registry.register::<dyn Greeter>("en", Arc::new(English));
        registry.register::<String>("en", Arc::new("not a greeter".to_string()));

        assert_eq!(registry.lookup::<dyn Greeter>().len(), 1);
        assert_eq!(registry.lookup::<String>().len(), 1);
        assert_eq!(registry.count_owned("en"), 2);
    }

    #[test]
    fn test_on_unload_withdraws_only_owner() {
        let registry = ExtensionRegistry::new();
        registry.register::<dyn Greeter>("en", Arc::new(English));
        registry.register::<dyn Greeter>("fr", Arc::new(French));

        assert_eq!(registry.on_unload("en"), 1);
        assert_eq!(registry.on_unload("en"), 0);

        let remaining = registry.lookup::<dyn Greeter>();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].greet(), "bonjour");
    }
}
