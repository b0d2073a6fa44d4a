//! Type-keyed registry of auxiliary option sets.
//!
//! Library integrations declare their own [`OptionSet`] types and bind them
//! against the same merged bag as the main configuration. Instances are
//! created on first request and cached by `TypeId`, so every caller observes
//! the same bound object.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::options::OptionSet;
use crate::config::sources::MergedConfiguration;
use crate::config::transform::ValueTransformers;
use crate::config::ConfigError;

#[derive(Default)]
pub struct ExtensionRegistry {
    entries: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached instance of `T`, binding a fresh default against
    /// `bag` on first request.
    pub fn get_or_create<T>(
        &self,
        bag: &MergedConfiguration,
        transformers: &ValueTransformers,
    ) -> Result<Arc<T>, ConfigError>
    where
        T: OptionSet + Default + Send + Sync + 'static,
    {
        let mut entries = self.entries.lock().expect("extension registry poisoned");
        if let Some(existing) = entries.get(&TypeId::of::<T>()) {
            if let Ok(typed) = Arc::clone(existing).downcast::<T>() {
                return Ok(typed);
            }
        }
        let mut instance = T::default();
        crate::config::binder::bind(&mut instance, bag, transformers)?;
        let instance: Arc<T> = Arc::new(instance);
        entries.insert(TypeId::of::<T>(), instance.clone());
        tracing::debug!(extension = std::any::type_name::<T>(), "extension bound");
        Ok(instance)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("extension registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("bound", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::options::{OptionDescriptor, OptionKind, OptionValue};

    #[derive(Debug, Default)]
    struct Tuning {
        threads: i32,
    }

    impl OptionSet for Tuning {
        fn descriptors() -> &'static [OptionDescriptor<Self>] {
            static TABLE: &[OptionDescriptor<Tuning>] = &[OptionDescriptor {
                key: "tuning.threads",
                aliases: &[],
                description: "",
                kind: OptionKind::Int,
                set: |t, v| {
                    if let OptionValue::Int(value) = v {
                        t.threads = value;
                    }
                },
            }];
            TABLE
        }
    }

    #[test]
    fn test_binds_once_and_caches() {
        let registry = ExtensionRegistry::new();
        let bag = MergedConfiguration::from_entries("test", [("tuning.threads", "8")]);
        let chain = ValueTransformers::new();

        let first = registry.get_or_create::<Tuning>(&bag, &chain).unwrap();
        assert_eq!(first.threads, 8);

        // a different bag does not rebind the cached instance
        let other = MergedConfiguration::from_entries("test", [("tuning.threads", "99")]);
        let second = registry.get_or_create::<Tuning>(&other, &chain).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_bind_failure_is_propagated() {
        let registry = ExtensionRegistry::new();
        let bag = MergedConfiguration::from_entries("test", [("tuning.threads", "lots")]);
        let err = registry
            .get_or_create::<Tuning>(&bag, &ValueTransformers::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumericValue { .. }));
        assert!(registry.is_empty());
    }
}
