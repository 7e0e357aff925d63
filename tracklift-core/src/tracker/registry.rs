//! Registration table mapping tracker identifiers to backend constructors
//!
//! The registry is filled once through [`TrackerRegistryBuilder`] and is
//! read-only afterwards, so it can be shared freely between uploads.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::backends::{SpBackend, YusBackend};
use super::config::TrackerConfig;
use super::generic::GenericBackend;
use super::http::HttpSender;
use super::types::TrackerClient;

/// Constructor for a backend instance.
pub type TrackerFactory = fn(TrackerConfig, Arc<dyn HttpSender>) -> Arc<dyn TrackerClient>;

/// Errors raised while registering or resolving backends.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Backend '{id}' is already registered")]
    Duplicate { id: String },

    #[error("No backend registered for '{id}'")]
    NotFound { id: String },
}

fn normalize(id: &str) -> String {
    id.trim().to_lowercase()
}

/// Collects registrations before freezing them into a [`TrackerRegistry`].
#[derive(Default)]
pub struct TrackerRegistryBuilder {
    factories: BTreeMap<String, TrackerFactory>,
}

impl TrackerRegistryBuilder {
    /// Registers `factory` under `id`, compared case-insensitively.
    ///
    /// # Errors
    /// - `RegistryError::Duplicate` - `id` is already taken
    pub fn register(mut self, id: &str, factory: TrackerFactory) -> Result<Self, RegistryError> {
        let key = normalize(id);
        if self.factories.contains_key(&key) {
            return Err(RegistryError::Duplicate { id: key });
        }
        self.factories.insert(key, factory);
        Ok(self)
    }

    pub fn build(self) -> TrackerRegistry {
        tracing::debug!(
            "Tracker registry initialized with backends: {}",
            self.factories.keys().cloned().collect::<Vec<_>>().join(", ")
        );
        TrackerRegistry {
            factories: self.factories,
        }
    }
}

/// Immutable map from backend identifier to constructor.
pub struct TrackerRegistry {
    factories: BTreeMap<String, TrackerFactory>,
}

impl TrackerRegistry {
    pub fn builder() -> TrackerRegistryBuilder {
        TrackerRegistryBuilder::default()
    }

    /// Builder pre-filled with `generic`, `yus` and `sp`.
    pub fn builtin() -> TrackerRegistryBuilder {
        let mut builder = TrackerRegistryBuilder::default();
        let builtins: [(&str, TrackerFactory); 3] = [
            ("generic", GenericBackend::create),
            ("yus", YusBackend::create),
            ("sp", SpBackend::create),
        ];
        for (id, factory) in builtins {
            builder.factories.insert(id.to_string(), factory);
        }
        builder
    }

    /// Registry with only the built-in backends.
    pub fn with_builtin_backends() -> Self {
        Self::builtin().build()
    }

    /// Looks up the constructor for `id`, case-insensitively.
    ///
    /// # Errors
    /// - `RegistryError::NotFound` - Nothing registered under `id`
    pub fn resolve(&self, id: &str) -> Result<TrackerFactory, RegistryError> {
        self.factories
            .get(&normalize(id))
            .copied()
            .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })
    }

    /// Constructs the backend selected by `config.backend_key()`.
    ///
    /// # Errors
    /// - `RegistryError::NotFound` - No backend under that key
    pub fn instantiate(
        &self,
        config: &TrackerConfig,
        sender: Arc<dyn HttpSender>,
    ) -> Result<Arc<dyn TrackerClient>, RegistryError> {
        let factory = self.resolve(config.backend_key())?;
        Ok(factory(config.clone(), sender))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(&normalize(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::test_mocks::RecordingSender;

    fn sender() -> Arc<dyn HttpSender> {
        Arc::new(RecordingSender::new())
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let registry = TrackerRegistry::with_builtin_backends();
        let lower = registry.resolve("yus").unwrap()(TrackerConfig::new("YUS"), sender());
        let upper = registry.resolve("YUS").unwrap()(TrackerConfig::new("YUS"), sender());

        assert_eq!(lower.backend_name(), "yus");
        assert_eq!(lower.backend_name(), upper.backend_name());
    }

    #[test]
    fn test_unknown_backend() {
        let registry = TrackerRegistry::with_builtin_backends();
        assert!(matches!(
            registry.resolve("nope"),
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_registration() {
        let result = TrackerRegistry::builder()
            .register("Custom", GenericBackend::create)
            .and_then(|builder| builder.register("custom", GenericBackend::create));
        assert!(matches!(result, Err(RegistryError::Duplicate { .. })));

        let result = TrackerRegistry::builtin().register("SP", GenericBackend::create);
        assert!(matches!(result, Err(RegistryError::Duplicate { .. })));
    }

    #[test]
    fn test_instantiate_uses_backend_key() {
        let registry = TrackerRegistry::builtin()
            .register("myth", GenericBackend::create)
            .unwrap()
            .build();

        let mut config = TrackerConfig::new("OTHER");
        config.backend = Some("generic".to_string());
        let client = registry.instantiate(&config, sender()).unwrap();
        assert_eq!(client.backend_name(), "generic");
        assert_eq!(client.tracker_id(), "OTHER");

        let client = registry.instantiate(&TrackerConfig::new("sp"), sender()).unwrap();
        assert_eq!(client.backend_name(), "sp");

        assert!(registry.contains("MYTH"));
        assert_eq!(registry.ids().count(), 4);
    }

    #[test]
    fn test_registry_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TrackerRegistry>();
    }
}
