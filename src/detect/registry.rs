use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;
use super::backends::StubBackend;
use crate::config::DetectorSettings;

/// Named detector backends. The daemon picks one by configuration name.
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn DetectorBackend>>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Backends available under `settings`, with the configured one as default.
    ///
    /// The stub is always registered. The tract backend needs both the
    /// `backend-tract` feature and a model path.
    pub fn from_settings(settings: &DetectorSettings) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(StubBackend::new());

        #[cfg(feature = "backend-tract")]
        if let Some(model_path) = &settings.model_path {
            let backend = super::backends::TractBackend::new(model_path, settings.input_size)?
                .with_thresholds(settings.confidence, settings.iou, settings.max_detections);
            registry.register(backend);
        }

        if settings.backend == "tract" && registry.get("tract").is_none() {
            return Err(anyhow!(
                "detector backend 'tract' requires the backend-tract feature and a model path"
            ));
        }
        registry.set_default(&settings.backend)?;
        Ok(registry)
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Arc::new(backend));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!(
                "detector backend '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            ));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Get backend by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn DetectorBackend>> {
        self.backends.get(name).cloned()
    }

    /// Get default backend.
    pub fn default_backend(&self) -> Result<Arc<dyn DetectorBackend>> {
        self.default_name
            .as_ref()
            .and_then(|name| self.get(name))
            .ok_or_else(|| anyhow!("no detector backend registered"))
    }

    /// List registered backends, sorted by name.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_backend_is_default() {
        let mut registry = BackendRegistry::new();
        assert!(registry.default_backend().is_err());
        registry.register(StubBackend::new());
        assert_eq!(registry.default_backend().unwrap().name(), "stub");
        assert_eq!(registry.list(), vec!["stub".to_string()]);
    }

    #[test]
    fn set_default_rejects_unknown_backend() {
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::new());
        let err = registry.set_default("tract").unwrap_err();
        assert!(err.to_string().contains("not registered"));
        assert!(registry.set_default("stub").is_ok());
    }

    #[test]
    fn settings_pick_the_configured_backend() {
        let registry = BackendRegistry::from_settings(&DetectorSettings::default()).unwrap();
        assert_eq!(registry.default_backend().unwrap().name(), "stub");

        let tract = DetectorSettings {
            backend: "tract".into(),
            model_path: None,
            ..DetectorSettings::default()
        };
        assert!(BackendRegistry::from_settings(&tract).is_err());
    }
}
