use std::collections::BTreeMap;

use anyhow::{anyhow, Result};

use super::backend::{Predictor, PredictorConfig};
use super::backends::StubPredictor;

/// Builds a predictor from its configuration.
pub type PredictorFactory = Box<dyn Fn(&PredictorConfig) -> Result<Box<dyn Predictor>> + Send + Sync>;

/// Registry of predictor backends, keyed by name.
///
/// Backends are registered as factories so that only the selected model is
/// loaded at startup.
pub struct BackendRegistry {
    factories: BTreeMap<String, PredictorFactory>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
            default_name: None,
        }
    }

    /// Registry with every backend compiled into this build.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("stub", |cfg| {
            cfg.require_cpu("stub")?;
            Ok(Box::new(StubPredictor::new(cfg.score_threshold)) as Box<dyn Predictor>)
        });
        #[cfg(feature = "backend-tract")]
        registry.register("tract", |cfg| {
            cfg.require_cpu("tract")?;
            let path = cfg
                .model_path
                .as_ref()
                .ok_or_else(|| anyhow!("the tract backend requires a model path"))?;
            let predictor =
                super::backends::TractPredictor::new(path, cfg.input_width, cfg.input_height)?
                    .with_threshold(cfg.score_threshold);
            Ok(Box::new(predictor) as Box<dyn Predictor>)
        });
        registry
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&PredictorConfig) -> Result<Box<dyn Predictor>> + Send + Sync + 'static,
    {
        if self.default_name.is_none() {
            self.default_name = Some(name.to_string());
        }
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.factories.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// List registered backends.
    pub fn list(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Build the named backend.
    pub fn build(&self, name: &str, cfg: &PredictorConfig) -> Result<Box<dyn Predictor>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            anyhow!(
                "backend '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            )
        })?;
        factory(cfg)
    }

    /// Build the default backend.
    pub fn build_default(&self, cfg: &PredictorConfig) -> Result<Box<dyn Predictor>> {
        let name = self
            .default_name
            .as_deref()
            .ok_or_else(|| anyhow!("no backends registered"))?;
        self.build(name, cfg)
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
    use crate::config::NodeConfig;
    use crate::detect::{Device, ScriptedPredictor};

    fn predictor_config() -> PredictorConfig {
        PredictorConfig::from_node_config(&NodeConfig::default())
    }

    #[test]
    fn builtin_registers_stub_as_default() {
        let registry = BackendRegistry::builtin();
        assert_eq!(registry.default_name(), Some("stub"));
        let predictor = registry.build_default(&predictor_config()).unwrap();
        assert_eq!(predictor.name(), "stub");
    }

    #[test]
    fn unknown_backend_lists_available() {
        let registry = BackendRegistry::builtin();
        let err = registry
            .build("detectron", &predictor_config())
            .err()
            .unwrap();
        assert!(err.to_string().contains("stub"));
    }

    #[test]
    fn set_default_requires_registration() {
        let mut registry = BackendRegistry::builtin();
        assert!(registry.set_default("missing").is_err());

        registry.register("scripted", |_| {
            Ok(Box::new(ScriptedPredictor::new(Vec::new())) as Box<dyn Predictor>)
        });
        registry.set_default("scripted").unwrap();
        let predictor = registry.build_default(&predictor_config()).unwrap();
        assert_eq!(predictor.name(), "scripted");
    }

    #[test]
    fn stub_rejects_gpu_device() {
        let registry = BackendRegistry::builtin();
        let mut cfg = predictor_config();
        cfg.device = Device::Cuda(0);
        assert!(registry.build("stub", &cfg).is_err());
    }
}
