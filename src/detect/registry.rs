use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::backend::DetectionEngine;
use super::backends::{ColorBlobEngine, MotionEngine};

/// Registry of detection engines, keyed by name.
///
/// Engines are shared across detection tasks, so they are stored as `Arc`s.
pub struct EngineRegistry {
    engines: BTreeMap<String, Arc<dyn DetectionEngine>>,
    default_name: Option<String>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self {
            engines: BTreeMap::new(),
            default_name: None,
        }
    }

    /// Registry holding every built-in engine, with `color` as the default.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(ColorBlobEngine::default());
        registry.register(MotionEngine::new());
        registry
    }

    /// Register an engine. The first registered engine becomes the default.
    pub fn register<E: DetectionEngine + 'static>(&mut self, engine: E) {
        let name = engine.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.engines.insert(name, Arc::new(engine));
    }

    /// Set default engine by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.engines.contains_key(name) {
            return Err(anyhow!("detector '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DetectionEngine>> {
        self.engines.get(name).cloned()
    }

    pub fn default_engine(&self) -> Option<Arc<dyn DetectionEngine>> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Look up an engine, listing the known names on failure.
    pub fn select(&self, name: &str) -> Result<Arc<dyn DetectionEngine>> {
        self.get(name).ok_or_else(|| {
            anyhow!(
                "unknown detector '{}' (available: {})",
                name,
                self.list().join(", ")
            )
        })
    }

    /// Registered engine names, sorted.
    pub fn list(&self) -> Vec<String> {
        self.engines.keys().cloned().collect()
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}
