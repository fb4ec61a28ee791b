use std::collections::HashMap;

use anyhow::{anyhow, Result};

use super::backend::{RegionClassifier, ThresholdDetector};

/// Registry of classifier backends, selectable by name at startup.
pub struct ClassifierRegistry {
    classifiers: HashMap<String, Box<dyn RegionClassifier>>,
    default_name: Option<String>,
}

impl ClassifierRegistry {
    pub fn new() -> Self {
        Self {
            classifiers: HashMap::new(),
            default_name: None,
        }
    }

    /// Registry with the always-available backends (`cpu` default, `stub`).
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(super::ContrastClassifier::new());
        registry.register(super::StubClassifier::new());
        registry
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<C: RegionClassifier + 'static>(&mut self, classifier: C) {
        let name = classifier.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.classifiers.insert(name, Box::new(classifier));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.classifiers.contains_key(name) {
            return Err(anyhow!("classifier '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// List registered backends, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classifiers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Take a backend out of the registry, warm it up and wrap it in the threshold policy.
    ///
    /// `None` selects the default backend.
    pub fn into_detector(
        mut self,
        name: Option<&str>,
        threshold: f32,
    ) -> Result<ThresholdDetector<Box<dyn RegionClassifier>>> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self
                .default_name
                .clone()
                .ok_or_else(|| anyhow!("no classifier registered"))?,
        };
        let mut classifier = self.classifiers.remove(&name).ok_or_else(|| {
            anyhow!(
                "classifier '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            )
        })?;
        classifier.warm_up()?;
        Ok(ThresholdDetector::new(classifier).with_threshold(threshold))
    }
}

impl Default for ClassifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{PresenceDetector, Region, StubClassifier};
    use crate::frame::Frame;

    #[test]
    fn first_registered_is_default() {
        let registry = ClassifierRegistry::with_builtin();
        assert_eq!(registry.default_name(), Some("cpu"));
        assert_eq!(registry.list(), vec!["cpu", "stub"]);
    }

    #[test]
    fn selects_by_name_with_threshold() {
        let mut registry = ClassifierRegistry::new();
        registry.register(StubClassifier::fixed(vec![Region::new(0.6)]));
        let mut detector = registry.into_detector(Some("stub"), 0.55).unwrap();
        assert_eq!(detector.name(), "stub");
        assert!(detector.detect(&Frame::new()).unwrap());
    }

    #[test]
    fn unknown_backend_is_an_error() {
        let registry = ClassifierRegistry::with_builtin();
        assert!(registry.into_detector(Some("hog"), 0.5).is_err());
        let mut registry = ClassifierRegistry::new();
        assert!(registry.set_default("cpu").is_err());
    }
}
