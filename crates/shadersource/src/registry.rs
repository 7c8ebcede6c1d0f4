use dashmap::DashMap;

use crate::descriptor::ExternalShader;

/// Imported shaders by name. Lives for the process; nothing is persisted.
///
/// Safe to share between the render thread and whichever thread imports
/// files. Each operation is atomic for its key only.
#[derive(Debug, Default)]
pub struct ExternalRegistry {
    shaders: DashMap<String, ExternalShader>,
}

impl ExternalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `shader`, returning whatever previously held its name.
    pub fn insert(&self, shader: ExternalShader) -> Option<ExternalShader> {
        self.shaders.insert(shader.name.clone(), shader)
    }

    pub fn get(&self, name: &str) -> Option<ExternalShader> {
        self.shaders.get(name).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, name: &str) -> Option<ExternalShader> {
        self.shaders.remove(name).map(|(_, shader)| shader)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.shaders.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shaders.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::reference::MemoryTree;

    fn direct(name: &str, source: &str) -> ExternalShader {
        let reference = Arc::new(MemoryTree::new().reference(&format!("{name}.slang")));
        ExternalShader::direct(name, reference, source)
    }

    #[test]
    fn latest_registration_wins() {
        let registry = ExternalRegistry::new();
        assert!(registry.insert(direct("glow", "one")).is_none());
        let replaced = registry.insert(direct("glow", "two")).expect("previous entry");
        assert_eq!(replaced.shader_sources(), ["one".to_string()]);
        assert_eq!(registry.get("glow").unwrap().shader_sources(), ["two".to_string()]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn names_are_sorted_and_removal_works() {
        let registry = ExternalRegistry::new();
        registry.insert(direct("zeta", "z"));
        registry.insert(direct("alpha", "a"));
        assert_eq!(registry.names(), vec!["alpha".to_string(), "zeta".to_string()]);

        assert!(registry.remove("alpha").is_some());
        assert!(registry.remove("alpha").is_none());
        assert!(!registry.contains("alpha"));
        assert!(registry.contains("zeta"));
    }
}
