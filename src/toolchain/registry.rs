use std::collections::HashMap;

use crate::{
    config::Config,
    core::{domain::Language, errors::ExecutionError},
    toolchain::adapter::ToolchainAdapter,
};

/// Maps a language to its adapter. Adding a language means adding one entry.
#[derive(Clone, Debug, Default)]
pub struct ToolchainRegistry {
    adapters: HashMap<Language, ToolchainAdapter>,
}

impl ToolchainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        registry.register(Language::Python, ToolchainAdapter::python(&config.python_path));
        registry.register(Language::Cpp, ToolchainAdapter::gnu_cpp(&config.gpp_path));
        registry.register(Language::C, ToolchainAdapter::gnu_c(&config.gcc_path));
        registry
    }

    pub fn register(
        &mut self,
        language: Language,
        adapter: ToolchainAdapter,
    ) -> Option<ToolchainAdapter> {
        self.adapters.insert(language, adapter)
    }

    pub fn resolve(&self, language: Language) -> Result<&ToolchainAdapter, ExecutionError> {
        self.adapters
            .get(&language)
            .ok_or_else(|| ExecutionError::UnsupportedLanguage {
                tag: language.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (Language, &ToolchainAdapter)> {
        self.adapters.iter().map(|(language, adapter)| (*language, adapter))
    }
}
