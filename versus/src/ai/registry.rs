//! Provider registry
//!
//! Holds one config per provider kind plus the active-provider selector.
//! Constructed once per session and passed by reference to whoever needs an
//! adapter. Every mutation persists the whole registry.

use serde::{Deserialize, Serialize};

use crate::ai::adapter::ProviderAdapter;
use crate::ai::provider::{ProviderConfig, ProviderKind, ProviderStatus};
use crate::storage::{DocumentStore, StoreError};

/// Persisted registry document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiConfig {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// `None` means no provider is selected
    #[serde(default)]
    pub active_provider: Option<ProviderKind>,
}

/// Where the registry document lives.
pub trait RegistryStore: Send + Sync {
    fn load_ai_config(&self) -> Result<AiConfig, StoreError>;
    fn save_ai_config(&self, config: &AiConfig) -> Result<(), StoreError>;
}

impl RegistryStore for DocumentStore {
    fn load_ai_config(&self) -> Result<AiConfig, StoreError> {
        self.ai_config()
    }

    fn save_ai_config(&self, config: &AiConfig) -> Result<(), StoreError> {
        DocumentStore::save_ai_config(self, config)
    }
}

/// Store that keeps nothing; for tests and throwaway sessions.
pub struct MemoryRegistryStore;

impl RegistryStore for MemoryRegistryStore {
    fn load_ai_config(&self) -> Result<AiConfig, StoreError> {
        Ok(AiConfig::default())
    }

    fn save_ai_config(&self, _config: &AiConfig) -> Result<(), StoreError> {
        Ok(())
    }
}

pub struct ProviderRegistry {
    config: AiConfig,
    store: Box<dyn RegistryStore>,
    relay_url: String,
}

impl ProviderRegistry {
    /// Read the persisted registry, or start empty if none was saved.
    pub fn load(
        store: Box<dyn RegistryStore>,
        relay_url: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let config = store.load_ai_config()?;
        Ok(Self {
            config,
            store,
            relay_url: relay_url.into(),
        })
    }

    pub fn in_memory(relay_url: impl Into<String>) -> Self {
        Self {
            config: AiConfig::default(),
            store: Box::new(MemoryRegistryStore),
            relay_url: relay_url.into(),
        }
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }

    pub fn providers(&self) -> &[ProviderConfig] {
        &self.config.providers
    }

    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.config.providers.iter().find(|p| p.kind == kind)
    }

    pub fn active_provider(&self) -> Option<ProviderKind> {
        self.config.active_provider
    }

    /// Config of the selected provider, if one is selected and stored.
    pub fn active_config(&self) -> Option<&ProviderConfig> {
        self.active_provider().and_then(|kind| self.provider(kind))
    }

    /// Insert or replace the config for its kind, keeping registry order.
    pub fn upsert_provider(&mut self, config: ProviderConfig) -> Result<(), StoreError> {
        match self
            .config
            .providers
            .iter_mut()
            .find(|p| p.kind == config.kind)
        {
            Some(existing) => *existing = config,
            None => self.config.providers.push(config),
        }
        self.persist()
    }

    /// Recorded even if the kind is missing or disabled; availability says
    /// whether it can be used.
    pub fn set_active_provider(&mut self, kind: Option<ProviderKind>) -> Result<(), StoreError> {
        self.config.active_provider = kind;
        if let Some(kind) = kind {
            if !self.provider(kind).is_some_and(ProviderConfig::is_usable) {
                tracing::info!("Active provider {} is not usable yet", kind);
            }
        }
        self.persist()
    }

    pub fn is_available(&self) -> bool {
        self.active_config().is_some_and(ProviderConfig::is_usable)
    }

    /// Adapter bound to the active provider, or `None` when unavailable.
    pub fn resolve_adapter(&self) -> Option<ProviderAdapter> {
        if !self.is_available() {
            return None;
        }
        let config = self.active_config()?;
        match ProviderAdapter::from_config(config, &self.relay_url) {
            Ok(adapter) => Some(adapter),
            Err(e) => {
                tracing::warn!("Active provider {} cannot be used: {}", config.kind, e);
                None
            }
        }
    }

    pub fn status(&self) -> ProviderStatus {
        ProviderStatus {
            active_provider: self.active_provider(),
            available: self.is_available(),
            configured: self.config.providers.iter().map(|p| p.kind).collect(),
            enabled: self
                .config
                .providers
                .iter()
                .filter(|p| p.enabled)
                .map(|p| p.kind)
                .collect(),
            model: self.active_config().map(|p| p.model.clone()),
        }
    }

    /// Write the whole registry to its store.
    pub fn persist(&self) -> Result<(), StoreError> {
        self.store.save_ai_config(&self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RELAY: &str = "http://127.0.0.1:8787";

    #[test]
    fn test_empty_registry_unavailable() {
        let registry = ProviderRegistry::in_memory(RELAY);
        assert!(!registry.is_available());
        assert!(registry.resolve_adapter().is_none());
    }

    #[test]
    fn test_upsert_replaces_by_kind() {
        let mut registry = ProviderRegistry::in_memory(RELAY);
        registry
            .upsert_provider(ProviderConfig::new(ProviderKind::Anthropic).with_credential("a"))
            .unwrap();
        registry
            .upsert_provider(ProviderConfig::new(ProviderKind::Ollama))
            .unwrap();
        registry
            .upsert_provider(ProviderConfig::new(ProviderKind::Anthropic).with_credential("b"))
            .unwrap();

        assert_eq!(registry.providers().len(), 2);
        assert_eq!(registry.providers()[0].kind, ProviderKind::Anthropic);
        assert_eq!(
            registry.provider(ProviderKind::Anthropic).unwrap().credential(),
            Some("b")
        );
    }

    #[test]
    fn test_active_provider_without_config_is_recorded_but_unavailable() {
        let mut registry = ProviderRegistry::in_memory(RELAY);
        registry.set_active_provider(Some(ProviderKind::OpenAi)).unwrap();
        assert_eq!(registry.active_provider(), Some(ProviderKind::OpenAi));
        assert!(!registry.is_available());
    }

    #[test]
    fn test_disabled_active_provider_unavailable() {
        let mut registry = ProviderRegistry::in_memory(RELAY);
        let mut config = ProviderConfig::new(ProviderKind::OpenAi).with_credential("sk");
        config.enabled = false;
        registry.upsert_provider(config).unwrap();
        registry.set_active_provider(Some(ProviderKind::OpenAi)).unwrap();

        assert!(!registry.is_available());
        assert!(registry.resolve_adapter().is_none());
        assert!(!registry.status().available);
    }

    #[test]
    fn test_blank_model_unavailable_and_unresolved() {
        let mut registry = ProviderRegistry::in_memory(RELAY);
        registry
            .upsert_provider(
                ProviderConfig::new(ProviderKind::Anthropic)
                    .with_credential("sk")
                    .with_model("  "),
            )
            .unwrap();
        registry.set_active_provider(Some(ProviderKind::Anthropic)).unwrap();

        assert!(!registry.is_available());
        assert!(registry.resolve_adapter().is_none());
    }

    #[test]
    fn test_resolve_adapter_for_local_kind() {
        let mut registry = ProviderRegistry::in_memory(RELAY);
        registry
            .upsert_provider(ProviderConfig::new(ProviderKind::Ollama))
            .unwrap();
        registry.set_active_provider(Some(ProviderKind::Ollama)).unwrap();

        let adapter = registry.resolve_adapter().unwrap();
        assert_eq!(adapter.kind(), ProviderKind::Ollama);
    }

    #[test]
    fn test_none_selection() {
        let mut registry = ProviderRegistry::in_memory(RELAY);
        registry
            .upsert_provider(ProviderConfig::new(ProviderKind::Ollama))
            .unwrap();
        registry.set_active_provider(None).unwrap();
        assert!(!registry.is_available());
    }

    #[test]
    fn test_persisted_registry_reloads() {
        let dir = TempDir::new().unwrap();
        {
            let store = DocumentStore::open(dir.path()).unwrap();
            let mut registry = ProviderRegistry::load(Box::new(store), RELAY).unwrap();
            registry
                .upsert_provider(ProviderConfig::new(ProviderKind::Anthropic).with_credential("k"))
                .unwrap();
            registry.set_active_provider(Some(ProviderKind::Anthropic)).unwrap();
        }

        let store = DocumentStore::open(dir.path()).unwrap();
        let registry = ProviderRegistry::load(Box::new(store), RELAY).unwrap();
        assert_eq!(registry.active_provider(), Some(ProviderKind::Anthropic));
        assert!(registry.is_available());
    }

    #[test]
    fn test_ai_config_document_shape() {
        let config = AiConfig {
            providers: vec![ProviderConfig::new(ProviderKind::Anthropic).with_credential("k")],
            active_provider: Some(ProviderKind::Anthropic),
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["activeProvider"], "anthropic");
        assert_eq!(json["providers"][0]["apiKey"], "k");
        assert_eq!(json["providers"][0]["enabled"], true);
    }
}
