//! Resolves a model-provider client for a task, applying retry/circuit-breaking (§2, §4.3).

use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use dashmap::DashMap;
use uuid::Uuid;

use crate::domain::ModelProviderConfig;
use crate::memory_store::{MemoryStore, StoreError};

use super::{AsyncOpenAiProvider, CircuitBreaker, ModelProvider, ResilientProvider};

fn openai_config(config: &ModelProviderConfig) -> OpenAIConfig {
    let mut openai_config = OpenAIConfig::new();
    if !config.credentials.is_empty() {
        openai_config = openai_config.with_api_key(String::from_utf8_lossy(&config.credentials).into_owned());
    }
    if let Some(base_url) = &config.base_url {
        openai_config = openai_config.with_api_base(base_url.clone());
    }
    openai_config
}

/// Caches one resilient provider handle per provider config id so the circuit
/// breaker's state is shared across tasks that use the same provider (§9, decided
/// in DESIGN.md: breaker state is per-provider, not per-task or per-agent).
pub struct ProviderFactory {
    store: Arc<dyn MemoryStore>,
    cache: DashMap<Uuid, Arc<dyn ModelProvider>>,
    max_attempts: u32,
    max_delay: Duration,
}

impl ProviderFactory {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            max_attempts: 4,
            max_delay: Duration::from_secs(30),
        }
    }

    pub async fn resolve(&self, provider_id: Uuid) -> Result<Arc<dyn ModelProvider>, StoreError> {
        if let Some(existing) = self.cache.get(&provider_id) {
            return Ok(existing.clone());
        }
        let config: ModelProviderConfig = self.store.get_provider_config(provider_id).await?;
        let inner = AsyncOpenAiProvider::with_config(openai_config(&config));
        let resilient = ResilientProvider::new(inner, self.max_attempts, self.max_delay)
            .with_breaker(Arc::new(CircuitBreaker::new(5, Duration::from_secs(30))));
        let provider: Arc<dyn ModelProvider> = Arc::new(resilient);
        self.cache.insert(provider_id, provider.clone());
        Ok(provider)
    }

    /// Seeds the cache directly, bypassing config resolution, so reconciler tests
    /// can plug in a [`super::MockProvider`] without a real provider config.
    #[cfg(test)]
    pub fn cache_for_test(&self, provider_id: Uuid, provider: Arc<dyn ModelProvider>) {
        self.cache.insert(provider_id, provider);
    }
}
