//! Provider registry - factory lookup and live-instance caching.

use crate::TableProvider;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_core::AccessError;
use tracing::{debug, info};

/// Identifies how to construct a provider: a type name plus an option map.
/// Immutable once a session is established; identical descriptors share
/// one live instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderDescriptor {
    pub provider_type: String,
    pub options: BTreeMap<String, String>,
}

impl ProviderDescriptor {
    pub fn new(provider_type: impl Into<String>, options: BTreeMap<String, String>) -> Self {
        Self {
            provider_type: provider_type.into(),
            options,
        }
    }
}

/// Constructs providers of one type from an option map.
///
/// Factories must ignore options they do not recognize so newer clients
/// can pass provider-specific extensions to older servers.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    fn provider_type(&self) -> &'static str;

    async fn create(
        &self,
        options: &BTreeMap<String, String>,
    ) -> Result<Arc<dyn TableProvider>, AccessError>;
}

/// Maps descriptors to live provider instances.
///
/// Acquisition is idempotent per descriptor: a repeated acquire returns the
/// same live instance, a differing descriptor constructs a distinct one.
/// Construction is serialized so racing first-acquires of one descriptor
/// build exactly one provider.
pub struct ProviderRegistry {
    factories: BTreeMap<String, Arc<dyn ProviderFactory>>,
    live: DashMap<ProviderDescriptor, Arc<dyn TableProvider>>,
    build_lock: tokio::sync::Mutex<()>,
}

impl ProviderRegistry {
    pub fn new(factories: Vec<Arc<dyn ProviderFactory>>) -> Self {
        Self {
            factories: factories
                .into_iter()
                .map(|f| (f.provider_type().to_string(), f))
                .collect(),
            live: DashMap::new(),
            build_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Return the live instance for `descriptor`, constructing it on first
    /// acquire.
    pub async fn acquire(
        &self,
        descriptor: &ProviderDescriptor,
    ) -> Result<Arc<dyn TableProvider>, AccessError> {
        if let Some(provider) = self.live.get(descriptor) {
            return Ok(provider.clone());
        }

        let _guard = self.build_lock.lock().await;
        if let Some(provider) = self.live.get(descriptor) {
            return Ok(provider.clone());
        }

        let factory = self
            .factories
            .get(&descriptor.provider_type)
            .ok_or_else(|| AccessError::ProviderNotFound(descriptor.provider_type.clone()))?;

        debug!(provider_type = %descriptor.provider_type, "constructing provider");
        let provider = factory.create(&descriptor.options).await?;
        self.live.insert(descriptor.clone(), provider.clone());
        info!(provider_type = %descriptor.provider_type, "provider registered");
        Ok(provider)
    }

    /// Tear down the live instance for `descriptor`, if any. Returns
    /// whether an instance was released.
    pub async fn release(&self, descriptor: &ProviderDescriptor) -> bool {
        match self.live.remove(descriptor) {
            Some((_, provider)) => {
                provider.close().await;
                info!(provider_type = %descriptor.provider_type, "provider released");
                true
            }
            None => false,
        }
    }

    /// Tear down every live instance; used at server shutdown.
    pub async fn release_all(&self) {
        let descriptors: Vec<ProviderDescriptor> =
            self.live.iter().map(|e| e.key().clone()).collect();
        for descriptor in descriptors {
            self.release(&descriptor).await;
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn known_types(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

/// Build the registry with all built-in factories.
pub fn default_registry() -> ProviderRegistry {
    ProviderRegistry::new(vec![
        Arc::new(crate::mock::MockFactory),
        Arc::new(crate::csv::CsvFactory),
    ])
}
