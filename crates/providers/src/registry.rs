//! The fixed adapter registry.

use std::sync::Arc;

use async_trait::async_trait;
use slipway_core::{ProviderKind, ProviderSecrets, Result};
use slipway_vault::SecretValidator;

use crate::adapter::ProviderAdapter;
use crate::netlify::NetlifyAdapter;
use crate::vercel::VercelAdapter;

/// Compile-time list of registered adapters, in registration order.
///
/// There is no runtime plugin story: the set of providers is closed and
/// wired up once at process start.
pub struct ProviderRegistry {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// The standard registry: Netlify then Vercel.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(vec![
            Arc::new(NetlifyAdapter::new()),
            Arc::new(VercelAdapter::new()),
        ])
    }

    /// A registry over explicit adapters (tests use mock-backed ones).
    #[must_use]
    pub fn new(adapters: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        Self { adapters }
    }

    /// Look up the adapter for a provider.
    #[must_use]
    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters
            .iter()
            .find(|adapter| adapter.kind() == kind)
            .cloned()
    }

    /// Whether `kind` has a registered adapter.
    #[must_use]
    pub fn contains(&self, kind: ProviderKind) -> bool {
        self.get(kind).is_some()
    }

    /// All adapters, in registration order.
    #[must_use]
    pub fn adapters(&self) -> &[Arc<dyn ProviderAdapter>] {
        &self.adapters
    }
}

/// The vault validates secrets through the registry, keeping the vault
/// crate independent of the concrete adapters.
#[async_trait]
impl SecretValidator for ProviderRegistry {
    async fn validate(&self, secrets: &ProviderSecrets) -> Result<bool> {
        match self.get(secrets.provider()) {
            Some(adapter) => adapter.validate(secrets).await,
            None => Ok(false),
        }
    }
}
