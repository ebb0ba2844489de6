//! Per-deployment cancellation tokens.

use dashmap::DashMap;
use slipway_core::DeploymentId;
use tokio_util::sync::CancellationToken;

/// Tracks the cancellation token of every in-flight pipeline so a
/// cancel request can reach the owning worker.
#[derive(Default)]
pub struct CancelRegistry {
    tokens: DashMap<DeploymentId, CancellationToken>,
}

impl CancelRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token for a deployment about to run.
    pub fn register(&self, id: DeploymentId, token: CancellationToken) {
        self.tokens.insert(id, token);
    }

    /// Trigger a deployment's token. Returns `false` when no pipeline
    /// is currently registered for it.
    pub fn cancel(&self, id: DeploymentId) -> bool {
        match self.tokens.get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop the token once the pipeline finished.
    pub fn release(&self, id: DeploymentId) {
        self.tokens.remove(&id);
    }

    /// Number of in-flight pipelines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether any pipeline is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_triggers_registered_token() {
        let registry = CancelRegistry::new();
        let id = DeploymentId::generate();
        let token = CancellationToken::new();
        registry.register(id, token.clone());

        assert!(registry.cancel(id));
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_unknown_is_false() {
        let registry = CancelRegistry::new();
        assert!(!registry.cancel(DeploymentId::generate()));
    }

    #[test]
    fn release_forgets_the_token() {
        let registry = CancelRegistry::new();
        let id = DeploymentId::generate();
        registry.register(id, CancellationToken::new());
        assert_eq!(registry.len(), 1);
        registry.release(id);
        assert!(registry.is_empty());
        assert!(!registry.cancel(id));
    }
}
