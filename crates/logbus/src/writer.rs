//! A deployment-bound convenience handle over the bus.

use std::collections::BTreeMap;
use std::sync::Arc;

use slipway_core::{DeploymentId, LogLevel};

use crate::bus::LogBus;

/// Writes events for one deployment without repeating the id everywhere.
///
/// Append failures are deliberately swallowed here (after a `tracing`
/// warning): progress logging must never take a pipeline down.
#[derive(Clone)]
pub struct LogWriter {
    bus: Arc<LogBus>,
    id: DeploymentId,
}

impl LogWriter {
    /// Bind a writer to one deployment.
    #[must_use]
    pub fn new(bus: Arc<LogBus>, id: DeploymentId) -> Self {
        Self { bus, id }
    }

    /// The deployment this writer is bound to.
    #[must_use]
    pub fn deployment_id(&self) -> DeploymentId {
        self.id
    }

    async fn emit(
        &self,
        level: LogLevel,
        step: Option<&str>,
        message: String,
        metadata: BTreeMap<String, serde_json::Value>,
    ) {
        if let Err(error) = self.bus.append(self.id, level, message, step, metadata).await {
            tracing::warn!(
                deployment_id = %self.id,
                %error,
                "dropping progress event: durable append failed"
            );
        }
    }

    /// Info-level step progress.
    pub async fn info(&self, step: &str, message: impl Into<String>) {
        self.emit(LogLevel::Info, Some(step), message.into(), BTreeMap::new())
            .await;
    }

    /// Warn-level step progress.
    pub async fn warn(&self, step: &str, message: impl Into<String>) {
        self.emit(LogLevel::Warn, Some(step), message.into(), BTreeMap::new())
            .await;
    }

    /// Error-level step outcome.
    pub async fn error(&self, step: &str, message: impl Into<String>) {
        self.emit(LogLevel::Error, Some(step), message.into(), BTreeMap::new())
            .await;
    }

    /// Success-level step outcome.
    pub async fn success(&self, step: &str, message: impl Into<String>) {
        self.emit(LogLevel::Success, Some(step), message.into(), BTreeMap::new())
            .await;
    }

    /// Debug-level internals (verbatim build output lines).
    pub async fn debug(&self, step: &str, message: impl Into<String>) {
        self.emit(LogLevel::Debug, Some(step), message.into(), BTreeMap::new())
            .await;
    }

    /// Success with structured extras (the final URL, for instance).
    pub async fn success_with(
        &self,
        step: &str,
        message: impl Into<String>,
        metadata: BTreeMap<String, serde_json::Value>,
    ) {
        self.emit(LogLevel::Success, Some(step), message.into(), metadata)
            .await;
    }
}
