//! The error taxonomy the deployment core reasons about.
//!
//! Every failure the pipeline, queue, vault, or adapters can produce maps
//! to one variant here. The queue and the worker never inspect messages;
//! they branch on [`Error::is_retryable`] / [`Error::is_terminal`] only,
//! so retries are data rather than stack unwinding.

use crate::provider::ProviderKind;

/// Result alias used throughout Slipway.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the deployment core.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Malformed intake; never enters the queue.
    #[error("validation failed: {message}")]
    Validation {
        /// What was wrong with the input.
        message: String,
    },

    /// Unknown deployment or credential id.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind ("deployment", "credential", "job").
        entity: &'static str,
        /// The id that could not be resolved.
        id: String,
    },

    /// Duplicate active credential for a provider.
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflicting state.
        message: String,
    },

    /// The provider rejected the secret.
    #[error("invalid credential: {message}")]
    InvalidCredential {
        /// Provider-reported detail.
        message: String,
    },

    /// The credential exists but is deactivated.
    #[error("credential {id} is inactive")]
    CredentialInactive {
        /// The inactive credential id.
        id: String,
    },

    /// No usable credential for the chosen provider; terminal.
    #[error("no active credential for provider {provider}")]
    MissingCredential {
        /// The provider a credential was needed for.
        provider: ProviderKind,
    },

    /// The provider API could not be reached to validate; `is_valid` is
    /// left untouched.
    #[error("credential validation unavailable: {message}")]
    ValidationUnavailable {
        /// Underlying network error.
        message: String,
    },

    /// Repository not reachable or branch not resolvable after fallbacks.
    #[error("clone failed: {original} (final attempt: {last})")]
    CloneFailed {
        /// Error from the originally requested ref.
        original: String,
        /// Error from the last fallback attempt.
        last: String,
    },

    /// Non-zero build exit; terminal.
    #[error("build failed: {message}")]
    BuildFailed {
        /// Captured failure detail (tail of build output).
        message: String,
    },

    /// Provider API rejected or timed out the upload.
    #[error("deploy failed: {message}")]
    DeployFailed {
        /// Provider-reported detail.
        message: String,
        /// 5xx/network-class failures retry; 4xx-class do not.
        retryable: bool,
    },

    /// Pipeline exceeded its wall-clock budget; terminal.
    #[error("deployment timed out after {elapsed_secs}s")]
    Timeout {
        /// Seconds elapsed when the timer fired.
        elapsed_secs: u64,
    },

    /// User-initiated cancellation; terminal.
    #[error("deployment cancelled")]
    Cancelled,

    /// No container daemon; terminal, reported distinctly.
    #[error("container daemon unavailable: {message}")]
    ContainerUnavailable {
        /// Connection failure detail.
        message: String,
    },

    /// A state transition that violates the deployment state machine.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state.
        from: String,
        /// Rejected target state.
        to: String,
    },

    /// Durable storage failure.
    #[error("storage error: {message}")]
    Storage {
        /// Underlying I/O or serialization detail.
        message: String,
    },

    /// Retryable network-class error, wrapped to signal the queue.
    #[error("transient error: {message}")]
    Transient {
        /// Underlying detail.
        message: String,
    },

    /// Invariant violation inside the service itself.
    #[error("internal error: {message}")]
    Internal {
        /// Detail for operators; never shown to users verbatim.
        message: String,
    },
}

impl Error {
    /// Shorthand for [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::NotFound`].
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`Error::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::Storage`].
    pub fn storage(message: impl std::fmt::Display) -> Self {
        Self::Storage {
            message: message.to_string(),
        }
    }

    /// Shorthand for [`Error::Transient`].
    pub fn transient(message: impl std::fmt::Display) -> Self {
        Self::Transient {
            message: message.to_string(),
        }
    }

    /// Shorthand for [`Error::Internal`].
    pub fn internal(message: impl std::fmt::Display) -> Self {
        Self::Internal {
            message: message.to_string(),
        }
    }

    /// Returns `true` if the queue should re-enqueue the job for another
    /// attempt after this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CloneFailed { .. } | Self::Transient { .. } | Self::ValidationUnavailable { .. } => {
                true
            }
            Self::DeployFailed { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Returns `true` if this error ends the deployment without retry.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !self.is_retryable()
    }

    /// Short machine-readable kind tag, used in HTTP bodies and log
    /// metadata.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict_error",
            Self::InvalidCredential { .. } => "invalid_credential",
            Self::CredentialInactive { .. } => "credential_inactive",
            Self::MissingCredential { .. } => "missing_credential",
            Self::ValidationUnavailable { .. } => "validation_unavailable",
            Self::CloneFailed { .. } => "clone_error",
            Self::BuildFailed { .. } => "build_error",
            Self::DeployFailed { .. } => "deploy_error",
            Self::Timeout { .. } => "timeout_error",
            Self::Cancelled => "cancelled",
            Self::ContainerUnavailable { .. } => "container_unavailable",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Storage { .. } => "storage_error",
            Self::Transient { .. } => "transient_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_errors_retry() {
        let err = Error::CloneFailed {
            original: "branch feature/x not found".into(),
            last: "connection reset".into(),
        };
        assert!(err.is_retryable());
        assert!(!err.is_terminal());
    }

    #[test]
    fn build_errors_are_terminal() {
        let err = Error::BuildFailed {
            message: "exit code 1".into(),
        };
        assert!(err.is_terminal());
    }

    #[test]
    fn deploy_retryability_follows_flag() {
        let server_side = Error::DeployFailed {
            message: "502 bad gateway".into(),
            retryable: true,
        };
        let client_side = Error::DeployFailed {
            message: "401 unauthorized".into(),
            retryable: false,
        };
        assert!(server_side.is_retryable());
        assert!(client_side.is_terminal());
    }

    #[test]
    fn timeout_cancelled_and_daemon_loss_are_terminal() {
        assert!(Error::Timeout { elapsed_secs: 900 }.is_terminal());
        assert!(Error::Cancelled.is_terminal());
        assert!(Error::ContainerUnavailable {
            message: "connection refused".into()
        }
        .is_terminal());
    }

    #[test]
    fn missing_credential_is_terminal() {
        let err = Error::MissingCredential {
            provider: ProviderKind::Netlify,
        };
        assert!(err.is_terminal());
        assert!(err.to_string().contains("netlify"));
    }

    #[test]
    fn validation_unavailable_retries() {
        assert!(Error::ValidationUnavailable {
            message: "dns failure".into()
        }
        .is_retryable());
    }

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(Error::Cancelled.kind(), "cancelled");
        assert_eq!(Error::validation("x").kind(), "validation_error");
        assert_eq!(
            Error::not_found("deployment", "d-1").kind(),
            "not_found"
        );
    }

    #[test]
    fn clone_error_carries_both_messages() {
        let err = Error::CloneFailed {
            original: "first".into(),
            last: "second".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("first"));
        assert!(msg.contains("second"));
    }
}
