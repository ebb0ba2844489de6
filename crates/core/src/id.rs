//! Strongly-typed identifiers for Slipway entities.
//!
//! Each identifier wraps a UUID behind its own newtype so a
//! [`DeploymentId`] can never be passed where a [`CredentialId`] is
//! expected. All id types support `generate()` for random creation,
//! `nil()` for a zero value, `parse(&str)`, `Display`, and serde
//! (serialized as the UUID string).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error returned when parsing an identifier from a string fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} id: {input}")]
pub struct IdParseError {
    /// Which id type was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub input: String,
}

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// The zero-valued identifier.
            #[must_use]
            pub fn nil() -> Self {
                Self(Uuid::nil())
            }

            /// Returns `true` if this is the zero-valued identifier.
            #[must_use]
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }

            /// Parse an identifier from its string form.
            pub fn parse(input: &str) -> Result<Self, IdParseError> {
                Uuid::parse_str(input).map(Self).map_err(|_| IdParseError {
                    kind: $label,
                    input: input.to_owned(),
                })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

define_id!(
    /// Identifier of a [`crate::Deployment`].
    DeploymentId,
    "deployment"
);
define_id!(
    /// Identifier of a queued [`crate::JobItem`].
    JobId,
    "job"
);
define_id!(
    /// Identifier of a stored [`crate::Credential`].
    CredentialId,
    "credential"
);
