#![warn(missing_docs)]

//! # Slipway Vault
//!
//! Encrypted at-rest storage of provider secrets.
//!
//! Secrets are validated against the provider before they are accepted,
//! sealed with AES-256-GCM under a key derived from the configured
//! master key, and persisted through the [`CredentialStore`] port. When
//! no master key is configured the vault runs on an ephemeral key -- it
//! still works, but credentials do not survive a restart; that degraded
//! mode is announced with a warning at startup.
//!
//! [`CredentialStore`]: slipway_store::CredentialStore

mod crypto;
mod vault;

pub use crypto::{Cipher, KeySource};
pub use vault::{CredentialUpdate, SecretValidator, ValidationOutcome, Vault};
