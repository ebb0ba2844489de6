#![warn(missing_docs)]

//! # Slipway Core
//!
//! Core types and data model for the Slipway deployment service.
//! This crate provides the fundamental building blocks used by all other
//! Slipway crates:
//!
//! - **Identifiers**: [`DeploymentId`], [`JobId`], [`CredentialId`]
//! - **Deployment model**: [`Deployment`], [`DeploymentState`] and its
//!   transition rules, [`DeployRequest`], [`DeployConfig`]
//! - **Detection model**: [`DetectionResult`], [`ProjectType`],
//!   [`PackageManager`]
//! - **Log model**: [`LogEvent`], [`LogLevel`]
//! - **Queue model**: [`JobItem`]
//! - **Credential model**: [`Credential`], [`ProviderSecrets`]
//! - **Error taxonomy**: [`Error`] with retryable/terminal classification

pub mod credential;
pub mod deployment;
pub mod detection;
pub mod error;
pub mod id;
pub mod job;
pub mod log;
pub mod provider;
pub mod secret;

pub use credential::{Credential, CredentialSummary};
pub use deployment::{
    can_transition, validate_transition, Budget, DeployConfig, DeployRequest, Deployment,
    DeploymentState, Environment, StatePatch,
};
pub use detection::{DetectionResult, PackageManager, ProjectType};
pub use error::{Error, Result};
pub use id::{CredentialId, DeploymentId, IdParseError, JobId};
pub use job::JobItem;
pub use log::{LogEvent, LogLevel, LogQuery, LogSummary};
pub use provider::ProviderKind;
pub use secret::{NetlifySecrets, ProviderSecrets, Secret, VercelSecrets};
