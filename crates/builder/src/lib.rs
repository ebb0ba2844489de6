#![warn(missing_docs)]

//! # Slipway Builder
//!
//! Turns a repository reference plus a detection result into an
//! artifact directory, emitting progress onto the Log Bus along the
//! way:
//!
//! - [`WorkspaceManager`] -- unique clone directories, wiping, orphan
//!   sweeps
//! - [`GitFetcher`] -- shallow clones with the branch fallback chain
//! - [`ContainerBuilder`] -- builds inside a container driven over the
//!   local daemon socket
//! - [`artifact::resolve`] -- locates the build output, falling back to
//!   the workspace root with a warning
//!
//! The engine consumes the fetch and build stages through the
//! [`SourceFetcher`] / [`ArtifactBuilder`] traits, so pipelines are
//! testable without git or a container daemon.

pub mod artifact;
mod clone;
mod container;
mod traits;
mod workspace;

pub use clone::{fallback_branches, GitFetcher};
pub use container::ContainerBuilder;
pub use traits::{ArtifactBuilder, SourceFetcher};
pub use workspace::WorkspaceManager;
