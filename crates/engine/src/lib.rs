#![warn(missing_docs)]

//! # Slipway Engine
//!
//! The worker pool and the per-deployment pipeline:
//!
//! ```text
//! queued -> cloning -> building -> deploying -> success
//!                |          |            |
//!                +----------+------------+--> failed
//!                +----------+------------+--> cancelled
//! ```
//!
//! Each worker leases one item at a time and drives it through clone,
//! analysis, provider selection, credential load, build, upload, and
//! finalize, with cleanup that always runs. Cancellation is
//! cooperative: a flag checked at the start of every major step, plus a
//! token that aborts in-flight I/O best-effort. Only transient error
//! kinds go back to the queue for retry; everything else ends the
//! deployment.

mod cancel;
mod engine;
mod pipeline;
mod worker;

pub use engine::{Engine, EngineDeps};
