#![warn(missing_docs)]

//! # Slipway Detector
//!
//! Pure analysis of a cloned workspace tree: which framework is this,
//! how is it built, where does the output land, roughly how big is it.
//!
//! The detector is total -- it returns a [`DetectionResult`] for any
//! input, degrading to static-site defaults instead of failing -- and
//! deterministic: the same bytes always produce the same result.
//!
//! [`DetectionResult`]: slipway_core::DetectionResult

mod detect;
mod manifest;
pub mod tree;

pub use detect::detect;
pub use manifest::Manifest;
