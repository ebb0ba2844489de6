#![warn(missing_docs)]

//! # Slipway Queue
//!
//! Durable FIFO of deployment work items with at-least-once delivery:
//! leases, exponential backoff on retryable failures, cancellation
//! intents for leased items, and an append-only journal that survives
//! process restarts (leases held by a crashed process re-enqueue with
//! the lost attempt counted).
//!
//! The wall-clock job timeout itself is enforced by the worker (see
//! `slipway-engine`); this crate supplies the timeout value on each
//! item and the lease TTL backstop behind it.

mod journal;
mod queue;

pub use journal::{Completion, JournalEntry};
pub use queue::{
    CancelOutcome, CompletedJob, JobQueue, QueueConfig, QueueStats, RecoveryReport, RetryDecision,
};
