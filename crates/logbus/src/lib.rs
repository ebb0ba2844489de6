#![warn(missing_docs)]

//! # Slipway Log Bus
//!
//! Per-deployment append-only log with durable persistence and live
//! fan-out.
//!
//! [`LogBus::append`] assigns a monotonic id, persists the event through
//! the [`LogStore`] port, and only then notifies subscribers -- an event
//! a subscriber sees is always already durable. Subscriptions replay the
//! full existing log in order, then follow live appends.
//!
//! Fan-out uses [`tokio::sync::broadcast`] per deployment. A slow
//! subscriber never blocks appenders: when its buffer overflows, the
//! oldest events for that subscriber are dropped and it receives a
//! [`BusMessage::Gap`] carrying the missed count before continuing with
//! the live tail.
//!
//! [`LogStore`]: slipway_store::LogStore

mod bus;
mod writer;

pub use bus::{BusMessage, LogBus, Subscription, DEFAULT_BUFFER, DEFAULT_HEARTBEAT};
pub use writer::LogWriter;
