//! Structured deployment progress events.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::DeploymentId;

/// Severity of a [`LogEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Internal detail.
    Debug,
    /// Normal progress.
    Info,
    /// Degraded but continuing.
    Warn,
    /// A step failed.
    Error,
    /// A step (or the whole deployment) finished well.
    Success,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Success => "success",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for LogLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "success" => Ok(Self::Success),
            other => Err(crate::Error::validation(format!(
                "unknown log level: {other}"
            ))),
        }
    }
}

/// One entry in a deployment's append-only log.
///
/// `id` is unique and monotonic within a deployment; events with a
/// higher id never carry an earlier timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Per-deployment monotonic sequence number.
    pub id: u64,
    /// Owning deployment.
    pub deployment_id: DeploymentId,
    /// Server-assigned time of the append.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub level: LogLevel,
    /// Short pipeline step tag ("clone", "analysis", ...).
    #[serde(default)]
    pub step: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// Structured extras (exit codes, URLs, counts).
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Filters for reading a deployment's durable log.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    /// Maximum number of events to return.
    pub limit: Option<usize>,
    /// Only events at exactly this level.
    pub level: Option<LogLevel>,
    /// Only events whose message contains this substring
    /// (case-insensitive).
    pub search: Option<String>,
    /// Only events with an id strictly greater than this.
    pub since_id: Option<u64>,
}

impl LogQuery {
    /// Returns `true` if `event` passes every filter.
    #[must_use]
    pub fn matches(&self, event: &LogEvent) -> bool {
        if let Some(level) = self.level {
            if event.level != level {
                return false;
            }
        }
        if let Some(since) = self.since_id {
            if event.id <= since {
                return false;
            }
        }
        if let Some(search) = &self.search {
            if !event
                .message
                .to_lowercase()
                .contains(&search.to_lowercase())
            {
                return false;
            }
        }
        true
    }
}

/// Aggregate view of one deployment's log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogSummary {
    /// Total number of events.
    pub total: u64,
    /// Event count per level name.
    pub by_level: BTreeMap<String, u64>,
    /// Timestamp of the first event.
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Timestamp of the last event.
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds between first and last event.
    #[serde(default)]
    pub duration_ms: Option<i64>,
}

impl LogSummary {
    /// Compute a summary over an ordered event slice.
    #[must_use]
    pub fn compute(events: &[LogEvent]) -> Self {
        let mut by_level: BTreeMap<String, u64> = BTreeMap::new();
        for event in events {
            *by_level.entry(event.level.to_string()).or_default() += 1;
        }
        let start_time = events.first().map(|e| e.timestamp);
        let end_time = events.last().map(|e| e.timestamp);
        let duration_ms = match (start_time, end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        };
        Self {
            total: events.len() as u64,
            by_level,
            start_time,
            end_time,
            duration_ms,
        }
    }
}
