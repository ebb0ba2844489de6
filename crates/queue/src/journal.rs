//! Append-only queue journal.
//!
//! One JSON document per line. Replayed at startup to rebuild queue
//! state; compacted to a snapshot right after replay so the file does
//! not grow without bound across restarts.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use slipway_core::{Error, JobId, JobItem, Result};
use tracing::warn;

/// Terminal outcome of a queue item, kept in the completion history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// Deployment finished successfully.
    Success,
    /// Deployment ended in a terminal error.
    Failed,
    /// Deployment was cancelled.
    Cancelled,
    /// Deployment exceeded its wall-clock budget.
    TimedOut,
}

/// One journal line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JournalEntry {
    /// An item entered the queue.
    Enqueued {
        /// The full item (the snapshot form as well).
        item: JobItem,
    },
    /// A worker took a lease; `attempts_made` already counts it.
    Leased {
        /// The leased item.
        job_id: JobId,
        /// Attempts started so far.
        attempts_made: u32,
    },
    /// A retryable failure sent the item to the delayed set.
    Retried {
        /// The nacked item.
        job_id: JobId,
        /// Backoff applied, for operators reading the journal.
        delay_ms: u64,
        /// Sanitized error kind that caused the retry.
        error: String,
    },
    /// The item left the queue for good.
    Completed {
        /// The finished item.
        job_id: JobId,
        /// How it ended.
        outcome: Completion,
    },
    /// Cancellation intent was recorded for a leased item.
    CancelRequested {
        /// The item to cancel.
        job_id: JobId,
    },
}

/// The journal file handle.
pub struct Journal {
    path: PathBuf,
    file: File,
}

impl Journal {
    /// Open (or create) the journal at `path`, replaying existing
    /// entries first.
    pub fn open(path: impl Into<PathBuf>) -> Result<(Self, Vec<JournalEntry>)> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::storage)?;
        }
        let entries = Self::load(&path);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(Error::storage)?;
        Ok((Self { path, file }, entries))
    }

    fn load(path: &Path) -> Vec<JournalEntry> {
        let Ok(file) = File::open(path) else {
            return Vec::new();
        };
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                // A torn final line after a crash is expected; anything
                // else malformed is logged and skipped.
                Err(error) => {
                    warn!(%error, "skipping malformed journal line");
                }
            }
        }
        entries
    }

    /// Append one entry and flush it to disk.
    pub fn append(&mut self, entry: &JournalEntry) -> Result<()> {
        let line = serde_json::to_string(entry).map_err(Error::storage)?;
        writeln!(self.file, "{line}").map_err(Error::storage)?;
        self.file.flush().map_err(Error::storage)?;
        Ok(())
    }

    /// Replace the journal contents with a fresh snapshot.
    pub fn compact(&mut self, snapshot: &[JournalEntry]) -> Result<()> {
        let tmp = self.path.with_extension("journal.tmp");
        {
            let mut out = File::create(&tmp).map_err(Error::storage)?;
            for entry in snapshot {
                let line = serde_json::to_string(entry).map_err(Error::storage)?;
                writeln!(out, "{line}").map_err(Error::storage)?;
            }
            out.flush().map_err(Error::storage)?;
        }
        std::fs::rename(&tmp, &self.path).map_err(Error::storage)?;
        self.file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(Error::storage)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use slipway_core::{Budget, DeployConfig, DeployRequest, DeploymentId, Environment};
    use tempfile::TempDir;

    use super::*;

    fn item() -> JobItem {
        JobItem::new(
            DeploymentId::generate(),
            DeployRequest {
                repo_url: "https://github.com/acme/site".into(),
                branch: "main".into(),
                environment: Environment::School,
                budget: Budget::Free,
                preferred_providers: vec![],
                explicit_provider: None,
                explicit_credential_id: None,
                config: DeployConfig::default(),
            },
            3,
            Duration::from_secs(900),
        )
    }

    #[test]
    fn append_then_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.journal");
        let job = item();
        {
            let (mut journal, entries) = Journal::open(&path).unwrap();
            assert!(entries.is_empty());
            journal.append(&JournalEntry::Enqueued { item: job.clone() }).unwrap();
            journal
                .append(&JournalEntry::Leased {
                    job_id: job.job_id,
                    attempts_made: 1,
                })
                .unwrap();
        }
        let (_, entries) = Journal::open(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0], JournalEntry::Enqueued { .. }));
        assert!(matches!(entries[1], JournalEntry::Leased { .. }));
    }

    #[test]
    fn torn_last_line_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.journal");
        let job = item();
        {
            let (mut journal, _) = Journal::open(&path).unwrap();
            journal.append(&JournalEntry::Enqueued { item: job }).unwrap();
        }
        // Simulate a crash mid-write.
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{\"event\":\"leased\",\"job_id\":");
        std::fs::write(&path, raw).unwrap();

        let (_, entries) = Journal::open(&path).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn compact_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.journal");
        let job = item();
        let (mut journal, _) = Journal::open(&path).unwrap();
        for _ in 0..5 {
            journal
                .append(&JournalEntry::CancelRequested { job_id: job.job_id })
                .unwrap();
        }
        journal
            .compact(&[JournalEntry::Enqueued { item: job.clone() }])
            .unwrap();
        // New appends land after the snapshot.
        journal
            .append(&JournalEntry::Completed {
                job_id: job.job_id,
                outcome: Completion::Success,
            })
            .unwrap();

        let (_, entries) = Journal::open(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0], JournalEntry::Enqueued { .. }));
        assert!(matches!(entries[1], JournalEntry::Completed { .. }));
    }
}
