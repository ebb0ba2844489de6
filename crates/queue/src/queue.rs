//! The durable work queue.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use slipway_core::{DeployRequest, DeploymentId, JobId, JobItem, Result};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::journal::{Completion, Journal, JournalEntry};

/// Queue policy knobs.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Delivery attempt cap per item.
    pub max_attempts: u32,
    /// Per-attempt wall-clock budget copied onto items.
    pub job_timeout: Duration,
    /// First retry backoff; doubles per attempt.
    pub base_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
    /// Lease duration before the sweeper re-enqueues an item. Must
    /// exceed `job_timeout`.
    pub lease_ttl: Duration,
    /// Backlog size beyond which enqueue logs a warning.
    pub high_water: usize,
    /// Completed items remembered for debugging.
    pub history: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        let job_timeout = Duration::from_secs(900);
        Self {
            max_attempts: 3,
            job_timeout,
            base_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(300),
            lease_ttl: job_timeout + Duration::from_secs(60),
            high_water: 100,
            history: 64,
        }
    }
}

impl QueueConfig {
    /// Derive the config from worker policy settings.
    #[must_use]
    pub fn with_policy(max_attempts: u32, job_timeout: Duration, high_water: usize) -> Self {
        Self {
            max_attempts,
            job_timeout,
            lease_ttl: job_timeout + Duration::from_secs(60),
            high_water,
            ..Self::default()
        }
    }
}

/// What `retry` decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-enqueued with backoff; the worker must not touch the
    /// deployment record further.
    Requeued {
        /// Backoff applied before the item becomes leasable again.
        delay: Duration,
    },
    /// Attempts exhausted; the worker marks the deployment failed.
    Exhausted,
}

/// What `cancel` found.
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    /// The item was still waiting and has been removed; the caller
    /// transitions the deployment record.
    Removed(Box<JobItem>),
    /// The item is leased; intent recorded for the owning worker's next
    /// cooperative checkpoint.
    IntentRecorded,
    /// Nothing queued under this id (already completed or unknown).
    NotQueued,
}

/// A finished item kept in the bounded debug history.
#[derive(Debug, Clone)]
pub struct CompletedJob {
    /// The item as it finished.
    pub item: JobItem,
    /// How it ended.
    pub outcome: Completion,
    /// When it left the queue.
    pub completed_at: DateTime<Utc>,
}

/// Counters for `/health` and logs.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct QueueStats {
    /// Items leasable right now.
    pub ready: usize,
    /// Items waiting out a backoff.
    pub delayed: usize,
    /// Items currently leased.
    pub leased: usize,
    /// Completed items remembered.
    pub completed: usize,
}

/// Items recovered from the journal at startup.
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Items re-enqueued (including leases from a crashed process;
    /// their `attempts_made` already counts the lost attempt).
    pub requeued: Vec<JobItem>,
    /// Leased items with recorded cancel intent: dropped, and the
    /// caller marks their deployments cancelled.
    pub cancelled: Vec<JobItem>,
}

struct Lease {
    item: JobItem,
    deadline: Instant,
    cancel_requested: bool,
}

struct Delayed {
    item: JobItem,
    due: Instant,
}

#[derive(Default)]
struct State {
    ready: VecDeque<JobItem>,
    delayed: Vec<Delayed>,
    leased: HashMap<JobId, Lease>,
    history: VecDeque<CompletedJob>,
    /// Items that exhausted attempts via lease expiry; drained by the
    /// worker loop to mark their deployments failed.
    dead_letters: Vec<JobItem>,
}

impl State {
    fn promote_due(&mut self, now: Instant) {
        let mut index = 0;
        while index < self.delayed.len() {
            if self.delayed[index].due <= now {
                let delayed = self.delayed.swap_remove(index);
                debug!(job_id = %delayed.item.job_id, "backoff elapsed, item ready");
                self.ready.push_back(delayed.item);
            } else {
                index += 1;
            }
        }
    }

    fn next_due(&self) -> Option<Instant> {
        self.delayed.iter().map(|d| d.due).min()
    }

    fn backlog(&self) -> usize {
        self.ready.len() + self.delayed.len()
    }

    fn push_history(&mut self, job: CompletedJob, cap: usize) {
        if self.history.len() == cap {
            self.history.pop_front();
        }
        self.history.push_back(job);
    }
}

/// Durable FIFO of deployment work items.
///
/// Delivery is at-least-once: a worker leases an item, and only an
/// explicit completion removes it. Lease expiry (crashed worker) and
/// retryable failures re-enqueue; `attempts_made` counts leases taken.
pub struct JobQueue {
    state: Mutex<State>,
    journal: Mutex<Journal>,
    notify: Notify,
    config: QueueConfig,
}

impl JobQueue {
    /// Open the queue, replaying and compacting the journal at `path`.
    pub fn open(path: impl AsRef<Path>, config: QueueConfig) -> Result<(Self, RecoveryReport)> {
        let (mut journal, entries) = Journal::open(path.as_ref().to_path_buf())?;
        let (state, report) = replay(entries, &config);

        // Compact to a snapshot of what actually survived.
        let snapshot: Vec<JournalEntry> = state
            .ready
            .iter()
            .map(|item| JournalEntry::Enqueued { item: item.clone() })
            .collect();
        journal.compact(&snapshot)?;

        if !report.requeued.is_empty() || !report.cancelled.is_empty() {
            info!(
                requeued = report.requeued.len(),
                cancelled = report.cancelled.len(),
                "queue recovered from journal"
            );
        }
        Ok((
            Self {
                state: Mutex::new(state),
                journal: Mutex::new(journal),
                notify: Notify::new(),
                config,
            },
            report,
        ))
    }

    /// Accept one work item. Durable before it becomes leasable.
    pub fn enqueue(&self, deployment_id: DeploymentId, request: DeployRequest) -> Result<JobItem> {
        let item = JobItem::new(
            deployment_id,
            request,
            self.config.max_attempts,
            self.config.job_timeout,
        );
        self.journal
            .lock()
            .append(&JournalEntry::Enqueued { item: item.clone() })?;

        let backlog = {
            let mut state = self.state.lock();
            state.ready.push_back(item.clone());
            state.backlog()
        };
        if backlog > self.config.high_water {
            // Intake stays responsive; the backlog is only announced.
            warn!(backlog, high_water = self.config.high_water, "queue backlog above high water");
        }
        self.notify.notify_one();
        Ok(item)
    }

    /// Wait for the next leasable item. Increments `attempts_made`.
    pub async fn lease(&self) -> JobItem {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);

            let wait_until = {
                let mut state = self.state.lock();
                state.promote_due(Instant::now());
                while let Some(mut item) = state.ready.pop_front() {
                    if item.attempts_made >= item.max_attempts {
                        // Exhausted via lease expiry; surfaced through
                        // dead letters instead of another delivery.
                        let completed = CompletedJob {
                            item: item.clone(),
                            outcome: Completion::Failed,
                            completed_at: Utc::now(),
                        };
                        state.push_history(completed, self.config.history);
                        state.dead_letters.push(item);
                        continue;
                    }
                    item.attempts_made += 1;
                    state.leased.insert(
                        item.job_id,
                        Lease {
                            item: item.clone(),
                            deadline: Instant::now() + self.config.lease_ttl,
                            cancel_requested: false,
                        },
                    );
                    let entry = JournalEntry::Leased {
                        job_id: item.job_id,
                        attempts_made: item.attempts_made,
                    };
                    drop(state);
                    self.journal_best_effort(&entry);
                    return item;
                }
                state.next_due()
            };

            match wait_until {
                Some(due) => {
                    tokio::select! {
                        () = &mut notified => {}
                        () = tokio::time::sleep_until(due) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Remove a finished item (success or non-retryable failure) for
    /// good.
    pub fn complete(&self, job_id: JobId, outcome: Completion) {
        let removed = {
            let mut state = self.state.lock();
            let lease = state.leased.remove(&job_id);
            if let Some(lease) = &lease {
                let completed = CompletedJob {
                    item: lease.item.clone(),
                    outcome,
                    completed_at: Utc::now(),
                };
                state.push_history(completed, self.config.history);
            }
            lease.is_some()
        };
        if removed {
            self.journal_best_effort(&JournalEntry::Completed { job_id, outcome });
        }
    }

    /// A retryable failure: back off and redeliver, unless attempts are
    /// exhausted.
    pub fn retry(&self, job_id: JobId, error_kind: &str) -> RetryDecision {
        let (decision, entry) = {
            let mut state = self.state.lock();
            let Some(lease) = state.leased.remove(&job_id) else {
                // Lease already expired; the sweeper took over.
                return RetryDecision::Requeued { delay: Duration::ZERO };
            };
            let item = lease.item;
            if item.attempts_made >= item.max_attempts {
                let completed = CompletedJob {
                    item,
                    outcome: Completion::Failed,
                    completed_at: Utc::now(),
                };
                state.push_history(completed, self.config.history);
                (
                    RetryDecision::Exhausted,
                    JournalEntry::Completed {
                        job_id,
                        outcome: Completion::Failed,
                    },
                )
            } else {
                let delay = backoff_delay(
                    self.config.base_backoff,
                    self.config.max_backoff,
                    item.attempts_made,
                );
                state.delayed.push(Delayed {
                    item,
                    due: Instant::now() + delay,
                });
                (
                    RetryDecision::Requeued { delay },
                    JournalEntry::Retried {
                        job_id,
                        delay_ms: delay.as_millis() as u64,
                        error: error_kind.to_owned(),
                    },
                )
            }
        };
        self.journal_best_effort(&entry);
        self.notify.notify_one();
        decision
    }

    /// Cancel an item: removal when it is still waiting, recorded
    /// intent when a worker holds it.
    pub fn cancel(&self, job_id: JobId) -> CancelOutcome {
        let (outcome, entry) = {
            let mut state = self.state.lock();
            if let Some(position) = state.ready.iter().position(|i| i.job_id == job_id) {
                let item = state.ready.remove(position).expect("position just found");
                let completed = CompletedJob {
                    item: item.clone(),
                    outcome: Completion::Cancelled,
                    completed_at: Utc::now(),
                };
                state.push_history(completed, self.config.history);
                (
                    CancelOutcome::Removed(Box::new(item)),
                    Some(JournalEntry::Completed {
                        job_id,
                        outcome: Completion::Cancelled,
                    }),
                )
            } else if let Some(position) =
                state.delayed.iter().position(|d| d.item.job_id == job_id)
            {
                let delayed = state.delayed.swap_remove(position);
                let completed = CompletedJob {
                    item: delayed.item.clone(),
                    outcome: Completion::Cancelled,
                    completed_at: Utc::now(),
                };
                state.push_history(completed, self.config.history);
                (
                    CancelOutcome::Removed(Box::new(delayed.item)),
                    Some(JournalEntry::Completed {
                        job_id,
                        outcome: Completion::Cancelled,
                    }),
                )
            } else if let Some(lease) = state.leased.get_mut(&job_id) {
                lease.cancel_requested = true;
                (
                    CancelOutcome::IntentRecorded,
                    Some(JournalEntry::CancelRequested { job_id }),
                )
            } else {
                (CancelOutcome::NotQueued, None)
            }
        };
        if let Some(entry) = entry {
            self.journal_best_effort(&entry);
        }
        outcome
    }

    /// Whether cancellation intent is recorded for a leased item. The
    /// owning worker checks this at cooperative checkpoints.
    #[must_use]
    pub fn is_cancel_requested(&self, job_id: JobId) -> bool {
        self.state
            .lock()
            .leased
            .get(&job_id)
            .is_some_and(|lease| lease.cancel_requested)
    }

    /// Expire overdue leases: cancel-intent items drop, the rest
    /// re-enqueue (at-least-once). Returns how many expired.
    pub fn expire_leases(&self) -> usize {
        let now = Instant::now();
        let mut expired = 0;
        let mut entries = Vec::new();
        {
            let mut state = self.state.lock();
            let overdue: Vec<JobId> = state
                .leased
                .iter()
                .filter(|(_, lease)| lease.deadline <= now)
                .map(|(id, _)| *id)
                .collect();
            for job_id in overdue {
                let lease = state.leased.remove(&job_id).expect("id just collected");
                expired += 1;
                if lease.cancel_requested {
                    let completed = CompletedJob {
                        item: lease.item,
                        outcome: Completion::Cancelled,
                        completed_at: Utc::now(),
                    };
                    state.push_history(completed, self.config.history);
                    entries.push(JournalEntry::Completed {
                        job_id,
                        outcome: Completion::Cancelled,
                    });
                } else {
                    warn!(job_id = %job_id, "lease expired, re-enqueueing");
                    entries.push(JournalEntry::Enqueued {
                        item: lease.item.clone(),
                    });
                    state.ready.push_back(lease.item);
                }
            }
        }
        for entry in &entries {
            self.journal_best_effort(entry);
        }
        if expired > 0 {
            self.notify.notify_waiters();
        }
        expired
    }

    /// Items that exhausted attempts without a worker observing it
    /// (lease-expiry exhaustion). The worker loop drains these and
    /// marks their deployments failed.
    #[must_use]
    pub fn take_dead_letters(&self) -> Vec<JobItem> {
        std::mem::take(&mut self.state.lock().dead_letters)
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            ready: state.ready.len(),
            delayed: state.delayed.len(),
            leased: state.leased.len(),
            completed: state.history.len(),
        }
    }

    /// The bounded completion history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<CompletedJob> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// The configured per-attempt timeout.
    #[must_use]
    pub fn job_timeout(&self) -> Duration {
        self.config.job_timeout
    }

    fn journal_best_effort(&self, entry: &JournalEntry) {
        // Enqueue durability is load-bearing and handled separately;
        // everything else degrades to at-least-once on journal loss.
        if let Err(error) = self.journal.lock().append(entry) {
            warn!(%error, "queue journal append failed");
        }
    }
}

/// Exponential backoff from `base`, doubling per completed attempt,
/// capped at `max`.
fn backoff_delay(base: Duration, max: Duration, attempts_made: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempts_made.saturating_sub(1));
    base.saturating_mul(factor).min(max)
}

fn replay(entries: Vec<JournalEntry>, config: &QueueConfig) -> (State, RecoveryReport) {
    enum Status {
        Ready,
        Leased { cancel_requested: bool },
        Done,
    }
    struct Replayed {
        item: JobItem,
        status: Status,
    }

    let mut order: Vec<JobId> = Vec::new();
    let mut map: HashMap<JobId, Replayed> = HashMap::new();
    for entry in entries {
        match entry {
            JournalEntry::Enqueued { item } => {
                if !map.contains_key(&item.job_id) {
                    order.push(item.job_id);
                }
                map.insert(
                    item.job_id,
                    Replayed {
                        item,
                        status: Status::Ready,
                    },
                );
            }
            JournalEntry::Leased {
                job_id,
                attempts_made,
            } => {
                if let Some(replayed) = map.get_mut(&job_id) {
                    replayed.item.attempts_made = attempts_made;
                    replayed.status = Status::Leased {
                        cancel_requested: false,
                    };
                }
            }
            JournalEntry::Retried { job_id, .. } => {
                if let Some(replayed) = map.get_mut(&job_id) {
                    // Backoff does not survive a restart; the item is
                    // simply leasable again.
                    replayed.status = Status::Ready;
                }
            }
            JournalEntry::Completed { job_id, .. } => {
                if let Some(replayed) = map.get_mut(&job_id) {
                    replayed.status = Status::Done;
                }
            }
            JournalEntry::CancelRequested { job_id } => {
                if let Some(replayed) = map.get_mut(&job_id) {
                    if let Status::Leased { cancel_requested } = &mut replayed.status {
                        *cancel_requested = true;
                    }
                }
            }
        }
    }

    let mut state = State::default();
    let mut report = RecoveryReport::default();
    for job_id in order {
        let Some(replayed) = map.remove(&job_id) else {
            continue;
        };
        match replayed.status {
            Status::Ready => {
                report.requeued.push(replayed.item.clone());
                state.ready.push_back(replayed.item);
            }
            Status::Leased { cancel_requested } => {
                if cancel_requested {
                    let completed = CompletedJob {
                        item: replayed.item.clone(),
                        outcome: Completion::Cancelled,
                        completed_at: Utc::now(),
                    };
                    state.push_history(completed, config.history);
                    report.cancelled.push(replayed.item);
                } else {
                    // The crashed attempt counts; another worker takes
                    // over (at-least-once).
                    report.requeued.push(replayed.item.clone());
                    state.ready.push_back(replayed.item);
                }
            }
            Status::Done => {}
        }
    }
    (state, report)
}

#[cfg(test)]
mod tests {
    use slipway_core::{Budget, DeployConfig, Environment};
    use tempfile::TempDir;

    use super::*;

    fn request() -> DeployRequest {
        DeployRequest {
            repo_url: "https://github.com/acme/site".into(),
            branch: "main".into(),
            environment: Environment::School,
            budget: Budget::Free,
            preferred_providers: vec![],
            explicit_provider: None,
            explicit_credential_id: None,
            config: DeployConfig::default(),
        }
    }

    fn open(dir: &TempDir, config: QueueConfig) -> (JobQueue, RecoveryReport) {
        JobQueue::open(dir.path().join("queue.journal"), config).unwrap()
    }

    #[tokio::test]
    async fn enqueue_lease_fifo() {
        let dir = TempDir::new().unwrap();
        let (queue, _) = open(&dir, QueueConfig::default());
        let a = queue.enqueue(DeploymentId::generate(), request()).unwrap();
        let b = queue.enqueue(DeploymentId::generate(), request()).unwrap();

        let first = queue.lease().await;
        let second = queue.lease().await;
        assert_eq!(first.job_id, a.job_id);
        assert_eq!(second.job_id, b.job_id);
        assert_eq!(first.attempts_made, 1);
    }

    #[tokio::test]
    async fn complete_removes_and_remembers() {
        let dir = TempDir::new().unwrap();
        let (queue, _) = open(&dir, QueueConfig::default());
        queue.enqueue(DeploymentId::generate(), request()).unwrap();
        let item = queue.lease().await;
        queue.complete(item.job_id, Completion::Success);

        let stats = queue.stats();
        assert_eq!(stats.leased, 0);
        assert_eq!(stats.completed, 1);
        assert_eq!(queue.history()[0].outcome, Completion::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_backs_off_exponentially() {
        let dir = TempDir::new().unwrap();
        let (queue, _) = open(&dir, QueueConfig::default());
        queue.enqueue(DeploymentId::generate(), request()).unwrap();

        let item = queue.lease().await;
        let decision = queue.retry(item.job_id, "clone_error");
        assert_eq!(
            decision,
            RetryDecision::Requeued {
                delay: Duration::from_secs(5)
            }
        );
        assert_eq!(queue.stats().delayed, 1);

        // Not leasable until the backoff elapses.
        tokio::time::advance(Duration::from_secs(6)).await;
        let again = queue.lease().await;
        assert_eq!(again.job_id, item.job_id);
        assert_eq!(again.attempts_made, 2);

        let decision = queue.retry(again.job_id, "clone_error");
        assert_eq!(
            decision,
            RetryDecision::Requeued {
                delay: Duration::from_secs(10)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_exhaust_at_max() {
        let dir = TempDir::new().unwrap();
        let (queue, _) = open(&dir, QueueConfig::default());
        queue.enqueue(DeploymentId::generate(), request()).unwrap();

        for attempt in 1..=3u32 {
            tokio::time::advance(Duration::from_secs(30)).await;
            let item = queue.lease().await;
            assert_eq!(item.attempts_made, attempt);
            if attempt < 3 {
                assert!(matches!(
                    queue.retry(item.job_id, "transient_error"),
                    RetryDecision::Requeued { .. }
                ));
            } else {
                assert_eq!(queue.retry(item.job_id, "transient_error"), RetryDecision::Exhausted);
            }
        }
        assert_eq!(queue.stats().ready, 0);
        assert_eq!(queue.stats().delayed, 0);
    }

    #[tokio::test]
    async fn cancel_unleased_removes() {
        let dir = TempDir::new().unwrap();
        let (queue, _) = open(&dir, QueueConfig::default());
        let item = queue.enqueue(DeploymentId::generate(), request()).unwrap();
        match queue.cancel(item.job_id) {
            CancelOutcome::Removed(removed) => assert_eq!(removed.job_id, item.job_id),
            other => panic!("expected removal, got {other:?}"),
        }
        assert_eq!(queue.stats().ready, 0);
        assert!(matches!(queue.cancel(item.job_id), CancelOutcome::NotQueued));
    }

    #[tokio::test]
    async fn cancel_leased_records_intent() {
        let dir = TempDir::new().unwrap();
        let (queue, _) = open(&dir, QueueConfig::default());
        queue.enqueue(DeploymentId::generate(), request()).unwrap();
        let item = queue.lease().await;

        assert!(!queue.is_cancel_requested(item.job_id));
        assert!(matches!(queue.cancel(item.job_id), CancelOutcome::IntentRecorded));
        assert!(queue.is_cancel_requested(item.job_id));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lease_requeues_with_attempt_counted() {
        let dir = TempDir::new().unwrap();
        let config = QueueConfig {
            lease_ttl: Duration::from_secs(10),
            ..QueueConfig::default()
        };
        let (queue, _) = open(&dir, config);
        queue.enqueue(DeploymentId::generate(), request()).unwrap();
        let item = queue.lease().await;
        assert_eq!(item.attempts_made, 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(queue.expire_leases(), 1);
        let again = queue.lease().await;
        assert_eq!(again.job_id, item.job_id);
        assert_eq!(again.attempts_made, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lease_with_intent_is_dropped() {
        let dir = TempDir::new().unwrap();
        let config = QueueConfig {
            lease_ttl: Duration::from_secs(10),
            ..QueueConfig::default()
        };
        let (queue, _) = open(&dir, config);
        queue.enqueue(DeploymentId::generate(), request()).unwrap();
        let item = queue.lease().await;
        queue.cancel(item.job_id);

        tokio::time::advance(Duration::from_secs(11)).await;
        queue.expire_leases();
        assert_eq!(queue.stats().ready, 0);
        assert_eq!(queue.history().last().unwrap().outcome, Completion::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_expiry_becomes_dead_letter() {
        let dir = TempDir::new().unwrap();
        let config = QueueConfig {
            max_attempts: 1,
            lease_ttl: Duration::from_secs(10),
            ..QueueConfig::default()
        };
        let (queue, _) = open(&dir, config);
        let item = queue.enqueue(DeploymentId::generate(), request()).unwrap();
        let _ = queue.lease().await;
        tokio::time::advance(Duration::from_secs(11)).await;
        queue.expire_leases();

        // The re-enqueued item is exhausted; leasing must not deliver
        // it, it surfaces as a dead letter instead.
        tokio::time::advance(Duration::from_secs(1)).await;
        let lease = tokio::time::timeout(Duration::from_secs(1), queue.lease()).await;
        assert!(lease.is_err(), "exhausted item must not be delivered");
        let dead = queue.take_dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].job_id, item.job_id);
    }

    #[tokio::test]
    async fn journal_recovery_requeues_leased_items() {
        let dir = TempDir::new().unwrap();
        let (survivor_id, leased_id) = {
            let (queue, _) = open(&dir, QueueConfig::default());
            let survivor = queue.enqueue(DeploymentId::generate(), request()).unwrap();
            let crashed = queue.enqueue(DeploymentId::generate(), request()).unwrap();
            // Lease the first enqueued item and "crash".
            let leased = queue.lease().await;
            assert_eq!(leased.job_id, survivor.job_id);
            let _ = crashed;
            (survivor.job_id, leased.job_id)
        };
        assert_eq!(survivor_id, leased_id);

        let (queue, report) = open(&dir, QueueConfig::default());
        assert_eq!(report.requeued.len(), 2);
        let recovered = queue.lease().await;
        // The crashed lease counts as an attempt.
        let attempts: Vec<u32> = {
            let second = queue.lease().await;
            vec![recovered.attempts_made, second.attempts_made]
        };
        assert!(attempts.contains(&2));
        assert!(attempts.contains(&1));
    }

    #[tokio::test]
    async fn journal_recovery_drops_completed_items() {
        let dir = TempDir::new().unwrap();
        {
            let (queue, _) = open(&dir, QueueConfig::default());
            queue.enqueue(DeploymentId::generate(), request()).unwrap();
            let item = queue.lease().await;
            queue.complete(item.job_id, Completion::Success);
        }
        let (queue, report) = open(&dir, QueueConfig::default());
        assert!(report.requeued.is_empty());
        assert_eq!(queue.stats().ready, 0);
    }

    #[tokio::test]
    async fn journal_recovery_reports_cancel_intent() {
        let dir = TempDir::new().unwrap();
        let deployment_id = DeploymentId::generate();
        {
            let (queue, _) = open(&dir, QueueConfig::default());
            queue.enqueue(deployment_id, request()).unwrap();
            let item = queue.lease().await;
            queue.cancel(item.job_id);
        }
        let (queue, report) = open(&dir, QueueConfig::default());
        assert_eq!(report.cancelled.len(), 1);
        assert_eq!(report.cancelled[0].deployment_id, deployment_id);
        assert_eq!(queue.stats().ready, 0);
    }

    #[test]
    fn backoff_schedule() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(300);
        assert_eq!(backoff_delay(base, max, 1), Duration::from_secs(5));
        assert_eq!(backoff_delay(base, max, 2), Duration::from_secs(10));
        assert_eq!(backoff_delay(base, max, 3), Duration::from_secs(20));
        assert_eq!(backoff_delay(base, max, 10), Duration::from_secs(300));
    }
}
