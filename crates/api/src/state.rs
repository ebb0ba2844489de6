//! Shared handler state.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use slipway_engine::Engine;
use slipway_logbus::LogBus;
use slipway_queue::JobQueue;
use slipway_store::DeploymentStore;
use slipway_vault::Vault;

/// Everything handlers reach for.
#[derive(Clone)]
pub struct AppState {
    /// Deployment records.
    pub store: Arc<dyn DeploymentStore>,
    /// Log bus (reads + SSE).
    pub bus: Arc<LogBus>,
    /// Work queue (intake + health stats).
    pub queue: Arc<JobQueue>,
    /// Credential vault.
    pub vault: Arc<Vault>,
    /// Engine (cancel path, in-flight count).
    pub engine: Arc<Engine>,
    /// Intake throttle.
    pub limiter: Arc<RateLimiter>,
}

/// Fixed-window per-minute intake throttle.
///
/// Coarse on purpose: the queue keeps accepting work under load (it
/// never drops accepted jobs); this only bounds how fast intake grows.
pub struct RateLimiter {
    per_minute: u32,
    window: Mutex<(u64, u32)>,
}

impl RateLimiter {
    /// Allow `per_minute` intakes per wall-clock minute.
    #[must_use]
    pub fn new(per_minute: u32) -> Self {
        Self {
            per_minute,
            window: Mutex::new((0, 0)),
        }
    }

    /// Returns `true` if this request is within the budget.
    #[must_use]
    pub fn check(&self) -> bool {
        let minute = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() / 60);
        self.check_at(minute)
    }

    fn check_at(&self, minute: u64) -> bool {
        let mut window = self.window.lock();
        if window.0 != minute {
            *window = (minute, 0);
        }
        if window.1 >= self.per_minute {
            return false;
        }
        window.1 += 1;
        true
    }
}
