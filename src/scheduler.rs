//! Periodic background tick (spec §4.11): closes timed-out batches, kicks
//! off execution for batches sitting `ready`, expires stale deposit
//! windows, and reaps resolved orphan deposits. One worker, fixed cadence,
//! the same shape as this corpus's batch-queue timeout loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::chain::{ChainSender, ChainWatcher};
use crate::config::RelayConfig;
use crate::lifecycle::BatchLifecycle;
use crate::persistence;
use crate::proof::ProofGenerator;
use crate::types::BatchStatus;
use crate::venue::VenueExecutor;

/// Upper bound on batches executing concurrently; execution does real I/O
/// (venue, prover, chain sends) so an unbounded fan-out per tick would let
/// one slow tick pile onto the next.
const MAX_CONCURRENT_EXECUTIONS: usize = 8;

fn now_epoch() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

pub struct Scheduler<V, P, C> {
    lifecycle: Arc<BatchLifecycle<V, P, C>>,
    config: RelayConfig,
    execution_permits: Arc<Semaphore>,
    snapshot_path: String,
    last_snapshot_at: AtomicU64,
}

impl<V, P, C> Scheduler<V, P, C>
where
    V: VenueExecutor,
    P: ProofGenerator,
    C: ChainWatcher + ChainSender,
{
    pub fn new(lifecycle: Arc<BatchLifecycle<V, P, C>>, config: RelayConfig, snapshot_path: impl Into<String>) -> Self {
        Self {
            lifecycle,
            config,
            execution_permits: Arc::new(Semaphore::new(MAX_CONCURRENT_EXECUTIONS)),
            snapshot_path: snapshot_path.into(),
            last_snapshot_at: AtomicU64::new(0),
        }
    }

    pub async fn tick(&self) {
        let now = now_epoch();

        for batch in self.lifecycle.store().open_batches() {
            let age = now.saturating_sub(batch.created_at);
            if age >= self.config.batch_timeout_secs && batch.order_ids.len() >= self.config.min_batch_size {
                if let Err(e) = self.lifecycle.close_batch(batch.id) {
                    warn!(batch_id = %batch.id, error = %e, "scheduled close failed");
                } else {
                    info!(batch_id = %batch.id, age, "batch closed on timeout");
                }
            }
        }

        for batch in self.lifecycle.store().ready_batches() {
            self.spawn_execution(batch.id);
        }

        let expired = self.lifecycle.store().expire_stale_pending_deposits(now);
        if expired > 0 {
            info!(expired, "pending-deposit orders expired");
        }

        let reaped = self.lifecycle.store().reap_unmatched(self.config.unmatched_retention_secs);
        if reaped > 0 {
            info!(reaped, "resolved unmatched deposits reaped");
        }

        self.maybe_snapshot(now);
    }

    /// Writes a snapshot if at least `config.snapshot_interval_secs` have
    /// passed since the last one, so an unclean exit (OOM-kill, `kill -9`)
    /// loses at most one interval's worth of state rather than everything
    /// since the last graceful shutdown.
    fn maybe_snapshot(&self, now: u64) {
        let last = self.last_snapshot_at.load(Ordering::Relaxed);
        if now.saturating_sub(last) < self.config.snapshot_interval_secs {
            return;
        }
        match persistence::save(self.lifecycle.store(), &self.snapshot_path) {
            Ok(()) => self.last_snapshot_at.store(now, Ordering::Relaxed),
            Err(e) => warn!(path = %self.snapshot_path, error = %e, "periodic snapshot failed"),
        }
    }

    /// Matches the HTTP `/execute-ready` hook: run every `ready` batch now.
    pub async fn execute_all_ready(&self) -> usize {
        let ready = self.lifecycle.store().ready_batches();
        let n = ready.len();
        for batch in ready {
            self.spawn_execution(batch.id);
        }
        n
    }

    fn spawn_execution(&self, batch_id: crate::types::BatchId) {
        let lifecycle = Arc::clone(&self.lifecycle);
        let permits = Arc::clone(&self.execution_permits);
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            // Re-check status: another tick or an admin call may have raced
            // us between enqueue and permit acquisition.
            if lifecycle
                .store()
                .get_batch(batch_id)
                .map(|b| b.status != BatchStatus::Ready)
                .unwrap_or(true)
            {
                return;
            }
            if let Err(e) = lifecycle.execute(batch_id).await {
                warn!(%batch_id, error = %e, "scheduled execution failed");
            }
        });
    }

    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.scheduler_tick);
            loop {
                interval.tick().await;
                self.tick().await;
            }
        })
    }
}
