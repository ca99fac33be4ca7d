//! Bounded scheduler for delayed finalization tasks.
//!
//! A semaphore caps the number of tasks in flight. Callers reserve a permit
//! before creating any state, so a saturated scheduler turns into an early
//! rejection rather than unbounded task growth. Each task can be cancelled by
//! record id, and a shutdown signal cancels everything still waiting. Shutdown
//! waits for running jobs at most for the configured grace period.

use crate::error::ProvisioningError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Largest accepted limit. Bounded by the semaphore and by `acquire_many`.
pub const MAX_LIMIT: usize = if Semaphore::MAX_PERMITS < u32::MAX as usize {
    Semaphore::MAX_PERMITS
} else {
    u32::MAX as usize
};

pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug)]
struct LiveTask(Arc<AtomicUsize>);

impl Drop for LiveTask {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Held capacity for one task. Dropping it without scheduling frees the slot.
#[derive(Debug)]
pub struct Reservation {
    // Field order matters: the live count drops before the permit is released.
    _live: LiveTask,
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug)]
struct PendingTask {
    ticket: u64,
    cancel_tx: watch::Sender<bool>,
}

pub struct FinalizationScheduler {
    limit: usize,
    grace: Duration,
    permits: Arc<Semaphore>,
    live: Arc<AtomicUsize>,
    tasks: Arc<Mutex<HashMap<String, PendingTask>>>,
    next_ticket: AtomicU64,
    closed: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl FinalizationScheduler {
    pub fn new(limit: usize) -> Self {
        let requested = limit;
        let limit = limit.clamp(1, MAX_LIMIT);
        if limit != requested {
            tracing::warn!(requested, limit, "finalization limit clamped");
        }
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            limit,
            grace: DEFAULT_SHUTDOWN_GRACE,
            permits: Arc::new(Semaphore::new(limit)),
            live: Arc::new(AtomicUsize::new(0)),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_ticket: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Reservations still alive: waiting, running, or not yet scheduled.
    pub fn in_flight(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn reserve(&self) -> Result<Reservation, ProvisioningError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ProvisioningError::ShuttingDown);
        }

        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => {
                self.live.fetch_add(1, Ordering::AcqRel);
                Ok(Reservation {
                    _live: LiveTask(self.live.clone()),
                    _permit: permit,
                })
            }
            Err(TryAcquireError::NoPermits) => {
                Err(ProvisioningError::SchedulerSaturated { limit: self.limit })
            }
            Err(TryAcquireError::Closed) => Err(ProvisioningError::ShuttingDown),
        }
    }

    /// Run `job` after `delay` unless cancelled first.
    ///
    /// Scheduling under an id that already has a pending task supersedes it:
    /// the earlier task is cancelled and never runs.
    pub async fn schedule<F>(&self, reservation: Reservation, id: String, delay: Duration, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        {
            let mut tasks = self.tasks.lock().await;
            if let Some(previous) = tasks.insert(id.clone(), PendingTask { ticket, cancel_tx }) {
                tracing::debug!(id = %id, "superseding pending finalization");
                let _ = previous.cancel_tx.send(true);
            }
        }

        let tasks = self.tasks.clone();
        tokio::spawn(async move {
            let _reservation = reservation;

            let fire = if *shutdown_rx.borrow() {
                false
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => true,
                    _ = cancel_rx.changed() => false,
                    _ = shutdown_rx.changed() => false,
                }
            };

            {
                let mut tasks = tasks.lock().await;
                if tasks.get(&id).map(|task| task.ticket) == Some(ticket) {
                    tasks.remove(&id);
                }
            }

            if fire {
                job.await;
            } else {
                tracing::debug!(id = %id, "finalization cancelled");
            }
        });
    }

    /// Cancel the pending task for `id`. Returns false when nothing was waiting.
    pub async fn cancel(&self, id: &str) -> bool {
        match self.tasks.lock().await.remove(id) {
            Some(task) => {
                let _ = task.cancel_tx.send(true);
                true
            }
            None => false,
        }
    }

    pub async fn pending(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Stop accepting work, cancel waiting tasks, and wait up to the grace
    /// period for running ones. Jobs still running after that are left behind.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown_tx.send_replace(true);

        let limit = u32::try_from(self.limit).unwrap_or(u32::MAX);
        match tokio::time::timeout(self.grace, self.permits.acquire_many(limit)).await {
            Ok(Ok(permits)) => permits.forget(),
            Ok(Err(_)) => {}
            Err(_) => tracing::warn!(
                still_running = self.in_flight(),
                grace_ms = self.grace.as_millis() as u64,
                "shutdown grace elapsed with completions still running"
            ),
        }
        self.permits.close();
        tracing::info!("finalization scheduler stopped");
    }
}
