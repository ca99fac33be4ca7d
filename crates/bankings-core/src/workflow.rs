use crate::error::ProvisioningError;
use crate::flow::TransitionOutcome;
use crate::notify::DownstreamNotifier;
use crate::number::{AccountNumberFactory, CurrencyCode};
use crate::registry::{AccountRegistry, Retain};
use crate::scheduler::FinalizationScheduler;
use crate::types::{AccountRecord, ProvisioningReceipt, ProvisioningRequest, ResultUpdate};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What happens to a record once the background task completes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetentionPolicy {
    /// Keep the record in `completed` so an inbound result can finalize it.
    #[default]
    RetainUntilResult,
    /// Drop the record right after completion; the final number is only
    /// logged and sent downstream.
    RemoveOnCompletion,
}

impl RetentionPolicy {
    pub fn label(self) -> &'static str {
        match self {
            Self::RetainUntilResult => "retain",
            Self::RemoveOnCompletion => "remove",
        }
    }
}

/// Workflow configuration.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub finalize_after: Duration,
    pub retention: RetentionPolicy,
    pub max_in_flight: usize,
    /// Upper bound on how long shutdown waits for running completions.
    pub shutdown_grace: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            finalize_after: Duration::from_secs(5),
            retention: RetentionPolicy::RetainUntilResult,
            max_in_flight: 1024,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// Completion step shared with background tasks.
#[derive(Clone)]
struct Finalizer {
    registry: Arc<AccountRegistry>,
    factory: AccountNumberFactory,
    notifier: Arc<dyn DownstreamNotifier>,
    retention: RetentionPolicy,
}

impl Finalizer {
    async fn complete(&self, id: &str) -> TransitionOutcome {
        let factory = self.factory;
        let retain = match self.retention {
            RetentionPolicy::RetainUntilResult => Retain::Keep,
            RetentionPolicy::RemoveOnCompletion => Retain::Evict,
        };

        let completed = self
            .registry
            .mutate_or_evict(id, |record| {
                if let Err(err) = record.status.mark_completed() {
                    return (Err((record.status.stage(), err)), Retain::Keep);
                }
                let provisional = record.account_number.clone();
                record.account_number = factory.regenerate(&record.currency, &provisional);
                record.updated_at = Utc::now();
                (Ok((provisional, record.clone())), retain)
            })
            .await;

        match completed {
            None => {
                warn!(id, "completion skipped: record not found");
                TransitionOutcome::IgnoredNotFound
            }
            Some(Err((stage, err))) => {
                warn!(id, stage = stage.name(), error = %err, "completion skipped");
                TransitionOutcome::IgnoredWrongState(stage)
            }
            Some(Ok((provisional, record))) => {
                info!(
                    id,
                    provisional = %provisional,
                    account_number = %record.account_number,
                    retention = self.retention.label(),
                    "account number finalized"
                );
                self.deliver(&record).await;
                TransitionOutcome::Applied
            }
        }
    }

    async fn deliver(&self, record: &AccountRecord) {
        let Some(payload) = record.downstream_payload() else {
            debug!(id = %record.id, "no application identifiers; skipping notification");
            return;
        };

        match self.notifier.notify(&payload).await {
            Ok(()) => info!(
                id = %record.id,
                application_id = payload.application_id,
                notifier = self.notifier.name(),
                "status sent"
            ),
            Err(err) => error!(
                id = %record.id,
                notifier = self.notifier.name(),
                error = %err,
                "downstream notification failed"
            ),
        }
    }
}

/// Account provisioning workflow.
///
/// A create request stores a `processing` record with a provisional number and
/// schedules completion. Completion regenerates the number, marks the record
/// `completed`, and notifies downstream. A result update is only accepted while
/// the record is `completed`.
pub struct ProvisioningWorkflow {
    registry: Arc<AccountRegistry>,
    factory: AccountNumberFactory,
    finalizer: Finalizer,
    scheduler: FinalizationScheduler,
    config: WorkflowConfig,
    sequence: AtomicU64,
}

impl ProvisioningWorkflow {
    pub fn new(config: WorkflowConfig, notifier: Arc<dyn DownstreamNotifier>) -> Self {
        let registry = Arc::new(AccountRegistry::new());
        let factory = AccountNumberFactory::new();
        let finalizer = Finalizer {
            registry: registry.clone(),
            factory,
            notifier,
            retention: config.retention,
        };

        Self {
            registry,
            factory,
            finalizer,
            scheduler: FinalizationScheduler::new(config.max_in_flight)
                .with_shutdown_grace(config.shutdown_grace),
            config,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    /// Validate, store a `processing` record, and schedule its completion.
    ///
    /// The returned number is provisional: completion replaces it.
    pub async fn provision(
        &self,
        request: ProvisioningRequest,
    ) -> Result<ProvisioningReceipt, ProvisioningError> {
        let currency = match request.currency.clone() {
            Some(input) => CurrencyCode::try_from(input),
            None => Err(ProvisioningError::InvalidCurrency(String::new())),
        }
        .map_err(|err| {
            warn!(error = %err, "rejecting provisioning request");
            err
        })?;

        let reservation = self.scheduler.reserve()?;

        let id = request
            .composite_id()
            .unwrap_or_else(|| self.next_token());
        let number = self.factory.generate(&currency);
        let deadline = Utc::now()
            + chrono::Duration::from_std(self.config.finalize_after)
                .unwrap_or_else(|_| chrono::Duration::zero());
        let record = AccountRecord::processing(id.clone(), &request, currency, number, deadline);
        let receipt = ProvisioningReceipt::from(&record);

        if self.registry.insert(record).await.is_some() {
            info!(id = %id, "overwrote existing record");
        }
        info!(
            id = %id,
            account_number = %receipt.account_number,
            caller_number = ?request.number,
            "provisional account number issued"
        );

        let finalizer = self.finalizer.clone();
        let task_id = id.clone();
        self.scheduler
            .schedule(reservation, id, self.config.finalize_after, async move {
                finalizer.complete(&task_id).await;
            })
            .await;

        Ok(receipt)
    }

    /// Run the completion step now. Background tasks call the same path.
    pub async fn complete(&self, id: &str) -> TransitionOutcome {
        self.finalizer.complete(id).await
    }

    /// Accept a terminal result for a `completed` record; anything else is a
    /// logged no-op.
    pub async fn apply_result(&self, update: ResultUpdate) -> TransitionOutcome {
        let ResultUpdate { id, result } = update;

        let outcome = self
            .registry
            .mutate(&id, |record| match record.status.mark_finalized(result) {
                Ok(()) => {
                    record.updated_at = Utc::now();
                    TransitionOutcome::Applied
                }
                Err(_) => TransitionOutcome::IgnoredWrongState(record.status.stage()),
            })
            .await
            .unwrap_or(TransitionOutcome::IgnoredNotFound);

        match outcome {
            TransitionOutcome::Applied => info!(id = %id, "result recorded"),
            TransitionOutcome::IgnoredWrongState(stage) => {
                warn!(id = %id, stage = stage.name(), "result update ignored: record not completed")
            }
            TransitionOutcome::IgnoredNotFound => {
                warn!(id = %id, "result update ignored: record not found")
            }
        }

        outcome
    }

    pub async fn record(&self, id: &str) -> Option<AccountRecord> {
        self.registry.get(id).await
    }

    /// Cancel a pending completion. The record stays in `processing`.
    pub async fn cancel(&self, id: &str) -> bool {
        let cancelled = self.scheduler.cancel(id).await;
        if cancelled {
            info!(id, "finalization cancelled");
        }
        cancelled
    }

    pub fn in_flight(&self) -> usize {
        self.scheduler.in_flight()
    }

    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }

    fn next_token(&self) -> String {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{:x}{:04x}", nanos, sequence & 0xffff)
    }
}
