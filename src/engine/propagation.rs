//! Keeps the rider snapshot embedded in orders in step with the rider record.
//!
//! The propagator consumes the rider change feed and rewrites
//! `order.rider.address` for every order embedding the changed rider. Updates
//! are set-style, so replaying an event after a restart converges to the same
//! state. Each handled event is checkpointed; a restart resumes after the last
//! checkpoint.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::RiderDeletePolicy;
use crate::error::AppError;
use crate::models::change::{ChangeEvent, OperationType, ResumeToken};
use crate::models::rider::Rider;
use crate::observability::metrics::Metrics;
use crate::store::checkpoint::CheckpointStore;
use crate::store::{ChangeFeed, OrderRepository, UpdateOutcome};

pub const DEFAULT_RESUBSCRIBE_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Inserts and unrecognised operations never touch orders.
    NotAnUpdate,
    /// Update or replace without a usable post-change document.
    Malformed,
    /// Rider deleted while the delete policy keeps snapshots.
    RiderDeleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationOutcome {
    Applied(UpdateOutcome),
    Skipped(SkipReason),
    Failed,
}

impl PropagationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PropagationOutcome::Applied(_) => "applied",
            PropagationOutcome::Skipped(_) => "skipped",
            PropagationOutcome::Failed => "failed",
        }
    }
}

pub struct Propagator {
    feed: Arc<dyn ChangeFeed>,
    orders: Arc<dyn OrderRepository>,
    checkpoints: Arc<dyn CheckpointStore>,
    delete_policy: RiderDeletePolicy,
    resubscribe_delay: Duration,
    metrics: Metrics,
}

impl Propagator {
    pub fn new(
        feed: Arc<dyn ChangeFeed>,
        orders: Arc<dyn OrderRepository>,
        checkpoints: Arc<dyn CheckpointStore>,
        metrics: Metrics,
    ) -> Self {
        Self {
            feed,
            orders,
            checkpoints,
            delete_policy: RiderDeletePolicy::default(),
            resubscribe_delay: DEFAULT_RESUBSCRIBE_DELAY,
            metrics,
        }
    }

    pub fn with_delete_policy(mut self, delete_policy: RiderDeletePolicy) -> Self {
        self.delete_policy = delete_policy;
        self
    }

    pub fn with_resubscribe_delay(mut self, resubscribe_delay: Duration) -> Self {
        self.resubscribe_delay = resubscribe_delay;
        self
    }

    /// Starts the subscription loop on the runtime.
    pub fn spawn(self) -> PropagatorHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(shutdown_rx));

        PropagatorHandle { shutdown_tx, task }
    }

    async fn run(self, mut shutdown_rx: oneshot::Receiver<()>) {
        let mut resume_after = match self.checkpoints.load().await {
            Ok(token) => token,
            Err(err) => {
                error!(error = %err, "failed to load checkpoint; replaying retained history");
                None
            }
        };
        info!(resume_after = ?resume_after.map(|t| t.0), "consistency propagator started");

        'subscription: loop {
            match self.feed.subscribe(resume_after) {
                Ok(mut stream) => loop {
                    // The in-flight event always completes; shutdown is only
                    // observed while waiting for the next one.
                    let next = tokio::select! {
                        _ = &mut shutdown_rx => break 'subscription,
                        next = stream.next() => next,
                    };

                    match next {
                        Some(Ok(event)) => {
                            self.handle_event(&event).await;
                            self.checkpoint(event.token).await;
                            resume_after = Some(event.token);
                        }
                        Some(Err(err)) => {
                            warn!(error = %err, "rider change feed interrupted; resubscribing");
                            break;
                        }
                        None => {
                            warn!("rider change feed closed; resubscribing");
                            break;
                        }
                    }
                },
                Err(err) => error!(error = %err, "failed to subscribe to rider change feed"),
            }

            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = sleep(self.resubscribe_delay) => {}
            }
        }

        info!(resume_after = ?resume_after.map(|t| t.0), "consistency propagator stopped");
    }

    /// Runs one change event through the filter and the bulk update. Failures
    /// are logged and the event is dropped.
    pub async fn handle_event(&self, event: &ChangeEvent) -> PropagationOutcome {
        let outcome = match event.operation_type {
            OperationType::Update | OperationType::Replace => {
                match Self::post_change_rider(event) {
                    Some(rider) => self.sync_address(rider).await,
                    None => {
                        warn!(
                            token = %event.token,
                            rider_id = %event.document_key,
                            operation = event.operation_type.as_str(),
                            "change event has no usable rider document; ignoring"
                        );
                        PropagationOutcome::Skipped(SkipReason::Malformed)
                    }
                }
            }
            OperationType::Delete => self.handle_delete(event.document_key).await,
            OperationType::Insert | OperationType::Unknown => {
                debug!(
                    token = %event.token,
                    operation = event.operation_type.as_str(),
                    "change event does not affect orders"
                );
                PropagationOutcome::Skipped(SkipReason::NotAnUpdate)
            }
        };

        self.metrics
            .propagation_events_total
            .with_label_values(&[outcome.label()])
            .inc();
        outcome
    }

    fn post_change_rider(event: &ChangeEvent) -> Option<&Rider> {
        event
            .full_document
            .as_ref()
            .filter(|rider| rider.id == event.document_key)
    }

    async fn sync_address(&self, rider: &Rider) -> PropagationOutcome {
        match self
            .orders
            .update_rider_address(rider.id, &rider.address)
            .await
        {
            Ok(result) => {
                self.metrics
                    .orders_resynced_total
                    .inc_by(result.modified as u64);

                if result.modified > 0 {
                    info!(
                        rider_id = %rider.id,
                        address = %rider.address,
                        matched = result.matched,
                        modified = result.modified,
                        "orders resynced with rider address"
                    );
                } else {
                    debug!(
                        rider_id = %rider.id,
                        matched = result.matched,
                        "no order needed a rider address update"
                    );
                }
                PropagationOutcome::Applied(result)
            }
            Err(err) => {
                error!(
                    rider_id = %rider.id,
                    error = %err,
                    "failed to propagate rider address; dropping event"
                );
                PropagationOutcome::Failed
            }
        }
    }

    async fn handle_delete(&self, rider_id: Uuid) -> PropagationOutcome {
        match self.delete_policy {
            RiderDeletePolicy::Keep => {
                debug!(rider_id = %rider_id, "rider deleted; orders keep their snapshot");
                PropagationOutcome::Skipped(SkipReason::RiderDeleted)
            }
            RiderDeletePolicy::Unassign => match self.orders.clear_rider(rider_id).await {
                Ok(result) => {
                    info!(
                        rider_id = %rider_id,
                        unassigned = result.modified,
                        "rider deleted; orders unassigned"
                    );
                    PropagationOutcome::Applied(result)
                }
                Err(err) => {
                    error!(
                        rider_id = %rider_id,
                        error = %err,
                        "failed to unassign deleted rider; dropping event"
                    );
                    PropagationOutcome::Failed
                }
            },
        }
    }

    async fn checkpoint(&self, token: ResumeToken) {
        match self.checkpoints.save(token).await {
            Ok(()) => self
                .metrics
                .propagation_checkpoint
                .set(i64::try_from(token.0).unwrap_or(i64::MAX)),
            Err(err) => error!(token = %token, error = %err, "failed to persist checkpoint"),
        }
    }
}

/// Owner of a running propagator. Dropping the handle also stops the
/// propagator once its current event is done.
pub struct PropagatorHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl PropagatorHandle {
    /// Signals shutdown and waits for the in-flight event to finish.
    pub async fn stop(self) -> Result<(), AppError> {
        let _ = self.shutdown_tx.send(());
        self.task
            .await
            .map_err(|err| AppError::Internal(format!("propagator task failed: {err}")))
    }
}
