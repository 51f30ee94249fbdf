use std::sync::Arc;
use std::time::Instant;

use rand::Rng;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{NewOrder, Order};
use crate::models::rider::Rider;
use crate::observability::metrics::Metrics;
use crate::store::{OrderRepository, RiderFilter, RiderRepository};

#[derive(Debug, Clone)]
pub struct Selection {
    pub rider: Option<Rider>,
    pub pool_size: usize,
}

/// Picks a rider for a new order from the riders currently marked available.
///
/// Selection does not reserve the rider: concurrent checkouts may pick the
/// same one.
#[derive(Clone)]
pub struct AssignmentSelector {
    riders: Arc<dyn RiderRepository>,
}

impl AssignmentSelector {
    pub fn new(riders: Arc<dyn RiderRepository>) -> Self {
        Self { riders }
    }

    pub async fn select(&self) -> Result<Selection, AppError> {
        let pool = self.riders.find(RiderFilter::available()).await?;
        let rider = pick_uniform(&pool, &mut rand::rng()).cloned();

        Ok(Selection {
            rider,
            pool_size: pool.len(),
        })
    }

    pub async fn current(&self, id: Uuid) -> Result<Option<Rider>, AppError> {
        self.riders.get_by_id(id).await
    }
}

/// Each rider in `pool` is returned with probability `1 / pool.len()`.
pub fn pick_uniform<'a, R>(pool: &'a [Rider], rng: &mut R) -> Option<&'a Rider>
where
    R: Rng + ?Sized,
{
    if pool.is_empty() {
        return None;
    }

    pool.get(rng.random_range(0..pool.len()))
}

/// Order creation with rider assignment as a precondition of the write.
#[derive(Clone)]
pub struct OrderService {
    selector: AssignmentSelector,
    orders: Arc<dyn OrderRepository>,
    metrics: Metrics,
}

impl OrderService {
    pub fn new(
        selector: AssignmentSelector,
        orders: Arc<dyn OrderRepository>,
        metrics: Metrics,
    ) -> Self {
        Self {
            selector,
            orders,
            metrics,
        }
    }

    pub async fn create(&self, new_order: NewOrder) -> Result<Order, AppError> {
        let start = Instant::now();
        let result = self.assign_and_persist(new_order).await;

        let outcome = match &result {
            Ok(order) if order.rider.is_some() => "assigned",
            Ok(_) => "unassigned",
            Err(err) => {
                error!(error = %err, "order creation failed");
                "error"
            }
        };
        self.metrics
            .assignment_latency_seconds
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());
        self.metrics
            .assignments_total
            .with_label_values(&[outcome])
            .inc();

        result
    }

    async fn assign_and_persist(&self, new_order: NewOrder) -> Result<Order, AppError> {
        let mut order = Order::from_checkout(new_order);

        let selection = self.selector.select().await?;
        self.metrics
            .available_riders
            .set(i64::try_from(selection.pool_size).unwrap_or(i64::MAX));

        match &selection.rider {
            Some(rider) => info!(
                order_id = %order.id,
                rider_id = %rider.id,
                rider_name = %rider.name,
                pool_size = selection.pool_size,
                "rider assigned to order"
            ),
            None => info!(order_id = %order.id, "no available rider; order left unassigned"),
        }
        order.rider = selection.rider;

        let mut order = self.orders.create(order).await?;
        if let Some(snapshot) = order.rider.as_mut() {
            self.reconcile_snapshot(order.id, snapshot).await;
        }
        Ok(order)
    }

    /// A rider address written between the pool read and the order write is
    /// published before the order exists, so the propagator cannot repair it.
    /// Re-read the rider until the stored snapshot matches. Failures only log:
    /// the order is already persisted.
    async fn reconcile_snapshot(&self, order_id: Uuid, snapshot: &mut Rider) {
        for _ in 0..MAX_RECONCILE_ROUNDS {
            let current = match self.selector.current(snapshot.id).await {
                Ok(Some(current)) => current,
                Ok(None) => return,
                Err(err) => {
                    warn!(
                        order_id = %order_id,
                        rider_id = %snapshot.id,
                        error = %err,
                        "failed to re-read assigned rider"
                    );
                    return;
                }
            };

            if current.address == snapshot.address {
                return;
            }

            if let Err(err) = self
                .orders
                .update_rider_address(snapshot.id, &current.address)
                .await
            {
                warn!(
                    order_id = %order_id,
                    rider_id = %snapshot.id,
                    error = %err,
                    "failed to refresh rider address on new order"
                );
                return;
            }

            info!(
                order_id = %order_id,
                rider_id = %snapshot.id,
                address = %current.address,
                "rider moved during assignment; snapshot refreshed"
            );
            snapshot.address = current.address;
        }

        warn!(
            order_id = %order_id,
            rider_id = %snapshot.id,
            "rider address kept changing during assignment; leaving it to the propagator"
        );
    }
}

const MAX_RECONCILE_ROUNDS: usize = 3;
