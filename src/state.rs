use std::sync::Arc;

use crate::engine::assignment::{AssignmentSelector, OrderService};
use crate::observability::metrics::Metrics;
use crate::store::memory::{MemoryOrderStore, MemoryRiderStore};
use crate::store::{ChangeFeed, OrderRepository, RiderRepository};

pub struct AppState {
    pub riders: Arc<dyn RiderRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub rider_feed: Arc<dyn ChangeFeed>,
    pub order_service: OrderService,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        riders: Arc<dyn RiderRepository>,
        orders: Arc<dyn OrderRepository>,
        rider_feed: Arc<dyn ChangeFeed>,
    ) -> Self {
        let metrics = Metrics::new();
        let order_service = OrderService::new(
            AssignmentSelector::new(riders.clone()),
            orders.clone(),
            metrics.clone(),
        );

        Self {
            riders,
            orders,
            rider_feed,
            order_service,
            metrics,
        }
    }

    /// State over the in-process stores; the rider store also serves as the
    /// rider change feed.
    pub fn in_memory(change_feed_buffer_size: usize, change_history_size: usize) -> Self {
        let riders = Arc::new(MemoryRiderStore::new(
            change_feed_buffer_size,
            change_history_size,
        ));

        Self::new(riders.clone(), Arc::new(MemoryOrderStore::new()), riders)
    }
}
