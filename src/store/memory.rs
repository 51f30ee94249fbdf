//! In-process stores backed by `DashMap`.
//!
//! The rider store doubles as the rider change feed: every write is committed
//! and published while holding the feed lock, so events for one rider are
//! emitted in commit order. A bounded history lets subscribers resume from a
//! token without missing events.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::change::{ChangeEvent, OperationType, ResumeToken};
use crate::models::order::Order;
use crate::models::rider::Rider;
use crate::store::{
    ChangeFeed, ChangeStream, OrderRepository, RiderFilter, RiderRepository, UpdateOutcome,
};

struct FeedLog {
    next_token: u64,
    history: VecDeque<ChangeEvent>,
}

pub struct MemoryRiderStore {
    riders: DashMap<Uuid, Rider>,
    feed: Mutex<FeedLog>,
    events_tx: broadcast::Sender<ChangeEvent>,
    history_size: usize,
}

impl MemoryRiderStore {
    pub fn new(buffer_size: usize, history_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(buffer_size.max(1));

        Self {
            riders: DashMap::new(),
            feed: Mutex::new(FeedLog {
                next_token: 1,
                history: VecDeque::new(),
            }),
            events_tx,
            history_size,
        }
    }

    /// Token of the most recently published event.
    pub fn latest_token(&self) -> Result<Option<ResumeToken>, AppError> {
        let log = self.lock_feed()?;
        Ok(log.next_token.checked_sub(1).filter(|t| *t > 0).map(ResumeToken))
    }

    fn lock_feed(&self) -> Result<MutexGuard<'_, FeedLog>, AppError> {
        self.feed
            .lock()
            .map_err(|_| AppError::Internal("rider change feed lock poisoned".to_string()))
    }

    fn publish(
        &self,
        log: &mut FeedLog,
        operation_type: OperationType,
        document_key: Uuid,
        full_document: Option<Rider>,
    ) {
        let event = ChangeEvent {
            token: ResumeToken(log.next_token),
            operation_type,
            document_key,
            full_document,
            cluster_time: Utc::now(),
        };
        log.next_token += 1;

        log.history.push_back(event.clone());
        while log.history.len() > self.history_size {
            log.history.pop_front();
        }

        debug!(
            token = %event.token,
            operation = operation_type.as_str(),
            rider_id = %document_key,
            "rider change published"
        );
        let _ = self.events_tx.send(event);
    }
}

#[async_trait]
impl RiderRepository for MemoryRiderStore {
    async fn find(&self, filter: RiderFilter) -> Result<Vec<Rider>, AppError> {
        let mut riders: Vec<Rider> = self
            .riders
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        riders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(riders)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Rider>, AppError> {
        Ok(self.riders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, mut rider: Rider) -> Result<Rider, AppError> {
        let mut log = self.lock_feed()?;

        let operation = if self.riders.contains_key(&rider.id) {
            OperationType::Update
        } else {
            OperationType::Insert
        };
        rider.updated_at = Utc::now();

        self.riders.insert(rider.id, rider.clone());
        self.publish(&mut log, operation, rider.id, Some(rider.clone()));

        Ok(rider)
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Rider>, AppError> {
        let mut log = self.lock_feed()?;

        let removed = self.riders.remove(&id).map(|(_, rider)| rider);
        if removed.is_some() {
            self.publish(&mut log, OperationType::Delete, id, None);
        }

        Ok(removed)
    }
}

impl ChangeFeed for MemoryRiderStore {
    fn subscribe(&self, resume_after: Option<ResumeToken>) -> Result<ChangeStream, AppError> {
        let log = self.lock_feed()?;
        // Subscribing under the lock means the receiver sees exactly the events
        // published after the backlog snapshot below.
        let live_rx = self.events_tx.subscribe();

        let resume_after = match resume_after {
            Some(token) if token.0 >= log.next_token => {
                warn!(
                    resume_after = %token,
                    next_token = log.next_token,
                    "resume token is ahead of the feed; replaying retained history"
                );
                None
            }
            other => other,
        };

        if let (Some(after), Some(oldest)) = (resume_after, log.history.front()) {
            if after.0 + 1 < oldest.token.0 {
                warn!(
                    resume_after = %after,
                    oldest_retained = %oldest.token,
                    "resume token fell out of retained history; some events were missed"
                );
            }
        }

        let backlog: Vec<ChangeEvent> = log
            .history
            .iter()
            .filter(|event| resume_after.is_none_or(|after| event.token > after))
            .cloned()
            .collect();
        drop(log);

        let live = BroadcastStream::new(live_rx).map(|item| match item {
            Ok(event) => Ok(event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => Err(AppError::ChangeFeed(format!(
                "subscriber lagged behind by {skipped} events"
            ))),
        });

        let backlog = futures::stream::iter(backlog.into_iter().map(Ok::<ChangeEvent, AppError>));
        Ok(backlog.chain(live).boxed())
    }
}

#[derive(Default)]
pub struct MemoryOrderStore {
    orders: DashMap<Uuid, Order>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for MemoryOrderStore {
    async fn create(&self, order: Order) -> Result<Order, AppError> {
        if self.orders.contains_key(&order.id) {
            return Err(AppError::Storage(format!("order {} already exists", order.id)));
        }

        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Order>, AppError> {
        Ok(self.orders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_rider(&self, rider_id: Uuid) -> Result<Vec<Order>, AppError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.value().rider_id() == Some(rider_id))
            .map(|entry| entry.value().clone())
            .collect();

        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn update_rider_address(
        &self,
        rider_id: Uuid,
        address: &str,
    ) -> Result<UpdateOutcome, AppError> {
        let mut outcome = UpdateOutcome::default();

        for mut entry in self.orders.iter_mut() {
            let Some(rider) = entry.value_mut().rider.as_mut() else {
                continue;
            };
            if rider.id != rider_id {
                continue;
            }

            outcome.matched += 1;
            if rider.address != address {
                rider.address = address.to_string();
                outcome.modified += 1;
            }
        }

        Ok(outcome)
    }

    async fn clear_rider(&self, rider_id: Uuid) -> Result<UpdateOutcome, AppError> {
        let mut outcome = UpdateOutcome::default();

        for mut entry in self.orders.iter_mut() {
            let order = entry.value_mut();
            if order.rider_id() == Some(rider_id) {
                order.rider = None;
                outcome.matched += 1;
                outcome.modified += 1;
            }
        }

        Ok(outcome)
    }
}
