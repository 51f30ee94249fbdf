//! Repository and change-feed seams between the engine and persistence.

pub mod checkpoint;
pub mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::change::{ChangeEvent, ResumeToken};
use crate::models::order::Order;
use crate::models::rider::Rider;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiderFilter {
    pub is_available: Option<bool>,
}

impl RiderFilter {
    pub fn available() -> Self {
        Self {
            is_available: Some(true),
        }
    }

    pub fn matches(&self, rider: &Rider) -> bool {
        self.is_available
            .is_none_or(|wanted| rider.is_available == wanted)
    }
}

/// Result of a multi-document update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    /// Documents selected by the filter.
    pub matched: usize,
    /// Documents whose contents actually changed.
    pub modified: usize,
}

#[async_trait]
pub trait RiderRepository: Send + Sync {
    /// Riders matching `filter`, newest first.
    async fn find(&self, filter: RiderFilter) -> Result<Vec<Rider>, AppError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Rider>, AppError>;
    async fn save(&self, rider: Rider) -> Result<Rider, AppError>;
    async fn delete(&self, id: Uuid) -> Result<Option<Rider>, AppError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create(&self, order: Order) -> Result<Order, AppError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Order>, AppError>;
    async fn find_by_rider(&self, rider_id: Uuid) -> Result<Vec<Order>, AppError>;

    /// Sets `rider.address` on every order embedding `rider_id`. Leaves every
    /// other field untouched.
    async fn update_rider_address(
        &self,
        rider_id: Uuid,
        address: &str,
    ) -> Result<UpdateOutcome, AppError>;

    /// Removes the embedded rider from every order embedding `rider_id`.
    async fn clear_rider(&self, rider_id: Uuid) -> Result<UpdateOutcome, AppError>;
}

pub type ChangeStream = BoxStream<'static, Result<ChangeEvent, AppError>>;

pub trait ChangeFeed: Send + Sync {
    /// Events committed after `resume_after`, then live events. `None` starts
    /// from the oldest retained event.
    fn subscribe(&self, resume_after: Option<ResumeToken>) -> Result<ChangeStream, AppError>;
}
