use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{NewOrder, Order};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order))
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub rider_id: Option<Uuid>,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewOrder>,
) -> Result<Json<Order>, AppError> {
    if payload.cart.is_empty() {
        return Err(AppError::BadRequest("cart cannot be empty".to_string()));
    }

    if !payload.total_price.is_finite() || payload.total_price < 0.0 {
        return Err(AppError::BadRequest(
            "total_price must be a non-negative number".to_string(),
        ));
    }

    let order = state.order_service.create(payload).await?;
    Ok(Json(order))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {} not found", id)))?;

    Ok(Json(order))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    let rider_id = query
        .rider_id
        .ok_or_else(|| AppError::BadRequest("rider_id query parameter is required".to_string()))?;

    let orders = state.orders.find_by_rider(rider_id).await?;
    Ok(Json(orders))
}
