use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::rider::{ImageRef, Rider, WithdrawMethod};
use crate::state::AppState;
use crate::store::RiderFilter;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/riders", post(create_rider).get(list_riders))
        .route(
            "/riders/:id",
            get(get_rider).patch(update_rider).delete(delete_rider),
        )
        .route("/riders/:id/address", patch(update_rider_address))
        .route("/riders/:id/availability", patch(update_rider_availability))
        .route(
            "/riders/:id/withdraw-method",
            post(update_withdraw_method).delete(delete_withdraw_method),
        )
}

#[derive(Deserialize)]
pub struct CreateRiderRequest {
    pub name: String,
    pub email: String,
    pub address: String,
    pub phone_number: String,
    pub car_number: String,
    pub license_number: Option<String>,
    pub avatar: Option<ImageRef>,
    #[serde(default)]
    pub is_available: bool,
}

#[derive(Deserialize)]
pub struct UpdateRiderRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone_number: Option<String>,
    pub car_number: Option<String>,
    pub license_number: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateAddressRequest {
    pub address: String,
}

#[derive(Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub is_available: bool,
}

async fn create_rider(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRiderRequest>,
) -> Result<Json<Rider>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    if !payload.email.contains('@') {
        return Err(AppError::BadRequest("email is not valid".to_string()));
    }

    require_address(&payload.address)?;

    // Check-then-save: two concurrent creates with one email can both pass.
    // A unique index on the rider store is what closes that window.
    let existing = state.riders.find(RiderFilter::default()).await?;
    if existing
        .iter()
        .any(|rider| rider.email.eq_ignore_ascii_case(&payload.email))
    {
        return Err(AppError::BadRequest("rider already exists".to_string()));
    }

    let now = Utc::now();
    let rider = Rider {
        id: Uuid::new_v4(),
        name: payload.name,
        email: payload.email,
        address: payload.address,
        phone_number: payload.phone_number,
        car_number: payload.car_number,
        license_number: payload.license_number,
        is_available: payload.is_available,
        withdraw_method: None,
        avatar: payload.avatar,
        created_at: now,
        updated_at: now,
    };

    let rider = state.riders.save(rider).await?;
    Ok(Json(rider))
}

async fn list_riders(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Rider>>, AppError> {
    let riders = state.riders.find(RiderFilter::default()).await?;
    Ok(Json(riders))
}

async fn get_rider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Rider>, AppError> {
    let rider = state
        .riders
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("rider {} not found", id)))?;

    Ok(Json(rider))
}

async fn update_rider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRiderRequest>,
) -> Result<Json<Rider>, AppError> {
    if let Some(address) = &payload.address {
        require_address(address)?;
    }

    let rider = modify_rider(&state, id, |rider| {
        if let Some(name) = payload.name {
            rider.name = name;
        }
        if let Some(address) = payload.address {
            rider.address = address;
        }
        if let Some(phone_number) = payload.phone_number {
            rider.phone_number = phone_number;
        }
        if let Some(car_number) = payload.car_number {
            rider.car_number = car_number;
        }
        if payload.license_number.is_some() {
            rider.license_number = payload.license_number;
        }
    })
    .await?;

    Ok(Json(rider))
}

async fn update_rider_address(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAddressRequest>,
) -> Result<Json<Rider>, AppError> {
    require_address(&payload.address)?;

    let rider = modify_rider(&state, id, |rider| rider.address = payload.address).await?;
    Ok(Json(rider))
}

async fn update_rider_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAvailabilityRequest>,
) -> Result<Json<Rider>, AppError> {
    let rider = modify_rider(&state, id, |rider| rider.is_available = payload.is_available).await?;
    Ok(Json(rider))
}

async fn update_withdraw_method(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<WithdrawMethod>,
) -> Result<Json<Rider>, AppError> {
    let rider = modify_rider(&state, id, |rider| rider.withdraw_method = Some(payload)).await?;
    Ok(Json(rider))
}

async fn delete_withdraw_method(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Rider>, AppError> {
    let rider = modify_rider(&state, id, |rider| rider.withdraw_method = None).await?;
    Ok(Json(rider))
}

async fn delete_rider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Rider>, AppError> {
    let rider = state
        .riders
        .delete(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("rider {} not found", id)))?;

    Ok(Json(rider))
}

async fn modify_rider(
    state: &AppState,
    id: Uuid,
    apply: impl FnOnce(&mut Rider),
) -> Result<Rider, AppError> {
    let mut rider = state
        .riders
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("rider {} not found", id)))?;

    apply(&mut rider);
    state.riders.save(rider).await
}

fn require_address(address: &str) -> Result<(), AppError> {
    if address.trim().is_empty() {
        return Err(AppError::BadRequest("address cannot be empty".to_string()));
    }
    Ok(())
}
