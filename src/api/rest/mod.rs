pub mod orders;
pub mod riders;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::error::AppError;
use crate::state::AppState;
use crate::store::RiderFilter;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(riders::router())
        .merge(orders::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    riders: usize,
    available_riders: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    let riders = state.riders.find(RiderFilter::default()).await?;
    let available_riders = riders.iter().filter(|rider| rider.is_available).count();

    Ok(Json(HealthResponse {
        status: "ok",
        riders: riders.len(),
        available_riders,
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
