use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use rider_sync::api::rest::router;
use rider_sync::engine::propagation::{Propagator, PropagatorHandle};
use rider_sync::state::AppState;
use rider_sync::store::checkpoint::MemoryCheckpoint;
use serde_json::{json, Value};
use tower::ServiceExt;

fn setup() -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::in_memory(1024, 1024));
    (router(state.clone()), state)
}

fn spawn_propagator(state: &AppState) -> PropagatorHandle {
    Propagator::new(
        state.rider_feed.clone(),
        state.orders.clone(),
        Arc::new(MemoryCheckpoint::new()),
        state.metrics.clone(),
    )
    .with_resubscribe_delay(Duration::from_millis(10))
    .spawn()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn delete_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn rider_payload(name: &str, address: &str, is_available: bool) -> Value {
    json!({
        "name": name,
        "email": format!("{}@riders.test", name.to_lowercase()),
        "address": address,
        "phone_number": "+233200000000",
        "car_number": "GR-1234-24",
        "is_available": is_available
    })
}

fn order_payload() -> Value {
    json!({
        "cart": [
            { "product_id": "waakye-large", "name": "Waakye (large)", "quantity": 2, "unit_price": 35.0 }
        ],
        "shipping_address": {
            "address": "12 Ring Road",
            "city": "Accra",
            "country": "GH",
            "zip_code": null,
            "phone_number": null
        },
        "user": {
            "id": "00000000-0000-0000-0000-0000000000aa",
            "name": "Ama",
            "email": "ama@shop.test"
        },
        "total_price": 70.0
    })
}

async fn create_rider(app: &axum::Router, name: &str, address: &str, is_available: bool) -> Value {
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/riders",
            rider_payload(name, address, is_available),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    body_json(res).await
}

async fn create_order(app: &axum::Router) -> Value {
    let res = app
        .clone()
        .oneshot(json_request("POST", "/orders", order_payload()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    body_json(res).await
}

async fn wait_for_rider_address(app: &axum::Router, order_id: &str, address: &str) -> Value {
    let uri = format!("/orders/{order_id}");
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let order = body_json(app.clone().oneshot(get_request(&uri)).await.unwrap()).await;
            if order["rider"]["address"] == address {
                return order;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("order rider address did not converge")
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["riders"], 0);
    assert_eq!(body["available_riders"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("orders_resynced_total"));
    assert!(body.contains("available_riders"));
}

#[tokio::test]
async fn create_rider_returns_rider() {
    let (app, _state) = setup();
    let body = create_rider(&app, "Kofi", "Osu", true).await;

    assert_eq!(body["name"], "Kofi");
    assert_eq!(body["address"], "Osu");
    assert_eq!(body["is_available"], true);
    assert!(body["withdraw_method"].is_null());
    assert!(!body["id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn create_rider_empty_name_returns_400() {
    let (app, _state) = setup();
    let response = app
        .oneshot(json_request("POST", "/riders", rider_payload("  ", "Osu", true)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_rider_duplicate_email_returns_400() {
    let (app, _state) = setup();
    create_rider(&app, "Kofi", "Osu", true).await;

    let response = app
        .oneshot(json_request("POST", "/riders", rider_payload("Kofi", "Labone", false)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "rider already exists");
}

#[tokio::test]
async fn list_riders_initially_empty() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/riders")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn update_rider_availability() {
    let (app, _state) = setup();
    let rider = create_rider(&app, "Esi", "Osu", false).await;
    let id = rider["id"].as_str().unwrap();

    let res = app
        .oneshot(json_request(
            "PATCH",
            &format!("/riders/{id}/availability"),
            json!({ "is_available": true }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["is_available"], true);
}

#[tokio::test]
async fn update_unknown_rider_returns_404() {
    let (app, _state) = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";

    let res = app
        .oneshot(json_request(
            "PATCH",
            &format!("/riders/{fake_id}/address"),
            json!({ "address": "Airport" }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn withdraw_method_can_be_set_and_removed() {
    let (app, _state) = setup();
    let rider = create_rider(&app, "Yaw", "Osu", true).await;
    let uri = format!("/riders/{}/withdraw-method", rider["id"].as_str().unwrap());

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &uri,
            json!({
                "bank_name": "GCB",
                "account_holder": "Yaw Boateng",
                "account_number": "0011223344"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["withdraw_method"]["bank_name"], "GCB");

    let res = app.oneshot(delete_request(&uri)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(body_json(res).await["withdraw_method"].is_null());
}

#[tokio::test]
async fn get_nonexistent_order_returns_404() {
    let (app, _state) = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(get_request(&format!("/orders/{fake_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_order_with_empty_cart_returns_400() {
    let (app, _state) = setup();
    let mut payload = order_payload();
    payload["cart"] = json!([]);

    let response = app
        .oneshot(json_request("POST", "/orders", payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_order_without_available_riders_is_unassigned() {
    let (app, _state) = setup();
    create_rider(&app, "Esi", "Osu", false).await;

    let order = create_order(&app).await;

    assert_eq!(order["status"], "Processing");
    assert!(order["rider"].is_null());
}

#[tokio::test]
async fn order_embeds_one_of_the_available_riders() {
    let (app, _state) = setup();
    let kofi = create_rider(&app, "Kofi", "Osu", true).await;
    let ama = create_rider(&app, "Ama", "Labone", true).await;
    let esi = create_rider(&app, "Esi", "Madina", false).await;

    for _ in 0..20 {
        let order = create_order(&app).await;
        let rider_id = &order["rider"]["id"];

        assert!(*rider_id == kofi["id"] || *rider_id == ama["id"]);
        assert_ne!(*rider_id, esi["id"]);
    }
}

#[tokio::test]
async fn list_orders_requires_rider_id() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/orders")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rider_address_change_propagates_to_orders() {
    let (app, state) = setup();
    let propagator = spawn_propagator(&state);

    let rider = create_rider(&app, "Kofi", "A", true).await;
    let rider_id = rider["id"].as_str().unwrap().to_string();
    let first = create_order(&app).await;
    let second = create_order(&app).await;
    assert_eq!(first["rider"]["address"], "A");
    assert_eq!(second["rider"]["address"], "A");

    let res = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/riders/{rider_id}/address"),
            json!({ "address": "B" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    for order in [&first, &second] {
        let synced = wait_for_rider_address(&app, order["id"].as_str().unwrap(), "B").await;
        assert_eq!(synced["cart"], order["cart"]);
        assert_eq!(synced["total_price"], order["total_price"]);
        assert_eq!(synced["status"], order["status"]);
        assert_eq!(synced["rider"]["name"], order["rider"]["name"]);
    }

    let third = create_order(&app).await;
    assert_eq!(third["rider"]["address"], "B");

    let res = app
        .clone()
        .oneshot(get_request(&format!("/orders?rider_id={rider_id}")))
        .await
        .unwrap();
    let listed = body_json(res).await;
    assert_eq!(listed.as_array().unwrap().len(), 3);

    propagator.stop().await.unwrap();
}

#[tokio::test]
async fn deleted_rider_leaves_snapshot_in_place() {
    let (app, state) = setup();
    let propagator = spawn_propagator(&state);

    let rider = create_rider(&app, "Kofi", "A", true).await;
    let rider_id = rider["id"].as_str().unwrap().to_string();
    let order = create_order(&app).await;

    let res = app
        .clone()
        .oneshot(delete_request(&format!("/riders/{rider_id}")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(get_request(&format!("/riders/{rider_id}")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    propagator.stop().await.unwrap();

    let res = app
        .oneshot(get_request(&format!(
            "/orders/{}",
            order["id"].as_str().unwrap()
        )))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["rider"]["id"], rider_id);
    assert_eq!(body["rider"]["address"], "A");
}
