use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use courier_market::api::rest::router;
use courier_market::state::AppState;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use tower::ServiceExt;

fn setup() -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(1024));
    (router(state.clone()), state)
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

fn decimal(value: &Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}

async fn create_customer(app: &axum::Router, name: &str) -> String {
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/users",
            json!({ "name": name, "role": "Customer" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    body_json(res).await["id"].as_str().unwrap().to_string()
}

async fn create_courier(app: &axum::Router, name: &str, fee_per_km: f64, waiting_rate: f64) -> String {
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/users",
            json!({
                "name": name,
                "role": "Courier",
                "fee_per_km": fee_per_km,
                "waiting_rate": waiting_rate,
                "rating": 4.5,
                "location": { "lat": 52.520, "lng": 13.405 },
                "available_budget": 500
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    body_json(res).await["id"].as_str().unwrap().to_string()
}

async fn create_order(app: &axum::Router, customer_id: &str, extra: Value) -> Value {
    let mut body = json!({
        "customer_id": customer_id,
        "pickup": { "lat": 52.520, "lng": 13.405, "address": "Alexanderplatz 1", "phone": "555-0101" },
        "dropoff": { "lat": 52.530, "lng": 13.415, "address": "Bernauer Str. 2", "phone": "555-0102" },
        "payment_mode": "Cash"
    });
    for (key, value) in extra.as_object().unwrap() {
        body[key] = value.clone();
    }
    let res = app
        .clone()
        .oneshot(json_request("POST", "/orders", body))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    body_json(res).await
}

async fn deposit(app: &axum::Router, user_id: &str, amount: f64) {
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/users/{user_id}/deposit"),
            json!({ "amount": amount }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["users"], 0);
    assert_eq!(body["orders"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    assert!(body.contains("open_orders"));
    assert!(body.contains("platform_revenue"));
}

#[tokio::test]
async fn create_user_empty_name_returns_400() {
    let (app, _state) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/users",
            json!({ "name": "  ", "role": "Courier" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "bad_request");
}

#[tokio::test]
async fn deposit_shows_up_in_wallet_view() {
    let (app, _state) = setup();
    let customer = create_customer(&app, "Carla").await;
    deposit(&app, &customer, 100.0).await;

    let res = app
        .oneshot(get_request(&format!("/users/{customer}/wallet")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let wallet = body_json(res).await;
    assert_eq!(decimal(&wallet["balance"]), dec!(100));
    assert_eq!(decimal(&wallet["reserved"]), dec!(0));
    assert_eq!(decimal(&wallet["available"]), dec!(100));
    assert_eq!(wallet["history"].as_array().unwrap().len(), 1);
    assert_eq!(wallet["history"][0]["kind"], "deposit");
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
    let body = body_json(response).await;
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn create_order_starts_open() {
    let (app, _state) = setup();
    let customer = create_customer(&app, "Olga").await;
    let order = create_order(&app, &customer, json!({})).await;

    assert_eq!(order["status"], "Open");
    assert_eq!(order["bid_expired"], false);
    assert!(order["accepted_couriers"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn order_from_courier_account_is_rejected() {
    let (app, _state) = setup();
    let courier = create_courier(&app, "Kim", 2.0, 1.0).await;

    let res = app
        .oneshot(json_request(
            "POST",
            "/orders",
            json!({
                "customer_id": courier,
                "pickup": { "lat": 52.52, "lng": 13.40, "address": "a", "phone": "p" },
                "dropoff": { "lat": 52.53, "lng": 13.41, "address": "b", "phone": "p" },
                "payment_mode": "Cash"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_bid_is_rejected() {
    let (app, _state) = setup();
    let customer = create_customer(&app, "Omar").await;
    let courier = create_courier(&app, "Dana", 2.0, 1.0).await;
    let order = create_order(&app, &customer, json!({})).await;
    let order_id = order["id"].as_str().unwrap();

    let bid = json!({ "courier_id": courier, "bid_amount": 15 });
    let first = app
        .clone()
        .oneshot(json_request("POST", &format!("/orders/{order_id}/bids"), bid.clone()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .clone()
        .oneshot(json_request("POST", &format!("/orders/{order_id}/bids"), bid))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let res = app
        .oneshot(get_request(&format!("/orders/{order_id}")))
        .await
        .unwrap();
    let stored = body_json(res).await;
    assert_eq!(stored["offers"].as_object().unwrap().len(), 1);
}

#[tokio::test]
async fn wallet_bid_exceeding_available_funds_is_rejected_without_state_change() {
    let (app, _state) = setup();
    let customer = create_customer(&app, "Pia").await;
    deposit(&app, &customer, 100.0).await;
    let courier = create_courier(&app, "Lev", 5.0, 2.0).await;

    // Upfront budget alone pushes the estimate past the 100 on deposit once
    // the commission and waiting margin are added.
    let order = create_order(
        &app,
        &customer,
        json!({ "payment_mode": "Wallet", "needed_budget": 100 }),
    )
    .await;
    let order_id = order["id"].as_str().unwrap();

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/bids"),
            json!({ "courier_id": courier, "bid_amount": 110 }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::PAYMENT_REQUIRED);
    let body = body_json(res).await;
    assert_eq!(body["kind"], "insufficient_funds");
    assert!(decimal(&body["shortfall"]) > dec!(0));

    let res = app
        .oneshot(get_request(&format!("/orders/{order_id}")))
        .await
        .unwrap();
    let stored = body_json(res).await;
    assert!(stored["offers"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn acceptance_reaches_quorum_and_designates_primary() {
    let (app, _state) = setup();
    let customer = create_customer(&app, "Maya").await;
    let courier = create_courier(&app, "Ned", 2.0, 1.0).await;
    let order = create_order(&app, &customer, json!({})).await;
    let order_id = order["id"].as_str().unwrap();

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/bids"),
            json!({ "courier_id": courier, "bid_amount": 20 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/accept/{courier}"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let assignment = body_json(res).await;
    assert_eq!(assignment["is_primary"], true);
    assert_eq!(assignment["pickup_pin"].as_str().unwrap().len(), 4);

    // Accepting again is idempotent: same assignment, no error.
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/accept/{courier}"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let again = body_json(res).await;
    assert_eq!(again["pickup_pin"], assignment["pickup_pin"]);

    let res = app
        .oneshot(get_request(&format!("/orders/{order_id}")))
        .await
        .unwrap();
    let stored = body_json(res).await;
    assert_eq!(stored["status"], "InProgress");
    assert_eq!(stored["bid_expired"], true);
    assert_eq!(stored["accepted_couriers"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn bids_on_closed_orders_are_rejected() {
    let (app, _state) = setup();
    let customer = create_customer(&app, "Tess").await;
    let first = create_courier(&app, "Uri", 2.0, 1.0).await;
    let second = create_courier(&app, "Val", 2.0, 1.0).await;
    let order = create_order(&app, &customer, json!({})).await;
    let order_id = order["id"].as_str().unwrap();

    app.clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/bids"),
            json!({ "courier_id": first, "bid_amount": 20 }),
        ))
        .await
        .unwrap();
    app.clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/accept/{first}"),
            json!({}),
        ))
        .await
        .unwrap();

    let res = app
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/bids"),
            json!({ "courier_id": second, "bid_amount": 18 }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn cancel_only_works_while_open() {
    let (app, _state) = setup();
    let customer = create_customer(&app, "Rita").await;
    let order = create_order(&app, &customer, json!({})).await;
    let order_id = order["id"].as_str().unwrap();

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/cancel"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["status"], "Cancelled");

    let res = app
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/cancel"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn open_orders_filters_by_reach_and_budget() {
    let (app, _state) = setup();
    let customer = create_customer(&app, "Noor").await;

    // Courier sits in Berlin with a 10 km reach and a 500 budget.
    let courier = create_courier(&app, "Ben", 2.0, 1.0).await;

    let nearby = create_order(&app, &customer, json!({})).await;
    let far_away = create_order(
        &app,
        &customer,
        json!({
            "pickup": { "lat": 48.8566, "lng": 2.3522, "address": "Paris", "phone": "p" }
        }),
    )
    .await;
    let too_expensive = create_order(&app, &customer, json!({ "needed_budget": 900 })).await;

    let res = app
        .oneshot(get_request(&format!("/orders/open?courier_id={courier}")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let orders = body_json(res).await;
    let ids: Vec<&str> = orders
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&nearby["id"].as_str().unwrap()));
    assert!(!ids.contains(&far_away["id"].as_str().unwrap()));
    assert!(!ids.contains(&too_expensive["id"].as_str().unwrap()));
}

#[tokio::test]
async fn location_update_is_debounced() {
    let (app, _state) = setup();
    let courier = create_courier(&app, "Gus", 2.0, 1.0).await;

    // A few meters within the debounce window: dropped.
    let res = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/users/{courier}/location"),
            json!({ "location": { "lat": 52.52001, "lng": 13.40501 } }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["current_location"]["lat"], 52.520);

    // A real move: accepted.
    let res = app
        .oneshot(json_request(
            "PATCH",
            &format!("/users/{courier}/location"),
            json!({ "location": { "lat": 52.60, "lng": 13.50 } }),
        ))
        .await
        .unwrap();
    let body = body_json(res).await;
    assert_eq!(body["current_location"]["lat"], 52.60);
}

#[tokio::test]
async fn pickup_confirm_twice_returns_conflict() {
    let (app, _state) = setup();
    let customer = create_customer(&app, "Ada").await;
    let courier = create_courier(&app, "Hal", 2.0, 1.0).await;
    let order = create_order(&app, &customer, json!({})).await;
    let order_id = order["id"].as_str().unwrap();

    app.clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/bids"),
            json!({ "courier_id": courier, "bid_amount": 20 }),
        ))
        .await
        .unwrap();
    app.clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/accept/{courier}"),
            json!({}),
        ))
        .await
        .unwrap();

    let confirm = json!({ "courier_id": courier, "image": "img-1", "receipt": "rcpt-1" });
    let first = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/pickup/confirm"),
            confirm.clone(),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let charge = body_json(first).await;
    assert_eq!(charge["waiting_time_ms"], 0);

    let second = app
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/pickup/confirm"),
            confirm,
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn finalize_before_confirmations_is_rejected() {
    let (app, _state) = setup();
    let customer = create_customer(&app, "Ivy").await;
    let courier = create_courier(&app, "Jon", 2.0, 1.0).await;
    let order = create_order(&app, &customer, json!({})).await;
    let order_id = order["id"].as_str().unwrap();

    app.clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/bids"),
            json!({ "courier_id": courier, "bid_amount": 20 }),
        ))
        .await
        .unwrap();
    app.clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/accept/{courier}"),
            json!({}),
        ))
        .await
        .unwrap();

    let res = app
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order_id}/finalize/{courier}"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}
