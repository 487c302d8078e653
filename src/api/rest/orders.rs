use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::{acceptance, bidding, fulfillment, settlement};
use crate::error::AppError;
use crate::geo;
use crate::ledger::CASH_BLOCK;
use crate::models::order::{
    Assignment, Bid, Order, OrderStatus, PaymentMode, Place, Receipt,
};
use crate::models::user::Role;
use crate::notify::MarketEvent;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/open", get(open_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/bids", post(place_bid))
        .route("/orders/:id/accept/:courier_id", post(accept_bid))
        .route("/orders/:id/pickup/arrive", post(pickup_arrive))
        .route("/orders/:id/pickup/confirm", post(pickup_confirm))
        .route("/orders/:id/dropoff/arrive", post(dropoff_arrive))
        .route("/orders/:id/dropoff/confirm", post(dropoff_confirm))
        .route("/orders/:id/finalize/:courier_id", post(finalize_order))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    pub pickup: Place,
    pub dropoff: Place,
    pub payment_mode: PaymentMode,
    #[serde(default)]
    pub needed_budget: Decimal,
    #[serde(default = "default_required_couriers")]
    pub required_couriers: u32,
    #[serde(default = "default_max_pickup_distance")]
    pub max_pickup_distance_m: f64,
}

fn default_required_couriers() -> u32 {
    1
}

fn default_max_pickup_distance() -> f64 {
    10_000.0
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    let customer = state
        .users
        .get(&payload.customer_id)
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", payload.customer_id)))?;
    if customer.role != Role::Customer {
        return Err(AppError::BadRequest(
            "orders can only be created by customers".to_string(),
        ));
    }
    if payload.required_couriers < 1 {
        return Err(AppError::BadRequest(
            "required_couriers must be at least 1".to_string(),
        ));
    }
    if payload.needed_budget < Decimal::ZERO {
        return Err(AppError::BadRequest(
            "needed_budget cannot be negative".to_string(),
        ));
    }

    let order = Order {
        id: Uuid::new_v4(),
        customer_id: payload.customer_id,
        pickup: payload.pickup,
        dropoff: payload.dropoff,
        payment_mode: payload.payment_mode,
        needed_budget: payload.needed_budget,
        required_couriers: payload.required_couriers,
        max_pickup_distance_m: payload.max_pickup_distance_m,
        status: OrderStatus::Open,
        accepted_couriers: Vec::new(),
        offers: HashMap::new(),
        couriers: HashMap::new(),
        dropoff_estimation: None,
        bid_expired: false,
        created_at: Utc::now(),
    };

    state.orders.insert(order.id, order.clone());
    state.metrics.open_orders.inc();
    Ok(Json(order))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;
    Ok(Json(order))
}

#[derive(Deserialize)]
pub struct OpenOrdersQuery {
    pub courier_id: Uuid,
}

/// Open orders a courier can actually take: pickup within the courier's
/// reach, upfront budget within the courier's means, and cash orders hidden
/// from couriers whose wallet has fallen below the CASH_BLOCK floor. A
/// linear scan, by design.
async fn open_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OpenOrdersQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    let courier = state
        .users
        .get(&query.courier_id)
        .ok_or_else(|| AppError::NotFound(format!("courier {} not found", query.courier_id)))?;
    let wallet_blocked = state.ledger.balance(courier.id) < CASH_BLOCK;

    let mut matches = Vec::new();
    for order in state.orders.snapshot() {
        if order.status != OrderStatus::Open {
            continue;
        }
        if order.needed_budget > courier.available_budget {
            continue;
        }
        if wallet_blocked && order.payment_mode == PaymentMode::Cash {
            continue;
        }

        let route = geo::estimate(
            state.estimator.as_ref(),
            courier.current_location.as_ref(),
            Some(&order.pickup.point()),
        )
        .await;
        let reach = order.max_pickup_distance_m.min(courier.max_pickup_distance_m);
        if route.distance_m > reach {
            continue;
        }

        matches.push(order);
    }

    Ok(Json(matches))
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state.orders.update(id, |order| {
        if order.status != OrderStatus::Open {
            return Err(AppError::InvalidState(
                "only open orders can be cancelled".to_string(),
            ));
        }
        order.status = OrderStatus::Cancelled;
        Ok(order.clone())
    })?;

    state.metrics.open_orders.dec();
    state.notifier.notify(MarketEvent::OrderCancelled { order_id: id });
    Ok(Json(order))
}

#[derive(Deserialize)]
pub struct PlaceBidRequest {
    pub courier_id: Uuid,
    pub bid_amount: Decimal,
    #[serde(default)]
    pub bid_message: String,
}

async fn place_bid(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PlaceBidRequest>,
) -> Result<Json<Bid>, AppError> {
    let bid = bidding::place_bid(
        &state,
        id,
        payload.courier_id,
        payload.bid_amount,
        payload.bid_message,
    )
    .await?;
    Ok(Json(bid))
}

async fn accept_bid(
    State(state): State<Arc<AppState>>,
    Path((id, courier_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Assignment>, AppError> {
    let assignment = acceptance::accept_bid(&state, id, courier_id).await?;
    Ok(Json(assignment))
}

#[derive(Deserialize)]
pub struct ArrivalRequest {
    pub courier_id: Uuid,
}

#[derive(Deserialize)]
pub struct ConfirmStopRequest {
    pub courier_id: Uuid,
    pub image: Option<String>,
    pub receipt: Option<String>,
    pub paid_amount: Option<Decimal>,
}

impl ConfirmStopRequest {
    fn into_engine_request(self) -> fulfillment::ConfirmRequest {
        fulfillment::ConfirmRequest {
            image: self.image,
            receipt: self.receipt,
            paid_amount: self.paid_amount,
        }
    }
}

async fn pickup_arrive(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ArrivalRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let arrival = fulfillment::record_arrival(
        &state,
        id,
        payload.courier_id,
        fulfillment::Stage::Pickup,
    )
    .await?;
    Ok(Json(serde_json::json!({ "arrival": arrival })))
}

async fn pickup_confirm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ConfirmStopRequest>,
) -> Result<Json<fulfillment::WaitingCharge>, AppError> {
    let courier_id = payload.courier_id;
    let charge = fulfillment::confirm(
        &state,
        id,
        courier_id,
        fulfillment::Stage::Pickup,
        payload.into_engine_request(),
    )
    .await?;
    Ok(Json(charge))
}

async fn dropoff_arrive(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ArrivalRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let arrival = fulfillment::record_arrival(
        &state,
        id,
        payload.courier_id,
        fulfillment::Stage::Dropoff,
    )
    .await?;
    Ok(Json(serde_json::json!({ "arrival": arrival })))
}

async fn dropoff_confirm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ConfirmStopRequest>,
) -> Result<Json<fulfillment::WaitingCharge>, AppError> {
    let courier_id = payload.courier_id;
    let charge = fulfillment::confirm(
        &state,
        id,
        courier_id,
        fulfillment::Stage::Dropoff,
        payload.into_engine_request(),
    )
    .await?;
    Ok(Json(charge))
}

async fn finalize_order(
    State(state): State<Arc<AppState>>,
    Path((id, courier_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Receipt>, AppError> {
    let receipt = settlement::finalize_order(&state, id, courier_id).await?;
    Ok(Json(receipt))
}
