use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::bidding;
use crate::error::AppError;
use crate::geo::haversine_m;
use crate::models::user::{GeoPoint, Role, User};
use crate::models::wallet::WalletTransaction;
use crate::state::AppState;

/// Location updates closer than this within the debounce window are dropped.
const LOCATION_MIN_DELTA_M: f64 = 50.0;
const LOCATION_MIN_INTERVAL_S: i64 = 60;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/:id", get(get_user))
        .route("/users/:id/location", patch(update_location))
        .route("/users/:id/deposit", post(deposit))
        .route("/users/:id/wallet", get(wallet))
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub fee_per_km: Decimal,
    #[serde(default)]
    pub waiting_rate: Decimal,
    #[serde(default)]
    pub rating: f64,
    pub location: Option<GeoPoint>,
    #[serde(default = "default_max_pickup_distance")]
    pub max_pickup_distance_m: f64,
    #[serde(default)]
    pub available_budget: Decimal,
}

fn default_max_pickup_distance() -> f64 {
    10_000.0
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<User>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if payload.fee_per_km < Decimal::ZERO || payload.waiting_rate < Decimal::ZERO {
        return Err(AppError::BadRequest("rates cannot be negative".to_string()));
    }

    let user = User {
        id: Uuid::new_v4(),
        name: payload.name,
        role: payload.role,
        fee_per_km: payload.fee_per_km,
        waiting_rate: payload.waiting_rate,
        rating: payload.rating.clamp(0.0, 5.0),
        order_count: 0,
        current_location: payload.location,
        location_updated_at: payload.location.map(|_| Utc::now()),
        max_pickup_distance_m: payload.max_pickup_distance_m,
        available_budget: payload.available_budget,
        created_at: Utc::now(),
    };

    state.users.insert(user.id, user.clone());
    Ok(Json(user))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    let user = state
        .users
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;
    Ok(Json(user))
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

/// Live-tracking updates are debounced per user: a move of at most 50 m
/// within 60 s of the last write is dropped, returning the stored state.
async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<User>, AppError> {
    let now = Utc::now();
    let user = state.users.update(id, |user| {
        if let (Some(previous), Some(updated_at)) =
            (user.current_location, user.location_updated_at)
        {
            let moved = haversine_m(&previous, &payload.location);
            let elapsed = (now - updated_at).num_seconds();
            if moved <= LOCATION_MIN_DELTA_M && elapsed < LOCATION_MIN_INTERVAL_S {
                return Ok(user.clone());
            }
        }

        user.current_location = Some(payload.location);
        user.location_updated_at = Some(now);
        Ok(user.clone())
    })?;

    Ok(Json(user))
}

#[derive(Deserialize)]
pub struct DepositRequest {
    pub amount: Decimal,
}

#[derive(Serialize)]
pub struct DepositResponse {
    pub balance: Decimal,
    pub transaction: WalletTransaction,
}

async fn deposit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DepositRequest>,
) -> Result<Json<DepositResponse>, AppError> {
    if state.users.get(&id).is_none() {
        return Err(AppError::NotFound(format!("user {id} not found")));
    }

    let transaction = state.ledger.deposit(id, payload.amount)?;
    Ok(Json(DepositResponse {
        balance: state.ledger.balance(id),
        transaction,
    }))
}

#[derive(Serialize)]
pub struct WalletResponse {
    pub balance: Decimal,
    pub reserved: Decimal,
    pub available: Decimal,
    pub history: Vec<WalletTransaction>,
}

async fn wallet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<WalletResponse>, AppError> {
    if state.users.get(&id).is_none() {
        return Err(AppError::NotFound(format!("user {id} not found")));
    }

    let balance = state.ledger.balance(id);
    let reserved = bidding::reserved_amount(&state, id);
    Ok(Json(WalletResponse {
        balance,
        reserved,
        available: balance - reserved,
        history: state.ledger.history(id),
    }))
}
