use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Role {
    Customer,
    Courier,
}

/// A marketplace participant. Wallet balances are never stored here; they
/// live in the ledger so every balance change leaves a transaction behind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    /// Courier rate per kilometre of route.
    pub fee_per_km: Decimal,
    /// Courier waiting charge per minute beyond the grace period.
    pub waiting_rate: Decimal,
    pub rating: f64,
    pub order_count: u32,
    pub current_location: Option<GeoPoint>,
    pub location_updated_at: Option<DateTime<Utc>>,
    /// How far (meters) the courier is willing to travel to a pickup.
    pub max_pickup_distance_m: f64,
    /// Cash the courier can front for upfront purchases.
    pub available_budget: Decimal,
    pub created_at: DateTime<Utc>,
}
