use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::RouteEstimate;
use crate::models::user::GeoPoint;

/// A pickup or dropoff stop: coordinates plus contact details for the door.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Place {
    pub lat: f64,
    pub lng: f64,
    pub address: String,
    pub phone: String,
}

impl Place {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum PaymentMode {
    Cash,
    Wallet,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum OrderStatus {
    Open,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub pickup: Place,
    pub dropoff: Place,
    pub payment_mode: PaymentMode,
    /// Upfront purchase cost the courier fronts at pickup.
    pub needed_budget: Decimal,
    pub required_couriers: u32,
    pub max_pickup_distance_m: f64,
    pub status: OrderStatus,
    /// Insertion order is acceptance order; primary selection breaks ties on it.
    pub accepted_couriers: Vec<Uuid>,
    /// At most one bid per courier.
    pub offers: HashMap<Uuid, Bid>,
    /// One assignment per accepted courier.
    pub couriers: HashMap<Uuid, Assignment>,
    /// Pickup → dropoff route, computed once and cached.
    pub dropoff_estimation: Option<RouteEstimate>,
    pub bid_expired: bool,
    pub created_at: DateTime<Utc>,
}

/// A courier's offer on an order. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub bid_amount: Decimal,
    pub bid_message: String,
    /// Courier's location at bid time → pickup.
    pub pickup_estimation: RouteEstimate,
    /// Copied from the order's cached estimate.
    pub dropoff_estimation: RouteEstimate,
    pub estimated_distance_fee: Decimal,
    pub upfront_purchase_cost: Decimal,
    pub final_estimated_cost: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Per-courier fulfillment record, created at acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    /// 4-digit PIN authenticating the physical handoff.
    pub pickup_pin: String,
    pub pickup_arrival: Option<DateTime<Utc>>,
    pub pickup_confirmed: bool,
    pub waiting_time_pickup_ms: i64,
    pub waiting_fee_pickup: Decimal,
    pub package_image: Option<String>,
    pub pickup_receipt: Option<String>,
    pub paid_amount: Option<Decimal>,
    pub dropoff_arrival: Option<DateTime<Utc>>,
    pub dropoff_confirmed: bool,
    pub waiting_time_dropoff_ms: i64,
    pub waiting_fee_dropoff: Decimal,
    pub dropoff_image: Option<String>,
    pub dropoff_receipt: Option<String>,
    pub dropoff_paid_amount: Option<Decimal>,
    /// Flips false→true exactly once, in settlement.
    pub finalized: bool,
    pub is_primary: bool,
    /// Courier location snapshot at acceptance, kept for audit.
    pub initial_location: Option<GeoPoint>,
    pub receipt: Option<Receipt>,
    pub accepted_at: DateTime<Utc>,
}

impl Assignment {
    pub fn new(pickup_pin: String, initial_location: Option<GeoPoint>) -> Self {
        Self {
            pickup_pin,
            pickup_arrival: None,
            pickup_confirmed: false,
            waiting_time_pickup_ms: 0,
            waiting_fee_pickup: Decimal::ZERO,
            package_image: None,
            pickup_receipt: None,
            paid_amount: None,
            dropoff_arrival: None,
            dropoff_confirmed: false,
            waiting_time_dropoff_ms: 0,
            waiting_fee_dropoff: Decimal::ZERO,
            dropoff_image: None,
            dropoff_receipt: None,
            dropoff_paid_amount: None,
            finalized: false,
            is_primary: false,
            initial_location,
            receipt: None,
            accepted_at: Utc::now(),
        }
    }
}

/// Itemized settlement result, written exactly once per accepted courier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub distance_fee: Decimal,
    pub waiting_fee_pickup: Decimal,
    pub waiting_fee_dropoff: Decimal,
    pub upfront_purchase_cost: Decimal,
    pub courier_fee: Decimal,
    pub platform_fee: Decimal,
    pub total_customer_charge: Decimal,
    pub finalized_at: DateTime<Utc>,
}
