use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use tracing::info;
use uuid::Uuid;

use crate::engine::{COMMISSION_RATE, SAFETY_MARGIN_FACTOR};
use crate::error::AppError;
use crate::geo;
use crate::models::order::{Bid, OrderStatus, PaymentMode};
use crate::models::user::Role;
use crate::notify::MarketEvent;
use crate::state::AppState;

/// Place a courier's bid on an open order.
///
/// The cost estimate is derived from the cached pickup→dropoff route and the
/// courier's per-km rate. For wallet-mode orders the customer must have
/// enough uncommitted balance to cover the estimate plus a waiting-fee
/// safety margin and commission, otherwise the bid is rejected before
/// anything is written.
pub async fn place_bid(
    state: &AppState,
    order_id: Uuid,
    courier_id: Uuid,
    bid_amount: Decimal,
    bid_message: String,
) -> Result<Bid, AppError> {
    let order = state
        .orders
        .get(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    if order.status != OrderStatus::Open {
        return Err(AppError::InvalidState(
            "order is not open for bids".to_string(),
        ));
    }
    if order.offers.contains_key(&courier_id) {
        return Err(AppError::InvalidState(
            "courier already placed a bid on this order".to_string(),
        ));
    }

    let courier = state
        .users
        .get(&courier_id)
        .ok_or_else(|| AppError::NotFound(format!("courier {courier_id} not found")))?;
    if courier.role != Role::Courier {
        return Err(AppError::BadRequest("bidder must be a courier".to_string()));
    }
    let courier_location = courier.current_location.ok_or_else(|| {
        AppError::BadRequest("courier has no known location".to_string())
    })?;

    // Pickup→dropoff is order-wide; compute it once and cache it on the order.
    let dropoff_estimation = match order.dropoff_estimation {
        Some(est) => est,
        None => {
            let est = geo::estimate(
                state.estimator.as_ref(),
                Some(&order.pickup.point()),
                Some(&order.dropoff.point()),
            )
            .await;
            state.orders.update(order_id, |o| {
                if o.dropoff_estimation.is_none() {
                    o.dropoff_estimation = Some(est);
                }
                Ok(())
            })?;
            est
        }
    };

    let pickup_estimation = geo::estimate(
        state.estimator.as_ref(),
        Some(&courier_location),
        Some(&order.pickup.point()),
    )
    .await;

    let dropoff_km = Decimal::from_f64(dropoff_estimation.distance_m / 1000.0)
        .ok_or_else(|| AppError::Internal("route distance is not finite".to_string()))?;
    let estimated_distance_fee = dropoff_km * courier.fee_per_km;
    let upfront_purchase_cost = order.needed_budget;
    let final_estimated_cost = estimated_distance_fee + upfront_purchase_cost;

    if order.payment_mode == PaymentMode::Wallet {
        let safety_margin = SAFETY_MARGIN_FACTOR * courier.waiting_rate;
        let total_estimated =
            (final_estimated_cost + safety_margin) * (Decimal::ONE + COMMISSION_RATE);
        let available = available_funds(state, order.customer_id);
        if total_estimated > available {
            state.metrics.bids_total.with_label_values(&["rejected"]).inc();
            return Err(AppError::InsufficientFunds {
                shortfall: total_estimated - available,
            });
        }
    }

    let bid = Bid {
        bid_amount,
        bid_message,
        pickup_estimation,
        dropoff_estimation,
        estimated_distance_fee,
        upfront_purchase_cost,
        final_estimated_cost,
        timestamp: Utc::now(),
    };

    let stored = bid.clone();
    state.orders.update(order_id, move |o| {
        if o.status != OrderStatus::Open {
            return Err(AppError::InvalidState(
                "order is not open for bids".to_string(),
            ));
        }
        if o.offers.contains_key(&courier_id) {
            return Err(AppError::InvalidState(
                "courier already placed a bid on this order".to_string(),
            ));
        }
        o.offers.insert(courier_id, stored.clone());
        Ok(())
    })?;

    state.metrics.bids_total.with_label_values(&["placed"]).inc();
    state.notifier.notify(MarketEvent::BidPlaced {
        order_id,
        courier_id,
    });

    info!(
        order_id = %order_id,
        courier_id = %courier_id,
        final_estimated_cost = %bid.final_estimated_cost,
        "bid placed"
    );

    Ok(bid)
}

/// Funds held against a customer's wallet for accepted bids on their
/// not-yet-settled wallet-mode orders.
pub fn reserved_amount(state: &AppState, customer_id: Uuid) -> Decimal {
    let mut reserved = Decimal::ZERO;

    for order in state.orders.snapshot() {
        if order.customer_id != customer_id
            || order.payment_mode != PaymentMode::Wallet
            || !matches!(order.status, OrderStatus::Open | OrderStatus::InProgress)
        {
            continue;
        }
        for courier_id in &order.accepted_couriers {
            let Some(bid) = order.offers.get(courier_id) else {
                continue;
            };
            let waiting_rate = state
                .users
                .get(courier_id)
                .map(|u| u.waiting_rate)
                .unwrap_or(Decimal::ZERO);
            reserved += (bid.final_estimated_cost + SAFETY_MARGIN_FACTOR * waiting_rate)
                * (Decimal::ONE + COMMISSION_RATE);
        }
    }

    reserved
}

pub fn available_funds(state: &AppState, customer_id: Uuid) -> Decimal {
    state.ledger.balance(customer_id) - reserved_amount(state, customer_id)
}
