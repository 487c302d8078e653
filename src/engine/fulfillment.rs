use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::WAITING_TIMEOUT_MS;
use crate::error::AppError;
use crate::models::order::Assignment;
use crate::notify::MarketEvent;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stage {
    Pickup,
    Dropoff,
}

#[derive(Debug, Clone)]
pub struct ConfirmRequest {
    pub image: Option<String>,
    pub receipt: Option<String>,
    pub paid_amount: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaitingCharge {
    pub waiting_time_ms: i64,
    pub waiting_fee: Decimal,
}

/// Milliseconds of billable waiting: time on site beyond the grace period.
pub fn waiting_time_ms(arrival: DateTime<Utc>, confirmed: DateTime<Utc>) -> i64 {
    ((confirmed - arrival).num_milliseconds() - WAITING_TIMEOUT_MS).max(0)
}

/// Waiting fee at the courier's per-minute rate, prorated to the millisecond.
pub fn waiting_fee(waiting_ms: i64, rate_per_minute: Decimal) -> Decimal {
    Decimal::from(waiting_ms) / dec!(60000) * rate_per_minute
}

/// Record the courier's arrival at the pickup or dropoff stop.
/// First write wins; duplicate calls return the recorded timestamp.
pub async fn record_arrival(
    state: &AppState,
    order_id: Uuid,
    courier_id: Uuid,
    stage: Stage,
) -> Result<DateTime<Utc>, AppError> {
    let now = Utc::now();
    state.orders.update(order_id, |o| {
        let assignment = assignment_mut(o.couriers.get_mut(&courier_id), courier_id)?;
        let slot = match stage {
            Stage::Pickup => &mut assignment.pickup_arrival,
            Stage::Dropoff => &mut assignment.dropoff_arrival,
        };
        Ok(*slot.get_or_insert(now))
    })
}

/// Confirm the handoff at a stop, computing the waiting charge exactly once.
/// A second confirmation for the same stage is rejected; the stored waiting
/// figures are never recomputed.
pub async fn confirm(
    state: &AppState,
    order_id: Uuid,
    courier_id: Uuid,
    stage: Stage,
    request: ConfirmRequest,
) -> Result<WaitingCharge, AppError> {
    let waiting_rate = state
        .users
        .get(&courier_id)
        .ok_or_else(|| AppError::NotFound(format!("courier {courier_id} not found")))?
        .waiting_rate;
    let now = Utc::now();

    let charge = state.orders.update(order_id, |o| {
        let assignment = assignment_mut(o.couriers.get_mut(&courier_id), courier_id)?;

        let confirmed_flag = match stage {
            Stage::Pickup => assignment.pickup_confirmed,
            Stage::Dropoff => assignment.dropoff_confirmed,
        };
        if confirmed_flag {
            return Err(AppError::InvalidState(match stage {
                Stage::Pickup => "pickup already confirmed".to_string(),
                Stage::Dropoff => "dropoff already confirmed".to_string(),
            }));
        }

        // Confirmation without a prior arrival records the arrival now.
        let arrival = match stage {
            Stage::Pickup => *assignment.pickup_arrival.get_or_insert(now),
            Stage::Dropoff => *assignment.dropoff_arrival.get_or_insert(now),
        };

        let waiting_ms = waiting_time_ms(arrival, now);
        let fee = waiting_fee(waiting_ms, waiting_rate);

        match stage {
            Stage::Pickup => {
                assignment.pickup_confirmed = true;
                assignment.waiting_time_pickup_ms = waiting_ms;
                assignment.waiting_fee_pickup = fee;
                assignment.package_image = request.image.clone();
                assignment.pickup_receipt = request.receipt.clone();
                assignment.paid_amount = request.paid_amount;
            }
            Stage::Dropoff => {
                assignment.dropoff_confirmed = true;
                assignment.waiting_time_dropoff_ms = waiting_ms;
                assignment.waiting_fee_dropoff = fee;
                assignment.dropoff_image = request.image.clone();
                assignment.dropoff_receipt = request.receipt.clone();
                assignment.dropoff_paid_amount = request.paid_amount;
            }
        }

        Ok(WaitingCharge {
            waiting_time_ms: waiting_ms,
            waiting_fee: fee,
        })
    })?;

    state.notifier.notify(match stage {
        Stage::Pickup => MarketEvent::PickupConfirmed {
            order_id,
            courier_id,
        },
        Stage::Dropoff => MarketEvent::DropoffConfirmed {
            order_id,
            courier_id,
        },
    });

    info!(
        order_id = %order_id,
        courier_id = %courier_id,
        waiting_time_ms = charge.waiting_time_ms,
        waiting_fee = %charge.waiting_fee,
        "stop confirmed"
    );

    Ok(charge)
}

fn assignment_mut(
    slot: Option<&mut Assignment>,
    courier_id: Uuid,
) -> Result<&mut Assignment, AppError> {
    slot.ok_or_else(|| {
        AppError::NotFound(format!(
            "courier {courier_id} is not accepted on this order"
        ))
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    use super::{waiting_fee, waiting_time_ms};

    #[test]
    fn waiting_within_grace_period_is_free() {
        let arrival = Utc::now();
        let confirmed = arrival + Duration::milliseconds(300_000);
        assert_eq!(waiting_time_ms(arrival, confirmed), 0);
        assert_eq!(waiting_fee(0, dec!(1)), dec!(0));
    }

    #[test]
    fn one_millisecond_past_grace_is_billable() {
        let arrival = Utc::now();
        let confirmed = arrival + Duration::milliseconds(300_001);
        assert_eq!(waiting_time_ms(arrival, confirmed), 1);
    }

    #[test]
    fn six_minutes_on_site_bills_one_minute() {
        let arrival = Utc::now();
        let confirmed = arrival + Duration::minutes(6);
        let waiting = waiting_time_ms(arrival, confirmed);
        assert_eq!(waiting, 60_000);
        assert_eq!(waiting_fee(waiting, dec!(1)), dec!(1));
    }

    #[test]
    fn fee_scales_with_rate() {
        assert_eq!(waiting_fee(120_000, dec!(0.5)), dec!(1));
    }
}
