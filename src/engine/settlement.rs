use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::COMMISSION_RATE;
use crate::error::AppError;
use crate::models::order::{OrderStatus, PaymentMode, Receipt};
use crate::notify::MarketEvent;
use crate::state::AppState;

/// Finalize one accepted courier's leg of an order: compute the fee split,
/// move the money, write the receipt. Safe to retry; a second call for the
/// same (order, courier) is rejected before any ledger effect.
pub async fn finalize_order(
    state: &AppState,
    order_id: Uuid,
    courier_id: Uuid,
) -> Result<Receipt, AppError> {
    let courier = state
        .users
        .get(&courier_id)
        .ok_or_else(|| AppError::NotFound(format!("courier {courier_id} not found")))?;
    let fee_per_km = courier.fee_per_km;
    let now = Utc::now();

    // The ledger legs run inside the exclusive order update: concurrent
    // retries serialize on the order, and the loser sees finalized=true
    // before it can touch the ledger.
    let result = state.orders.update_once(order_id, |o| {
        let assignment = o.couriers.get(&courier_id).ok_or_else(|| {
            AppError::NotFound(format!(
                "courier {courier_id} is not accepted on this order"
            ))
        })?;
        if !assignment.pickup_confirmed || !assignment.dropoff_confirmed {
            return Err(AppError::InvalidState(
                "pickup and dropoff must both be confirmed before settlement".to_string(),
            ));
        }
        if assignment.finalized {
            return Err(AppError::InvalidState(
                "courier already finalized for this order".to_string(),
            ));
        }

        let bid = o.offers.get(&courier_id).ok_or_else(|| {
            AppError::NotFound(format!("no bid from courier {courier_id} on this order"))
        })?;

        let total_km = (bid.pickup_estimation.distance_m + bid.dropoff_estimation.distance_m)
            / 1000.0;
        let total_km = Decimal::from_f64(total_km)
            .ok_or_else(|| AppError::Internal("route distance is not finite".to_string()))?;

        let distance_fee = total_km * fee_per_km;
        let courier_fee = distance_fee
            + assignment.waiting_fee_pickup
            + assignment.waiting_fee_dropoff
            + bid.upfront_purchase_cost;
        let platform_fee = courier_fee * COMMISSION_RATE;
        let total_customer_charge = courier_fee + platform_fee;

        match o.payment_mode {
            PaymentMode::Wallet => state.ledger.settle_wallet(
                o.id,
                o.customer_id,
                courier_id,
                total_customer_charge,
                courier_fee,
                platform_fee,
            )?,
            PaymentMode::Cash => state.ledger.settle_cash(o.id, courier_id, platform_fee)?,
        }

        let receipt = Receipt {
            distance_fee,
            waiting_fee_pickup: assignment.waiting_fee_pickup,
            waiting_fee_dropoff: assignment.waiting_fee_dropoff,
            upfront_purchase_cost: bid.upfront_purchase_cost,
            courier_fee,
            platform_fee,
            total_customer_charge,
            finalized_at: now,
        };

        let assignment = o
            .couriers
            .get_mut(&courier_id)
            .ok_or_else(|| AppError::Internal("assignment vanished during settlement".to_string()))?;
        assignment.finalized = true;
        assignment.receipt = Some(receipt.clone());

        let all_finalized = o
            .accepted_couriers
            .iter()
            .all(|id| o.couriers.get(id).map(|a| a.finalized).unwrap_or(false));
        if all_finalized {
            o.status = OrderStatus::Completed;
        }

        Ok((receipt, all_finalized))
    });

    let (receipt, completed) = match result {
        Ok(out) => out,
        Err(err) => {
            state
                .metrics
                .settlements_total
                .with_label_values(&["error"])
                .inc();
            error!(order_id = %order_id, courier_id = %courier_id, error = %err, "settlement failed");
            return Err(err);
        }
    };

    state
        .metrics
        .settlements_total
        .with_label_values(&["success"])
        .inc();
    if let Some(revenue) = state.ledger.system_balance().to_f64() {
        state.metrics.platform_revenue.set(revenue);
    }

    // The courier's completed-order tally feeds future primary selection.
    state.users.update(courier_id, |u| {
        u.order_count += 1;
        Ok(())
    })?;

    state.notifier.notify(MarketEvent::OrderFinalized {
        order_id,
        courier_id,
    });
    if completed {
        state.notifier.notify(MarketEvent::OrderCompleted { order_id });
    }

    info!(
        order_id = %order_id,
        courier_id = %courier_id,
        courier_fee = %receipt.courier_fee,
        platform_fee = %receipt.platform_fee,
        completed,
        "courier settled"
    );

    Ok(receipt)
}
