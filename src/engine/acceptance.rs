use std::collections::HashMap;

use rand::Rng;
use tracing::info;
use uuid::Uuid;

use crate::engine::selection::{self, CourierStats};
use crate::error::AppError;
use crate::models::order::{Assignment, OrderStatus};
use crate::notify::MarketEvent;
use crate::state::AppState;

struct Applied {
    assignment: Assignment,
    already_accepted: bool,
    quorum_reached: bool,
    primary: Option<Uuid>,
    expired_bidders: Vec<Uuid>,
}

/// Accept a courier's bid. Idempotent: a courier that is already accepted
/// gets their existing assignment back unchanged.
///
/// The append, the quorum check, the status flip and the primary designation
/// all happen inside a single order update, so two acceptances racing on the
/// last slot can never both take it.
pub async fn accept_bid(
    state: &AppState,
    order_id: Uuid,
    courier_id: Uuid,
) -> Result<Assignment, AppError> {
    let courier = state
        .users
        .get(&courier_id)
        .ok_or_else(|| AppError::NotFound(format!("courier {courier_id} not found")))?;
    let initial_location = courier.current_location;

    let applied = state.orders.update(order_id, |o| {
        if o.accepted_couriers.contains(&courier_id) {
            let assignment = o
                .couriers
                .get(&courier_id)
                .cloned()
                .ok_or_else(|| AppError::Internal("accepted courier without assignment".to_string()))?;
            return Ok(Applied {
                assignment,
                already_accepted: true,
                quorum_reached: false,
                primary: None,
                expired_bidders: Vec::new(),
            });
        }

        if o.status != OrderStatus::Open {
            return Err(AppError::InvalidState(
                "order is not open for acceptance".to_string(),
            ));
        }
        if !o.offers.contains_key(&courier_id) {
            return Err(AppError::NotFound(format!(
                "no bid from courier {courier_id} on this order"
            )));
        }
        if o.accepted_couriers.len() as u32 >= o.required_couriers {
            return Err(AppError::InvalidState(
                "required courier count already reached".to_string(),
            ));
        }

        o.accepted_couriers.push(courier_id);
        o.couriers
            .insert(courier_id, Assignment::new(generate_pickup_pin(), initial_location));

        let quorum_reached = o.accepted_couriers.len() as u32 == o.required_couriers;
        let mut primary = None;
        let mut expired_bidders = Vec::new();
        if quorum_reached {
            o.status = OrderStatus::InProgress;
            o.bid_expired = true;
            // Stats are read here, inside the update, so primary selection
            // sees every accepted courier's current record.
            let stats: HashMap<Uuid, CourierStats> = o
                .accepted_couriers
                .iter()
                .filter_map(|id| {
                    state.users.get(id).map(|user| {
                        (
                            *id,
                            CourierStats {
                                rating: user.rating,
                                order_count: user.order_count,
                            },
                        )
                    })
                })
                .collect();
            primary = selection::designate_primary(o, &stats);
            expired_bidders = o
                .offers
                .keys()
                .filter(|bidder| !o.accepted_couriers.contains(bidder))
                .copied()
                .collect();
        }

        // Re-read after primary designation so the caller sees is_primary.
        let assignment = o
            .couriers
            .get(&courier_id)
            .cloned()
            .ok_or_else(|| AppError::Internal("assignment vanished during acceptance".to_string()))?;

        Ok(Applied {
            assignment,
            already_accepted: false,
            quorum_reached,
            primary,
            expired_bidders,
        })
    })?;

    if applied.already_accepted {
        return Ok(applied.assignment);
    }

    state.notifier.notify(MarketEvent::BidAccepted {
        order_id,
        courier_id,
    });

    if applied.quorum_reached {
        state.metrics.open_orders.dec();
        if let Some(primary) = applied.primary {
            state.notifier.notify(MarketEvent::PrimaryDesignated {
                order_id,
                courier_id: primary,
            });
        }
        for bidder in &applied.expired_bidders {
            state.notifier.notify(MarketEvent::BidExpired {
                order_id,
                courier_id: *bidder,
            });
        }
    }

    info!(
        order_id = %order_id,
        courier_id = %courier_id,
        quorum_reached = applied.quorum_reached,
        "bid accepted"
    );

    Ok(applied.assignment)
}

fn generate_pickup_pin() -> String {
    rand::thread_rng().gen_range(1000..=9999).to_string()
}
