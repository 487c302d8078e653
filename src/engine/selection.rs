use std::collections::HashMap;

use uuid::Uuid;

use crate::models::order::Order;

const RATING_WEIGHT: f64 = 0.3;
const ORDER_COUNT_WEIGHT: f64 = 0.7;

#[derive(Debug, Clone, Copy)]
pub struct CourierStats {
    pub rating: f64,
    pub order_count: u32,
}

pub fn weight(stats: &CourierStats) -> f64 {
    RATING_WEIGHT * stats.rating + ORDER_COUNT_WEIGHT * stats.order_count as f64
}

/// Pick exactly one primary courier among the accepted ones: highest weight
/// wins, ties go to the earliest-accepted courier. A re-run on an order that
/// already has a primary is a no-op returning the existing designation.
pub fn designate_primary(
    order: &mut Order,
    stats: &HashMap<Uuid, CourierStats>,
) -> Option<Uuid> {
    if let Some(existing) = order
        .couriers
        .iter()
        .find(|(_, assignment)| assignment.is_primary)
        .map(|(id, _)| *id)
    {
        return Some(existing);
    }

    let mut best: Option<(Uuid, f64)> = None;
    for courier_id in &order.accepted_couriers {
        let w = stats.get(courier_id).map(weight).unwrap_or(0.0);
        // Strict comparison keeps the first accepted courier on ties.
        match best {
            Some((_, best_w)) if w <= best_w => {}
            _ => best = Some((*courier_id, w)),
        }
    }

    let (winner, _) = best?;
    if let Some(assignment) = order.couriers.get_mut(&winner) {
        assignment.is_primary = true;
    }
    Some(winner)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::{CourierStats, designate_primary, weight};
    use crate::models::order::{Assignment, Order, OrderStatus, PaymentMode, Place};

    fn place(lat: f64, lng: f64) -> Place {
        Place {
            lat,
            lng,
            address: "somewhere".to_string(),
            phone: "555-0100".to_string(),
        }
    }

    fn order_with_accepted(couriers: &[Uuid]) -> Order {
        let mut order = Order {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            pickup: place(52.51, 13.39),
            dropoff: place(52.54, 13.42),
            payment_mode: PaymentMode::Cash,
            needed_budget: Decimal::ZERO,
            required_couriers: couriers.len() as u32,
            max_pickup_distance_m: 10_000.0,
            status: OrderStatus::InProgress,
            accepted_couriers: couriers.to_vec(),
            offers: HashMap::new(),
            couriers: HashMap::new(),
            dropoff_estimation: None,
            bid_expired: true,
            created_at: Utc::now(),
        };
        for id in couriers {
            order
                .couriers
                .insert(*id, Assignment::new("1234".to_string(), None));
        }
        order
    }

    #[test]
    fn order_count_outweighs_rating() {
        let seasoned = CourierStats {
            rating: 3.0,
            order_count: 50,
        };
        let well_rated = CourierStats {
            rating: 5.0,
            order_count: 10,
        };
        assert!(weight(&seasoned) > weight(&well_rated));
    }

    #[test]
    fn highest_weight_becomes_primary() {
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);
        let mut order = order_with_accepted(&[low, high]);
        let stats = HashMap::from([
            (low, CourierStats { rating: 4.0, order_count: 1 }),
            (high, CourierStats { rating: 4.0, order_count: 9 }),
        ]);

        let winner = designate_primary(&mut order, &stats);

        assert_eq!(winner, Some(high));
        assert!(order.couriers[&high].is_primary);
        assert!(!order.couriers[&low].is_primary);
    }

    #[test]
    fn tie_goes_to_first_accepted() {
        let first = Uuid::from_u128(1);
        let second = Uuid::from_u128(2);
        let mut order = order_with_accepted(&[first, second]);
        let same = CourierStats {
            rating: 4.5,
            order_count: 3,
        };
        let stats = HashMap::from([(first, same), (second, same)]);

        assert_eq!(designate_primary(&mut order, &stats), Some(first));
    }

    #[test]
    fn redesignation_is_a_no_op() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let mut order = order_with_accepted(&[a, b]);
        let stats = HashMap::from([
            (a, CourierStats { rating: 1.0, order_count: 0 }),
            (b, CourierStats { rating: 5.0, order_count: 20 }),
        ]);

        let first_run = designate_primary(&mut order, &stats);
        let second_run = designate_primary(&mut order, &stats);

        assert_eq!(first_run, second_run);
        let primaries = order
            .couriers
            .values()
            .filter(|assignment| assignment.is_primary)
            .count();
        assert_eq!(primaries, 1);
    }
}
