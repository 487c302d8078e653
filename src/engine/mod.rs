pub mod acceptance;
pub mod bidding;
pub mod fulfillment;
pub mod selection;
pub mod settlement;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Platform commission applied on top of every courier fee.
pub const COMMISSION_RATE: Decimal = dec!(0.10);

/// Reservation safety margin: half the courier's per-minute waiting rate.
pub const SAFETY_MARGIN_FACTOR: Decimal = dec!(0.5);

/// Grace period before waiting charges start, in milliseconds.
pub const WAITING_TIMEOUT_MS: i64 = 300_000;
