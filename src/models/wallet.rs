use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    OrderPayment,
    OrderCredit,
    PlatformFeeTransfer,
}

/// One ledger entry. Appended to the owning account's history and never
/// mutated or deleted afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub account: Uuid,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub order_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}
