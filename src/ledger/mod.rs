use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::wallet::{TransactionKind, WalletTransaction};

/// Courier wallet floor. Platform-fee transfers on cash orders may push a
/// courier negative down to this value; below it, cash orders are withheld
/// from the courier until the balance recovers.
pub const CASH_BLOCK: Decimal = dec!(-100);

/// Account id under which system-wallet entries are recorded.
pub const SYSTEM_ACCOUNT: Uuid = Uuid::nil();

#[derive(Default)]
struct LedgerInner {
    balances: HashMap<Uuid, Decimal>,
    system_balance: Decimal,
    history: HashMap<Uuid, Vec<WalletTransaction>>,
    system_history: Vec<WalletTransaction>,
}

/// Balances plus append-only transaction history for every account, and the
/// singleton system wallet accumulating platform commission. One lock guards
/// all of it: a multi-leg settlement is observed fully applied or not at all,
/// and a balance check is never separated from the debit it authorizes.
pub struct WalletLedger {
    inner: Mutex<LedgerInner>,
}

impl WalletLedger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LedgerInner::default()),
        }
    }

    /// Unknown accounts read as zero, never as an error.
    pub fn balance(&self, account: Uuid) -> Decimal {
        let inner = self.inner.lock().expect("ledger lock poisoned");
        inner.balances.get(&account).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn system_balance(&self) -> Decimal {
        let inner = self.inner.lock().expect("ledger lock poisoned");
        inner.system_balance
    }

    pub fn history(&self, account: Uuid) -> Vec<WalletTransaction> {
        let inner = self.inner.lock().expect("ledger lock poisoned");
        inner.history.get(&account).cloned().unwrap_or_default()
    }

    pub fn system_history(&self) -> Vec<WalletTransaction> {
        let inner = self.inner.lock().expect("ledger lock poisoned");
        inner.system_history.clone()
    }

    pub fn deposit(&self, account: Uuid, amount: Decimal) -> Result<WalletTransaction, AppError> {
        if amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(
                "deposit amount must be positive".to_string(),
            ));
        }

        let mut inner = self.inner.lock().expect("ledger lock poisoned");
        *inner.balances.entry(account).or_insert(Decimal::ZERO) += amount;
        Ok(append(
            &mut inner,
            account,
            TransactionKind::Deposit,
            amount,
            None,
        ))
    }

    /// Wallet-mode settlement: debit the customer for the full charge, credit
    /// the courier their fee, and route the commission slice of the charge to
    /// the system wallet. The customer balance is re-checked here because the
    /// bid-time reservation was only an estimate.
    pub fn settle_wallet(
        &self,
        order_id: Uuid,
        customer: Uuid,
        courier: Uuid,
        total_customer_charge: Decimal,
        courier_fee: Decimal,
        platform_fee: Decimal,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.lock().expect("ledger lock poisoned");

        let customer_balance = inner
            .balances
            .get(&customer)
            .copied()
            .unwrap_or(Decimal::ZERO);
        if customer_balance < total_customer_charge {
            return Err(AppError::InsufficientFunds {
                shortfall: total_customer_charge - customer_balance,
            });
        }

        *inner.balances.entry(customer).or_insert(Decimal::ZERO) -= total_customer_charge;
        append(
            &mut inner,
            customer,
            TransactionKind::OrderPayment,
            total_customer_charge,
            Some(order_id),
        );

        *inner.balances.entry(courier).or_insert(Decimal::ZERO) += courier_fee;
        append(
            &mut inner,
            courier,
            TransactionKind::OrderCredit,
            courier_fee,
            Some(order_id),
        );

        inner.system_balance += platform_fee;
        append_system(&mut inner, platform_fee, Some(order_id));

        Ok(())
    }

    /// Cash-mode settlement: the courier collected cash in person, so only
    /// the platform fee moves, courier → system, down to the CASH_BLOCK floor.
    pub fn settle_cash(
        &self,
        order_id: Uuid,
        courier: Uuid,
        platform_fee: Decimal,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.lock().expect("ledger lock poisoned");

        let courier_balance = inner
            .balances
            .get(&courier)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let courier_after = courier_balance - platform_fee;
        if courier_after < CASH_BLOCK {
            return Err(AppError::InsufficientFunds {
                shortfall: CASH_BLOCK - courier_after,
            });
        }

        *inner.balances.entry(courier).or_insert(Decimal::ZERO) -= platform_fee;
        append(
            &mut inner,
            courier,
            TransactionKind::PlatformFeeTransfer,
            platform_fee,
            Some(order_id),
        );
        inner.system_balance += platform_fee;
        append_system(&mut inner, platform_fee, Some(order_id));

        Ok(())
    }
}

impl Default for WalletLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn append(
    inner: &mut LedgerInner,
    account: Uuid,
    kind: TransactionKind,
    amount: Decimal,
    order_id: Option<Uuid>,
) -> WalletTransaction {
    let tx = WalletTransaction {
        account,
        kind,
        amount,
        order_id,
        timestamp: Utc::now(),
    };
    inner.history.entry(account).or_default().push(tx.clone());
    tx
}

fn append_system(inner: &mut LedgerInner, amount: Decimal, order_id: Option<Uuid>) {
    inner.system_history.push(WalletTransaction {
        account: SYSTEM_ACCOUNT,
        kind: TransactionKind::PlatformFeeTransfer,
        amount,
        order_id,
        timestamp: Utc::now(),
    });
}
