use std::sync::Arc;

use tokio::sync::broadcast;

use crate::geo::{GreatCircleEstimator, RouteEstimator};
use crate::ledger::WalletLedger;
use crate::models::order::Order;
use crate::models::user::User;
use crate::notify::{BroadcastSink, MarketEvent, NotificationSink};
use crate::observability::metrics::Metrics;
use crate::store::Repository;

pub struct AppState {
    pub users: Repository<User>,
    pub orders: Repository<Order>,
    pub ledger: WalletLedger,
    pub estimator: Arc<dyn RouteEstimator>,
    pub notifier: Arc<dyn NotificationSink>,
    pub events_tx: broadcast::Sender<MarketEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(event_buffer_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            users: Repository::new("user"),
            orders: Repository::new("order"),
            ledger: WalletLedger::new(),
            estimator: Arc::new(GreatCircleEstimator),
            notifier: Arc::new(BroadcastSink::new(events_tx.clone())),
            events_tx,
            metrics: Metrics::new(),
        }
    }
}
