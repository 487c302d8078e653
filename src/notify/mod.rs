use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Marketplace events fanned out to interested parties. Delivery is
/// fire-and-forget: no engine operation blocks on, or fails because of,
/// a notification.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    BidPlaced { order_id: Uuid, courier_id: Uuid },
    BidAccepted { order_id: Uuid, courier_id: Uuid },
    BidExpired { order_id: Uuid, courier_id: Uuid },
    PrimaryDesignated { order_id: Uuid, courier_id: Uuid },
    PickupConfirmed { order_id: Uuid, courier_id: Uuid },
    DropoffConfirmed { order_id: Uuid, courier_id: Uuid },
    OrderFinalized { order_id: Uuid, courier_id: Uuid },
    OrderCompleted { order_id: Uuid },
    OrderCancelled { order_id: Uuid },
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: MarketEvent);
}

/// Sink backed by the process-wide broadcast channel that also feeds the
/// websocket endpoint. Send errors (no subscribers) are ignored.
pub struct BroadcastSink {
    tx: broadcast::Sender<MarketEvent>,
}

impl BroadcastSink {
    pub fn new(tx: broadcast::Sender<MarketEvent>) -> Self {
        Self { tx }
    }
}

impl NotificationSink for BroadcastSink {
    fn notify(&self, event: MarketEvent) {
        let _ = self.tx.send(event);
    }
}
