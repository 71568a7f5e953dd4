use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// Domain events emitted by the core services after their transaction
/// commits. Consumers (notification delivery, reporting, integrations)
/// subscribe on the receiving end of the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Lot ledger events
    LotReceived {
        lot_id: i64,
        product_id: i64,
        quantity: Decimal,
    },
    LotsConsumed {
        product_id: i64,
        quantity: Decimal,
        lot_ids: Vec<i64>,
        reference_type: String,
        reference_id: Option<i64>,
    },
    LotAdjusted {
        lot_id: i64,
        old_quantity: Decimal,
        new_quantity: Decimal,
    },
    LotStatusChanged {
        lot_id: i64,
        new_status: String,
    },

    // BOM events
    BomEdgeAdded {
        bom_item_id: i64,
        parent_product_id: i64,
        child_product_id: i64,
    },
    BomEdgeDeactivated {
        bom_item_id: i64,
    },

    // Work order events
    WorkOrderCreated {
        work_order_id: i64,
        product_id: i64,
        planned_quantity: Decimal,
    },
    WorkOrderStarted {
        work_order_id: i64,
    },
    WorkOrderPaused {
        work_order_id: i64,
        reason: Option<String>,
    },
    WorkOrderResumed {
        work_order_id: i64,
    },
    WorkOrderCancelled {
        work_order_id: i64,
        reason: Option<String>,
    },
    WorkOrderCompleted {
        work_order_id: i64,
        produced_quantity: Decimal,
        scrap_quantity: Decimal,
    },
    ProductionRecorded {
        work_order_id: i64,
        produced_delta: Decimal,
        scrap_delta: Decimal,
    },
    ComponentShortageDetected {
        work_order_id: i64,
        product_id: i64,
        required: Decimal,
        available: Decimal,
        shortage: Decimal,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, surfacing delivery failure to the caller.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event; a full or closed channel is logged and dropped.
    /// Used after commit, where the mutation must not be failed
    /// retroactively because a consumer fell behind.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping domain event: {}", e);
        }
    }
}
