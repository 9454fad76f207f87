use uuid::Uuid;

use crate::models::order::OrderStatus;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct StatusChangedEvent {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub previous_status: OrderStatus,
    pub timestamp: i64,
    pub message: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct TrackingUpdatedEvent {
    pub order_id: Uuid,
    pub tracking_number: String,
    pub carrier: String,
    pub timestamp: i64,
    pub message: String,
}

/// Wire payload pushed to realtime subscribers of an order
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    StatusChanged(StatusChangedEvent),
    TrackingUpdated(TrackingUpdatedEvent),
}

impl OrderEvent {
    pub fn order_id(&self) -> Uuid {
        match self {
            OrderEvent::StatusChanged(e) => e.order_id,
            OrderEvent::TrackingUpdated(e) => e.order_id,
        }
    }
}
