use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreResult;
use vendia_shared::models::order::OrderStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    InApp,
    Email,
}

/// Fixed channel-escalation table keyed by status: shipment milestones the
/// buyer is waiting on go out on email as well as in-app.
pub fn channels_for(status: OrderStatus) -> Vec<NotificationChannel> {
    match status {
        OrderStatus::Shipped | OrderStatus::OutForDelivery | OrderStatus::Delivered => {
            vec![NotificationChannel::InApp, NotificationChannel::Email]
        }
        _ => vec![NotificationChannel::InApp],
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: Uuid,
    pub order_id: Uuid,
    pub channels: Vec<NotificationChannel>,
    pub subject: String,
    pub body: String,
}

/// Port to the external notification fan-out service. Delivery is
/// best-effort; a failure here never fails the operation that produced
/// the notification.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, notification: &Notification) -> CoreResult<()>;
}

/// Default dispatcher: records the notification in the log stream.
/// Stands in for the real channel fan-out service in tests and local runs.
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn dispatch(&self, notification: &Notification) -> CoreResult<()> {
        tracing::info!(
            recipient = %notification.recipient,
            order_id = %notification.order_id,
            channels = ?notification.channels,
            subject = %notification.subject,
            "notification dispatched"
        );
        Ok(())
    }
}
