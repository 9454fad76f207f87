use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::outbox::Effect;
use vendia_core::notify::{channels_for, Notification};
use vendia_core::repository::{OrderRecord, OrderStore};
use vendia_core::{CoreError, CoreResult};
use vendia_shared::models::events::{OrderEvent, StatusChangedEvent, TrackingUpdatedEvent};
use vendia_shared::models::order::{OrderStatus, OrderStatusEvent};

/// Transition-graph enforcement mode. Lenient accepts any known status from
/// any other, which mirrors how staff correct orders by hand today; strict
/// enforces the forward shipment graph. Pending product clarification the
/// default stays lenient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPolicy {
    Lenient,
    Strict,
}

impl TransitionPolicy {
    pub fn parse(s: &str) -> Option<TransitionPolicy> {
        match s {
            "lenient" => Some(TransitionPolicy::Lenient),
            "strict" => Some(TransitionPolicy::Strict),
            _ => None,
        }
    }
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        TransitionPolicy::Lenient
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatusUpdateOptions {
    pub reason: Option<String>,
    pub notes: Option<String>,
}

/// Result of a transition: the updated record, the audit event, and the
/// outbox of best-effort side effects for the dispatcher. The engine itself
/// only performs the authoritative status write.
#[derive(Debug)]
pub struct TransitionOutcome {
    pub record: OrderRecord,
    pub event: OrderStatusEvent,
    pub effects: Vec<Effect>,
}

/// Pure policy check, separated from persistence so it can be tested
/// without a store.
pub fn check_transition(
    previous: OrderStatus,
    next: OrderStatus,
    policy: TransitionPolicy,
) -> CoreResult<()> {
    match policy {
        TransitionPolicy::Lenient => Ok(()),
        TransitionPolicy::Strict => {
            if previous.can_progress_to(next) {
                Ok(())
            } else {
                Err(CoreError::Validation(format!(
                    "transition {previous} -> {next} not allowed under strict policy"
                )))
            }
        }
    }
}

/// Validates and applies status changes to an order or sub-order
pub struct TransitionEngine {
    store: Arc<dyn OrderStore>,
    policy: TransitionPolicy,
}

impl TransitionEngine {
    pub fn new(store: Arc<dyn OrderStore>, policy: TransitionPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn update_status(
        &self,
        id: Uuid,
        new_status_raw: &str,
        actor_id: Uuid,
        opts: StatusUpdateOptions,
    ) -> CoreResult<TransitionOutcome> {
        let new_status = OrderStatus::parse(new_status_raw).ok_or_else(|| {
            CoreError::Validation(format!("unknown order status: {new_status_raw}"))
        })?;

        let (record, recipient) = self.load_record(id).await?;
        let previous = record.status();
        check_transition(previous, new_status, self.policy)?;

        let now = Utc::now();
        let record = match record {
            OrderRecord::Parent(mut order) => {
                self.store.update_order_status(order.id, new_status, now).await?;
                order.apply_status(new_status, now);
                OrderRecord::Parent(order)
            }
            OrderRecord::Sub(mut sub) => {
                self.store.update_sub_order_status(sub.id, new_status, now).await?;
                sub.apply_status(new_status, now);
                OrderRecord::Sub(sub)
            }
        };

        let event = OrderStatusEvent::new(id, previous, new_status, actor_id)
            .with_note(opts.notes.or(opts.reason));
        let message = format!("Order status changed from {previous} to {new_status}");

        let effects = vec![
            Effect::AppendHistory(event.clone()),
            Effect::Broadcast {
                order_id: id,
                event: OrderEvent::StatusChanged(StatusChangedEvent {
                    order_id: id,
                    status: new_status,
                    previous_status: previous,
                    timestamp: now.timestamp(),
                    message: message.clone(),
                }),
            },
            Effect::Notify(Notification {
                recipient,
                order_id: id,
                channels: channels_for(new_status),
                subject: format!("Order update: {new_status}"),
                body: message,
            }),
        ];

        Ok(TransitionOutcome { record, event, effects })
    }

    pub async fn add_tracking(
        &self,
        id: Uuid,
        tracking_number: &str,
        carrier: &str,
        actor_id: Uuid,
    ) -> CoreResult<TransitionOutcome> {
        if tracking_number.trim().is_empty() {
            return Err(CoreError::Validation("tracking_number is required".to_string()));
        }
        if carrier.trim().is_empty() {
            return Err(CoreError::Validation("carrier is required".to_string()));
        }

        let (record, recipient) = self.load_record(id).await?;
        let status = record.status();

        let now = Utc::now();
        let record = match record {
            OrderRecord::Parent(mut order) => {
                self.store
                    .update_order_tracking(order.id, tracking_number, carrier, now)
                    .await?;
                order.apply_tracking(tracking_number, carrier, now);
                OrderRecord::Parent(order)
            }
            OrderRecord::Sub(mut sub) => {
                self.store
                    .update_sub_order_tracking(sub.id, tracking_number, carrier, now)
                    .await?;
                sub.apply_tracking(tracking_number, carrier, now);
                OrderRecord::Sub(sub)
            }
        };

        // Tracking assignment is recorded in the same timeline; the status
        // itself does not move.
        let event = OrderStatusEvent::new(id, status, status, actor_id)
            .with_tracking(tracking_number, carrier);
        let message = format!("Tracking updated: {carrier} {tracking_number}");

        let effects = vec![
            Effect::AppendHistory(event.clone()),
            Effect::Broadcast {
                order_id: id,
                event: OrderEvent::TrackingUpdated(TrackingUpdatedEvent {
                    order_id: id,
                    tracking_number: tracking_number.to_string(),
                    carrier: carrier.to_string(),
                    timestamp: now.timestamp(),
                    message: message.clone(),
                }),
            },
            Effect::Notify(Notification {
                recipient,
                order_id: id,
                channels: channels_for(status),
                subject: "Tracking information added".to_string(),
                body: message,
            }),
        ];

        Ok(TransitionOutcome { record, event, effects })
    }

    /// Load the parent-or-sub record and resolve the buyer to notify.
    /// Sub-orders carry no buyer id, so the recipient comes from the parent.
    async fn load_record(&self, id: Uuid) -> CoreResult<(OrderRecord, Uuid)> {
        let record = self
            .store
            .find_record(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("order {id}")))?;

        let recipient = match &record {
            OrderRecord::Parent(order) => order.buyer_id,
            OrderRecord::Sub(sub) => {
                self.store
                    .get_order(sub.parent_order_id)
                    .await?
                    .ok_or_else(|| {
                        CoreError::Internal(format!("sub-order {} has no parent order", sub.id))
                    })?
                    .buyer_id
            }
        };

        Ok((record, recipient))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vendia_core::notify::NotificationChannel;
    use vendia_shared::models::order::{Order, OrderItem};
    use vendia_store::memory::MemoryOrderStore;

    async fn seed_order(store: &MemoryOrderStore, status: OrderStatus) -> Order {
        let mut order = Order::new(Uuid::new_v4());
        order.add_item(OrderItem::new(
            order.id,
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            "Ceramic Mug".to_string(),
            1,
            1800,
        ));
        order.status = status;
        store.insert_order(&order).await.unwrap();
        order
    }

    #[tokio::test]
    async fn test_update_status_produces_event_and_effects() {
        let store = Arc::new(MemoryOrderStore::new());
        let engine = TransitionEngine::new(store.clone(), TransitionPolicy::Lenient);
        let order = seed_order(&store, OrderStatus::Confirmed).await;

        let outcome = engine
            .update_status(order.id, "shipped", Uuid::new_v4(), StatusUpdateOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.record.status(), OrderStatus::Shipped);
        assert_eq!(outcome.event.previous_status, OrderStatus::Confirmed);
        assert_eq!(outcome.event.new_status, OrderStatus::Shipped);
        assert_eq!(outcome.effects.len(), 3);

        // Channel escalation for shipment milestones
        let notify = outcome
            .effects
            .iter()
            .find_map(|e| match e {
                Effect::Notify(n) => Some(n),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            notify.channels,
            vec![NotificationChannel::InApp, NotificationChannel::Email]
        );
        assert_eq!(notify.recipient, order.buyer_id);

        // The persisted row reflects the write
        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Shipped);
    }

    #[tokio::test]
    async fn test_unknown_status_is_rejected_before_any_write() {
        let store = Arc::new(MemoryOrderStore::new());
        let engine = TransitionEngine::new(store.clone(), TransitionPolicy::Lenient);
        let order = seed_order(&store, OrderStatus::Confirmed).await;

        let err = engine
            .update_status(order.id, "bogus_status", Uuid::new_v4(), StatusUpdateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Confirmed);
        assert!(store.list_status_events(order.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_order_is_not_found() {
        let store = Arc::new(MemoryOrderStore::new());
        let engine = TransitionEngine::new(store, TransitionPolicy::Lenient);

        let err = engine
            .update_status(Uuid::new_v4(), "shipped", Uuid::new_v4(), StatusUpdateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_strict_policy_rejects_regression() {
        let store = Arc::new(MemoryOrderStore::new());
        let engine = TransitionEngine::new(store.clone(), TransitionPolicy::Strict);
        let order = seed_order(&store, OrderStatus::Delivered).await;

        let err = engine
            .update_status(order.id, "pending", Uuid::new_v4(), StatusUpdateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_lenient_policy_allows_manual_correction() {
        let store = Arc::new(MemoryOrderStore::new());
        let engine = TransitionEngine::new(store.clone(), TransitionPolicy::Lenient);
        let order = seed_order(&store, OrderStatus::Shipped).await;

        let outcome = engine
            .update_status(
                order.id,
                "processing",
                Uuid::new_v4(),
                StatusUpdateOptions {
                    reason: Some("carrier returned the parcel".to_string()),
                    notes: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.record.status(), OrderStatus::Processing);
        assert_eq!(
            outcome.event.note.as_deref(),
            Some("carrier returned the parcel")
        );
    }

    #[tokio::test]
    async fn test_add_tracking_requires_both_fields() {
        let store = Arc::new(MemoryOrderStore::new());
        let engine = TransitionEngine::new(store.clone(), TransitionPolicy::Lenient);
        let order = seed_order(&store, OrderStatus::Processing).await;

        let err = engine
            .add_tracking(order.id, "", "UPS", Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let err = engine
            .add_tracking(order.id, "1Z999AA10123456784", "  ", Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_add_tracking_keeps_status_and_records_fields() {
        let store = Arc::new(MemoryOrderStore::new());
        let engine = TransitionEngine::new(store.clone(), TransitionPolicy::Lenient);
        let order = seed_order(&store, OrderStatus::Processing).await;

        let outcome = engine
            .add_tracking(order.id, "1Z999AA10123456784", "UPS", Uuid::new_v4())
            .await
            .unwrap();

        assert_eq!(outcome.event.previous_status, OrderStatus::Processing);
        assert_eq!(outcome.event.new_status, OrderStatus::Processing);
        assert_eq!(outcome.event.tracking_number.as_deref(), Some("1Z999AA10123456784"));
        assert_eq!(outcome.event.carrier.as_deref(), Some("UPS"));

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.tracking_number.as_deref(), Some("1Z999AA10123456784"));
        assert_eq!(stored.carrier.as_deref(), Some("UPS"));
    }
}
