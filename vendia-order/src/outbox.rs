use std::sync::Arc;

use uuid::Uuid;

use vendia_core::notify::{Notification, NotificationDispatcher};
use vendia_core::realtime::RealtimeTransport;
use vendia_core::repository::OrderStore;
use vendia_shared::models::events::OrderEvent;
use vendia_shared::models::order::OrderStatusEvent;

/// Side effects produced by a transition, delivered after the authoritative
/// status write. History lives here too: a failed append is logged, not
/// rolled into the status write.
#[derive(Debug)]
pub enum Effect {
    AppendHistory(OrderStatusEvent),
    Broadcast { order_id: Uuid, event: OrderEvent },
    Notify(Notification),
}

impl Effect {
    fn kind(&self) -> &'static str {
        match self {
            Effect::AppendHistory(_) => "history_append",
            Effect::Broadcast { .. } => "broadcast",
            Effect::Notify(_) => "notification",
        }
    }
}

/// Delivers an outbox best-effort: every failure is logged and swallowed,
/// the persisted status remains authoritative.
pub struct EffectDispatcher {
    store: Arc<dyn OrderStore>,
    transport: Arc<dyn RealtimeTransport>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl EffectDispatcher {
    pub fn new(
        store: Arc<dyn OrderStore>,
        transport: Arc<dyn RealtimeTransport>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self { store, transport, notifier }
    }

    pub async fn dispatch_all(&self, effects: &[Effect]) {
        for effect in effects {
            let result = match effect {
                Effect::AppendHistory(event) => self.store.append_status_event(event).await,
                Effect::Broadcast { order_id, event } => {
                    self.transport.publish(*order_id, event).await
                }
                Effect::Notify(notification) => self.notifier.dispatch(notification).await,
            };

            if let Err(err) = result {
                tracing::warn!(
                    effect = effect.kind(),
                    error = %err,
                    "best-effort side effect failed, continuing"
                );
            }
        }
    }
}
