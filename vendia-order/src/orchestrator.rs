use chrono::Utc;
use uuid::Uuid;

use crate::outbox::EffectDispatcher;
use crate::splitter::{CommissionSplitter, SplitReport};
use crate::transition::{StatusUpdateOptions, TransitionEngine};
use vendia_core::repository::OrderRecord;
use vendia_core::CoreResult;
use vendia_shared::models::order::{OrderStatus, OrderStatusEvent};

/// Result of a lifecycle mutation: the updated record, the audit event,
/// and the split report when the change confirmed payment.
#[derive(Debug)]
pub struct UpdateResult {
    pub record: OrderRecord,
    pub event: OrderStatusEvent,
    pub split: Option<SplitReport>,
}

/// Composes the transition engine with effect delivery and the one-time
/// commission split. `confirmed` is the payment-confirmed state; a parent
/// order entering it is partitioned into seller earnings synchronously,
/// within the triggering request.
pub struct LifecycleOrchestrator {
    engine: TransitionEngine,
    dispatcher: EffectDispatcher,
    splitter: CommissionSplitter,
}

impl LifecycleOrchestrator {
    pub fn new(
        engine: TransitionEngine,
        dispatcher: EffectDispatcher,
        splitter: CommissionSplitter,
    ) -> Self {
        Self { engine, dispatcher, splitter }
    }

    pub async fn update_status(
        &self,
        id: Uuid,
        new_status_raw: &str,
        actor_id: Uuid,
        opts: StatusUpdateOptions,
    ) -> CoreResult<UpdateResult> {
        let outcome = self.engine.update_status(id, new_status_raw, actor_id, opts).await?;
        self.dispatcher.dispatch_all(&outcome.effects).await;

        let split = match &outcome.record {
            OrderRecord::Parent(order) if order.status == OrderStatus::Confirmed => {
                Some(self.splitter.split_and_create_earnings(order, Utc::now()).await?)
            }
            _ => None,
        };

        Ok(UpdateResult { record: outcome.record, event: outcome.event, split })
    }

    pub async fn add_tracking(
        &self,
        id: Uuid,
        tracking_number: &str,
        carrier: &str,
        actor_id: Uuid,
    ) -> CoreResult<UpdateResult> {
        let outcome = self.engine.add_tracking(id, tracking_number, carrier, actor_id).await?;
        self.dispatcher.dispatch_all(&outcome.effects).await;
        Ok(UpdateResult { record: outcome.record, event: outcome.event, split: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splitter::CommissionPolicy;
    use crate::transition::TransitionPolicy;
    use std::sync::Arc;
    use vendia_core::notify::LogDispatcher;
    use vendia_core::realtime::NoopTransport;
    use vendia_core::repository::OrderStore;
    use vendia_shared::models::order::{Order, OrderItem};
    use vendia_store::memory::MemoryOrderStore;

    fn orchestrator(store: Arc<MemoryOrderStore>) -> LifecycleOrchestrator {
        LifecycleOrchestrator::new(
            TransitionEngine::new(store.clone(), TransitionPolicy::Lenient),
            EffectDispatcher::new(store.clone(), Arc::new(NoopTransport), Arc::new(LogDispatcher)),
            CommissionSplitter::new(store, CommissionPolicy::new(1000, 7)),
        )
    }

    async fn seed_two_seller_order(store: &MemoryOrderStore) -> Order {
        let mut order = Order::new(Uuid::new_v4());
        order.add_item(OrderItem::new(
            order.id,
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            "Brass Hook".to_string(),
            3,
            2500,
        ));
        order.add_item(OrderItem::new(
            order.id,
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            "Oak Shelf".to_string(),
            1,
            7500,
        ));
        store.insert_order(&order).await.unwrap();
        order
    }

    #[tokio::test]
    async fn test_confirming_payment_splits_the_order() {
        let store = Arc::new(MemoryOrderStore::new());
        let orch = orchestrator(store.clone());
        let order = seed_two_seller_order(&store).await;

        let result = orch
            .update_status(order.id, "confirmed", Uuid::new_v4(), StatusUpdateOptions::default())
            .await
            .unwrap();

        let split = result.split.expect("confirmation should trigger the split");
        assert_eq!(split.sub_orders.len(), 2);
        assert_eq!(split.earnings.len(), 2);
        assert_eq!(store.list_sub_orders(order.id).await.unwrap().len(), 2);

        // History was appended through the outbox
        let timeline = store.list_status_events(order.id).await.unwrap();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].previous_status, OrderStatus::Pending);
        assert_eq!(timeline[0].new_status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_reconfirming_does_not_duplicate_earnings() {
        let store = Arc::new(MemoryOrderStore::new());
        let orch = orchestrator(store.clone());
        let order = seed_two_seller_order(&store).await;
        let actor = Uuid::new_v4();

        orch.update_status(order.id, "confirmed", actor, StatusUpdateOptions::default())
            .await
            .unwrap();
        let second = orch
            .update_status(order.id, "confirmed", actor, StatusUpdateOptions::default())
            .await
            .unwrap();

        assert!(second.split.unwrap().skipped_existing);
        assert_eq!(store.list_earnings_for_order(order.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_non_payment_transitions_do_not_split() {
        let store = Arc::new(MemoryOrderStore::new());
        let orch = orchestrator(store.clone());
        let order = seed_two_seller_order(&store).await;

        let result = orch
            .update_status(order.id, "processing", Uuid::new_v4(), StatusUpdateOptions::default())
            .await
            .unwrap();
        assert!(result.split.is_none());
        assert!(store.list_earnings_for_order(order.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sub_order_transition_appends_to_its_own_timeline() {
        let store = Arc::new(MemoryOrderStore::new());
        let orch = orchestrator(store.clone());
        let order = seed_two_seller_order(&store).await;
        let actor = Uuid::new_v4();

        orch.update_status(order.id, "confirmed", actor, StatusUpdateOptions::default())
            .await
            .unwrap();
        let subs = store.list_sub_orders(order.id).await.unwrap();
        let sub_id = subs[0].id;

        let result = orch
            .update_status(sub_id, "shipped", actor, StatusUpdateOptions::default())
            .await
            .unwrap();
        assert!(matches!(result.record, OrderRecord::Sub(_)));
        assert!(result.split.is_none());

        let timeline = store.list_status_events(sub_id).await.unwrap();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].new_status, OrderStatus::Shipped);
    }

    #[tokio::test]
    async fn test_each_call_appends_exactly_one_event() {
        let store = Arc::new(MemoryOrderStore::new());
        let orch = orchestrator(store.clone());
        let order = seed_two_seller_order(&store).await;
        let actor = Uuid::new_v4();

        for (i, status) in ["confirmed", "processing", "shipped"].into_iter().enumerate() {
            orch.update_status(order.id, status, actor, StatusUpdateOptions::default())
                .await
                .unwrap();
            let timeline = store.list_status_events(order.id).await.unwrap();
            assert_eq!(timeline.len(), i + 1);
        }

        let timeline = store.list_status_events(order.id).await.unwrap();
        assert_eq!(timeline[2].previous_status, OrderStatus::Processing);
        assert_eq!(timeline[2].new_status, OrderStatus::Shipped);
    }
}
