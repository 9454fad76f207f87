use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use vendia_core::repository::{OrderFilter, OrderRecord, OrderStore, Page};
use vendia_core::{CoreError, CoreResult};
use vendia_shared::models::earning::{Earning, EarningStatus};
use vendia_shared::models::order::{Order, OrderStatus, OrderStatusEvent, SubOrder};

#[derive(Default)]
struct Inner {
    orders: HashMap<Uuid, Order>,
    sub_orders: HashMap<Uuid, SubOrder>,
    events: Vec<OrderStatusEvent>,
    earnings: HashMap<Uuid, Earning>,
}

/// In-memory `OrderStore` over HashMaps behind one RwLock. Backs tests and
/// database-less runs; every write is atomic under the lock, which gives
/// the same promotion semantics as the predicate-scoped SQL update.
pub struct MemoryOrderStore {
    inner: RwLock<Inner>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Inner::default()) }
    }
}

impl Default for MemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_search(order: &Order, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    let hit = |v: &Option<String>| {
        v.as_deref()
            .map(|s| s.to_lowercase().contains(&needle))
            .unwrap_or(false)
    };
    order.id.to_string().contains(&needle)
        || hit(&order.tracking_number)
        || hit(&order.payment_reference)
        || hit(&order.buyer_email)
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert_order(&self, order: &Order) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.orders.contains_key(&order.id) {
            return Err(CoreError::Conflict(format!("order {} already exists", order.id)));
        }
        inner.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>> {
        let inner = self.inner.read().await;
        Ok(inner.orders.get(&id).cloned())
    }

    async fn find_record(&self, id: Uuid) -> CoreResult<Option<OrderRecord>> {
        let inner = self.inner.read().await;
        if let Some(order) = inner.orders.get(&id) {
            return Ok(Some(OrderRecord::Parent(order.clone())));
        }
        Ok(inner.sub_orders.get(&id).cloned().map(OrderRecord::Sub))
    }

    async fn update_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        let order = inner
            .orders
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("order {id}")))?;
        order.apply_status(status, now);
        Ok(())
    }

    async fn update_order_tracking(
        &self,
        id: Uuid,
        tracking_number: &str,
        carrier: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        let order = inner
            .orders
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("order {id}")))?;
        order.apply_tracking(tracking_number, carrier, now);
        Ok(())
    }

    async fn update_sub_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        let sub = inner
            .sub_orders
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("sub-order {id}")))?;
        sub.apply_status(status, now);
        Ok(())
    }

    async fn update_sub_order_tracking(
        &self,
        id: Uuid,
        tracking_number: &str,
        carrier: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        let sub = inner
            .sub_orders
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("sub-order {id}")))?;
        sub.apply_tracking(tracking_number, carrier, now);
        Ok(())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> CoreResult<Page<Order>> {
        let inner = self.inner.read().await;

        let mut matches: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| filter.status.map(|s| o.status == s).unwrap_or(true))
            .filter(|o| filter.buyer_id.map(|b| o.buyer_id == b).unwrap_or(true))
            .filter(|o| {
                filter
                    .seller_id
                    .map(|sid| {
                        o.items.iter().any(|i| i.seller_id == Some(sid))
                            || inner
                                .sub_orders
                                .values()
                                .any(|s| s.parent_order_id == o.id && s.seller_id == sid)
                    })
                    .unwrap_or(true)
            })
            .filter(|o| {
                filter
                    .search
                    .as_deref()
                    .map(|needle| matches_search(o, needle))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matches.len() as u64;
        let items = matches
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .collect();

        Ok(Page { items, total, page: filter.page(), limit: filter.limit() })
    }

    async fn append_status_event(&self, event: &OrderStatusEvent) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.events.push(event.clone());
        Ok(())
    }

    async fn list_status_events(&self, order_id: Uuid) -> CoreResult<Vec<OrderStatusEvent>> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn insert_sub_order(&self, sub_order: &SubOrder) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        let duplicate = inner.sub_orders.values().any(|s| {
            s.parent_order_id == sub_order.parent_order_id && s.seller_id == sub_order.seller_id
        });
        if duplicate || inner.sub_orders.contains_key(&sub_order.id) {
            return Err(CoreError::Conflict(format!(
                "sub-order for seller {} on order {} already exists",
                sub_order.seller_id, sub_order.parent_order_id
            )));
        }
        inner.sub_orders.insert(sub_order.id, sub_order.clone());
        Ok(())
    }

    async fn list_sub_orders(&self, parent_order_id: Uuid) -> CoreResult<Vec<SubOrder>> {
        let inner = self.inner.read().await;
        let mut subs: Vec<SubOrder> = inner
            .sub_orders
            .values()
            .filter(|s| s.parent_order_id == parent_order_id)
            .cloned()
            .collect();
        subs.sort_by_key(|s| s.seller_id);
        Ok(subs)
    }

    async fn insert_earning(&self, earning: &Earning) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        let duplicate = inner.earnings.values().any(|e| {
            e.seller_id == earning.seller_id && e.sub_order_id == earning.sub_order_id
        });
        if duplicate || inner.earnings.contains_key(&earning.id) {
            return Err(CoreError::Conflict(format!(
                "earning for seller {} on sub-order {} already exists",
                earning.seller_id, earning.sub_order_id
            )));
        }
        inner.earnings.insert(earning.id, earning.clone());
        Ok(())
    }

    async fn list_earnings_for_order(&self, order_id: Uuid) -> CoreResult<Vec<Earning>> {
        let inner = self.inner.read().await;
        let mut earnings: Vec<Earning> = inner
            .earnings
            .values()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect();
        earnings.sort_by_key(|e| e.seller_id);
        Ok(earnings)
    }

    async fn promote_due_earnings(
        &self,
        as_of: NaiveDate,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<Earning>> {
        let mut inner = self.inner.write().await;
        let mut promoted = Vec::new();
        for earning in inner.earnings.values_mut() {
            if earning.status == EarningStatus::Pending && earning.available_on <= as_of {
                earning.status = EarningStatus::Available;
                earning.updated_at = now;
                promoted.push(earning.clone());
            }
        }
        promoted.sort_by_key(|e| e.seller_id);
        Ok(promoted)
    }
}
