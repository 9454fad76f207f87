use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreResult;
use vendia_shared::models::earning::Earning;
use vendia_shared::models::order::{Order, OrderStatus, OrderStatusEvent, SubOrder};

/// A single id can name either a parent order or a seller sub-order.
/// Lookups return this union so callers handle both shapes explicitly
/// instead of relying on a not-found fallback between two tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum OrderRecord {
    #[serde(rename = "orders")]
    Parent(Order),
    #[serde(rename = "sub_orders")]
    Sub(SubOrder),
}

impl OrderRecord {
    pub fn id(&self) -> Uuid {
        match self {
            OrderRecord::Parent(o) => o.id,
            OrderRecord::Sub(s) => s.id,
        }
    }

    pub fn status(&self) -> OrderStatus {
        match self {
            OrderRecord::Parent(o) => o.status,
            OrderRecord::Sub(s) => s.status,
        }
    }
}

/// Listing filter; role scoping is expressed through `buyer_id`/`seller_id`
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub search: Option<String>,
    pub buyer_id: Option<Uuid>,
    pub seller_id: Option<Uuid>,
    pub page: u32,
    pub limit: u32,
}

impl OrderFilter {
    pub fn page(&self) -> u32 {
        self.page.max(1)
    }

    pub fn limit(&self) -> u32 {
        match self.limit {
            0 => 20,
            n => n.min(100),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.limit())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

/// Persistence port over orders, sub-orders, status history and earnings
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: &Order) -> CoreResult<()>;

    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>>;

    /// Parent-or-sub union lookup by a single id
    async fn find_record(&self, id: Uuid) -> CoreResult<Option<OrderRecord>>;

    async fn update_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<()>;

    async fn update_order_tracking(
        &self,
        id: Uuid,
        tracking_number: &str,
        carrier: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()>;

    async fn update_sub_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<()>;

    async fn update_sub_order_tracking(
        &self,
        id: Uuid,
        tracking_number: &str,
        carrier: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()>;

    async fn list_orders(&self, filter: &OrderFilter) -> CoreResult<Page<Order>>;

    /// Append to the audit timeline. The timeline is append-only; there is
    /// deliberately no update or delete counterpart.
    async fn append_status_event(&self, event: &OrderStatusEvent) -> CoreResult<()>;

    /// Timeline for an order or sub-order id, oldest first
    async fn list_status_events(&self, order_id: Uuid) -> CoreResult<Vec<OrderStatusEvent>>;

    async fn insert_sub_order(&self, sub_order: &SubOrder) -> CoreResult<()>;

    async fn list_sub_orders(&self, parent_order_id: Uuid) -> CoreResult<Vec<SubOrder>>;

    async fn insert_earning(&self, earning: &Earning) -> CoreResult<()>;

    async fn list_earnings_for_order(&self, order_id: Uuid) -> CoreResult<Vec<Earning>>;

    /// Promote every earning with `status = pending AND available_on <=
    /// as_of` to `available`, stamping `updated_at = now`, and return the
    /// promoted rows. The predicate scoping makes concurrent passes
    /// idempotent: a racing invocation finds zero additional rows.
    async fn promote_due_earnings(
        &self,
        as_of: NaiveDate,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<Earning>>;
}
