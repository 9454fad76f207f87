use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order status in the fulfillment lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Single validation boundary for inbound status strings.
    pub fn parse(s: &str) -> Option<OrderStatus> {
        OrderStatus::ALL.iter().copied().find(|v| v.as_str() == s)
    }

    /// Strict forward graph: the shipment milestones in order, with
    /// cancellation allowed before shipment and refund from confirmation
    /// onward. Lenient mode bypasses this check entirely.
    pub fn can_progress_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Confirmed) => true,
            (Confirmed, Processing) => true,
            (Processing, Shipped) => true,
            (Shipped, OutForDelivery) => true,
            (OutForDelivery, Delivered) => true,
            (Pending | Confirmed | Processing, Cancelled) => true,
            (Confirmed | Processing | Shipped | OutForDelivery | Delivered, Refunded) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single buyer checkout, possibly spanning multiple sellers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub buyer_email: Option<String>,
    pub items: Vec<OrderItem>,
    pub total_cents: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub shipping_address: Option<String>,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub refund_reference: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(buyer_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            buyer_id,
            buyer_email: None,
            items: Vec::new(),
            total_cents: 0,
            currency: "USD".to_string(),
            status: OrderStatus::Pending,
            shipping_address: None,
            payment_method: None,
            payment_reference: None,
            refund_reference: None,
            tracking_number: None,
            carrier: None,
            created_at: now,
            updated_at: now,
            shipped_at: None,
            delivered_at: None,
        }
    }

    /// Add a line item and keep the order total in sync
    pub fn add_item(&mut self, item: OrderItem) {
        self.total_cents += item.line_total_cents();
        self.items.push(item);
        self.updated_at = Utc::now();
    }

    /// Apply a status change, stamping the milestone timestamps
    pub fn apply_status(&mut self, new_status: OrderStatus, at: DateTime<Utc>) {
        self.status = new_status;
        self.updated_at = at;
        match new_status {
            OrderStatus::Shipped => self.shipped_at = Some(at),
            OrderStatus::Delivered => self.delivered_at = Some(at),
            _ => {}
        }
    }

    pub fn apply_tracking(&mut self, tracking_number: &str, carrier: &str, at: DateTime<Utc>) {
        self.tracking_number = Some(tracking_number.to_string());
        self.carrier = Some(carrier.to_string());
        self.updated_at = at;
    }

    /// Distinct sellers represented in the basket (nil seller ids are
    /// placeholder rows and not counted)
    pub fn seller_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self
            .items
            .iter()
            .filter_map(|i| i.seller_id)
            .filter(|id| !id.is_nil())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// An individual product line within an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub seller_id: Option<Uuid>,
    pub name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn new(
        order_id: Uuid,
        product_id: Uuid,
        seller_id: Option<Uuid>,
        name: String,
        quantity: i32,
        unit_price_cents: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            product_id,
            seller_id,
            name,
            quantity,
            unit_price_cents,
            created_at: Utc::now(),
        }
    }

    pub fn line_total_cents(&self) -> i64 {
        self.unit_price_cents * i64::from(self.quantity)
    }
}

/// The seller-scoped partition of a parent order's line items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubOrder {
    pub id: Uuid,
    pub parent_order_id: Uuid,
    pub seller_id: Uuid,
    pub items: Vec<OrderItem>,
    pub subtotal_cents: i64,
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubOrder {
    pub fn new(parent_order_id: Uuid, seller_id: Uuid, items: Vec<OrderItem>) -> Self {
        let subtotal_cents = items.iter().map(|i| i.line_total_cents()).sum();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            parent_order_id,
            seller_id,
            items,
            subtotal_cents,
            status: OrderStatus::Confirmed,
            tracking_number: None,
            carrier: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply_status(&mut self, new_status: OrderStatus, at: DateTime<Utc>) {
        self.status = new_status;
        self.updated_at = at;
    }

    pub fn apply_tracking(&mut self, tracking_number: &str, carrier: &str, at: DateTime<Utc>) {
        self.tracking_number = Some(tracking_number.to_string());
        self.carrier = Some(carrier.to_string());
        self.updated_at = at;
    }
}

/// Append-only audit record of a status transition. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusEvent {
    pub id: Uuid,
    pub order_id: Uuid,
    pub previous_status: OrderStatus,
    pub new_status: OrderStatus,
    pub actor_id: Uuid,
    pub note: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OrderStatusEvent {
    pub fn new(
        order_id: Uuid,
        previous_status: OrderStatus,
        new_status: OrderStatus,
        actor_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            previous_status,
            new_status,
            actor_id,
            note: None,
            tracking_number: None,
            carrier: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    pub fn with_tracking(mut self, tracking_number: &str, carrier: &str) -> Self {
        self.tracking_number = Some(tracking_number.to_string());
        self.carrier = Some(carrier.to_string());
        self
    }
}
