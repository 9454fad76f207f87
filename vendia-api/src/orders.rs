use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;
use vendia_core::identity::{Caller, Role};
use vendia_core::repository::{OrderFilter, OrderRecord, Page};
use vendia_order::StatusUpdateOptions;
use vendia_shared::models::order::{Order, OrderItem, OrderStatus, OrderStatusEvent, SubOrder};
use vendia_shared::pii::Masked;

/// Rough transit estimate shown on the order detail once shipped
const ESTIMATED_TRANSIT_DAYS: i64 = 5;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub seller_id: Option<Uuid>,
    pub name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            seller_id: item.seller_id,
            name: item.name.clone(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price_cents,
            line_total_cents: item.line_total_cents(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubOrderSummary {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub subtotal_cents: i64,
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
}

impl From<&SubOrder> for SubOrderSummary {
    fn from(sub: &SubOrder) -> Self {
        Self {
            id: sub.id,
            seller_id: sub.seller_id,
            subtotal_cents: sub.subtotal_cents,
            status: sub.status,
            tracking_number: sub.tracking_number.clone(),
            carrier: sub.carrier.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TimelineEntry {
    pub id: Uuid,
    pub previous_status: OrderStatus,
    pub new_status: OrderStatus,
    pub actor_id: Uuid,
    pub note: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&OrderStatusEvent> for TimelineEntry {
    fn from(event: &OrderStatusEvent) -> Self {
        Self {
            id: event.id,
            previous_status: event.previous_status,
            new_status: event.new_status,
            actor_id: event.actor_id,
            note: event.note.clone(),
            tracking_number: event.tracking_number.clone(),
            carrier: event.carrier.clone(),
            created_at: event.created_at,
        }
    }
}

/// One response contract for both record shapes; `source` tells the caller
/// which table the id matched.
#[derive(Debug, Serialize)]
pub struct OrderDetailResponse {
    pub id: Uuid,
    pub source: &'static str,
    pub parent_order_id: Option<Uuid>,
    pub buyer_id: Option<Uuid>,
    pub seller_id: Option<Uuid>,
    pub buyer_email: Option<Masked<String>>,
    pub status: OrderStatus,
    pub amount_cents: i64,
    pub currency: String,
    pub items: Vec<OrderItemResponse>,
    pub sub_orders: Vec<SubOrderSummary>,
    pub timeline: Vec<TimelineEntry>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub refund_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct OrderSummary {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub currency: String,
    pub item_count: usize,
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
    pub notes: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTrackingRequest {
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateStatusResponse {
    pub id: Uuid,
    pub source: &'static str,
    pub status: OrderStatus,
    pub previous_status: OrderStatus,
    pub sub_orders_created: usize,
    pub earnings_created: usize,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub buyer_id: Uuid,
    pub buyer_email: Option<String>,
    pub currency: Option<String>,
    pub shipping_address: Option<String>,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub items: Vec<CreateOrderItem>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderItem {
    pub product_id: Uuid,
    pub seller_id: Option<Uuid>,
    pub name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

// ============================================================================
// Identity
// ============================================================================

/// The upstream gateway authenticates callers and forwards their identity;
/// the core trusts these headers.
pub fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, AppError> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| {
            AppError::AuthenticationError("missing or invalid x-user-id header".to_string())
        })?;

    let role = headers
        .get("x-user-role")
        .and_then(|v| v.to_str().ok())
        .and_then(Role::parse)
        .ok_or_else(|| {
            AppError::AuthenticationError("missing or invalid x-user-role header".to_string())
        })?;

    Ok(Caller::new(user_id, role))
}

fn can_update_status(caller: &Caller, record: &OrderRecord, new_status: OrderStatus) -> bool {
    match caller.role {
        Role::Admin => true,
        Role::Seller => match record {
            OrderRecord::Sub(sub) => sub.seller_id == caller.user_id,
            OrderRecord::Parent(order) => {
                order.items.iter().any(|i| i.seller_id == Some(caller.user_id))
            }
        },
        // Customers can only cancel their own order
        Role::Customer => {
            new_status == OrderStatus::Cancelled
                && matches!(record, OrderRecord::Parent(o) if o.buyer_id == caller.user_id)
        }
    }
}

fn can_update_tracking(caller: &Caller, record: &OrderRecord) -> bool {
    match caller.role {
        Role::Admin => true,
        Role::Seller => match record {
            OrderRecord::Sub(sub) => sub.seller_id == caller.user_id,
            OrderRecord::Parent(order) => {
                order.items.iter().any(|i| i.seller_id == Some(caller.user_id))
            }
        },
        Role::Customer => false,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /v1/orders/:id
/// Order detail; the id may name a parent order or a seller sub-order
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<OrderDetailResponse>, AppError> {
    let caller = caller_from_headers(&headers)?;

    let record = state
        .store
        .find_record(order_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("order {order_id}")))?;

    match record {
        OrderRecord::Parent(order) => {
            let sub_orders = state.store.list_sub_orders(order.id).await?;
            if !caller.can_view_order(&order, &sub_orders) {
                return Err(AppError::AuthorizationError("no access to this order".to_string()));
            }
            let timeline = state.store.list_status_events(order.id).await?;
            Ok(Json(parent_detail(&order, &sub_orders, &timeline)))
        }
        OrderRecord::Sub(sub) => {
            let parent = state.store.get_order(sub.parent_order_id).await?;
            if !caller.can_view_sub_order(&sub, parent.as_ref().map(|p| p.buyer_id)) {
                return Err(AppError::AuthorizationError("no access to this order".to_string()));
            }
            let timeline = state.store.list_status_events(sub.id).await?;
            Ok(Json(sub_order_detail(&sub, parent.as_ref(), &timeline)))
        }
    }
}

/// GET /v1/orders/:id/timeline
/// Ordered status history for an order or sub-order
pub async fn get_timeline(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Vec<TimelineEntry>>, AppError> {
    let caller = caller_from_headers(&headers)?;

    let record = state
        .store
        .find_record(order_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("order {order_id}")))?;

    let allowed = match &record {
        OrderRecord::Parent(order) => {
            let sub_orders = state.store.list_sub_orders(order.id).await?;
            caller.can_view_order(order, &sub_orders)
        }
        OrderRecord::Sub(sub) => {
            let parent = state.store.get_order(sub.parent_order_id).await?;
            caller.can_view_sub_order(sub, parent.map(|p| p.buyer_id))
        }
    };
    if !allowed {
        return Err(AppError::AuthorizationError("no access to this order".to_string()));
    }

    let events = state.store.list_status_events(order_id).await?;
    Ok(Json(events.iter().map(TimelineEntry::from).collect()))
}

/// GET /v1/orders
/// Paginated, role-scoped listing
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
    headers: HeaderMap,
) -> Result<Json<Page<OrderSummary>>, AppError> {
    let caller = caller_from_headers(&headers)?;

    let status = match query.status.as_deref() {
        Some(raw) => Some(OrderStatus::parse(raw).ok_or_else(|| {
            AppError::ValidationError(format!("unknown order status: {raw}"))
        })?),
        None => None,
    };

    let filter = OrderFilter {
        status,
        search: query.search,
        buyer_id: (caller.role == Role::Customer).then_some(caller.user_id),
        seller_id: (caller.role == Role::Seller).then_some(caller.user_id),
        page: query.page.unwrap_or(1),
        limit: query.limit.unwrap_or(20),
    };

    let page = state.store.list_orders(&filter).await?;
    Ok(Json(Page {
        items: page
            .items
            .iter()
            .map(|o| OrderSummary {
                id: o.id,
                buyer_id: o.buyer_id,
                status: o.status,
                total_cents: o.total_cents,
                currency: o.currency.clone(),
                item_count: o.items.len(),
                tracking_number: o.tracking_number.clone(),
                created_at: o.created_at,
            })
            .collect(),
        total: page.total,
        page: page.page,
        limit: page.limit,
    }))
}

/// PATCH /v1/orders/:id/status
pub async fn update_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<UpdateStatusResponse>, AppError> {
    let caller = caller_from_headers(&headers)?;

    let raw_status = req
        .status
        .as_deref()
        .ok_or_else(|| AppError::ValidationError("status is required".to_string()))?;
    let new_status = OrderStatus::parse(raw_status)
        .ok_or_else(|| AppError::ValidationError(format!("unknown order status: {raw_status}")))?;

    let record = state
        .store
        .find_record(order_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("order {order_id}")))?;
    if !can_update_status(&caller, &record, new_status) {
        return Err(AppError::AuthorizationError(
            "caller may not change this order's status".to_string(),
        ));
    }

    let result = state
        .orchestrator
        .update_status(
            order_id,
            raw_status,
            caller.user_id,
            StatusUpdateOptions { reason: req.reason, notes: req.notes },
        )
        .await?;

    let (sub_orders_created, earnings_created) = result
        .split
        .as_ref()
        .map(|s| (s.sub_orders.len(), s.earnings.len()))
        .unwrap_or((0, 0));

    Ok(Json(UpdateStatusResponse {
        id: result.record.id(),
        source: record_source(&result.record),
        status: result.record.status(),
        previous_status: result.event.previous_status,
        sub_orders_created,
        earnings_created,
    }))
}

/// PATCH /v1/orders/:id/tracking
pub async fn update_tracking(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<UpdateTrackingRequest>,
) -> Result<Json<UpdateStatusResponse>, AppError> {
    let caller = caller_from_headers(&headers)?;

    let tracking_number = req
        .tracking_number
        .as_deref()
        .ok_or_else(|| AppError::ValidationError("tracking_number is required".to_string()))?;
    let carrier = req
        .carrier
        .as_deref()
        .ok_or_else(|| AppError::ValidationError("carrier is required".to_string()))?;

    let record = state
        .store
        .find_record(order_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("order {order_id}")))?;
    if !can_update_tracking(&caller, &record) {
        return Err(AppError::AuthorizationError(
            "caller may not change this order's tracking".to_string(),
        ));
    }

    let result = state
        .orchestrator
        .add_tracking(order_id, tracking_number, carrier, caller.user_id)
        .await?;

    Ok(Json(UpdateStatusResponse {
        id: result.record.id(),
        source: record_source(&result.record),
        status: result.record.status(),
        previous_status: result.event.previous_status,
        sub_orders_created: 0,
        earnings_created: 0,
    }))
}

/// POST /v1/orders
/// Checkout hand-off: the cart service calls this once payment intent
/// capture begins. Admin/system only.
pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderDetailResponse>), AppError> {
    let caller = caller_from_headers(&headers)?;
    if !caller.is_admin() {
        return Err(AppError::AuthorizationError("only system callers create orders".to_string()));
    }
    if req.items.is_empty() {
        return Err(AppError::ValidationError("order must contain at least one item".to_string()));
    }
    for item in &req.items {
        if item.quantity <= 0 {
            return Err(AppError::ValidationError("item quantity must be positive".to_string()));
        }
        if item.unit_price_cents < 0 {
            return Err(AppError::ValidationError("item price must not be negative".to_string()));
        }
    }

    let mut order = Order::new(req.buyer_id);
    order.buyer_email = req.buyer_email;
    if let Some(currency) = req.currency {
        order.currency = currency;
    }
    order.shipping_address = req.shipping_address;
    order.payment_method = req.payment_method;
    order.payment_reference = req.payment_reference;
    for item in req.items {
        order.add_item(OrderItem::new(
            order.id,
            item.product_id,
            item.seller_id,
            item.name,
            item.quantity,
            item.unit_price_cents,
        ));
    }

    state.store.insert_order(&order).await?;
    tracing::info!(order_id = %order.id, buyer_id = %order.buyer_id, "order created");

    Ok((StatusCode::CREATED, Json(parent_detail(&order, &[], &[]))))
}

// ============================================================================
// Response assembly
// ============================================================================

fn record_source(record: &OrderRecord) -> &'static str {
    match record {
        OrderRecord::Parent(_) => "orders",
        OrderRecord::Sub(_) => "sub_orders",
    }
}

fn parent_detail(
    order: &Order,
    sub_orders: &[SubOrder],
    timeline: &[OrderStatusEvent],
) -> OrderDetailResponse {
    OrderDetailResponse {
        id: order.id,
        source: "orders",
        parent_order_id: None,
        buyer_id: Some(order.buyer_id),
        seller_id: None,
        buyer_email: order.buyer_email.clone().map(Masked),
        status: order.status,
        amount_cents: order.total_cents,
        currency: order.currency.clone(),
        items: order.items.iter().map(OrderItemResponse::from).collect(),
        sub_orders: sub_orders.iter().map(SubOrderSummary::from).collect(),
        timeline: timeline.iter().map(TimelineEntry::from).collect(),
        tracking_number: order.tracking_number.clone(),
        carrier: order.carrier.clone(),
        estimated_delivery: order
            .shipped_at
            .map(|t| t + Duration::days(ESTIMATED_TRANSIT_DAYS)),
        refund_reference: order.refund_reference.clone(),
        created_at: order.created_at,
        updated_at: order.updated_at,
        shipped_at: order.shipped_at,
        delivered_at: order.delivered_at,
    }
}

/// Reshape a sub-order into the parent-order response contract
fn sub_order_detail(
    sub: &SubOrder,
    parent: Option<&Order>,
    timeline: &[OrderStatusEvent],
) -> OrderDetailResponse {
    OrderDetailResponse {
        id: sub.id,
        source: "sub_orders",
        parent_order_id: Some(sub.parent_order_id),
        buyer_id: parent.map(|p| p.buyer_id),
        seller_id: Some(sub.seller_id),
        buyer_email: None,
        status: sub.status,
        amount_cents: sub.subtotal_cents,
        currency: parent.map(|p| p.currency.clone()).unwrap_or_else(|| "USD".to_string()),
        items: sub.items.iter().map(OrderItemResponse::from).collect(),
        sub_orders: Vec::new(),
        timeline: timeline.iter().map(TimelineEntry::from).collect(),
        tracking_number: sub.tracking_number.clone(),
        carrier: sub.carrier.clone(),
        estimated_delivery: None,
        refund_reference: parent.and_then(|p| p.refund_reference.clone()),
        created_at: sub.created_at,
        updated_at: sub.updated_at,
        shipped_at: None,
        delivered_at: None,
    }
}
