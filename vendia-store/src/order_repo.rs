use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use vendia_core::repository::{OrderFilter, OrderRecord, OrderStore, Page};
use vendia_core::{CoreError, CoreResult};
use vendia_shared::models::earning::{Earning, EarningStatus};
use vendia_shared::models::order::{Order, OrderItem, OrderStatus, OrderStatusEvent, SubOrder};

/// Postgres-backed `OrderStore`. Queries are runtime-bound so the
/// workspace compiles without a live database.
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, order_id: Uuid) -> CoreResult<Vec<OrderItem>> {
        let rows: Vec<OrderItemRow> = sqlx::query_as(
            "SELECT id, order_id, product_id, seller_id, name, quantity, unit_price_cents, created_at \
             FROM order_items WHERE order_id = $1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;

        Ok(rows.into_iter().map(OrderItemRow::into_item).collect())
    }

    async fn load_seller_items(&self, order_id: Uuid, seller_id: Uuid) -> CoreResult<Vec<OrderItem>> {
        let rows: Vec<OrderItemRow> = sqlx::query_as(
            "SELECT id, order_id, product_id, seller_id, name, quantity, unit_price_cents, created_at \
             FROM order_items WHERE order_id = $1 AND seller_id = $2 ORDER BY created_at",
        )
        .bind(order_id)
        .bind(seller_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;

        Ok(rows.into_iter().map(OrderItemRow::into_item).collect())
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    buyer_id: Uuid,
    buyer_email: Option<String>,
    total_cents: i64,
    currency: String,
    status: String,
    shipping_address: Option<String>,
    payment_method: Option<String>,
    payment_reference: Option<String>,
    refund_reference: Option<String>,
    tracking_number: Option<String>,
    carrier: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> CoreResult<Order> {
        Ok(Order {
            id: self.id,
            buyer_id: self.buyer_id,
            buyer_email: self.buyer_email,
            items,
            total_cents: self.total_cents,
            currency: self.currency,
            status: parse_order_status(&self.status)?,
            shipping_address: self.shipping_address,
            payment_method: self.payment_method,
            payment_reference: self.payment_reference,
            refund_reference: self.refund_reference,
            tracking_number: self.tracking_number,
            carrier: self.carrier,
            created_at: self.created_at,
            updated_at: self.updated_at,
            shipped_at: self.shipped_at,
            delivered_at: self.delivered_at,
        })
    }
}

const ORDER_COLUMNS: &str = "id, buyer_id, buyer_email, total_cents, currency, status, \
     shipping_address, payment_method, payment_reference, refund_reference, tracking_number, \
     carrier, created_at, updated_at, shipped_at, delivered_at";

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    seller_id: Option<Uuid>,
    name: String,
    quantity: i32,
    unit_price_cents: i64,
    created_at: DateTime<Utc>,
}

impl OrderItemRow {
    fn into_item(self) -> OrderItem {
        OrderItem {
            id: self.id,
            order_id: self.order_id,
            product_id: self.product_id,
            seller_id: self.seller_id,
            name: self.name,
            quantity: self.quantity,
            unit_price_cents: self.unit_price_cents,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SubOrderRow {
    id: Uuid,
    parent_order_id: Uuid,
    seller_id: Uuid,
    subtotal_cents: i64,
    status: String,
    tracking_number: Option<String>,
    carrier: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SubOrderRow {
    fn into_sub_order(self, items: Vec<OrderItem>) -> CoreResult<SubOrder> {
        Ok(SubOrder {
            id: self.id,
            parent_order_id: self.parent_order_id,
            seller_id: self.seller_id,
            items,
            subtotal_cents: self.subtotal_cents,
            status: parse_order_status(&self.status)?,
            tracking_number: self.tracking_number,
            carrier: self.carrier,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    order_id: Uuid,
    previous_status: String,
    new_status: String,
    actor_id: Uuid,
    note: Option<String>,
    tracking_number: Option<String>,
    carrier: Option<String>,
    created_at: DateTime<Utc>,
}

impl EventRow {
    fn into_event(self) -> CoreResult<OrderStatusEvent> {
        Ok(OrderStatusEvent {
            id: self.id,
            order_id: self.order_id,
            previous_status: parse_order_status(&self.previous_status)?,
            new_status: parse_order_status(&self.new_status)?,
            actor_id: self.actor_id,
            note: self.note,
            tracking_number: self.tracking_number,
            carrier: self.carrier,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EarningRow {
    id: Uuid,
    seller_id: Uuid,
    sub_order_id: Uuid,
    order_id: Uuid,
    gross_cents: i64,
    commission_cents: i64,
    commission_rate_bps: i64,
    net_cents: i64,
    status: String,
    available_on: NaiveDate,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EarningRow {
    fn into_earning(self) -> CoreResult<Earning> {
        let status = EarningStatus::parse(&self.status).ok_or_else(|| {
            CoreError::Internal(format!("unrecognized earning status in storage: {}", self.status))
        })?;
        Ok(Earning {
            id: self.id,
            seller_id: self.seller_id,
            sub_order_id: self.sub_order_id,
            order_id: self.order_id,
            gross_cents: self.gross_cents,
            commission_cents: self.commission_cents,
            commission_rate_bps: self.commission_rate_bps,
            net_cents: self.net_cents,
            status,
            available_on: self.available_on,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const EARNING_COLUMNS: &str = "id, seller_id, sub_order_id, order_id, gross_cents, \
     commission_cents, commission_rate_bps, net_cents, status, available_on, created_at, updated_at";

fn parse_order_status(s: &str) -> CoreResult<OrderStatus> {
    OrderStatus::parse(s)
        .ok_or_else(|| CoreError::Internal(format!("unrecognized order status in storage: {s}")))
}

fn internal(err: sqlx::Error) -> CoreError {
    CoreError::Internal(err.to_string())
}

fn write_error(err: sqlx::Error) -> CoreError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return CoreError::Conflict(db_err.to_string());
        }
    }
    CoreError::Internal(err.to_string())
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert_order(&self, order: &Order) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(internal)?;

        sqlx::query(
            "INSERT INTO orders (id, buyer_id, buyer_email, total_cents, currency, status, \
             shipping_address, payment_method, payment_reference, refund_reference, \
             tracking_number, carrier, created_at, updated_at, shipped_at, delivered_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(order.id)
        .bind(order.buyer_id)
        .bind(&order.buyer_email)
        .bind(order.total_cents)
        .bind(&order.currency)
        .bind(order.status.as_str())
        .bind(&order.shipping_address)
        .bind(&order.payment_method)
        .bind(&order.payment_reference)
        .bind(&order.refund_reference)
        .bind(&order.tracking_number)
        .bind(&order.carrier)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .execute(&mut *tx)
        .await
        .map_err(write_error)?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, seller_id, name, quantity, \
                 unit_price_cents, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(item.id)
            .bind(order.id)
            .bind(item.product_id)
            .bind(item.seller_id)
            .bind(&item.name)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;
        }

        tx.commit().await.map_err(internal)?;
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?;

        match row {
            Some(row) => {
                let items = self.load_items(id).await?;
                Ok(Some(row.into_order(items)?))
            }
            None => Ok(None),
        }
    }

    async fn find_record(&self, id: Uuid) -> CoreResult<Option<OrderRecord>> {
        if let Some(order) = self.get_order(id).await? {
            return Ok(Some(OrderRecord::Parent(order)));
        }

        let row: Option<SubOrderRow> = sqlx::query_as(
            "SELECT id, parent_order_id, seller_id, subtotal_cents, status, tracking_number, \
             carrier, created_at, updated_at FROM sub_orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;

        match row {
            Some(row) => {
                let items = self.load_seller_items(row.parent_order_id, row.seller_id).await?;
                Ok(Some(OrderRecord::Sub(row.into_sub_order(items)?)))
            }
            None => Ok(None),
        }
    }

    async fn update_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE orders SET status = $1, updated_at = $2, \
             shipped_at = CASE WHEN $1 = 'shipped' THEN $2 ELSE shipped_at END, \
             delivered_at = CASE WHEN $1 = 'delivered' THEN $2 ELSE delivered_at END \
             WHERE id = $3",
        )
        .bind(status.as_str())
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(internal)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("order {id}")));
        }
        Ok(())
    }

    async fn update_order_tracking(
        &self,
        id: Uuid,
        tracking_number: &str,
        carrier: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE orders SET tracking_number = $1, carrier = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(tracking_number)
        .bind(carrier)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(internal)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("order {id}")));
        }
        Ok(())
    }

    async fn update_sub_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let result =
            sqlx::query("UPDATE sub_orders SET status = $1, updated_at = $2 WHERE id = $3")
                .bind(status.as_str())
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(internal)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("sub-order {id}")));
        }
        Ok(())
    }

    async fn update_sub_order_tracking(
        &self,
        id: Uuid,
        tracking_number: &str,
        carrier: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE sub_orders SET tracking_number = $1, carrier = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(tracking_number)
        .bind(carrier)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(internal)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("sub-order {id}")));
        }
        Ok(())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> CoreResult<Page<Order>> {
        fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
            if let Some(status) = filter.status {
                qb.push(" AND status = ").push_bind(status.as_str());
            }
            if let Some(buyer_id) = filter.buyer_id {
                qb.push(" AND buyer_id = ").push_bind(buyer_id);
            }
            if let Some(seller_id) = filter.seller_id {
                qb.push(" AND (EXISTS (SELECT 1 FROM order_items i WHERE i.order_id = orders.id AND i.seller_id = ")
                    .push_bind(seller_id)
                    .push(") OR EXISTS (SELECT 1 FROM sub_orders s WHERE s.parent_order_id = orders.id AND s.seller_id = ")
                    .push_bind(seller_id)
                    .push("))");
            }
            if let Some(search) = &filter.search {
                let pattern = format!("%{search}%");
                qb.push(" AND (id::text ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR tracking_number ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR payment_reference ILIKE ")
                    .push_bind(pattern)
                    .push(")");
            }
        }

        let mut count_qb =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders WHERE 1 = 1");
        push_filters(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE 1 = 1"
        ));
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(i64::from(filter.limit()))
            .push(" OFFSET ")
            .push_bind(filter.offset() as i64);

        let rows: Vec<OrderRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let order_items = self.load_items(row.id).await?;
            items.push(row.into_order(order_items)?);
        }

        Ok(Page {
            items,
            total: total as u64,
            page: filter.page(),
            limit: filter.limit(),
        })
    }

    async fn append_status_event(&self, event: &OrderStatusEvent) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO order_status_events (id, order_id, previous_status, new_status, \
             actor_id, note, tracking_number, carrier, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(event.id)
        .bind(event.order_id)
        .bind(event.previous_status.as_str())
        .bind(event.new_status.as_str())
        .bind(event.actor_id)
        .bind(&event.note)
        .bind(&event.tracking_number)
        .bind(&event.carrier)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn list_status_events(&self, order_id: Uuid) -> CoreResult<Vec<OrderStatusEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT id, order_id, previous_status, new_status, actor_id, note, tracking_number, \
             carrier, created_at FROM order_status_events WHERE order_id = $1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    async fn insert_sub_order(&self, sub_order: &SubOrder) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO sub_orders (id, parent_order_id, seller_id, subtotal_cents, status, \
             tracking_number, carrier, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(sub_order.id)
        .bind(sub_order.parent_order_id)
        .bind(sub_order.seller_id)
        .bind(sub_order.subtotal_cents)
        .bind(sub_order.status.as_str())
        .bind(&sub_order.tracking_number)
        .bind(&sub_order.carrier)
        .bind(sub_order.created_at)
        .bind(sub_order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn list_sub_orders(&self, parent_order_id: Uuid) -> CoreResult<Vec<SubOrder>> {
        let rows: Vec<SubOrderRow> = sqlx::query_as(
            "SELECT id, parent_order_id, seller_id, subtotal_cents, status, tracking_number, \
             carrier, created_at, updated_at FROM sub_orders \
             WHERE parent_order_id = $1 ORDER BY seller_id",
        )
        .bind(parent_order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;

        let mut subs = Vec::with_capacity(rows.len());
        for row in rows {
            let items = self.load_seller_items(row.parent_order_id, row.seller_id).await?;
            subs.push(row.into_sub_order(items)?);
        }
        Ok(subs)
    }

    async fn insert_earning(&self, earning: &Earning) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO earnings (id, seller_id, sub_order_id, order_id, gross_cents, \
             commission_cents, commission_rate_bps, net_cents, status, available_on, \
             created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(earning.id)
        .bind(earning.seller_id)
        .bind(earning.sub_order_id)
        .bind(earning.order_id)
        .bind(earning.gross_cents)
        .bind(earning.commission_cents)
        .bind(earning.commission_rate_bps)
        .bind(earning.net_cents)
        .bind(earning.status.as_str())
        .bind(earning.available_on)
        .bind(earning.created_at)
        .bind(earning.updated_at)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn list_earnings_for_order(&self, order_id: Uuid) -> CoreResult<Vec<Earning>> {
        let rows: Vec<EarningRow> = sqlx::query_as(&format!(
            "SELECT {EARNING_COLUMNS} FROM earnings WHERE order_id = $1 ORDER BY seller_id"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;

        rows.into_iter().map(EarningRow::into_earning).collect()
    }

    async fn promote_due_earnings(
        &self,
        as_of: NaiveDate,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<Earning>> {
        // One predicate-scoped update: a concurrent pass sees zero
        // remaining rows, which is what makes overlapping runs idempotent.
        let rows: Vec<EarningRow> = sqlx::query_as(&format!(
            "UPDATE earnings SET status = 'available', updated_at = $2 \
             WHERE status = 'pending' AND available_on <= $1 \
             RETURNING {EARNING_COLUMNS}"
        ))
        .bind(as_of)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;

        rows.into_iter().map(EarningRow::into_earning).collect()
    }
}
