use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use vendia_core::repository::OrderStore;
use vendia_core::CoreResult;
use vendia_shared::models::earning::Earning;
use vendia_shared::models::order::{Order, OrderItem, SubOrder};

/// Commission parameters, read from configuration at startup. A single
/// global rate applies; there is no per-category or per-seller override.
#[derive(Debug, Clone, Copy)]
pub struct CommissionPolicy {
    pub rate_bps: i64,
    pub holding_days: i64,
}

impl CommissionPolicy {
    pub fn new(rate_bps: i64, holding_days: i64) -> Self {
        Self { rate_bps, holding_days }
    }
}

impl Default for CommissionPolicy {
    fn default() -> Self {
        Self { rate_bps: 1000, holding_days: 7 }
    }
}

/// Round-half-up commission in integer minor units. Each seller group
/// rounds independently; there is no cross-group remainder correction.
pub fn commission_for(gross_cents: i64, rate_bps: i64) -> i64 {
    ((i128::from(gross_cents) * i128::from(rate_bps) + 5_000) / 10_000) as i64
}

/// One seller's slice of a parent order's basket
#[derive(Debug, Clone)]
pub struct SellerGroup {
    pub seller_id: Uuid,
    pub items: Vec<OrderItem>,
    pub gross_cents: i64,
}

/// Partition line items by seller, dropping items with no seller or the
/// nil-UUID placeholder. Groups come back in seller-id order so repeated
/// runs insert in a stable sequence.
pub fn group_by_seller(order: &Order) -> Vec<SellerGroup> {
    let mut by_seller: BTreeMap<Uuid, Vec<OrderItem>> = BTreeMap::new();
    for item in &order.items {
        let Some(seller_id) = item.seller_id else { continue };
        if seller_id.is_nil() {
            continue;
        }
        by_seller.entry(seller_id).or_default().push(item.clone());
    }

    by_seller
        .into_iter()
        .map(|(seller_id, items)| {
            let gross_cents = items.iter().map(|i| i.line_total_cents()).sum();
            SellerGroup { seller_id, items, gross_cents }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct GroupFailure {
    pub seller_id: Uuid,
    pub error: String,
}

/// What a split produced. `failures` lists seller groups whose rows could
/// not be written, with enough detail for a backfill to complete the rest.
#[derive(Debug, Default)]
pub struct SplitReport {
    pub sub_orders: Vec<SubOrder>,
    pub earnings: Vec<Earning>,
    pub skipped_existing: bool,
    pub failures: Vec<GroupFailure>,
}

/// Partitions a paid multi-seller order into sub-orders and per-seller
/// earnings with commission deducted. Runs once per order; re-running for
/// an order that already has earnings is a no-op.
pub struct CommissionSplitter {
    store: Arc<dyn OrderStore>,
    policy: CommissionPolicy,
}

impl CommissionSplitter {
    pub fn new(store: Arc<dyn OrderStore>, policy: CommissionPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn split_and_create_earnings(
        &self,
        order: &Order,
        now: DateTime<Utc>,
    ) -> CoreResult<SplitReport> {
        let existing = self.store.list_earnings_for_order(order.id).await?;
        if !existing.is_empty() {
            tracing::debug!(order_id = %order.id, "earnings already exist, skipping split");
            return Ok(SplitReport { skipped_existing: true, ..SplitReport::default() });
        }

        let available_on = now.date_naive() + Duration::days(self.policy.holding_days);
        let mut report = SplitReport::default();

        for group in group_by_seller(order) {
            let sub_order = SubOrder::new(order.id, group.seller_id, group.items.clone());
            let commission = commission_for(group.gross_cents, self.policy.rate_bps);
            let earning = Earning::new(
                group.seller_id,
                sub_order.id,
                order.id,
                group.gross_cents,
                commission,
                self.policy.rate_bps,
                available_on,
            );

            let written = match self.store.insert_sub_order(&sub_order).await {
                Ok(()) => self.store.insert_earning(&earning).await,
                Err(err) => Err(err),
            };

            match written {
                Ok(()) => {
                    report.sub_orders.push(sub_order);
                    report.earnings.push(earning);
                }
                Err(err) => {
                    tracing::error!(
                        order_id = %order.id,
                        seller_id = %group.seller_id,
                        error = %err,
                        "seller group failed during split, flagged for reconciliation"
                    );
                    report
                        .failures
                        .push(GroupFailure { seller_id: group.seller_id, error: err.to_string() });
                }
            }
        }

        tracing::info!(
            order_id = %order.id,
            sub_orders = report.sub_orders.len(),
            failed_groups = report.failures.len(),
            "order split into seller earnings"
        );
        Ok(report)
    }
}
