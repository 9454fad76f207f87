use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use vendia_core::repository::OrderStore;
use vendia_core::CoreResult;

/// Outcome of one settlement pass
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SettlementReport {
    pub promoted_count: usize,
    pub total_amount_promoted: i64,
}

/// Promotes earnings whose holding window has elapsed from `pending` to
/// `available`. Runs on a daily timer and on operator demand; both paths
/// share the same predicate-scoped update, so overlapping passes are safe.
pub struct SettlementScheduler {
    store: Arc<dyn OrderStore>,
}

impl SettlementScheduler {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    pub async fn run_pass(&self, now: DateTime<Utc>) -> CoreResult<SettlementReport> {
        let promoted = self.store.promote_due_earnings(now.date_naive(), now).await?;

        let report = SettlementReport {
            promoted_count: promoted.len(),
            total_amount_promoted: promoted.iter().map(|e| e.net_cents).sum(),
        };
        tracing::info!(
            promoted = report.promoted_count,
            total_cents = report.total_amount_promoted,
            "settlement pass complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;
    use vendia_shared::models::earning::{Earning, EarningStatus};
    use vendia_store::memory::MemoryOrderStore;

    fn earning_available_on(available_on: chrono::NaiveDate, net: i64) -> Earning {
        // gross chosen so the commission leaves exactly `net`
        let gross = net * 10 / 9;
        Earning::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            gross,
            gross - net,
            1000,
            available_on,
        )
    }

    #[tokio::test]
    async fn test_pass_promotes_only_due_earnings() {
        let store = Arc::new(MemoryOrderStore::new());
        let scheduler = SettlementScheduler::new(store.clone());
        let now = Utc::now();
        let today = now.date_naive();

        let due_yesterday = earning_available_on(today - Duration::days(1), 6750);
        let due_today = earning_available_on(today, 4500);
        let due_tomorrow = earning_available_on(today + Duration::days(1), 9000);
        store.insert_earning(&due_yesterday).await.unwrap();
        store.insert_earning(&due_today).await.unwrap();
        store.insert_earning(&due_tomorrow).await.unwrap();

        let report = scheduler.run_pass(now).await.unwrap();
        assert_eq!(report.promoted_count, 2);
        assert_eq!(report.total_amount_promoted, 6750 + 4500);

        let remaining = store
            .list_earnings_for_order(due_tomorrow.order_id)
            .await
            .unwrap();
        assert_eq!(remaining[0].status, EarningStatus::Pending);
    }

    #[tokio::test]
    async fn test_second_pass_promotes_nothing() {
        let store = Arc::new(MemoryOrderStore::new());
        let scheduler = SettlementScheduler::new(store.clone());
        let now = Utc::now();

        let due = earning_available_on(now.date_naive() - Duration::days(3), 1200);
        store.insert_earning(&due).await.unwrap();

        let first = scheduler.run_pass(now).await.unwrap();
        assert_eq!(first.promoted_count, 1);

        let second = scheduler.run_pass(now).await.unwrap();
        assert_eq!(second.promoted_count, 0);
        assert_eq!(second.total_amount_promoted, 0);

        let rows = store.list_earnings_for_order(due.order_id).await.unwrap();
        assert_eq!(rows[0].status, EarningStatus::Available);
    }
}
