use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, Json};
use chrono::{DateTime, Duration, Utc};

use crate::error::AppError;
use crate::orders::caller_from_headers;
use crate::state::AppState;
use vendia_order::{SettlementReport, SettlementScheduler};

/// POST /v1/settlement/run
/// Operator-triggered settlement pass. Safe to race the daily timer: both
/// run the same predicate-scoped promotion.
pub async fn run_settlement(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SettlementReport>, AppError> {
    let caller = caller_from_headers(&headers)?;
    if !caller.is_admin() {
        return Err(AppError::AuthorizationError(
            "settlement runs are operator-only".to_string(),
        ));
    }

    let report = state.scheduler.run_pass(Utc::now()).await?;
    Ok(Json(report))
}

/// Spawn the daily settlement worker. A failed pass is logged and retried
/// at the next scheduled instant; pending rows are picked up then.
pub fn spawn_settlement_worker(scheduler: Arc<SettlementScheduler>, hour_utc: u32, minute_utc: u32) {
    let hour = hour_utc.min(23);
    let minute = minute_utc.min(59);

    tokio::spawn(async move {
        tracing::info!(hour, minute, "settlement worker started (daily, UTC)");
        loop {
            let now = Utc::now();
            let next = next_run_after(now, hour, minute);
            let wait = (next - now)
                .to_std()
                .unwrap_or_else(|_| std::time::Duration::from_secs(60));
            tokio::time::sleep(wait).await;

            if let Err(err) = scheduler.run_pass(Utc::now()).await {
                tracing::error!(error = %err, "settlement pass failed, retrying at next tick");
            }
        }
    });
}

fn next_run_after(now: DateTime<Utc>, hour: u32, minute: u32) -> DateTime<Utc> {
    let today = now
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .expect("clamped settlement instant is valid")
        .and_utc();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}
