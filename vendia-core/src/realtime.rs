use async_trait::async_trait;
use uuid::Uuid;

use crate::CoreResult;
use vendia_shared::models::events::OrderEvent;

/// Port to the realtime push transport. Injected into the effect
/// dispatcher; there is no process-global handle. Delivery is best-effort
/// and a publish must never fail the primary operation.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn publish(&self, order_id: Uuid, event: &OrderEvent) -> CoreResult<()>;
}

/// Transport used in tests and before startup wiring completes: publishing
/// is a silent no-op.
pub struct NoopTransport;

#[async_trait]
impl RealtimeTransport for NoopTransport {
    async fn publish(&self, _order_id: Uuid, _event: &OrderEvent) -> CoreResult<()> {
        Ok(())
    }
}
