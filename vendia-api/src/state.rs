use std::sync::Arc;

use crate::realtime::ChannelTransport;
use vendia_core::repository::OrderStore;
use vendia_order::{LifecycleOrchestrator, SettlementScheduler};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn OrderStore>,
    pub orchestrator: Arc<LifecycleOrchestrator>,
    pub scheduler: Arc<SettlementScheduler>,
    pub realtime: Arc<ChannelTransport>,
}
