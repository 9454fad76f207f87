pub mod orchestrator;
pub mod outbox;
pub mod settlement;
pub mod splitter;
pub mod transition;

pub use orchestrator::{LifecycleOrchestrator, UpdateResult};
pub use outbox::{Effect, EffectDispatcher};
pub use settlement::{SettlementReport, SettlementScheduler};
pub use splitter::{CommissionPolicy, CommissionSplitter, SplitReport};
pub use transition::{StatusUpdateOptions, TransitionEngine, TransitionOutcome, TransitionPolicy};
