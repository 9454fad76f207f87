use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vendia_api::{app, realtime::ChannelTransport, settlement, AppState};
use vendia_core::notify::LogDispatcher;
use vendia_core::repository::OrderStore;
use vendia_order::{
    CommissionPolicy, CommissionSplitter, EffectDispatcher, LifecycleOrchestrator,
    SettlementScheduler, TransitionEngine, TransitionPolicy,
};
use vendia_store::{Db, MemoryOrderStore, PgOrderStore};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vendia_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = vendia_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Vendia API on port {}", config.server.port);

    let store: Arc<dyn OrderStore> = if config.database.url.is_empty() {
        tracing::warn!("No database URL configured, using the in-memory store");
        Arc::new(MemoryOrderStore::new())
    } else {
        let db = Db::new(&config.database.url)
            .await
            .expect("Failed to connect to Postgres");
        db.migrate().await.expect("Failed to run migrations");
        Arc::new(PgOrderStore::new(db.pool.clone()))
    };

    let realtime = Arc::new(ChannelTransport::new());

    let policy = TransitionPolicy::parse(&config.marketplace.transition_policy)
        .unwrap_or_default();
    let orchestrator = Arc::new(LifecycleOrchestrator::new(
        TransitionEngine::new(store.clone(), policy),
        EffectDispatcher::new(store.clone(), realtime.clone(), Arc::new(LogDispatcher)),
        CommissionSplitter::new(
            store.clone(),
            CommissionPolicy::new(
                config.marketplace.commission_rate_bps(),
                config.marketplace.holding_period_days,
            ),
        ),
    ));

    let scheduler = Arc::new(SettlementScheduler::new(store.clone()));
    settlement::spawn_settlement_worker(
        scheduler.clone(),
        config.settlement.hour_utc,
        config.settlement.minute_utc,
    );

    let app_state = AppState { store, orchestrator, scheduler, realtime };
    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
