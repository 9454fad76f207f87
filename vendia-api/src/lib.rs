use axum::{
    http::Method,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod orders;
pub mod realtime;
pub mod settlement;
pub mod state;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    Router::new()
        .route("/v1/orders", get(orders::list_orders).post(orders::create_order))
        .route("/v1/orders/{id}", get(orders::get_order))
        .route("/v1/orders/{id}/timeline", get(orders::get_timeline))
        .route("/v1/orders/{id}/status", patch(orders::update_status))
        .route("/v1/orders/{id}/tracking", patch(orders::update_tracking))
        .route("/v1/orders/{id}/ws", get(realtime::order_events_ws))
        .route("/v1/settlement/run", post(settlement::run_settlement))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
