use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use vendia_api::realtime::ChannelTransport;
use vendia_api::{app, AppState};
use vendia_core::notify::LogDispatcher;
use vendia_core::repository::OrderStore;
use vendia_order::{
    CommissionPolicy, CommissionSplitter, EffectDispatcher, LifecycleOrchestrator,
    SettlementScheduler, TransitionEngine, TransitionPolicy,
};
use vendia_shared::models::order::{Order, OrderItem};
use vendia_store::MemoryOrderStore;

fn build_app() -> (Router, Arc<MemoryOrderStore>) {
    let store = Arc::new(MemoryOrderStore::new());
    let store_dyn: Arc<dyn OrderStore> = store.clone();
    let realtime = Arc::new(ChannelTransport::new());

    let orchestrator = LifecycleOrchestrator::new(
        TransitionEngine::new(store_dyn.clone(), TransitionPolicy::Lenient),
        EffectDispatcher::new(store_dyn.clone(), realtime.clone(), Arc::new(LogDispatcher)),
        CommissionSplitter::new(store_dyn.clone(), CommissionPolicy::new(1000, 7)),
    );
    let scheduler = SettlementScheduler::new(store_dyn.clone());

    let state = AppState {
        store: store_dyn,
        orchestrator: Arc::new(orchestrator),
        scheduler: Arc::new(scheduler),
        realtime,
    };
    (app(state), store)
}

async fn seed_two_seller_order(store: &MemoryOrderStore, buyer: Uuid) -> Order {
    let mut order = Order::new(buyer);
    order.add_item(OrderItem::new(
        order.id,
        Uuid::new_v4(),
        Some(Uuid::new_v4()),
        "Cast Iron Skillet".to_string(),
        1,
        7500,
    ));
    order.add_item(OrderItem::new(
        order.id,
        Uuid::new_v4(),
        Some(Uuid::new_v4()),
        "Copper Kettle".to_string(),
        1,
        7500,
    ));
    store.insert_order(&order).await.unwrap();
    order
}

fn request(method: &str, uri: &str, user: Uuid, role: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", user.to_string())
        .header("x-user-role", role)
        .header("content-type", "application/json");
    match body {
        Some(body) => builder.body(Body::from(serde_json::to_vec(&body).unwrap())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_get_order_returns_union_for_parent_and_sub_ids() {
    let (app, store) = build_app();
    let buyer = Uuid::new_v4();
    let admin = Uuid::new_v4();
    let order = seed_two_seller_order(&store, buyer).await;

    // Confirm payment so the splitter creates the sub-orders
    let (status, _) = send(
        &app,
        request(
            "PATCH",
            &format!("/v1/orders/{}/status", order.id),
            admin,
            "admin",
            Some(json!({"status": "confirmed"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        request("GET", &format!("/v1/orders/{}", order.id), buyer, "customer", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "orders");
    assert_eq!(body["sub_orders"].as_array().unwrap().len(), 2);
    assert_eq!(body["amount_cents"], 15000);

    // The same endpoint serves a sub-order id, reshaped into the parent
    // contract instead of a 404
    let sub_id = body["sub_orders"][0]["id"].as_str().unwrap().to_string();
    let (status, body) = send(
        &app,
        request("GET", &format!("/v1/orders/{sub_id}"), buyer, "customer", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "sub_orders");
    assert_eq!(body["parent_order_id"].as_str().unwrap(), order.id.to_string());
    assert_eq!(body["amount_cents"], 7500);
}

#[tokio::test]
async fn test_get_order_is_scoped_to_the_buyer() {
    let (app, store) = build_app();
    let order = seed_two_seller_order(&store, Uuid::new_v4()).await;

    let (status, _) = send(
        &app,
        request("GET", &format!("/v1/orders/{}", order.id), Uuid::new_v4(), "customer", None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        request("GET", &format!("/v1/orders/{}", order.id), Uuid::new_v4(), "admin", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_get_order_unknown_id_is_404() {
    let (app, _) = build_app();
    let (status, _) = send(
        &app,
        request("GET", &format!("/v1/orders/{}", Uuid::new_v4()), Uuid::new_v4(), "admin", None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_patch_status_rejects_unknown_status() {
    let (app, store) = build_app();
    let admin = Uuid::new_v4();
    let order = seed_two_seller_order(&store, Uuid::new_v4()).await;

    let (status, body) = send(
        &app,
        request(
            "PATCH",
            &format!("/v1/orders/{}/status", order.id),
            admin,
            "admin",
            Some(json!({"status": "bogus_status"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("bogus_status"));

    // Nothing was persisted or appended
    assert!(store.list_status_events(order.id).await.unwrap().is_empty());

    let (status, _) = send(
        &app,
        request(
            "PATCH",
            &format!("/v1/orders/{}/status", order.id),
            admin,
            "admin",
            Some(json!({"notes": "no status field"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_updates_build_the_timeline() {
    let (app, store) = build_app();
    let buyer = Uuid::new_v4();
    let admin = Uuid::new_v4();
    let order = seed_two_seller_order(&store, buyer).await;

    for status_name in ["confirmed", "processing", "shipped"] {
        let (status, _) = send(
            &app,
            request(
                "PATCH",
                &format!("/v1/orders/{}/status", order.id),
                admin,
                "admin",
                Some(json!({"status": status_name})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(
        &app,
        request("GET", &format!("/v1/orders/{}/timeline", order.id), buyer, "customer", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let timeline = body.as_array().unwrap();
    assert_eq!(timeline.len(), 3);
    assert_eq!(timeline[2]["previous_status"], "processing");
    assert_eq!(timeline[2]["new_status"], "shipped");
}

#[tokio::test]
async fn test_confirming_payment_reports_created_earnings() {
    let (app, store) = build_app();
    let admin = Uuid::new_v4();
    let order = seed_two_seller_order(&store, Uuid::new_v4()).await;

    let (status, body) = send(
        &app,
        request(
            "PATCH",
            &format!("/v1/orders/{}/status", order.id),
            admin,
            "admin",
            Some(json!({"status": "confirmed"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sub_orders_created"], 2);
    assert_eq!(body["earnings_created"], 2);
    assert_eq!(body["previous_status"], "pending");

    let earnings = store.list_earnings_for_order(order.id).await.unwrap();
    assert_eq!(earnings.len(), 2);
    for earning in &earnings {
        assert_eq!(earning.gross_cents, 7500);
        assert_eq!(earning.commission_cents, 750);
        assert_eq!(earning.net_cents, 6750);
    }
}

#[tokio::test]
async fn test_patch_tracking_requires_both_fields() {
    let (app, store) = build_app();
    let admin = Uuid::new_v4();
    let order = seed_two_seller_order(&store, Uuid::new_v4()).await;

    let (status, _) = send(
        &app,
        request(
            "PATCH",
            &format!("/v1/orders/{}/tracking", order.id),
            admin,
            "admin",
            Some(json!({"tracking_number": "TRK-1"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        request(
            "PATCH",
            &format!("/v1/orders/{}/tracking", order.id),
            admin,
            "admin",
            Some(json!({"tracking_number": "TRK-1", "carrier": "DHL"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], body["previous_status"]);

    let stored = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.tracking_number.as_deref(), Some("TRK-1"));
    assert_eq!(stored.carrier.as_deref(), Some("DHL"));
}

#[tokio::test]
async fn test_customers_cannot_update_status_except_cancelling_their_own() {
    let (app, store) = build_app();
    let buyer = Uuid::new_v4();
    let order = seed_two_seller_order(&store, buyer).await;

    let (status, _) = send(
        &app,
        request(
            "PATCH",
            &format!("/v1/orders/{}/status", order.id),
            buyer,
            "customer",
            Some(json!({"status": "shipped"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        request(
            "PATCH",
            &format!("/v1/orders/{}/status", order.id),
            buyer,
            "customer",
            Some(json!({"status": "cancelled", "reason": "changed my mind"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_list_orders_is_role_scoped() {
    let (app, store) = build_app();
    let buyer = Uuid::new_v4();
    seed_two_seller_order(&store, buyer).await;
    seed_two_seller_order(&store, Uuid::new_v4()).await;

    let (status, body) = send(&app, request("GET", "/v1/orders", buyer, "customer", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (status, body) =
        send(&app, request("GET", "/v1/orders", Uuid::new_v4(), "admin", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);

    let (status, _) = send(
        &app,
        request("GET", "/v1/orders?status=nonsense", Uuid::new_v4(), "admin", None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_settlement_run_is_operator_only() {
    let (app, _) = build_app();

    let (status, _) = send(
        &app,
        request("POST", "/v1/settlement/run", Uuid::new_v4(), "customer", None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        request("POST", "/v1/settlement/run", Uuid::new_v4(), "admin", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["promoted_count"], 0);
    assert_eq!(body["total_amount_promoted"], 0);
}

#[tokio::test]
async fn test_create_order_is_system_only() {
    let (app, _) = build_app();
    let payload = json!({
        "buyer_id": Uuid::new_v4(),
        "items": [
            {"product_id": Uuid::new_v4(), "seller_id": Uuid::new_v4(), "name": "Stool", "quantity": 1, "unit_price_cents": 4200}
        ]
    });

    let (status, _) = send(
        &app,
        request("POST", "/v1/orders", Uuid::new_v4(), "customer", Some(payload.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        request("POST", "/v1/orders", Uuid::new_v4(), "admin", Some(payload)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["amount_cents"], 4200);
}

#[tokio::test]
async fn test_requests_without_identity_headers_are_rejected() {
    let (app, _) = build_app();
    let req = Request::builder()
        .method("GET")
        .uri("/v1/orders")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
