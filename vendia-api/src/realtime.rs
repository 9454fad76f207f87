use std::collections::HashMap;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures_util::StreamExt;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::state::AppState;
use vendia_core::realtime::RealtimeTransport;
use vendia_core::CoreResult;
use vendia_shared::models::events::OrderEvent;

const CHANNEL_CAPACITY: usize = 64;

/// In-process realtime transport: one broadcast channel per order id,
/// bridged to WebSocket subscribers. Publishing to an order nobody watches
/// is a no-op; a slow subscriber that lags simply misses events.
pub struct ChannelTransport {
    channels: RwLock<HashMap<Uuid, broadcast::Sender<OrderEvent>>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self { channels: RwLock::new(HashMap::new()) }
    }

    pub async fn subscribe(&self, order_id: Uuid) -> broadcast::Receiver<OrderEvent> {
        let mut channels = self.channels.write().await;
        channels
            .entry(order_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeTransport for ChannelTransport {
    async fn publish(&self, order_id: Uuid, event: &OrderEvent) -> CoreResult<()> {
        let channels = self.channels.read().await;
        if let Some(tx) = channels.get(&order_id) {
            // A send error only means every receiver is gone; delivery is
            // best-effort either way.
            let _ = tx.send(event.clone());
        }
        Ok(())
    }
}

/// GET /v1/orders/{id}/ws
/// Subscribe to status and tracking events for one order
pub async fn order_events_ws(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| stream_order_events(socket, state, order_id))
}

async fn stream_order_events(mut socket: WebSocket, state: AppState, order_id: Uuid) {
    let rx = state.realtime.subscribe(order_id).await;
    let mut events = BroadcastStream::new(rx);
    tracing::debug!(%order_id, "realtime subscriber connected");

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(Ok(event)) => {
                    let Ok(text) = serde_json::to_string(&event) else { continue };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    tracing::debug!(%order_id, skipped, "subscriber lagged, events dropped");
                }
                None => break,
            },
            msg = socket.recv() => match msg {
                // Inbound frames are ignored; the channel is push-only
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }

    tracing::debug!(%order_id, "realtime subscriber disconnected");
}
