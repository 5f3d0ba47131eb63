//! WebSocket endpoint for the live pulse channel
//!
//! Each connection is bridged into the fanout hub through an unbounded
//! channel, so a slow socket never stalls a broadcast. The forward task
//! drains that channel into the socket; once either side closes, the
//! subscriber is unregistered and no further sends are attempted.

use crate::fanout::{HubMessage, Subscriber};
use crate::server::AppState;
use crate::store::now_ms;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Bootstrap lookback pushed on connect
const BOOTSTRAP_WINDOW_MS: i64 = 10 * 60 * 1000;

pub async fn live_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Hub-facing side of one WebSocket connection
struct WsSubscriber {
    tx: mpsc::UnboundedSender<Arc<str>>,
}

impl Subscriber for WsSubscriber {
    fn send(&self, payload: Arc<str>) -> bool {
        self.tx.send(payload).is_ok()
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Bootstrap history, queued ahead of any live pulse so HISTORY is
    // always the first message the viewer sees
    let pulses = match state.store.query_since(now_ms() - BOOTSTRAP_WINDOW_MS) {
        Ok(pulses) => pulses,
        Err(e) => {
            log::warn!("⚠️  Bootstrap query failed, sending empty history: {}", e);
            Vec::new()
        }
    };
    let bootstrap = match serde_json::to_string(&HubMessage::History { pulses }) {
        Ok(json) => json,
        Err(e) => {
            log::error!("❌ Failed to encode bootstrap history: {}", e);
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<Arc<str>>();
    if tx.send(Arc::from(bootstrap)).is_err() {
        return;
    }

    let subscriber_id = state.hub.register(Arc::new(WsSubscriber { tx })).await;
    log::info!("🔌 Live subscriber {} connected", subscriber_id);

    let mut forward = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sender
                .send(Message::Text(payload.to_string().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    // Viewers send nothing meaningful; drain frames so close handshakes
    // and pings are processed
    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = &mut forward => break,
        }
    }

    state.hub.unregister(subscriber_id).await;
    forward.abort();
    log::info!("🔌 Live subscriber {} disconnected", subscriber_id);
}
