use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::InboundMsg;
use crate::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// One session per connection. Frames are dispatched inline, so replies leave
/// in the order requests arrived; the only suspension point is the upstream
/// fetch.
async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let connection_id = Uuid::new_v4();
    info!(%connection_id, "ws connected");

    while let Some(Ok(msg)) = ws_stream.next().await {
        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => break,
            _ => continue,
        };

        let reply = dispatch(&state, &text).await;
        // A send failure means the peer is gone; any in-flight fetch keeps
        // running and lands in the cache for future requesters.
        if ws_sink.send(Message::Text(reply)).await.is_err() {
            debug!(%connection_id, "reply dropped, peer gone");
            break;
        }
    }

    info!(%connection_id, "ws disconnected");
}

/// Turn one inbound frame into exactly one outbound frame.
async fn dispatch(state: &Arc<AppState>, text: &str) -> String {
    let outcome = match serde_json::from_str::<InboundMsg>(text) {
        Ok(msg) => handle_message(state, msg).await,
        Err(e) => Err(format!("invalid message: {e}")),
    };

    match outcome {
        Ok(payload) => payload.to_string(),
        Err(message) => error_frame(&message),
    }
}

async fn handle_message(state: &Arc<AppState>, msg: InboundMsg) -> Result<Value, String> {
    let request = state.router.classify(msg).map_err(|e| e.to_string())?;
    state.resolve(&request).await.map_err(|e| e.to_string())
}

fn error_frame(message: &str) -> String {
    json!({ "error": message }).to_string()
}
