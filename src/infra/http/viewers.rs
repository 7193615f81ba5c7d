//! `GET /ws`: the viewer broadcast channel.

use std::sync::Arc;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::application::broadcast::BroadcastHub;

use super::HttpState;

pub async fn viewer_socket(ws: WebSocketUpgrade, State(state): State<HttpState>) -> Response {
    ws.on_upgrade(move |socket| run_viewer(socket, state.hub))
}

/// Forward hub events to one viewer until either side goes away.
async fn run_viewer(socket: WebSocket, hub: Arc<BroadcastHub>) {
    let mut subscription = hub.connect();
    let viewer_id = subscription.id();
    let (mut outbound, mut inbound) = socket.split();

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                let text = match event.to_json() {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(
                            target = "zplcast::http::viewers",
                            viewer_id = %viewer_id,
                            error = %err,
                            "failed to encode viewer event"
                        );
                        continue;
                    }
                };
                if let Err(err) = outbound.send(Message::Text(text.into())).await {
                    debug!(
                        target = "zplcast::http::viewers",
                        viewer_id = %viewer_id,
                        error = %err,
                        "viewer send failed"
                    );
                    break;
                }
            }
            incoming = inbound.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(
                        target = "zplcast::http::viewers",
                        viewer_id = %viewer_id,
                        error = %err,
                        "viewer socket error"
                    );
                    break;
                }
            },
        }
    }

    hub.disconnect(viewer_id);
}
