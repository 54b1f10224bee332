use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use super::AppState;
use crate::gateway::{BroadcastGateway, ServerMessage};

/// `GET /vehicles`: upgrade to a viewer socket.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    let gateway = state.pipeline.gateway.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, gateway))
}

/// Serves one viewer until either side closes.
///
/// Outbound frames go through the client's gateway queue and a dedicated
/// writer task; inbound text frames are commands answered on the same queue.
pub async fn handle_socket(
    socket: WebSocket,
    gateway: BroadcastGateway,
) {
    let (mut sink, mut stream) = socket.split();
    let (client_id, mut rx) = gateway.connect();

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.as_ref().into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let reply = gateway.handle_frame(client_id, text.as_str());
                    gateway.send_to(client_id, &reply);
                }
                Some(Ok(Message::Binary(_))) => {
                    let reply = ServerMessage::Response {
                        request_id: None,
                        success: None,
                        asset_id: None,
                        error: Some("binary frames are not supported".into()),
                    };
                    gateway.send_to(client_id, &reply);
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(client_id, error = %e, "WebSocket receive failed");
                    break;
                }
            },
            _ = &mut writer => {
                warn!(client_id, "WebSocket writer stopped");
                break;
            }
        }
    }

    gateway.disconnect(client_id);
    writer.abort();
}
