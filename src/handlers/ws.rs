use super::AppState;
use crate::{error::PayError, services::PaymentMachine};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use uuid::Uuid;

/// Streams the payment's snapshot on every stage or progress change.
pub async fn payment_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, PayError> {
    let machine = state.sessions.get(id).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, machine, id)))
}

async fn handle_socket(socket: WebSocket, machine: Arc<PaymentMachine>, id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let mut updates = machine.subscribe();
    drop(machine);

    let mut pending = true;
    loop {
        if pending {
            let snapshot = updates.borrow_and_update().clone();
            if let Ok(msg) = serde_json::to_string(&snapshot) {
                if sender.send(Message::Text(msg)).await.is_err() {
                    break;
                }
            }
            pending = false;
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                pending = true;
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::debug!(payment_id = %id, "Payment WebSocket closed");
}
