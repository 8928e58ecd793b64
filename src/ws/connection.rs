//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single authorized connection,
//! forwarding validated send requests to the owning room session and
//! delivering room broadcasts back to the client. The connection moves
//! Connecting → Authorizing → Open in the upgrade handler; this module
//! is the Open state, and every exit path unregisters exactly once.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::frames::{ClientFrame, ServerFrame, parse_client_frame};
use crate::domain::message::MessageDraft;
use crate::domain::{ConnectionId, ConnectionRegistry, RoomId};
use crate::identity::UserProfile;
use crate::service::RoomSessionHandle;

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Registers with the connection registry and emits the connection
///   acknowledgement.
/// - Forwards `send` frames to the room session; session errors go back
///   to this client only.
/// - Ignores malformed and unknown frames without closing.
pub async fn run_connection(
    socket: WebSocket,
    room_id: RoomId,
    profile: UserProfile,
    session: RoomSessionHandle,
    registry: Arc<ConnectionRegistry>,
) {
    let conn_id = ConnectionId::new();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    registry.register(room_id, conn_id, out_tx).await;
    tracing::debug!(room_id = %room_id, user_id = %profile.id, "ws connection open");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let ack = ServerFrame::ack(format!("{} connected to chat room!", profile.username));
    let mut open = ws_tx.send(Message::text(ack.to_json())).await.is_ok();

    while open {
        tokio::select! {
            // Incoming frame from the client
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match parse_client_frame(&text) {
                            Some(ClientFrame::Send { content }) => {
                                let draft = MessageDraft::text(profile.id, content);
                                if let Err(error) = session
                                    .send_message(profile.clone(), draft, Some(conn_id))
                                    .await
                                {
                                    tracing::warn!(
                                        room_id = %room_id,
                                        user_id = %profile.id,
                                        %error,
                                        "send rejected"
                                    );
                                    let reply = ServerFrame::error(&error);
                                    if ws_tx.send(Message::text(reply.to_json())).await.is_err() {
                                        open = false;
                                    }
                                }
                            }
                            // Frame types outside the closed set are ignored.
                            Some(ClientFrame::Unknown) => {}
                            None => {
                                tracing::warn!(
                                    room_id = %room_id,
                                    user_id = %profile.id,
                                    "dropping malformed frame"
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => open = false,
                    _ => {}
                }
            }
            // Broadcast from the room session via the registry
            event = out_rx.recv() => {
                match event {
                    Some(posted) => {
                        let frame = ServerFrame::message(&posted);
                        if ws_tx.send(Message::text(frame.to_json())).await.is_err() {
                            open = false;
                        }
                    }
                    // Registry sender dropped; nothing more to deliver.
                    None => open = false,
                }
            }
        }
    }

    // Single exit point: client close, socket error, and registry
    // teardown all funnel here, so unregistration happens exactly once.
    registry.unregister(room_id, conn_id).await;
    tracing::debug!(room_id = %room_id, user_id = %profile.id, "ws connection closed");
}
