//! Signaling WebSocket endpoint.
//!
//! One socket is bound to one room and one resolved identity for its whole
//! life. The socket is split: a writer task drains the connection's bounded
//! outbound queue, while the reader decodes frames and hands them to the
//! router one at a time, so messages from one connection are handled in
//! arrival order.
//!
//! When the socket closes, or a reconnect under the same identity replaces
//! it, the connection is unregistered. Only the connection that is still
//! registered at that point performs the implicit leave.

use crate::errors::SignalingError;
use crate::http::{AppState, Caller};
use crate::observability::metrics;
use crate::protocol::ClientMessage;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use common::types::{ParticipantId, RoomId};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Handler for GET /ws/:room_id
///
/// Identity comes from the `x-participant-id` header or the
/// `participant_id` query parameter.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
    Caller(participant): Caller,
) -> Result<Response, SignalingError> {
    if room_id.is_blank() {
        return Err(SignalingError::InvalidMessage(
            "Room ID must not be empty".to_string(),
        ));
    }

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, room_id, participant)))
}

#[instrument(skip_all, fields(room_id = %room, participant_id = %participant))]
async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    room: RoomId,
    participant: ParticipantId,
) {
    let (handle, mut outbound) = state.connections.register(&room, &participant);
    let connection_id = handle.connection_id;
    let cancel = handle.cancel_token().clone();
    info!(target: "sig.ws", connection_id = %connection_id, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    let writer_cancel = cancel.clone();
    let mailbox = Arc::clone(handle.mailbox());
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                () = writer_cancel.cancelled() => break,
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };
                    mailbox.record_dequeue();
                    if sink.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!(target: "sig.ws", "Connection cancelled");
                break;
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    handle_frame(&state, &room, &participant, &text).await;
                }
                Some(Ok(Message::Binary(_))) => {
                    state.router.send_error(
                        &room,
                        &participant,
                        &SignalingError::InvalidMessage("Binary frames are not supported".to_string()),
                    );
                }
                Some(Ok(Message::Close(_))) | None => break,
                // Ping/pong are answered by the protocol layer.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(target: "sig.ws", error = %e, "WebSocket read failed");
                    break;
                }
            }
        }
    }

    cancel.cancel();
    let _ = writer.await;

    let still_registered = release_connection(&state, &room, &participant, connection_id).await;

    info!(
        target: "sig.ws",
        connection_id = %connection_id,
        replaced = !still_registered,
        delivered = handle.mailbox().delivered(),
        dropped = handle.mailbox().dropped(),
        "WebSocket closed"
    );
}

/// Unregister a closed connection. If it was still the participant's
/// current connection, run the implicit leave for a member, or release any
/// share a non-member holds. Returns whether it was still registered.
async fn release_connection(
    state: &AppState,
    room: &RoomId,
    participant: &ParticipantId,
    connection_id: Uuid,
) -> bool {
    if !state.connections.unregister(room, participant, connection_id) {
        return false;
    }
    if state.router.presence().contains(room, participant) {
        state.router.leave_room(room, participant).await;
    } else {
        state.router.stop_screen_share(room, participant).await;
    }
    true
}

/// Decode, validate and dispatch one text frame.
async fn handle_frame(state: &AppState, room: &RoomId, participant: &ParticipantId, text: &str) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(target: "sig.ws", error = %e, "Malformed client message");
            let err = SignalingError::InvalidMessage(format!("Malformed message: {e}"));
            metrics::record_error(err.error_type_label());
            state.router.send_error(room, participant, &err);
            return;
        }
    };

    if let Err(err) = message.validate(room, participant) {
        warn!(
            target: "sig.ws",
            message_type = message.kind(),
            error = %err,
            "Client message rejected"
        );
        metrics::record_error(err.error_type_label());
        state.router.send_error(room, participant, &err);
        return;
    }

    state.router.dispatch(room, participant, message).await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::collaborators::NoopNotifier;
    use crate::config::Config;
    use crate::session::InMemorySessionPersistence;
    use std::collections::HashMap;
    use tokio_util::sync::CancellationToken;

    fn state() -> Arc<AppState> {
        let config = Config::from_vars(&HashMap::new()).unwrap();
        Arc::new(AppState::new(
            &config,
            Arc::new(InMemorySessionPersistence::new()),
            Arc::new(NoopNotifier),
            CancellationToken::new(),
        ))
    }

    async fn next_frame(rx: &mut tokio::sync::mpsc::Receiver<String>) -> serde_json::Value {
        let frame = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("frame should arrive")
            .expect("queue open");
        serde_json::from_str(&frame).unwrap()
    }

    #[tokio::test]
    async fn test_malformed_frame_answers_sender_with_error() {
        let state = state();
        let room = RoomId::new("42");
        let alice = ParticipantId::new("alice");
        let (_handle, mut rx) = state.connections.register(&room, &alice);

        handle_frame(&state, &room, &alice, "{not json").await;

        let frame = next_frame(&mut rx).await;
        assert_eq!(frame["type"], "error");
        assert_eq!(frame["code"], 1);
    }

    #[tokio::test]
    async fn test_spoofed_sender_is_rejected() {
        let state = state();
        let room = RoomId::new("42");
        let alice = ParticipantId::new("alice");
        let (_handle, mut rx) = state.connections.register(&room, &alice);

        let frame = r#"{"type":"join-room","roomId":"42","fromParticipantId":"mallory"}"#;
        handle_frame(&state, &room, &alice, frame).await;

        let reply = next_frame(&mut rx).await;
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["code"], 3);
        assert!(!state.router.presence().contains(&room, &alice));
    }

    #[tokio::test]
    async fn test_join_frame_reaches_router() {
        let state = state();
        let room = RoomId::new("42");
        let alice = ParticipantId::new("alice");
        let (_handle, mut rx) = state.connections.register(&room, &alice);

        let frame = r#"{"type":"join-room","roomId":"42","fromParticipantId":"alice"}"#;
        handle_frame(&state, &room, &alice, frame).await;

        assert_eq!(next_frame(&mut rx).await["type"], "participants-list");
        assert_eq!(next_frame(&mut rx).await["type"], "room-info");
        assert!(state.router.presence().contains(&room, &alice));
    }

    #[tokio::test]
    async fn test_unjoined_socket_never_holds_a_share_slot() {
        let vars = HashMap::from([("SIG_MAX_CONCURRENT_SCREENS".to_string(), "1".to_string())]);
        let config = Config::from_vars(&vars).unwrap();
        let state = Arc::new(AppState::new(
            &config,
            Arc::new(InMemorySessionPersistence::new()),
            Arc::new(NoopNotifier),
            CancellationToken::new(),
        ));
        let room = RoomId::new("42");
        let ghost = ParticipantId::new("ghost");
        let alice = ParticipantId::new("alice");

        let (handle, mut ghost_rx) = state.connections.register(&room, &ghost);
        let frame = r#"{"type":"screen-share","participantId":"ghost","roomId":"42","streamId":"g1","isSharing":true}"#;
        handle_frame(&state, &room, &ghost, frame).await;

        let reply = next_frame(&mut ghost_rx).await;
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["code"], 3);
        assert!(release_connection(&state, &room, &ghost, handle.connection_id).await);

        let (_alice_handle, _alice_rx) = state.connections.register(&room, &alice);
        state.router.join_room(&room, &alice).await.unwrap();
        let frame = r#"{"type":"screen-share","participantId":"alice","roomId":"42","streamId":"a1","isSharing":true}"#;
        handle_frame(&state, &room, &alice, frame).await;

        let shares = state.router.active_screen_shares(&room);
        assert_eq!(shares.len(), 1);
        assert_eq!(shares.first().unwrap().participant_id, alice);
    }
}
