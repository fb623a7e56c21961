//! Live WebSocket connections, keyed by room and participant.
//!
//! Each connection gets a bounded outbound queue and a cancellation token
//! derived from the service shutdown token. A second connection for the
//! same room and identity replaces the first and cancels it; the replaced
//! connection's cleanup then finds a different connection ID in the map and
//! leaves the newer one alone.

use super::mailbox::OutboundMailbox;
use super::{DeliveryError, Transport};
use crate::observability::metrics;
use crate::protocol::Notification;
use common::types::{ParticipantId, RoomId};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Sending side of one connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub connection_id: Uuid,
    sender: mpsc::Sender<String>,
    cancel_token: CancellationToken,
    mailbox: Arc<OutboundMailbox>,
}

impl ConnectionHandle {
    /// Encode and queue a notification without waiting.
    pub fn try_send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let frame = serde_json::to_string(notification)
            .map_err(|e| DeliveryError::Encode(e.to_string()))?;

        match self.sender.try_send(frame) {
            Ok(()) => {
                self.mailbox.record_enqueue();
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.mailbox.record_drop();
                Err(DeliveryError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(DeliveryError::Closed),
        }
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    #[must_use]
    pub fn mailbox(&self) -> &Arc<OutboundMailbox> {
        &self.mailbox
    }
}

/// Production [`Transport`]: routes notifications to connection queues.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: DashMap<(RoomId, ParticipantId), ConnectionHandle>,
    shutdown: CancellationToken,
    buffer: usize,
}

impl ConnectionRegistry {
    /// `buffer` is the per-connection outbound queue length.
    #[must_use]
    pub fn new(buffer: usize, shutdown: CancellationToken) -> Self {
        Self {
            connections: DashMap::new(),
            shutdown,
            buffer: buffer.max(1),
        }
    }

    /// Register a connection, replacing and cancelling any previous one for
    /// the same identity. Returns the handle and the queue's receiving end.
    pub fn register(
        &self,
        room: &RoomId,
        participant: &ParticipantId,
    ) -> (ConnectionHandle, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let handle = ConnectionHandle {
            connection_id: Uuid::new_v4(),
            sender,
            cancel_token: self.shutdown.child_token(),
            mailbox: Arc::new(OutboundMailbox::new(format!("{room}/{participant}"))),
        };

        let previous = self
            .connections
            .insert((room.clone(), participant.clone()), handle.clone());

        if let Some(previous) = previous {
            info!(
                target: "sig.transport",
                room_id = %room,
                participant_id = %participant,
                replaced = %previous.connection_id,
                "Connection replaced by reconnect"
            );
            previous.cancel_token.cancel();
        }

        debug!(
            target: "sig.transport",
            room_id = %room,
            participant_id = %participant,
            connection_id = %handle.connection_id,
            "Connection registered"
        );
        metrics::set_connections_active(self.connections.len());
        (handle, receiver)
    }

    /// Remove the connection if it is still the registered one. Returns
    /// `false` when a newer connection has taken its place.
    pub fn unregister(&self, room: &RoomId, participant: &ParticipantId, connection_id: Uuid) -> bool {
        let removed = self
            .connections
            .remove_if(&(room.clone(), participant.clone()), |_, handle| {
                handle.connection_id == connection_id
            })
            .is_some();

        if removed {
            metrics::set_connections_active(self.connections.len());
        }
        removed
    }

    #[must_use]
    pub fn is_connected(&self, room: &RoomId, participant: &ParticipantId) -> bool {
        self.connections
            .contains_key(&(room.clone(), participant.clone()))
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Transport for ConnectionRegistry {
    fn deliver(
        &self,
        room: &RoomId,
        participant: &ParticipantId,
        notification: &Notification,
    ) -> Result<(), DeliveryError> {
        let handle = self
            .connections
            .get(&(room.clone(), participant.clone()))
            .map(|entry| entry.value().clone())
            .ok_or(DeliveryError::NotConnected)?;
        handle.try_send(notification)
    }
}
