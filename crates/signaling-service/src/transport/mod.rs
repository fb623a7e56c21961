//! Delivery of notifications to connected participants.
//!
//! The router never talks to sockets directly. It hands each notification
//! to a [`Transport`], whose `deliver` must not block: the production
//! [`ConnectionRegistry`] pushes onto a bounded per-connection queue with
//! `try_send`, so a slow recipient costs a dropped message for that
//! recipient only.
//!
//! [`fan_out`] delivers to a recipient list, logging and counting each
//! failure and carrying on with the rest.

mod mailbox;
mod registry;

pub use mailbox::{MailboxLevel, OutboundMailbox};
pub use registry::{ConnectionHandle, ConnectionRegistry};

use crate::observability::metrics;
use crate::protocol::Notification;
use common::types::{ParticipantId, RoomId};
use thiserror::Error;
use tracing::warn;

/// Why a notification did not reach a recipient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("recipient is not connected")]
    NotConnected,

    #[error("recipient outbound queue is full")]
    QueueFull,

    #[error("recipient connection is closed")]
    Closed,

    #[error("failed to encode notification: {0}")]
    Encode(String),
}

impl DeliveryError {
    /// Bounded metric label.
    #[must_use]
    pub fn reason_label(&self) -> &'static str {
        match self {
            DeliveryError::NotConnected => "not_connected",
            DeliveryError::QueueFull => "queue_full",
            DeliveryError::Closed => "closed",
            DeliveryError::Encode(_) => "encode",
        }
    }
}

/// Sink for outbound notifications.
pub trait Transport: Send + Sync {
    /// Queue `notification` for `participant` in `room`. Must not block.
    fn deliver(
        &self,
        room: &RoomId,
        participant: &ParticipantId,
        notification: &Notification,
    ) -> Result<(), DeliveryError>;
}

/// Outcome of a fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Deliver to every recipient; one failure never stops the rest.
pub fn fan_out<'a>(
    transport: &dyn Transport,
    room: &RoomId,
    recipients: impl IntoIterator<Item = &'a ParticipantId>,
    notification: &Notification,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    for recipient in recipients {
        if unicast(transport, room, recipient, notification) {
            report.delivered += 1;
        } else {
            report.failed += 1;
        }
    }
    report
}

/// Deliver to one recipient. Failures are logged and counted; returns
/// whether the notification was queued.
pub fn unicast(
    transport: &dyn Transport,
    room: &RoomId,
    recipient: &ParticipantId,
    notification: &Notification,
) -> bool {
    match transport.deliver(room, recipient, notification) {
        Ok(()) => true,
        Err(e) => {
            warn!(
                target: "sig.transport",
                room_id = %room,
                participant_id = %recipient,
                event = notification.kind(),
                error = %e,
                "Notification not delivered"
            );
            metrics::record_delivery_failure(e.reason_label());
            false
        }
    }
}

/// Test doubles for [`Transport`].
pub mod mock {
    use super::*;
    use crate::protocol::ServerEvent;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    /// One recorded delivery.
    #[derive(Debug, Clone)]
    pub struct Delivery {
        pub room: RoomId,
        pub recipient: ParticipantId,
        pub notification: Notification,
    }

    /// Transport that records every delivery in memory.
    ///
    /// Recipients registered with [`RecordingTransport::fail_for`] are
    /// refused with `NotConnected` and nothing is recorded for them.
    #[derive(Debug, Default)]
    pub struct RecordingTransport {
        deliveries: Mutex<Vec<Delivery>>,
        failing: Mutex<HashSet<ParticipantId>>,
    }

    impl RecordingTransport {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every delivery to `participant` fail.
        pub fn fail_for(&self, participant: &ParticipantId) {
            self.failing.lock().insert(participant.clone());
        }

        #[must_use]
        pub fn deliveries(&self) -> Vec<Delivery> {
            self.deliveries.lock().clone()
        }

        #[must_use]
        pub fn received_by(&self, participant: &ParticipantId) -> Vec<Notification> {
            self.deliveries
                .lock()
                .iter()
                .filter(|d| &d.recipient == participant)
                .map(|d| d.notification.clone())
                .collect()
        }

        #[must_use]
        pub fn events_for(&self, participant: &ParticipantId) -> Vec<ServerEvent> {
            self.received_by(participant)
                .into_iter()
                .map(|n| n.event)
                .collect()
        }

        #[must_use]
        pub fn kinds_for(&self, participant: &ParticipantId) -> Vec<&'static str> {
            self.received_by(participant)
                .iter()
                .map(Notification::kind)
                .collect()
        }

        /// Recipients of every delivery of the given event kind.
        #[must_use]
        pub fn recipients_of(&self, kind: &str) -> Vec<ParticipantId> {
            let mut recipients: Vec<ParticipantId> = self
                .deliveries
                .lock()
                .iter()
                .filter(|d| d.notification.kind() == kind)
                .map(|d| d.recipient.clone())
                .collect();
            recipients.sort();
            recipients
        }

        #[must_use]
        pub fn total(&self) -> usize {
            self.deliveries.lock().len()
        }

        pub fn clear(&self) {
            self.deliveries.lock().clear();
        }
    }

    impl Transport for RecordingTransport {
        fn deliver(
            &self,
            room: &RoomId,
            participant: &ParticipantId,
            notification: &Notification,
        ) -> Result<(), DeliveryError> {
            if self.failing.lock().contains(participant) {
                return Err(DeliveryError::NotConnected);
            }
            self.deliveries.lock().push(Delivery {
                room: room.clone(),
                recipient: participant.clone(),
                notification: notification.clone(),
            });
            Ok(())
        }
    }
}
