//! Screen-share arbitration.
//!
//! Decides which screen shares are live in a session: at most one per
//! participant and at most `max_concurrent` in total. The decision and the
//! state change happen together under the session's screen-board lock, so
//! a refused share leaves no trace. Every state change is broadcast to the
//! room after the lock is released.

use crate::collaborators::RoomDirectory;
use crate::errors::SignalingError;
use crate::observability::metrics;
use crate::presence::PresenceRegistry;
use crate::protocol::{Notification, ServerEvent};
use crate::session::{ScreenShare, SessionStore};
use crate::transport::{fan_out, Transport};
use common::types::{ParticipantId, RoomId, StreamId};
use std::sync::Arc;
use tracing::{info, instrument};

/// Which event announces a started share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareAnnouncement {
    /// `screen-share-changed`, for shares started over the socket.
    Changed,
    /// `new-screen-share`, for shares registered over HTTP.
    Registered,
}

pub struct ScreenShareArbiter {
    store: Arc<SessionStore>,
    presence: Arc<PresenceRegistry>,
    directory: Arc<dyn RoomDirectory>,
    transport: Arc<dyn Transport>,
    max_concurrent: usize,
}

impl ScreenShareArbiter {
    pub fn new(
        store: Arc<SessionStore>,
        presence: Arc<PresenceRegistry>,
        directory: Arc<dyn RoomDirectory>,
        transport: Arc<dyn Transport>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            store,
            presence,
            directory,
            transport,
            max_concurrent,
        }
    }

    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Start (or replace) the participant's share.
    ///
    /// # Errors
    ///
    /// - `AccessDenied` if the participant is not a room member or may not
    ///   share in this room
    /// - `CapacityExceeded` if a new sharer would exceed the cap
    #[instrument(skip_all, fields(room_id = %room, participant_id = %participant))]
    pub async fn start_share(
        &self,
        room: &RoomId,
        participant: &ParticipantId,
        stream_id: StreamId,
        title: Option<String>,
        announcement: ShareAnnouncement,
    ) -> Result<ScreenShare, SignalingError> {
        self.check_permission(room, participant).await?;

        self.check_membership(room, participant)?;

        let share = ScreenShare::new(participant.clone(), stream_id, title);
        let session = self.store.get_or_create_active(room);
        // Checked again under the board lock. A leave removes presence
        // before it takes this lock to stop the leaver's share, so a share
        // can never outlive its owner's membership.
        let outcome = session
            .with_screens(|board| {
                self.check_membership(room, participant)?;
                board.start(share.clone(), self.max_concurrent)
            })
            .inspect_err(|e| {
                if let SignalingError::CapacityExceeded { limit } = e {
                    info!(target: "sig.arbiter", limit, "Screen share refused at capacity");
                    metrics::record_screen_share_rejection("capacity");
                }
            })?;

        info!(
            target: "sig.arbiter",
            stream_id = %share.stream_id,
            replaced = outcome.replaced.is_some(),
            "Screen share started"
        );

        let event = match announcement {
            ShareAnnouncement::Changed => ServerEvent::share_started(&share, outcome.is_pinned),
            ShareAnnouncement::Registered => ServerEvent::NewScreenShare {
                participant_id: share.participant_id.clone(),
                stream_id: share.stream_id.clone(),
                screen_title: share.title.clone(),
            },
        };
        self.broadcast(room, event);
        Ok(share)
    }

    /// Stop the participant's share. Returns the removed share; stopping
    /// when nothing is shared is a silent no-op.
    #[instrument(skip_all, fields(room_id = %room, participant_id = %participant))]
    pub fn stop_share(&self, room: &RoomId, participant: &ParticipantId) -> Option<ScreenShare> {
        let session = self.store.active(room)?;
        let outcome = session.with_screens(|board| board.stop(participant));
        let removed = outcome.removed?;

        info!(target: "sig.arbiter", stream_id = %removed.stream_id, "Screen share stopped");
        self.broadcast(
            room,
            ServerEvent::ScreenShareChanged {
                participant_id: removed.participant_id.clone(),
                stream_id: Some(removed.stream_id.clone()),
                is_sharing: false,
                is_pinned: false,
                screen_title: removed.title.clone(),
            },
        );
        if outcome.unpinned {
            self.broadcast(room, ServerEvent::ScreenUnpinned);
        }
        Some(removed)
    }

    /// Pin a participant's share. The target need not be sharing yet.
    pub fn pin(&self, room: &RoomId, target: &ParticipantId) -> Result<(), SignalingError> {
        let session = self
            .store
            .active(room)
            .ok_or_else(|| no_session(room))?;
        session.with_screens(|board| board.pin(target.clone()));

        info!(target: "sig.arbiter", room_id = %room, participant_id = %target, "Screen pinned");
        self.broadcast(
            room,
            ServerEvent::ScreenPinned {
                pinned_participant_id: target.clone(),
            },
        );
        Ok(())
    }

    /// Clear the pin.
    ///
    /// # Errors
    ///
    /// `NotFound` without an active session, `InvalidState` if nothing is
    /// pinned.
    pub fn unpin(&self, room: &RoomId) -> Result<(), SignalingError> {
        let session = self
            .store
            .active(room)
            .ok_or_else(|| no_session(room))?;
        let previous = session.with_screens(|board| board.unpin())?;

        info!(target: "sig.arbiter", room_id = %room, participant_id = %previous, "Screen unpinned");
        self.broadcast(room, ServerEvent::ScreenUnpinned);
        Ok(())
    }

    /// Retitle the participant's share of `stream_id`.
    pub fn update_share_info(
        &self,
        room: &RoomId,
        participant: &ParticipantId,
        stream_id: &StreamId,
        title: String,
    ) -> Result<ScreenShare, SignalingError> {
        let session = self
            .store
            .active(room)
            .ok_or_else(|| no_session(room))?;
        let share = session.with_screens(|board| board.retitle(participant, stream_id, title))?;

        self.broadcast(
            room,
            ServerEvent::ScreenShareUpdated {
                participant_id: share.participant_id.clone(),
                stream_id: share.stream_id.clone(),
                screen_title: share.title.clone().unwrap_or_default(),
            },
        );
        Ok(share)
    }

    /// Active shares in start order; empty without a session.
    #[must_use]
    pub fn active_shares(&self, room: &RoomId) -> Vec<ScreenShare> {
        self.store
            .active(room)
            .map(|session| session.with_screens(|board| board.shares().to_vec()))
            .unwrap_or_default()
    }

    /// The pinned participant's share, if they are sharing.
    #[must_use]
    pub fn pinned_share(&self, room: &RoomId) -> Option<ScreenShare> {
        self.store
            .active(room)
            .and_then(|session| session.with_screens(|board| board.pinned_share()))
    }

    fn check_membership(&self, room: &RoomId, participant: &ParticipantId) -> Result<(), SignalingError> {
        if self.presence.contains(room, participant) {
            return Ok(());
        }
        metrics::record_screen_share_rejection("not_member");
        Err(SignalingError::AccessDenied(
            "Join the room before sharing a screen".to_string(),
        ))
    }

    async fn check_permission(
        &self,
        room: &RoomId,
        participant: &ParticipantId,
    ) -> Result<(), SignalingError> {
        let roles = self.directory.roles(room).await?;
        if roles.is_privileged(participant)
            || self.directory.participants_can_share_screen(room).await?
        {
            return Ok(());
        }

        metrics::record_screen_share_rejection("permission");
        Err(SignalingError::AccessDenied(
            "Screen sharing is restricted to the host and co-hosts".to_string(),
        ))
    }

    fn broadcast(&self, room: &RoomId, event: ServerEvent) {
        let members = self.presence.snapshot(room);
        fan_out(
            self.transport.as_ref(),
            room,
            &members,
            &Notification::new(event),
        );
    }
}

fn no_session(room: &RoomId) -> SignalingError {
    SignalingError::NotFound(format!("No active session in room {room}"))
}
