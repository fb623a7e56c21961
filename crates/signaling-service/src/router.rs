//! Signal router.
//!
//! Dispatches validated client messages to presence, session state, the
//! screen-share arbiter and the quality monitor, and fans the resulting
//! events out through the transport.
//!
//! # Ordering
//!
//! A join is recorded in the session store and then in presence before any
//! membership snapshot is taken, so of two racing joins at least one sees
//! the other. Ending a session clears presence before the store entry, the
//! reverse of the join order, so a join racing an end is never live in a
//! session while missing from presence. Every broadcast
//! works from an owned snapshot; no lock is held while notifications are
//! queued.
//!
//! # Failure isolation
//!
//! [`SignalRouter::dispatch`] never propagates an error. A failed message
//! is logged, counted, and answered with an `error` notification to its
//! sender only. Delivery failures to individual recipients are absorbed by
//! [`fan_out`].

use crate::arbiter::{ScreenShareArbiter, ShareAnnouncement};
use crate::collaborators::{MeetingNotifier, RoomDirectory};
use crate::errors::SignalingError;
use crate::observability::metrics;
use crate::presence::PresenceRegistry;
use crate::protocol::{
    ClientMessage, MediaControlMessage, Notification, QualityReport, ScreenShareMessage,
    ServerEvent, SignalEnvelope, SignalKind,
};
use crate::quality::{QualityMonitor, QualitySample, QualityStatistics};
use crate::session::{ScreenShare, SessionPersistence, SessionRecord, SessionStore};
use crate::transport::{fan_out, unicast, Transport};
use common::types::{ParticipantId, RoomId, SessionId, StreamId};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Connection state recorded for a joined participant.
pub const STATE_CONNECTED: &str = "connected";

/// Status reported by [`SessionInfo`] when a room has no live session.
pub const NO_ACTIVE_SESSION: &str = "NO_ACTIVE_SESSION";

/// Everything the router is wired to.
pub struct RouterDeps {
    pub presence: Arc<PresenceRegistry>,
    pub store: Arc<SessionStore>,
    pub directory: Arc<dyn RoomDirectory>,
    pub persistence: Arc<dyn SessionPersistence>,
    pub notifier: Arc<dyn MeetingNotifier>,
    pub transport: Arc<dyn Transport>,
    pub max_concurrent_screens: usize,
}

/// Read-only view of a room's session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub room_id: RoomId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub status: &'static str,
    pub participants: Vec<ParticipantId>,
    pub pinned_screen_share: Option<ParticipantId>,
    pub active_screen_shares: Vec<ScreenShare>,
}

pub struct SignalRouter {
    presence: Arc<PresenceRegistry>,
    store: Arc<SessionStore>,
    arbiter: ScreenShareArbiter,
    quality: QualityMonitor,
    directory: Arc<dyn RoomDirectory>,
    persistence: Arc<dyn SessionPersistence>,
    notifier: Arc<dyn MeetingNotifier>,
    transport: Arc<dyn Transport>,
    max_concurrent_screens: usize,
}

impl SignalRouter {
    pub fn new(deps: RouterDeps) -> Self {
        let arbiter = ScreenShareArbiter::new(
            Arc::clone(&deps.store),
            Arc::clone(&deps.presence),
            Arc::clone(&deps.directory),
            Arc::clone(&deps.transport),
            deps.max_concurrent_screens,
        );
        let quality = QualityMonitor::new(
            Arc::clone(&deps.store),
            Arc::clone(&deps.presence),
            Arc::clone(&deps.directory),
            Arc::clone(&deps.transport),
        );

        Self {
            presence: deps.presence,
            store: deps.store,
            arbiter,
            quality,
            directory: deps.directory,
            persistence: deps.persistence,
            notifier: deps.notifier,
            transport: deps.transport,
            max_concurrent_screens: deps.max_concurrent_screens,
        }
    }

    #[must_use]
    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Handle one validated message from `caller` in `room`.
    ///
    /// Errors are reported to the sender and never returned.
    #[instrument(skip_all, fields(room_id = %room, participant_id = %caller, message_type = message.kind()))]
    pub async fn dispatch(&self, room: &RoomId, caller: &ParticipantId, message: ClientMessage) {
        let kind = message.kind();
        let started = Instant::now();

        let result = self.handle(room, caller, message).await;

        let outcome = match &result {
            Ok(()) => "success",
            Err(e) => {
                warn!(
                    target: "sig.router",
                    error = %e,
                    error_type = e.error_type_label(),
                    "Message handling failed"
                );
                metrics::record_error(e.error_type_label());
                self.send_error(room, caller, e);
                "error"
            }
        };
        metrics::record_message(kind, outcome, started.elapsed());
    }

    /// Answer the sender with an `error` notification.
    pub fn send_error(&self, room: &RoomId, caller: &ParticipantId, err: &SignalingError) {
        unicast(self.transport.as_ref(), room, caller, &Notification::error(err));
    }

    async fn handle(
        &self,
        room: &RoomId,
        caller: &ParticipantId,
        message: ClientMessage,
    ) -> Result<(), SignalingError> {
        match message {
            ClientMessage::JoinRoom(_) => self.join_room(room, caller).await.map(|_| ()),
            ClientMessage::LeaveRoom(_) => {
                self.leave_room(room, caller).await;
                Ok(())
            }
            ClientMessage::Offer(envelope) => {
                self.relay(room, SignalKind::Offer, envelope);
                Ok(())
            }
            ClientMessage::Answer(envelope) => {
                self.relay(room, SignalKind::Answer, envelope);
                Ok(())
            }
            ClientMessage::IceCandidate(envelope) => {
                self.relay(room, SignalKind::IceCandidate, envelope);
                Ok(())
            }
            ClientMessage::MediaControl(message) => {
                self.media_control(room, message).await;
                Ok(())
            }
            ClientMessage::ScreenShare(message) => self.screen_share(room, caller, message).await,
            ClientMessage::PinScreen { participant_id } => {
                self.pin_screen(room, caller, &participant_id).await
            }
            ClientMessage::UnpinScreen => self.unpin_screen(room, caller).await,
            ClientMessage::UpdateScreenShare {
                stream_id,
                screen_title,
            } => self
                .update_screen_share(room, caller, &stream_id, screen_title)
                .await
                .map(|_| ()),
            ClientMessage::ConnectionStatus(report) => self
                .connection_status(room, caller, report)
                .await
                .map(|_| ()),
            ClientMessage::UpdatePermissions {
                allow_screen_sharing,
            } => {
                self.update_screen_share_permission(room, caller, allow_screen_sharing)
                    .await
            }
            ClientMessage::EndSession => self.end_session(room, caller).await.map(|_| ()),
        }
    }

    // ------------------------------------------------------------------
    // Presence
    // ------------------------------------------------------------------

    /// Join `participant` to `room`. Returns the member list after the join.
    #[instrument(skip_all, fields(room_id = %room, participant_id = %participant))]
    pub async fn join_room(
        &self,
        room: &RoomId,
        participant: &ParticipantId,
    ) -> Result<Vec<ParticipantId>, SignalingError> {
        // Store first, presence second. `end_session` clears presence before
        // ending the store entry, so whichever session this join lands in,
        // the joiner is in presence whenever it is live in that session.
        let session = self
            .store
            .update_connection_state(room, participant, STATE_CONNECTED);
        let newly_joined = self.presence.join(room, participant);
        let members = self.presence.snapshot(room);

        let display_name = match self.directory.display_name(room, participant).await {
            Ok(name) => name,
            Err(e) => {
                warn!(target: "sig.router", error = %e, "Display name lookup failed");
                None
            }
        };

        let others: Vec<&ParticipantId> = members.iter().filter(|m| *m != participant).collect();
        fan_out(
            self.transport.as_ref(),
            room,
            others,
            &Notification::new(ServerEvent::ParticipantJoined {
                participant_id: participant.clone(),
                room_id: room.clone(),
                display_name,
                participants: members.clone(),
            }),
        );

        let transport = self.transport.as_ref();
        unicast(
            transport,
            room,
            participant,
            &Notification::new(ServerEvent::ParticipantsList {
                room_id: room.clone(),
                participants: members.clone(),
            }),
        );
        unicast(
            transport,
            room,
            participant,
            &Notification::new(ServerEvent::RoomInfo {
                room_id: room.clone(),
                session_id: session.session_id(),
                participant_count: members.len(),
                max_concurrent_screens: self.max_concurrent_screens,
            }),
        );

        info!(
            target: "sig.router",
            session_id = %session.session_id(),
            newly_joined,
            participant_count = members.len(),
            "Participant joined"
        );
        self.update_gauges();
        self.persist(room).await;
        Ok(members)
    }

    /// Remove `participant` from `room`, as on an explicit leave or a
    /// closed connection. Leaving a room one is not in does nothing
    /// beyond cleanup.
    #[instrument(skip_all, fields(room_id = %room, participant_id = %participant))]
    pub async fn leave_room(&self, room: &RoomId, participant: &ParticipantId) {
        let was_member = self.presence.leave(room, participant);
        self.store.remove_participant(room, participant);
        self.arbiter.stop_share(room, participant);

        if was_member {
            let members = self.presence.snapshot(room);
            fan_out(
                self.transport.as_ref(),
                room,
                &members,
                &Notification::new(ServerEvent::ParticipantLeft {
                    participant_id: participant.clone(),
                    room_id: room.clone(),
                    participants: members.clone(),
                }),
            );
            info!(
                target: "sig.router",
                participant_count = members.len(),
                "Participant left"
            );

            match self.directory.roles(room).await {
                Ok(roles) if roles.is_host(participant) => {
                    if let Err(e) = self.directory.host_left(room, participant).await {
                        warn!(target: "sig.router", error = %e, "Host departure notification failed");
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(target: "sig.router", error = %e, "Role lookup failed on leave"),
            }
        }

        self.update_gauges();
        self.persist(room).await;
    }

    // ------------------------------------------------------------------
    // Signaling relay
    // ------------------------------------------------------------------

    /// Forward a handshake message. With a target it goes to that
    /// participant only; without one, to every member except the sender.
    pub fn relay(&self, room: &RoomId, kind: SignalKind, envelope: SignalEnvelope) {
        let sender = envelope.from_participant_id.clone();
        let target = envelope.to_participant_id.clone();
        let notification = Notification::new(ServerEvent::relayed(kind, envelope));

        match target {
            Some(to) => {
                unicast(self.transport.as_ref(), room, &to, &notification);
                debug!(
                    target: "sig.router",
                    room_id = %room,
                    from = %sender,
                    to = %to,
                    signal = kind.as_str(),
                    "Signal relayed"
                );
            }
            None => {
                let members = self.presence.snapshot(room);
                let report = fan_out(
                    self.transport.as_ref(),
                    room,
                    members.iter().filter(|m| **m != sender),
                    &notification,
                );
                debug!(
                    target: "sig.router",
                    room_id = %room,
                    from = %sender,
                    signal = kind.as_str(),
                    delivered = report.delivered,
                    "Signal broadcast"
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Media and screen sharing
    // ------------------------------------------------------------------

    /// Store the participant's media state and tell the whole room.
    pub async fn media_control(&self, room: &RoomId, message: MediaControlMessage) {
        self.store.update_media_state(room, &message);

        let members = self.presence.snapshot(room);
        fan_out(
            self.transport.as_ref(),
            room,
            &members,
            &Notification::new(ServerEvent::MediaControlChanged {
                participant_id: message.participant_id,
                media_type: message.media_type,
                enabled: message.enabled,
                stream_id: message.stream_id,
            }),
        );
        self.persist(room).await;
    }

    async fn screen_share(
        &self,
        room: &RoomId,
        caller: &ParticipantId,
        message: ScreenShareMessage,
    ) -> Result<(), SignalingError> {
        if !message.is_sharing {
            self.stop_screen_share(room, caller).await;
            return Ok(());
        }

        let stream_id = message.stream_id.ok_or_else(|| {
            SignalingError::InvalidMessage("streamId is required to start a screen share".to_string())
        })?;
        let share = self
            .start_screen_share(room, caller, stream_id, message.screen_title, ShareAnnouncement::Changed)
            .await?;

        if message.is_pinned {
            self.arbiter.pin(room, &share.participant_id)?;
            self.persist(room).await;
        }
        Ok(())
    }

    /// Start or replace `caller`'s share.
    pub async fn start_screen_share(
        &self,
        room: &RoomId,
        caller: &ParticipantId,
        stream_id: StreamId,
        title: Option<String>,
        announcement: ShareAnnouncement,
    ) -> Result<ScreenShare, SignalingError> {
        let share = self
            .arbiter
            .start_share(room, caller, stream_id, title, announcement)
            .await?;
        self.persist(room).await;
        Ok(share)
    }

    /// Stop `caller`'s share, if any.
    pub async fn stop_screen_share(&self, room: &RoomId, caller: &ParticipantId) -> Option<ScreenShare> {
        let removed = self.arbiter.stop_share(room, caller);
        if removed.is_some() {
            self.persist(room).await;
        }
        removed
    }

    pub async fn pin_screen(
        &self,
        room: &RoomId,
        caller: &ParticipantId,
        target: &ParticipantId,
    ) -> Result<(), SignalingError> {
        debug!(target: "sig.router", room_id = %room, participant_id = %caller, pinned = %target, "Pin requested");
        self.arbiter.pin(room, target)?;
        self.persist(room).await;
        Ok(())
    }

    pub async fn unpin_screen(&self, room: &RoomId, caller: &ParticipantId) -> Result<(), SignalingError> {
        debug!(target: "sig.router", room_id = %room, participant_id = %caller, "Unpin requested");
        self.arbiter.unpin(room)?;
        self.persist(room).await;
        Ok(())
    }

    pub async fn update_screen_share(
        &self,
        room: &RoomId,
        caller: &ParticipantId,
        stream_id: &StreamId,
        title: String,
    ) -> Result<ScreenShare, SignalingError> {
        let share = self
            .arbiter
            .update_share_info(room, caller, stream_id, title)?;
        self.persist(room).await;
        Ok(share)
    }

    /// Record a connection-quality report from `caller`.
    pub async fn connection_status(
        &self,
        room: &RoomId,
        caller: &ParticipantId,
        report: QualityReport,
    ) -> Result<QualitySample, SignalingError> {
        self.quality.record(room, caller, report).await
    }

    /// Host only: allow or forbid screen sharing by ordinary participants.
    #[instrument(skip_all, fields(room_id = %room, participant_id = %caller))]
    pub async fn update_screen_share_permission(
        &self,
        room: &RoomId,
        caller: &ParticipantId,
        enabled: bool,
    ) -> Result<(), SignalingError> {
        let roles = self.directory.roles(room).await?;
        if !roles.is_host(caller) {
            return Err(SignalingError::AccessDenied(
                "Only the host can change screen sharing permissions".to_string(),
            ));
        }

        self.directory
            .set_participants_can_share_screen(room, enabled)
            .await?;

        let members = self.presence.snapshot(room);
        fan_out(
            self.transport.as_ref(),
            room,
            &members,
            &Notification::new(ServerEvent::PermissionsUpdated {
                permission: "screenSharing",
                enabled,
            }),
        );
        info!(target: "sig.router", enabled, "Screen sharing permission updated");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// End the room's session. Room membership is cleared and captured in
    /// one step, the session is ended, and every captured member is told.
    ///
    /// # Errors
    ///
    /// `AccessDenied` unless `caller` is host or co-host; `NotFound`
    /// without an active session.
    #[instrument(skip_all, fields(room_id = %room, participant_id = %caller))]
    pub async fn end_session(
        &self,
        room: &RoomId,
        caller: &ParticipantId,
    ) -> Result<SessionRecord, SignalingError> {
        let roles = self.directory.roles(room).await?;
        if !roles.is_privileged(caller) {
            return Err(SignalingError::AccessDenied(
                "Only the host or a co-host can end the session".to_string(),
            ));
        }

        if self.store.active(room).is_none() {
            return Err(no_active_session(room));
        }

        // Reverse of the join order; see the module docs.
        let members = self.presence.clear_room(room);
        let record = self.store.end(room).ok_or_else(|| no_active_session(room))?;
        let ended_at = record.ended_at.unwrap_or_else(chrono::Utc::now);

        let report = fan_out(
            self.transport.as_ref(),
            room,
            &members,
            &Notification::new(ServerEvent::SessionEnded {
                room_id: room.clone(),
                session_id: record.session_id,
                ended_at,
            }),
        );

        info!(
            target: "sig.router",
            session_id = %record.session_id,
            notified = report.delivered,
            "Session ended"
        );

        let started = Instant::now();
        let result = self.persistence.mark_ended(&record).await;
        metrics::record_persistence("mark_ended", started.elapsed(), result.is_ok());
        if let Err(e) = result {
            warn!(target: "sig.persistence", error = %e, "Failed to persist ended session");
        }

        let notifier = Arc::clone(&self.notifier);
        let notify_room = room.clone();
        let session_id = record.session_id;
        tokio::spawn(async move {
            if let Err(e) = notifier.session_ended(&notify_room, session_id).await {
                warn!(
                    target: "sig.router",
                    room_id = %notify_room,
                    session_id = %session_id,
                    error = %e,
                    "Session end notification failed"
                );
            }
        });

        self.update_gauges();
        Ok(record)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    #[must_use]
    pub fn session_info(&self, room: &RoomId) -> SessionInfo {
        match self.store.active(room) {
            Some(session) => {
                let (pinned_screen_share, active_screen_shares) = session
                    .with_screens(|board| (board.pinned().cloned(), board.shares().to_vec()));
                SessionInfo {
                    room_id: room.clone(),
                    session_id: Some(session.session_id()),
                    status: "ACTIVE",
                    participants: self.presence.snapshot(room),
                    pinned_screen_share,
                    active_screen_shares,
                }
            }
            None => SessionInfo {
                room_id: room.clone(),
                session_id: None,
                status: NO_ACTIVE_SESSION,
                participants: Vec::new(),
                pinned_screen_share: None,
                active_screen_shares: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn active_screen_shares(&self, room: &RoomId) -> Vec<ScreenShare> {
        self.arbiter.active_shares(room)
    }

    #[must_use]
    pub fn pinned_screen_share(&self, room: &RoomId) -> Option<ScreenShare> {
        self.arbiter.pinned_share(room)
    }

    pub async fn quality_statistics(
        &self,
        room: &RoomId,
        caller: &ParticipantId,
    ) -> Result<QualityStatistics, SignalingError> {
        self.quality.statistics(room, caller).await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Hand the room's current record to persistence. Failures are logged
    /// and counted only.
    async fn persist(&self, room: &RoomId) {
        let Some(record) = self.store.record(room) else {
            return;
        };

        let started = Instant::now();
        let result = self.persistence.save(&record).await;
        metrics::record_persistence("save", started.elapsed(), result.is_ok());

        if let Err(e) = result {
            warn!(
                target: "sig.persistence",
                room_id = %room,
                session_id = %record.session_id,
                error = %e,
                "Failed to persist session record"
            );
        }
    }

    fn update_gauges(&self) {
        metrics::set_rooms_active(self.presence.room_count());
        metrics::set_sessions_active(self.store.session_count());
    }
}

fn no_active_session(room: &RoomId) -> SignalingError {
    SignalingError::NotFound(format!("No active session in room {room}"))
}
