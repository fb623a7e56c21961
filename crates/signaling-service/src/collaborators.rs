//! Services the signaling core consumes but does not own.
//!
//! - [`RoomDirectory`]: room and participant records (roles, display
//!   names, the room-level screen-share permission, host departure).
//! - [`MeetingNotifier`]: fire-and-forget end-of-meeting notifications.
//! - [`IdentityResolver`]: who is on the other end of a connection.
//!
//! In-memory implementations back the default deployment and the tests.

use crate::errors::SignalingError;
use axum::http::HeaderMap;
use common::types::{ParticipantId, RoomId, SessionId};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Header carrying the caller's participant ID.
pub const PARTICIPANT_HEADER: &str = "x-participant-id";

/// Query parameter fallback for clients that cannot set headers on a
/// WebSocket upgrade.
pub const PARTICIPANT_QUERY_PARAM: &str = "participant_id";

/// Privileged participants of a room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRoles {
    #[serde(default)]
    pub host: Option<ParticipantId>,
    #[serde(default)]
    pub co_hosts: HashSet<ParticipantId>,
}

impl RoomRoles {
    #[must_use]
    pub fn is_host(&self, participant: &ParticipantId) -> bool {
        self.host.as_ref() == Some(participant)
    }

    /// Host or co-host.
    #[must_use]
    pub fn is_privileged(&self, participant: &ParticipantId) -> bool {
        self.is_host(participant) || self.co_hosts.contains(participant)
    }

    /// Host and co-hosts, host first, co-hosts sorted.
    #[must_use]
    pub fn privileged(&self) -> Vec<ParticipantId> {
        let mut co_hosts: Vec<ParticipantId> = self
            .co_hosts
            .iter()
            .filter(|p| Some(*p) != self.host.as_ref())
            .cloned()
            .collect();
        co_hosts.sort();
        self.host.iter().cloned().chain(co_hosts).collect()
    }
}

/// Room and participant records.
#[async_trait::async_trait]
pub trait RoomDirectory: Send + Sync {
    async fn roles(&self, room: &RoomId) -> Result<RoomRoles, SignalingError>;

    async fn display_name(
        &self,
        room: &RoomId,
        participant: &ParticipantId,
    ) -> Result<Option<String>, SignalingError>;

    /// Whether non-privileged participants may share their screen.
    async fn participants_can_share_screen(&self, room: &RoomId) -> Result<bool, SignalingError>;

    async fn set_participants_can_share_screen(
        &self,
        room: &RoomId,
        allowed: bool,
    ) -> Result<(), SignalingError>;

    /// The host left the room; the directory owns what happens next.
    async fn host_left(&self, room: &RoomId, host: &ParticipantId) -> Result<(), SignalingError>;
}

#[derive(Debug, Clone)]
struct RoomEntry {
    roles: RoomRoles,
    participants_can_share: bool,
    display_names: HashMap<ParticipantId, String>,
}

impl Default for RoomEntry {
    fn default() -> Self {
        Self {
            roles: RoomRoles::default(),
            participants_can_share: true,
            display_names: HashMap::new(),
        }
    }
}

/// Directory kept in process memory. Unknown rooms have no host and allow
/// everyone to share.
#[derive(Debug, Default)]
pub struct InMemoryRoomDirectory {
    rooms: DashMap<RoomId, RoomEntry>,
    host_departures: Mutex<Vec<(RoomId, ParticipantId)>>,
}

impl InMemoryRoomDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the room's host and co-hosts.
    pub fn assign_roles(&self, room: &RoomId, roles: RoomRoles) {
        info!(
            target: "sig.directory",
            room_id = %room,
            host = ?roles.host.as_ref().map(ParticipantId::as_str),
            co_hosts = roles.co_hosts.len(),
            "Room roles assigned"
        );
        self.rooms.entry(room.clone()).or_default().roles = roles;
    }

    pub fn set_display_name(&self, room: &RoomId, participant: &ParticipantId, name: impl Into<String>) {
        self.rooms
            .entry(room.clone())
            .or_default()
            .display_names
            .insert(participant.clone(), name.into());
    }

    /// Every `host_left` call received so far.
    #[must_use]
    pub fn host_departures(&self) -> Vec<(RoomId, ParticipantId)> {
        self.host_departures.lock().clone()
    }
}

#[async_trait::async_trait]
impl RoomDirectory for InMemoryRoomDirectory {
    async fn roles(&self, room: &RoomId) -> Result<RoomRoles, SignalingError> {
        Ok(self
            .rooms
            .get(room.as_str())
            .map(|entry| entry.roles.clone())
            .unwrap_or_default())
    }

    async fn display_name(
        &self,
        room: &RoomId,
        participant: &ParticipantId,
    ) -> Result<Option<String>, SignalingError> {
        Ok(self
            .rooms
            .get(room.as_str())
            .and_then(|entry| entry.display_names.get(participant.as_str()).cloned()))
    }

    async fn participants_can_share_screen(&self, room: &RoomId) -> Result<bool, SignalingError> {
        Ok(self
            .rooms
            .get(room.as_str())
            .map_or(true, |entry| entry.participants_can_share))
    }

    async fn set_participants_can_share_screen(
        &self,
        room: &RoomId,
        allowed: bool,
    ) -> Result<(), SignalingError> {
        self.rooms
            .entry(room.clone())
            .or_default()
            .participants_can_share = allowed;
        Ok(())
    }

    async fn host_left(&self, room: &RoomId, host: &ParticipantId) -> Result<(), SignalingError> {
        debug!(target: "sig.directory", room_id = %room, participant_id = %host, "Host left");
        self.host_departures
            .lock()
            .push((room.clone(), host.clone()));
        Ok(())
    }
}

/// End-of-meeting notification side channel (mail, push). Called without
/// being awaited by the signaling path.
#[async_trait::async_trait]
pub trait MeetingNotifier: Send + Sync {
    async fn session_ended(&self, room: &RoomId, session_id: SessionId) -> Result<(), SignalingError>;
}

/// Notifier that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait::async_trait]
impl MeetingNotifier for NoopNotifier {
    async fn session_ended(&self, room: &RoomId, session_id: SessionId) -> Result<(), SignalingError> {
        debug!(
            target: "sig.notifier",
            room_id = %room,
            session_id = %session_id,
            "Session end notification skipped"
        );
        Ok(())
    }
}

/// Resolves the caller of a connection or request.
pub trait IdentityResolver: Send + Sync {
    fn resolve(
        &self,
        headers: &HeaderMap,
        query: &HashMap<String, String>,
    ) -> Result<ParticipantId, SignalingError>;
}

/// Reads the participant ID from the `x-participant-id` header, then the
/// `participant_id` query parameter. Anonymous callers get a guest ID when
/// guests are allowed.
#[derive(Debug, Clone, Copy)]
pub struct HeaderIdentityResolver {
    allow_guests: bool,
}

impl HeaderIdentityResolver {
    #[must_use]
    pub fn new(allow_guests: bool) -> Self {
        Self { allow_guests }
    }
}

impl IdentityResolver for HeaderIdentityResolver {
    fn resolve(
        &self,
        headers: &HeaderMap,
        query: &HashMap<String, String>,
    ) -> Result<ParticipantId, SignalingError> {
        let from_header = headers
            .get(PARTICIPANT_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        let from_query = query
            .get(PARTICIPANT_QUERY_PARAM)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty());

        match from_header.or(from_query) {
            Some(id) => Ok(ParticipantId::new(id)),
            None if self.allow_guests => Ok(ParticipantId::guest()),
            None => Err(SignalingError::AccessDenied(
                "Participant identity required".to_string(),
            )),
        }
    }
}

/// Test doubles for the collaborator traits.
pub mod mock {
    use super::*;
    use std::time::Duration;

    /// Notifier that records every call.
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        calls: Mutex<Vec<(RoomId, SessionId)>>,
    }

    impl RecordingNotifier {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        #[must_use]
        pub fn calls(&self) -> Vec<(RoomId, SessionId)> {
            self.calls.lock().clone()
        }

        /// Wait until at least `count` calls were recorded, up to one second.
        /// Returns the calls seen.
        pub async fn wait_for(&self, count: usize) -> Vec<(RoomId, SessionId)> {
            for _ in 0..100 {
                let calls = self.calls();
                if calls.len() >= count {
                    return calls;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            self.calls()
        }
    }

    #[async_trait::async_trait]
    impl MeetingNotifier for RecordingNotifier {
        async fn session_ended(
            &self,
            room: &RoomId,
            session_id: SessionId,
        ) -> Result<(), SignalingError> {
            self.calls.lock().push((room.clone(), session_id));
            Ok(())
        }
    }
}
