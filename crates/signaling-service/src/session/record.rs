//! Owned session snapshots.
//!
//! A [`SessionRecord`] is a point-in-time copy of a live session. It is
//! what the persistence layer stores and what the read-only queries hand
//! out; mutating it never affects the live state.

use crate::protocol::MediaControlMessage;
use crate::quality::QualitySample;
use chrono::{DateTime, Utc};
use common::types::{ParticipantId, RoomId, SessionId, StreamId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Waiting,
    Active,
    Paused,
    Ended,
}

/// One active screen share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenShare {
    pub participant_id: ParticipantId,
    pub stream_id: StreamId,
    pub title: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl ScreenShare {
    /// A share stamped with the current time.
    #[must_use]
    pub fn new(participant_id: ParticipantId, stream_id: StreamId, title: Option<String>) -> Self {
        Self {
            participant_id,
            stream_id,
            title,
            started_at: Utc::now(),
        }
    }
}

/// Snapshot of a room's session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub room_id: RoomId,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub connections: BTreeMap<ParticipantId, String>,
    pub media_states: BTreeMap<ParticipantId, MediaControlMessage>,
    pub connection_quality: BTreeMap<ParticipantId, QualitySample>,
    pub active_screen_shares: Vec<ScreenShare>,
    pub pinned_screen_share: Option<ParticipantId>,
}

impl SessionRecord {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}
