//! Live session state.
//!
//! One [`LiveSession`] per room with an active session, keyed in a sharded
//! map. Per-participant state (connection state, media state, quality) lives
//! in per-session `DashMap`s so concurrent updates from different
//! participants are independent single-key upserts with no whole-record
//! read-modify-write. Screen-share state is small and must change
//! atomically as a unit, so it sits behind a `parking_lot` mutex that is
//! only ever taken inside [`LiveSession::with_screens`] and never held
//! across an await point.

use super::record::{SessionRecord, SessionStatus};
use super::screens::ScreenBoard;
use crate::protocol::MediaControlMessage;
use crate::quality::QualitySample;
use chrono::{DateTime, Utc};
use common::types::{ParticipantId, RoomId, SessionId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// The active session of one room.
#[derive(Debug)]
pub struct LiveSession {
    session_id: SessionId,
    room_id: RoomId,
    started_at: DateTime<Utc>,
    connections: DashMap<ParticipantId, String>,
    media_states: DashMap<ParticipantId, MediaControlMessage>,
    quality: DashMap<ParticipantId, QualitySample>,
    screens: Mutex<ScreenBoard>,
}

impl LiveSession {
    fn new(room_id: RoomId) -> Self {
        Self {
            session_id: SessionId::new(),
            room_id,
            started_at: Utc::now(),
            connections: DashMap::new(),
            media_states: DashMap::new(),
            quality: DashMap::new(),
            screens: Mutex::new(ScreenBoard::default()),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Run `f` with exclusive access to the screen-share board.
    pub fn with_screens<R>(&self, f: impl FnOnce(&mut ScreenBoard) -> R) -> R {
        let mut board = self.screens.lock();
        f(&mut board)
    }

    #[must_use]
    pub fn connection_state(&self, participant: &ParticipantId) -> Option<String> {
        self.connections
            .get(participant.as_str())
            .map(|state| state.value().clone())
    }

    #[must_use]
    pub fn media_state(&self, participant: &ParticipantId) -> Option<MediaControlMessage> {
        self.media_states
            .get(participant.as_str())
            .map(|state| state.value().clone())
    }

    #[must_use]
    pub fn quality_of(&self, participant: &ParticipantId) -> Option<QualitySample> {
        self.quality
            .get(participant.as_str())
            .map(|sample| sample.value().clone())
    }

    /// Latest quality sample of every participant that reported one.
    #[must_use]
    pub fn quality_samples(&self) -> Vec<(ParticipantId, QualitySample)> {
        self.quality
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    fn snapshot(&self, status: SessionStatus, ended_at: Option<DateTime<Utc>>) -> SessionRecord {
        let (active_screen_shares, pinned_screen_share) =
            self.with_screens(|board| (board.shares().to_vec(), board.pinned().cloned()));

        SessionRecord {
            session_id: self.session_id,
            room_id: self.room_id.clone(),
            status,
            started_at: self.started_at,
            ended_at,
            connections: collect_sorted(&self.connections),
            media_states: collect_sorted(&self.media_states),
            connection_quality: collect_sorted(&self.quality),
            active_screen_shares,
            pinned_screen_share,
        }
    }
}

fn collect_sorted<V: Clone>(map: &DashMap<ParticipantId, V>) -> BTreeMap<ParticipantId, V> {
    map.iter()
        .map(|entry| (entry.key().clone(), entry.value().clone()))
        .collect()
}

/// All live sessions, keyed by room.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<RoomId, Arc<LiveSession>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the room's active session, creating it if there is none.
    pub fn get_or_create_active(&self, room: &RoomId) -> Arc<LiveSession> {
        match self.sessions.entry(room.clone()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let session = Arc::new(LiveSession::new(room.clone()));
                info!(
                    target: "sig.session",
                    room_id = %room,
                    session_id = %session.session_id,
                    "Session started"
                );
                Arc::clone(entry.insert(session).value())
            }
        }
    }

    /// The room's active session, without creating one.
    #[must_use]
    pub fn active(&self, room: &RoomId) -> Option<Arc<LiveSession>> {
        self.sessions
            .get(room.as_str())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// End the room's session. The live state is dropped and the final
    /// record, with status `Ended` and `ended_at` set, is returned.
    pub fn end(&self, room: &RoomId) -> Option<SessionRecord> {
        let (_, session) = self.sessions.remove(room.as_str())?;
        let record = session.snapshot(SessionStatus::Ended, Some(Utc::now()));

        info!(
            target: "sig.session",
            room_id = %room,
            session_id = %record.session_id,
            "Session ended"
        );
        Some(record)
    }

    /// Snapshot of the room's active session.
    #[must_use]
    pub fn record(&self, room: &RoomId) -> Option<SessionRecord> {
        self.active(room)
            .map(|session| session.snapshot(SessionStatus::Active, None))
    }

    pub fn update_connection_state(
        &self,
        room: &RoomId,
        participant: &ParticipantId,
        state: &str,
    ) -> Arc<LiveSession> {
        let session = self.get_or_create_active(room);
        session
            .connections
            .insert(participant.clone(), state.to_string());
        session
    }

    pub fn update_media_state(&self, room: &RoomId, message: &MediaControlMessage) -> Arc<LiveSession> {
        let session = self.get_or_create_active(room);
        session
            .media_states
            .insert(message.participant_id.clone(), message.clone());
        session
    }

    pub fn record_quality(
        &self,
        room: &RoomId,
        participant: &ParticipantId,
        sample: QualitySample,
    ) -> Arc<LiveSession> {
        let session = self.get_or_create_active(room);
        session.quality.insert(participant.clone(), sample);
        session
    }

    /// Drop the participant's connection, media and quality entries.
    /// Returns `false` if the room has no active session.
    pub fn remove_participant(&self, room: &RoomId, participant: &ParticipantId) -> bool {
        let Some(session) = self.active(room) else {
            return false;
        };
        session.connections.remove(participant.as_str());
        session.media_states.remove(participant.as_str());
        session.quality.remove(participant.as_str());
        true
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::protocol::{MediaType, QualityReport};
    use crate::session::ScreenShare;
    use common::types::StreamId;

    fn room() -> RoomId {
        RoomId::new("42")
    }

    fn p(id: &str) -> ParticipantId {
        ParticipantId::new(id)
    }

    fn mute(participant: &str) -> MediaControlMessage {
        MediaControlMessage {
            participant_id: p(participant),
            room_id: room(),
            media_type: MediaType::Audio,
            enabled: false,
            stream_id: None,
        }
    }

    #[test]
    fn test_get_or_create_returns_same_session() {
        let store = SessionStore::new();
        let first = store.get_or_create_active(&room());
        let second = store.get_or_create_active(&room());

        assert_eq!(first.session_id(), second.session_id());
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn test_active_does_not_create() {
        let store = SessionStore::new();
        assert!(store.active(&room()).is_none());
        assert!(store.record(&room()).is_none());
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn test_updates_create_session_lazily() {
        let store = SessionStore::new();
        store.update_media_state(&room(), &mute("alice"));

        let record = store.record(&room()).unwrap();
        assert_eq!(record.status, SessionStatus::Active);
        assert!(!record.media_states.get("alice").unwrap().enabled);
    }

    #[test]
    fn test_end_stamps_and_removes() {
        let store = SessionStore::new();
        let session = store.update_connection_state(&room(), &p("alice"), "connected");
        session.with_screens(|board| {
            board
                .start(ScreenShare::new(p("alice"), StreamId::new("s1"), None), 4)
                .unwrap();
        });

        let record = store.end(&room()).unwrap();

        assert_eq!(record.status, SessionStatus::Ended);
        assert!(record.ended_at.is_some());
        assert_eq!(record.session_id, session.session_id());
        assert_eq!(record.active_screen_shares.len(), 1);
        assert!(store.active(&room()).is_none());
        assert!(store.end(&room()).is_none());
    }

    #[test]
    fn test_new_session_after_end_has_new_id() {
        let store = SessionStore::new();
        let first = store.get_or_create_active(&room()).session_id();
        store.end(&room());

        let second = store.get_or_create_active(&room()).session_id();
        assert_ne!(first, second);
    }

    #[test]
    fn test_remove_participant_drops_all_entries() {
        let store = SessionStore::new();
        store.update_connection_state(&room(), &p("alice"), "connected");
        store.update_media_state(&room(), &mute("alice"));
        store.record_quality(
            &room(),
            &p("alice"),
            QualitySample::from_report(QualityReport {
                packet_loss_percent: 0.1,
                latency_ms: 20.0,
                bandwidth_kbps: 2000.0,
            }),
        );
        store.update_connection_state(&room(), &p("bob"), "connected");

        assert!(store.remove_participant(&room(), &p("alice")));

        let record = store.record(&room()).unwrap();
        assert!(!record.connections.contains_key("alice"));
        assert!(record.media_states.is_empty());
        assert!(record.connection_quality.is_empty());
        assert!(record.connections.contains_key("bob"));
    }

    #[test]
    fn test_concurrent_media_updates_are_not_lost() {
        let store = Arc::new(SessionStore::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.update_media_state(&room(), &mute(&format!("p{i}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let record = store.record(&room()).unwrap();
        assert_eq!(record.media_states.len(), 8);
        assert_eq!(store.session_count(), 1);
    }
}
