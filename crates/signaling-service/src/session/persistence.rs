//! Session durability seam.
//!
//! The router hands a [`SessionRecord`] snapshot to a [`SessionPersistence`]
//! after each mutation. Failures are the router's to log and count; they
//! never fail the signaling operation that triggered the write.

use super::record::SessionRecord;
use crate::errors::SignalingError;
use common::types::{RoomId, SessionId};
use super::record::SessionStatus;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Durable store for session records.
#[async_trait::async_trait]
pub trait SessionPersistence: Send + Sync {
    /// Upsert the record of an active session. A record already stored as
    /// ended is left untouched, so a snapshot taken before the end cannot
    /// resurrect the session.
    async fn save(&self, record: &SessionRecord) -> Result<(), SignalingError>;

    /// Store the final record of an ended session and drop the room's
    /// active-session pointer.
    async fn mark_ended(&self, record: &SessionRecord) -> Result<(), SignalingError>;
}

/// Process-local persistence, used when no Redis URL is configured.
#[derive(Debug, Default)]
pub struct InMemorySessionPersistence {
    records: DashMap<SessionId, SessionRecord>,
    active: DashMap<RoomId, SessionId>,
}

impl InMemorySessionPersistence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, session_id: &SessionId) -> Option<SessionRecord> {
        self.records.get(session_id).map(|r| r.value().clone())
    }

    /// ID of the room's active session, if one has been saved and not ended.
    #[must_use]
    pub fn active_session(&self, room: &RoomId) -> Option<SessionId> {
        self.active.get(room.as_str()).map(|id| *id.value())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait::async_trait]
impl SessionPersistence for InMemorySessionPersistence {
    async fn save(&self, record: &SessionRecord) -> Result<(), SignalingError> {
        // The record's shard lock is held until the pointer is written, so
        // a concurrent mark_ended either runs fully before or fully after.
        let _stored = match self.records.entry(record.session_id) {
            Entry::Occupied(entry) if entry.get().status == SessionStatus::Ended => {
                return Ok(());
            }
            Entry::Occupied(mut entry) => {
                entry.insert(record.clone());
                entry.into_ref()
            }
            Entry::Vacant(entry) => entry.insert(record.clone()),
        };
        self.active.insert(record.room_id.clone(), record.session_id);
        Ok(())
    }

    async fn mark_ended(&self, record: &SessionRecord) -> Result<(), SignalingError> {
        let _stored = self
            .records
            .entry(record.session_id)
            .insert(record.clone());
        self.active
            .remove_if(record.room_id.as_str(), |_, id| *id == record.session_id);
        Ok(())
    }
}

/// Test doubles for [`SessionPersistence`].
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Persistence that fails every call, counting attempts.
    #[derive(Debug, Default)]
    pub struct FailingPersistence {
        attempts: AtomicUsize,
    }

    impl FailingPersistence {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl SessionPersistence for FailingPersistence {
        async fn save(&self, _record: &SessionRecord) -> Result<(), SignalingError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(SignalingError::Redis("mock persistence unavailable".to_string()))
        }

        async fn mark_ended(&self, _record: &SessionRecord) -> Result<(), SignalingError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(SignalingError::Redis("mock persistence unavailable".to_string()))
        }
    }
}
