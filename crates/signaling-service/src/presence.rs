//! Room presence registry.
//!
//! Tracks which participants are currently joined to each room. Each room
//! owns an independent membership set inside a sharded [`DashMap`], so
//! joins and leaves in unrelated rooms never contend on one lock. All
//! mutations go through the entry API, which holds the shard lock for the
//! duration of the set update and nothing longer.
//!
//! Fan-out callers always work from [`PresenceRegistry::snapshot`], an owned
//! copy. No reference into the map is ever held across a send.

use common::types::{ParticipantId, RoomId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use tracing::debug;

/// Concurrent room membership table.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    rooms: DashMap<RoomId, HashSet<ParticipantId>>,
}

impl PresenceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `participant` to `room`. Returns `true` if they were not already
    /// a member. Joining twice is a no-op.
    pub fn join(&self, room: &RoomId, participant: &ParticipantId) -> bool {
        let inserted = self
            .rooms
            .entry(room.clone())
            .or_default()
            .insert(participant.clone());

        debug!(
            target: "sig.presence",
            room_id = %room,
            participant_id = %participant,
            inserted,
            "Participant joined room"
        );
        inserted
    }

    /// Remove `participant` from `room`. Returns `true` if they were a
    /// member. The room entry is evicted once its last member leaves.
    pub fn leave(&self, room: &RoomId, participant: &ParticipantId) -> bool {
        let Entry::Occupied(mut entry) = self.rooms.entry(room.clone()) else {
            return false;
        };

        let removed = entry.get_mut().remove(participant.as_str());
        if entry.get().is_empty() {
            entry.remove();
            debug!(target: "sig.presence", room_id = %room, "Evicted empty room");
        }
        removed
    }

    /// Owned, sorted copy of the room's current members.
    #[must_use]
    pub fn snapshot(&self, room: &RoomId) -> Vec<ParticipantId> {
        let mut members: Vec<ParticipantId> = self
            .rooms
            .get(room.as_str())
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    #[must_use]
    pub fn contains(&self, room: &RoomId, participant: &ParticipantId) -> bool {
        self.rooms
            .get(room.as_str())
            .is_some_and(|set| set.contains(participant.as_str()))
    }

    #[must_use]
    pub fn member_count(&self, room: &RoomId) -> usize {
        self.rooms.get(room.as_str()).map_or(0, |set| set.len())
    }

    /// Number of rooms with at least one member.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Drop the whole membership set of `room`, returning who was in it.
    pub fn clear_room(&self, room: &RoomId) -> Vec<ParticipantId> {
        let mut members: Vec<ParticipantId> = self
            .rooms
            .remove(room.as_str())
            .map(|(_, set)| set.into_iter().collect())
            .unwrap_or_default();
        members.sort();
        members
    }
}
