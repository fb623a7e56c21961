//! Screen-share slot bookkeeping for one session.
//!
//! [`ScreenBoard`] is plain data guarded by the session's mutex. Every
//! method either applies completely or returns an error without touching
//! the board.

use super::record::ScreenShare;
use crate::errors::SignalingError;
use common::types::{ParticipantId, StreamId};

/// Result of a successful [`ScreenBoard::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    /// The participant's previous share, if this start replaced it.
    pub replaced: Option<ScreenShare>,
    /// Whether the sharer currently holds the pin.
    pub is_pinned: bool,
}

/// Result of a [`ScreenBoard::stop`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StopOutcome {
    pub removed: Option<ScreenShare>,
    /// True if the removed share's owner held the pin.
    pub unpinned: bool,
}

/// Active shares in start order plus the pinned participant.
#[derive(Debug, Clone, Default)]
pub struct ScreenBoard {
    shares: Vec<ScreenShare>,
    pinned: Option<ParticipantId>,
}

impl ScreenBoard {
    /// Register `share`, replacing any share the same participant already
    /// has. A replacement moves to the end of the start order. A new sharer
    /// is refused once `limit` shares are active.
    pub fn start(
        &mut self,
        share: ScreenShare,
        limit: usize,
    ) -> Result<StartOutcome, SignalingError> {
        let is_pinned = self.pinned.as_ref() == Some(&share.participant_id);
        let existing = self
            .shares
            .iter()
            .position(|s| s.participant_id == share.participant_id);

        let replaced = match existing {
            Some(index) => Some(self.shares.remove(index)),
            None if self.shares.len() >= limit => {
                return Err(SignalingError::CapacityExceeded { limit });
            }
            None => None,
        };
        self.shares.push(share);

        Ok(StartOutcome {
            replaced,
            is_pinned,
        })
    }

    /// Remove the participant's share. Clears the pin if they held it.
    pub fn stop(&mut self, participant: &ParticipantId) -> StopOutcome {
        let Some(index) = self
            .shares
            .iter()
            .position(|s| &s.participant_id == participant)
        else {
            return StopOutcome::default();
        };

        let removed = self.shares.remove(index);
        let unpinned = self.pinned.as_ref() == Some(participant);
        if unpinned {
            self.pinned = None;
        }

        StopOutcome {
            removed: Some(removed),
            unpinned,
        }
    }

    /// Pin `participant`. Returns the previously pinned participant.
    pub fn pin(&mut self, participant: ParticipantId) -> Option<ParticipantId> {
        self.pinned.replace(participant)
    }

    /// Clear the pin. Fails if nothing is pinned.
    pub fn unpin(&mut self) -> Result<ParticipantId, SignalingError> {
        self.pinned
            .take()
            .ok_or_else(|| SignalingError::InvalidState("No screen share is pinned".to_string()))
    }

    /// Change the title of the participant's share of `stream`.
    pub fn retitle(
        &mut self,
        participant: &ParticipantId,
        stream: &StreamId,
        title: String,
    ) -> Result<ScreenShare, SignalingError> {
        let share = self
            .shares
            .iter_mut()
            .find(|s| &s.participant_id == participant && &s.stream_id == stream)
            .ok_or_else(|| {
                SignalingError::NotFound(format!("No screen share {stream} for {participant}"))
            })?;
        share.title = Some(title);
        Ok(share.clone())
    }

    #[must_use]
    pub fn shares(&self) -> &[ScreenShare] {
        &self.shares
    }

    #[must_use]
    pub fn pinned(&self) -> Option<&ParticipantId> {
        self.pinned.as_ref()
    }

    /// The pinned participant's share, if they have one.
    #[must_use]
    pub fn pinned_share(&self) -> Option<ScreenShare> {
        let pinned = self.pinned.as_ref()?;
        self.shares
            .iter()
            .find(|s| &s.participant_id == pinned)
            .cloned()
    }

    #[must_use]
    pub fn share_of(&self, participant: &ParticipantId) -> Option<&ScreenShare> {
        self.shares.iter().find(|s| &s.participant_id == participant)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shares.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn share(participant: &str, stream: &str) -> ScreenShare {
        ScreenShare::new(
            ParticipantId::new(participant),
            StreamId::new(stream),
            None,
        )
    }

    fn p(id: &str) -> ParticipantId {
        ParticipantId::new(id)
    }

    #[test]
    fn test_start_appends_in_order() {
        let mut board = ScreenBoard::default();
        board.start(share("a", "s1"), 4).unwrap();
        board.start(share("b", "s2"), 4).unwrap();

        let owners: Vec<_> = board.shares().iter().map(|s| s.participant_id.as_str()).collect();
        assert_eq!(owners, vec!["a", "b"]);
    }

    #[test]
    fn test_second_start_replaces_first() {
        let mut board = ScreenBoard::default();
        board.start(share("a", "s1"), 4).unwrap();

        let outcome = board.start(share("a", "s2"), 4).unwrap();

        assert_eq!(outcome.replaced.unwrap().stream_id, StreamId::new("s1"));
        assert_eq!(board.len(), 1);
        assert_eq!(board.share_of(&p("a")).unwrap().stream_id, StreamId::new("s2"));
    }

    #[test]
    fn test_restart_moves_share_to_end() {
        let mut board = ScreenBoard::default();
        board.start(share("a", "s1"), 4).unwrap();
        board.start(share("b", "s2"), 4).unwrap();

        board.start(share("a", "s3"), 4).unwrap();

        let order: Vec<_> = board
            .shares()
            .iter()
            .map(|s| (s.participant_id.as_str(), s.stream_id.as_str()))
            .collect();
        assert_eq!(order, vec![("b", "s2"), ("a", "s3")]);
    }

    #[test]
    fn test_replacement_allowed_at_capacity() {
        let mut board = ScreenBoard::default();
        board.start(share("a", "s1"), 2).unwrap();
        board.start(share("b", "s2"), 2).unwrap();

        assert!(board.start(share("b", "s3"), 2).is_ok());
        assert_eq!(board.len(), 2);
    }

    #[test]
    fn test_new_sharer_rejected_at_capacity_without_change() {
        let mut board = ScreenBoard::default();
        board.start(share("a", "s1"), 1).unwrap();

        let result = board.start(share("b", "s2"), 1);

        assert!(matches!(
            result,
            Err(SignalingError::CapacityExceeded { limit: 1 })
        ));
        assert_eq!(board.len(), 1);
        assert!(board.share_of(&p("b")).is_none());
    }

    #[test]
    fn test_start_reports_pin() {
        let mut board = ScreenBoard::default();
        board.pin(p("a"));

        let outcome = board.start(share("a", "s1"), 4).unwrap();
        assert!(outcome.is_pinned);

        let other = board.start(share("b", "s2"), 4).unwrap();
        assert!(!other.is_pinned);
    }

    #[test]
    fn test_stop_pinned_clears_pin() {
        let mut board = ScreenBoard::default();
        board.start(share("a", "s1"), 4).unwrap();
        board.start(share("b", "s2"), 4).unwrap();
        board.pin(p("a"));

        let outcome = board.stop(&p("a"));

        assert!(outcome.unpinned);
        assert!(board.pinned().is_none());
    }

    #[test]
    fn test_stop_other_keeps_pin() {
        let mut board = ScreenBoard::default();
        board.start(share("a", "s1"), 4).unwrap();
        board.start(share("b", "s2"), 4).unwrap();
        board.pin(p("a"));

        let outcome = board.stop(&p("b"));

        assert!(outcome.removed.is_some());
        assert!(!outcome.unpinned);
        assert_eq!(board.pinned(), Some(&p("a")));
    }

    #[test]
    fn test_stop_without_share_is_noop() {
        let mut board = ScreenBoard::default();
        board.pin(p("a"));

        let outcome = board.stop(&p("a"));

        assert_eq!(outcome, StopOutcome::default());
        assert_eq!(board.pinned(), Some(&p("a")));
    }

    #[test]
    fn test_pin_without_share_and_pinned_share_absent() {
        let mut board = ScreenBoard::default();
        assert!(board.pin(p("ghost")).is_none());

        assert_eq!(board.pinned(), Some(&p("ghost")));
        assert!(board.pinned_share().is_none());
    }

    #[test]
    fn test_unpin_nothing_pinned_is_invalid_state() {
        let mut board = ScreenBoard::default();
        assert!(matches!(
            board.unpin(),
            Err(SignalingError::InvalidState(_))
        ));

        board.pin(p("a"));
        assert_eq!(board.unpin().unwrap(), p("a"));
    }

    #[test]
    fn test_retitle() {
        let mut board = ScreenBoard::default();
        board.start(share("a", "s1"), 4).unwrap();

        let updated = board
            .retitle(&p("a"), &StreamId::new("s1"), "Roadmap".to_string())
            .unwrap();
        assert_eq!(updated.title.as_deref(), Some("Roadmap"));

        let missing = board.retitle(&p("a"), &StreamId::new("other"), "x".to_string());
        assert!(matches!(missing, Err(SignalingError::NotFound(_))));
    }
}
