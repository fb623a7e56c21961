//! Pre-configured test data.

use common::types::{ParticipantId, RoomId, StreamId};
use signaling_service::collaborators::RoomRoles;
use signaling_service::protocol::{QualityReport, SignalEnvelope};
use signaling_service::quality::QualityTier;
use uuid::Uuid;

/// Test room fixture with optional host and co-hosts.
#[derive(Debug, Clone)]
pub struct TestRoom {
    pub id: RoomId,
    pub host: Option<ParticipantId>,
    pub co_hosts: Vec<ParticipantId>,
}

impl TestRoom {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: RoomId::new(id),
            host: None,
            co_hosts: Vec::new(),
        }
    }

    /// Create a test room with a random ID.
    #[must_use]
    pub fn random() -> Self {
        Self::new(format!("room-{}", Uuid::new_v4()))
    }

    #[must_use]
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = Some(ParticipantId::new(host));
        self
    }

    #[must_use]
    pub fn with_co_host(mut self, co_host: &str) -> Self {
        self.co_hosts.push(ParticipantId::new(co_host));
        self
    }

    /// Roles to install in a room directory.
    #[must_use]
    pub fn roles(&self) -> RoomRoles {
        RoomRoles {
            host: self.host.clone(),
            co_hosts: self.co_hosts.iter().cloned().collect(),
        }
    }
}

/// Shorthand for a participant ID.
#[must_use]
pub fn pid(id: &str) -> ParticipantId {
    ParticipantId::new(id)
}

/// Shorthand for a stream ID.
#[must_use]
pub fn sid(id: &str) -> StreamId {
    StreamId::new(id)
}

/// Handshake envelope from `from`, optionally addressed to `to`.
#[must_use]
pub fn envelope(room: &TestRoom, from: &str, to: Option<&str>) -> SignalEnvelope {
    SignalEnvelope {
        room_id: room.id.clone(),
        from_participant_id: pid(from),
        to_participant_id: to.map(pid),
        data: serde_json::json!({"sdp": format!("v=0 from {from}")}),
    }
}

/// A quality report that classifies as `tier`.
#[must_use]
pub fn quality_report(tier: QualityTier) -> QualityReport {
    let (packet_loss_percent, latency_ms, bandwidth_kbps) = match tier {
        QualityTier::Excellent => (0.2, 20.0, 2500.0),
        QualityTier::Good => (1.5, 100.0, 800.0),
        QualityTier::Fair => (3.0, 250.0, 300.0),
        QualityTier::Poor => (12.0, 600.0, 50.0),
        QualityTier::Disconnected => (100.0, 0.0, 0.0),
    };
    QualityReport {
        packet_loss_percent,
        latency_ms,
        bandwidth_kbps,
    }
}
