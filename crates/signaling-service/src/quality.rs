//! Connection-quality monitoring.
//!
//! Clients report packet loss, latency and bandwidth periodically. Each
//! report is classified into a [`QualityTier`], stored as the participant's
//! latest [`QualitySample`], and pushed to the room's host and co-hosts
//! only. Ordinary participants never see each other's telemetry.

use crate::collaborators::RoomDirectory;
use crate::errors::SignalingError;
use crate::observability::metrics;
use crate::presence::PresenceRegistry;
use crate::protocol::{Notification, QualityReport, ServerEvent};
use crate::session::SessionStore;
use crate::transport::{fan_out, Transport};
use chrono::{DateTime, Utc};
use common::types::{ParticipantId, RoomId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Connection quality classes, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Excellent,
    Good,
    Fair,
    Poor,
    Disconnected,
}

impl QualityTier {
    /// Classify a report. Thresholds are checked best tier first; the first
    /// match wins.
    #[must_use]
    pub fn classify(packet_loss_percent: f64, latency_ms: f64, bandwidth_kbps: f64) -> Self {
        if packet_loss_percent < 1.0 && latency_ms < 50.0 && bandwidth_kbps > 1000.0 {
            QualityTier::Excellent
        } else if packet_loss_percent < 2.0 && latency_ms < 150.0 && bandwidth_kbps > 500.0 {
            QualityTier::Good
        } else if packet_loss_percent < 5.0 && latency_ms < 300.0 && bandwidth_kbps > 100.0 {
            QualityTier::Fair
        } else if bandwidth_kbps > 0.0 {
            QualityTier::Poor
        } else {
            QualityTier::Disconnected
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            QualityTier::Excellent => "Excellent",
            QualityTier::Good => "Good",
            QualityTier::Fair => "Fair",
            QualityTier::Poor => "Poor",
            QualityTier::Disconnected => "Disconnected",
        }
    }

    /// Indicator colour for client rendering.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            QualityTier::Excellent | QualityTier::Good => "green",
            QualityTier::Fair => "yellow",
            QualityTier::Poor => "red",
            QualityTier::Disconnected => "gray",
        }
    }

    #[must_use]
    pub const fn score(self) -> u8 {
        match self {
            QualityTier::Excellent => 90,
            QualityTier::Good => 70,
            QualityTier::Fair => 50,
            QualityTier::Poor => 30,
            QualityTier::Disconnected => 0,
        }
    }

    /// Bounded metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            QualityTier::Excellent => "excellent",
            QualityTier::Good => "good",
            QualityTier::Fair => "fair",
            QualityTier::Poor => "poor",
            QualityTier::Disconnected => "disconnected",
        }
    }
}

/// A participant's latest report with its derived tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualitySample {
    pub packet_loss_percent: f64,
    pub latency_ms: f64,
    pub bandwidth_kbps: f64,
    pub tier: QualityTier,
    pub last_ping: DateTime<Utc>,
}

impl QualitySample {
    /// Classify a report and stamp it with the current time.
    #[must_use]
    pub fn from_report(report: QualityReport) -> Self {
        Self {
            packet_loss_percent: report.packet_loss_percent,
            latency_ms: report.latency_ms,
            bandwidth_kbps: report.bandwidth_kbps,
            tier: QualityTier::classify(
                report.packet_loss_percent,
                report.latency_ms,
                report.bandwidth_kbps,
            ),
            last_ping: Utc::now(),
        }
    }

    #[must_use]
    pub fn report(&self) -> QualityReport {
        QualityReport {
            packet_loss_percent: self.packet_loss_percent,
            latency_ms: self.latency_ms,
            bandwidth_kbps: self.bandwidth_kbps,
        }
    }
}

/// Per-tier participant counts for a room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityStatistics {
    pub total: usize,
    pub excellent: usize,
    pub good: usize,
    pub fair: usize,
    pub poor: usize,
    pub disconnected: usize,
}

impl QualityStatistics {
    fn count(&mut self, tier: QualityTier) {
        self.total += 1;
        match tier {
            QualityTier::Excellent => self.excellent += 1,
            QualityTier::Good => self.good += 1,
            QualityTier::Fair => self.fair += 1,
            QualityTier::Poor => self.poor += 1,
            QualityTier::Disconnected => self.disconnected += 1,
        }
    }
}

/// Records quality samples and routes them to privileged participants.
pub struct QualityMonitor {
    store: Arc<SessionStore>,
    presence: Arc<PresenceRegistry>,
    directory: Arc<dyn RoomDirectory>,
    transport: Arc<dyn Transport>,
}

impl QualityMonitor {
    pub fn new(
        store: Arc<SessionStore>,
        presence: Arc<PresenceRegistry>,
        directory: Arc<dyn RoomDirectory>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            store,
            presence,
            directory,
            transport,
        }
    }

    /// Store the participant's sample and send a `connection-status-update`
    /// to every present host and co-host.
    #[instrument(skip_all, fields(room_id = %room, participant_id = %participant))]
    pub async fn record(
        &self,
        room: &RoomId,
        participant: &ParticipantId,
        report: QualityReport,
    ) -> Result<QualitySample, SignalingError> {
        report.validate()?;
        let sample = QualitySample::from_report(report);
        self.store
            .record_quality(room, participant, sample.clone());
        metrics::record_quality_sample(sample.tier.as_str());

        let roles = self.directory.roles(room).await?;
        let recipients: Vec<ParticipantId> = self
            .presence
            .snapshot(room)
            .into_iter()
            .filter(|member| roles.is_privileged(member))
            .collect();

        let tier = sample.tier;
        let notification = Notification::new(ServerEvent::ConnectionStatusUpdate {
            participant_id: participant.clone(),
            status: sample.report(),
            quality: tier,
            label: tier.label(),
            color: tier.color(),
            score: tier.score(),
            last_ping: sample.last_ping,
        });
        let report = fan_out(self.transport.as_ref(), room, &recipients, &notification);

        debug!(
            target: "sig.quality",
            tier = tier.as_str(),
            delivered = report.delivered,
            "Quality sample recorded"
        );
        Ok(sample)
    }

    /// Tier counts across the room's reporting participants. Host and
    /// co-hosts only.
    pub async fn statistics(
        &self,
        room: &RoomId,
        caller: &ParticipantId,
    ) -> Result<QualityStatistics, SignalingError> {
        let roles = self.directory.roles(room).await?;
        if !roles.is_privileged(caller) {
            return Err(SignalingError::AccessDenied(
                "Only the host or a co-host can view quality statistics".to_string(),
            ));
        }

        let session = self
            .store
            .active(room)
            .ok_or_else(|| SignalingError::NotFound(format!("No active session in room {room}")))?;

        let mut stats = QualityStatistics::default();
        for (_, sample) in session.quality_samples() {
            stats.count(sample.tier);
        }
        Ok(stats)
    }
}
